//! Log sinks — where batches of usage records are delivered
//!
//! A sink acknowledges a whole batch or fails it as a whole; there is no
//! partial acknowledgement. Any failure is reported as `SyncFailure`.

use crate::error::Result;
use crate::types::LogBatch;
use async_trait::async_trait;

pub mod http;
pub mod memory;

pub use http::HttpLogSink;
pub use memory::MemoryLogSink;

/// Log-ingestion endpoint
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch
    async fn deliver(&self, batch: &LogBatch) -> Result<()>;

    /// Sink name (e.g., "http", "memory")
    fn name(&self) -> &str;
}
