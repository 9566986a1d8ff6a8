//! In-memory sink for testing and single-process use

use super::LogSink;
use crate::error::{FirewallError, Result};
use crate::types::LogBatch;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Records delivered batches; can be told to fail or to respond slowly
#[derive(Default)]
pub struct MemoryLogSink {
    batches: RwLock<Vec<LogBatch>>,
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` deliveries
    pub fn failing(count: usize) -> Self {
        let sink = Self::default();
        sink.fail_next(count);
        sink
    }

    /// Wait `latency` before answering each delivery
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delivery attempts, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered batches, in delivery order
    pub async fn batches(&self) -> Vec<LogBatch> {
        self.batches.read().await.clone()
    }

    /// Total logs across delivered batches
    pub async fn delivered_count(&self) -> usize {
        self.batches.read().await.iter().map(|b| b.logs.len()).sum()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn deliver(&self, batch: &LogBatch) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FirewallError::SyncFailure(format!(
                "memory sink rejected attempt {}",
                attempt
            )));
        }

        self.batches.write().await.push(batch.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
