//! # a3s-firewall
//!
//! On-device AI-usage firewall core: classify prompts for sensitive data,
//! sanitize them before they leave the machine, and deliver privacy-safe
//! usage logs reliably.
//!
//! ## Overview
//!
//! A prompt flows through entity extraction (an ML capability plus a regex
//! fallback), overlap resolution, and risk scoring. Risky prompts are
//! sanitized with typed placeholders, masks, or redaction, and a diff shows
//! what changed. Each interaction produces a `LogEntry` carrying only counts,
//! types and flags, buffered durably and synced in batches with bounded
//! retries.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_firewall::{
//!     Classifier, ConfigHandle, ExtractorAdapter, FirewallConfig, MemoryDeadLetterHandler,
//!     MemoryKvStore, MemoryLogSink, PromptFirewall, RiskTier, SyncManager,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_firewall::Result<()> {
//! let config = ConfigHandle::new(FirewallConfig::default())?;
//! let sync = SyncManager::open(
//!     config.clone(),
//!     Arc::new(MemoryKvStore::new()),
//!     Arc::new(MemoryLogSink::new()),
//!     Arc::new(MemoryDeadLetterHandler::default()),
//! )
//! .await?;
//! let firewall = PromptFirewall::new(
//!     Classifier::new(config, ExtractorAdapter::regex_only()),
//!     sync,
//! );
//!
//! let inspection = firewall.inspect("My email is john@example.com").await;
//! assert_eq!(inspection.risk_tier(), RiskTier::Amber);
//! assert_eq!(inspection.sanitized_prompt(), Some("My email is [PERSONAL_INFO]"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EntityExtractor** trait — external ML entity-extraction capability
//! - **RegexMatcher** — deterministic fallback detector
//! - **merge** / **risk** — overlap resolution and tiering, pure functions
//! - **Sanitizer** / **diff** — prompt rewriting and change report
//! - **SyncManager** — durable log buffer with batched, retried delivery
//! - **KvStore** / **LogSink** / **DeadLetterHandler** — pluggable backends

pub mod buffer;
pub mod classifier;
pub mod config;
pub mod diff;
pub mod dlq;
pub mod error;
pub mod extractor;
pub mod merge;
pub mod patterns;
pub mod pipeline;
pub mod risk;
pub mod sanitize;
pub mod sink;
pub mod state;
pub mod sync;
pub mod text;
pub mod types;

// Re-export core types
pub use buffer::LogBuffer;
pub use classifier::Classifier;
pub use config::{
    ActiveConfig, ClassificationConfig, ConfigHandle, FirewallConfig, RiskThresholds,
    SanitizationConfig, SyncConfig,
};
pub use diff::{format_diff_text, generate_diff, DiffResult, DiffSegment, DiffSegmentKind};
pub use dlq::{DeadLetter, DeadLetterHandler, DeadLetterReason, MemoryDeadLetterHandler};
pub use error::{FirewallError, Result};
pub use extractor::{EntityExtractor, Extraction, ExtractorAdapter, RawEntity};
pub use patterns::{CustomPattern, PatternRule, RegexMatcher};
pub use pipeline::{Inspection, PromptFirewall};
pub use risk::RiskScore;
pub use sanitize::{SanitizationStrategy, Sanitizer};
pub use sink::{HttpLogSink, LogSink, MemoryLogSink};
pub use state::{FileKvStore, KvStore, MemoryKvStore};
pub use sync::{SyncManager, SyncOutcome, SyncStats, SyncWorker};
pub use types::{
    BufferedLogEntry, ClassificationResult, DeliveryState, EntitySpan, EntityType, Interaction,
    LogBatch, LogEntry, LogMetadata, Replacement, RiskTier, SanitizationResult, Source, ToolType,
};
