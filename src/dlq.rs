//! Dead letters: usage records the buffer gave up on
//!
//! Entries dropped at the retry ceiling or evicted at capacity are handed to
//! a `DeadLetterHandler`. Their loss is a bounded, expected outcome, so the
//! handler only makes it observable.

use crate::error::Result;
use crate::types::BufferedLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Why an entry left the buffer undelivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Retry count reached the ceiling
    RetryCeiling,
    /// Oldest pending entry evicted to stay within capacity
    Evicted,
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetryCeiling => write!(f, "retry ceiling exceeded"),
            Self::Evicted => write!(f, "evicted at capacity"),
        }
    }
}

/// A log entry that will never be delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub log_id: String,
    pub retry_count: u32,
    pub reason: DeadLetterReason,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(entry: &BufferedLogEntry, reason: DeadLetterReason) -> Self {
        Self {
            log_id: entry.log.id.clone(),
            retry_count: entry.retry_count,
            reason,
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Receives dead-lettered entries
#[async_trait]
pub trait DeadLetterHandler: Send + Sync {
    async fn handle(&self, letter: DeadLetter) -> Result<()>;

    /// Number of dead letters currently held
    async fn count(&self) -> Result<usize>;

    /// Most recent dead letters first
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>>;
}

/// Bounded in-memory handler; the oldest letters are discarded first
pub struct MemoryDeadLetterHandler {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
    max_letters: usize,
}

impl MemoryDeadLetterHandler {
    pub fn new(max_letters: usize) -> Self {
        Self {
            letters: Arc::new(RwLock::new(Vec::new())),
            max_letters,
        }
    }
}

impl Default for MemoryDeadLetterHandler {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl DeadLetterHandler for MemoryDeadLetterHandler {
    async fn handle(&self, letter: DeadLetter) -> Result<()> {
        tracing::warn!(
            log_id = %letter.log_id,
            retry_count = letter.retry_count,
            reason = %letter.reason,
            "Log entry dead-lettered"
        );

        let mut letters = self.letters.write().await;
        letters.push(letter);

        if self.max_letters > 0 && letters.len() > self.max_letters {
            let drain_count = letters.len() - self.max_letters;
            letters.drain(..drain_count);
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.letters.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let letters = self.letters.read().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }
}

/// Whether an entry with `retry_count` failures must be dropped
pub fn exceeds_ceiling(retry_count: u32, retry_ceiling: u32) -> bool {
    retry_count >= retry_ceiling
}
