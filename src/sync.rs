//! Log buffer persistence and delivery
//!
//! `SyncManager` owns the [`LogBuffer`], persists it to a [`KvStore`] after
//! every mutation, and delivers batches to a [`LogSink`]. Delivery is
//! at-most-N-retries and best-effort: entries reaching the retry ceiling are
//! dead-lettered, not surfaced as errors.
//!
//! Two triggers feed the same in-flight gate, so a sync is never duplicated:
//! - the periodic worker started with [`SyncManager::start`]
//! - the batch threshold, reached on [`SyncManager::enqueue`]
//!
//! Both automatic triggers run on the worker. Reaching the threshold with no
//! worker running leaves a wake-up behind, and a worker started later syncs
//! right away. Callers driving delivery by hand use
//! [`SyncManager::sync_once`].
//!
//! After a failed batch, automatic triggers wait for the backoff deadline.
//! An explicit [`SyncManager::sync_once`] always runs.

use crate::buffer::{FailedBatch, LogBuffer};
use crate::config::{ConfigHandle, SyncConfig};
use crate::dlq::{DeadLetter, DeadLetterHandler, DeadLetterReason};
use crate::error::{FirewallError, Result};
use crate::sink::LogSink;
use crate::state::KvStore;
use crate::types::{BufferedLogEntry, LogBatch, LogEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Storage key of the persisted buffer
pub const BUFFER_KEY: &str = "logBuffer";

/// Result of one sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing pending
    Idle,
    /// Another sync is running; nothing was done
    AlreadyInFlight,
    Delivered {
        count: usize,
        /// Highest retry count among the delivered entries
        max_retry_count: u32,
    },
    Failed {
        attempted: usize,
        dropped: usize,
        retry_in: Duration,
    },
}

/// Counters since the manager was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub delivered: u64,
    pub failed_attempts: u64,
    pub dropped: u64,
    pub evicted: u64,
    /// Sync attempts started by the worker
    pub worker_ticks: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    worker_ticks: AtomicU64,
}

struct BufferState {
    buffer: LogBuffer,
    next_retry_at: Option<Instant>,
}

struct Inner {
    state: Mutex<BufferState>,
    store: Arc<dyn KvStore>,
    sink: Arc<dyn LogSink>,
    dead_letters: Arc<dyn DeadLetterHandler>,
    config: ConfigHandle,
    in_flight: AtomicBool,
    counters: Counters,
    trigger: Notify,
}

/// Clears the in-flight flag when a sync attempt ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the log buffer; cheap to clone
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl SyncManager {
    /// Open the manager, loading any persisted buffer from `store`
    ///
    /// Loaded entries are all PENDING regardless of their state before the
    /// restart.
    pub async fn open(
        config: ConfigHandle,
        store: Arc<dyn KvStore>,
        sink: Arc<dyn LogSink>,
        dead_letters: Arc<dyn DeadLetterHandler>,
    ) -> Result<Self> {
        let capacity = config.current().config.sync.capacity;

        let persisted: Vec<BufferedLogEntry> = match store.get(&[BUFFER_KEY]).await?.remove(BUFFER_KEY) {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        let loaded = persisted.len();
        let (buffer, evicted) = LogBuffer::restore(persisted, capacity);

        let manager = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BufferState {
                    buffer,
                    next_retry_at: None,
                }),
                store,
                sink,
                dead_letters,
                config,
                in_flight: AtomicBool::new(false),
                counters: Counters::default(),
                trigger: Notify::new(),
            }),
        };

        if !evicted.is_empty() {
            let state = manager.inner.state.lock().await;
            manager.persist(&state.buffer).await?;
            drop(state);
            manager.dead_letter(evicted, DeadLetterReason::Evicted).await;
        }

        tracing::info!(
            loaded,
            sink = manager.inner.sink.name(),
            "Log buffer opened"
        );
        Ok(manager)
    }

    fn sync_config(&self) -> SyncConfig {
        self.inner.config.current().config.sync.clone()
    }

    /// Buffer a log entry and persist the buffer
    ///
    /// The entry stays buffered even if persisting fails; the storage error
    /// is returned. Reaching the batch threshold wakes the sync worker; it
    /// never delivers inline, so `enqueue` does not wait on the network.
    pub async fn enqueue(&self, log: LogEntry) -> Result<()> {
        let cfg = self.sync_config();
        let log_id = log.id.clone();

        let mut state = self.inner.state.lock().await;
        let mut evicted = state.buffer.set_capacity(cfg.capacity);
        evicted.extend(state.buffer.push(log));
        let len = state.buffer.len();
        let persisted = self.persist(&state.buffer).await;
        drop(state);

        tracing::debug!(log_id = %log_id, buffered = len, "Log entry buffered");

        self.dead_letter(evicted, DeadLetterReason::Evicted).await;

        if len >= cfg.batch_size {
            self.inner.trigger.notify_one();
        }

        persisted
    }

    /// Attempt delivery of one batch
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Sync already in flight");
            return Ok(SyncOutcome::AlreadyInFlight);
        }
        let _guard = InFlightGuard(&self.inner.in_flight);

        let cfg = self.sync_config();

        let (batch, evicted) = {
            let mut state = self.inner.state.lock().await;
            let evicted = state.buffer.set_capacity(cfg.capacity);
            let batch = state.buffer.select_batch(cfg.batch_size);
            if batch.is_empty() {
                state.next_retry_at = None;
            }
            (batch, evicted)
        };
        self.dead_letter(evicted, DeadLetterReason::Evicted).await;

        if batch.is_empty() {
            return Ok(SyncOutcome::Idle);
        }

        let ids: Vec<String> = batch.iter().map(|l| l.id.clone()).collect();
        let attempted = ids.len();
        let body = LogBatch {
            device_id: cfg.device_id.clone(),
            logs: batch,
        };

        match self.inner.sink.deliver(&body).await {
            Ok(()) => {
                let mut state = self.inner.state.lock().await;
                let max_retry_count = state
                    .buffer
                    .iter()
                    .filter(|e| ids.contains(&e.log.id))
                    .map(|e| e.retry_count)
                    .max()
                    .unwrap_or(0);
                let count = state.buffer.complete_delivered(&ids);
                state.next_retry_at = None;
                let persisted = self.persist(&state.buffer).await;
                drop(state);

                self.inner
                    .counters
                    .delivered
                    .fetch_add(count as u64, Ordering::Relaxed);
                tracing::info!(count, max_retry_count, "Log batch delivered");

                persisted?;
                Ok(SyncOutcome::Delivered {
                    count,
                    max_retry_count,
                })
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                let FailedBatch {
                    dropped,
                    max_retry_count,
                } = state.buffer.complete_failed(&ids, cfg.retry_ceiling);
                let retry_in = cfg.backoff_for(max_retry_count);
                // Nothing left to retry once every attempted entry is dropped
                state.next_retry_at =
                    (!state.buffer.is_empty()).then(|| Instant::now() + retry_in);
                let persisted = self.persist(&state.buffer).await;
                drop(state);

                self.inner
                    .counters
                    .failed_attempts
                    .fetch_add(1, Ordering::Relaxed);
                let dropped_count = dropped.len();
                tracing::warn!(
                    error = %e,
                    attempted,
                    dropped = dropped_count,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Log batch delivery failed"
                );
                self.dead_letter(dropped, DeadLetterReason::RetryCeiling).await;

                persisted?;
                Ok(SyncOutcome::Failed {
                    attempted,
                    dropped: dropped_count,
                    retry_in,
                })
            }
        }
    }

    /// Spawn the periodic sync worker
    pub fn start(&self) -> SyncWorker {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run(shutdown_rx).await });

        tracing::info!("Log sync worker started");
        SyncWorker {
            shutdown_tx,
            handle,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut config_rx = self.inner.config.subscribe();
        let mut last_tick = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let wake_at = self.next_wake(last_tick).await;

            tokio::select! {
                _ = shutdown_rx.changed() => break,
                // Recompute the wake time against the new interval
                Ok(()) = config_rx.changed() => continue,
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = self.inner.trigger.notified() => {}
            }

            if !self.retry_due().await {
                continue;
            }

            last_tick = Instant::now();
            self.inner
                .counters
                .worker_ticks
                .fetch_add(1, Ordering::Relaxed);
            match self.sync_once().await {
                Ok(outcome) => tracing::debug!(?outcome, "Sync tick"),
                Err(e) => tracing::warn!(error = %e, "Sync tick failed"),
            }
        }

        tracing::info!("Log sync worker stopped");
    }

    /// When the worker next wakes on its own
    ///
    /// A pending backoff deadline wins; otherwise one interval after the last
    /// tick. Never earlier than now.
    async fn next_wake(&self, last_tick: Instant) -> Instant {
        let now = Instant::now();
        match self.next_retry_at().await {
            Some(at) if at > now => at,
            _ => (last_tick + self.sync_config().sync_interval()).max(now),
        }
    }

    async fn persist(&self, buffer: &LogBuffer) -> Result<()> {
        let value = serde_json::to_value(buffer.snapshot())?;
        let mut entries = HashMap::with_capacity(1);
        entries.insert(BUFFER_KEY.to_string(), value);

        self.inner.store.set(entries).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to persist log buffer");
            e
        })
    }

    async fn dead_letter(&self, entries: Vec<BufferedLogEntry>, reason: DeadLetterReason) {
        if entries.is_empty() {
            return;
        }

        let counter = match reason {
            DeadLetterReason::RetryCeiling => &self.inner.counters.dropped,
            DeadLetterReason::Evicted => &self.inner.counters.evicted,
        };
        counter.fetch_add(entries.len() as u64, Ordering::Relaxed);

        for entry in &entries {
            if reason == DeadLetterReason::RetryCeiling {
                let error = FirewallError::RetryCeilingExceeded {
                    log_id: entry.log.id.clone(),
                    retries: entry.retry_count,
                };
                tracing::warn!(error = %error, "Log entry dropped");
            }
            if let Err(e) = self
                .inner
                .dead_letters
                .handle(DeadLetter::new(entry, reason))
                .await
            {
                tracing::warn!(log_id = %entry.log.id, error = %e, "Dead-letter handler failed");
            }
        }
    }

    /// Whether automatic triggers may sync now
    pub async fn retry_due(&self) -> bool {
        self.next_retry_at()
            .await
            .map_or(true, |at| at <= Instant::now())
    }

    /// Deadline of the scheduled retry, if a batch recently failed
    pub async fn next_retry_at(&self) -> Option<Instant> {
        self.inner.state.lock().await.next_retry_at
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.buffer.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.buffer.is_empty()
    }

    /// Copy of the buffered entries in FIFO order
    pub async fn entries(&self) -> Vec<BufferedLogEntry> {
        self.inner.state.lock().await.buffer.snapshot()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.inner.counters;
        SyncStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            failed_attempts: c.failed_attempts.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            worker_ticks: c.worker_ticks.load(Ordering::Relaxed),
        }
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterHandler> {
        &self.inner.dead_letters
    }
}

/// Running periodic sync task
pub struct SyncWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Stop the worker and wait for it to finish
    ///
    /// A sync in progress completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Log sync worker ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
