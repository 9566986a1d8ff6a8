//! Firewall configuration with hot reload
//!
//! `FirewallConfig` is the serializable settings document (camelCase JSON,
//! every section optional). `ConfigHandle` publishes validated snapshots
//! through a `tokio::sync::watch` channel so the classifier and the sync
//! manager pick up changes on their next operation without a restart.

use crate::error::{FirewallError, Result};
use crate::patterns::{CustomPattern, RegexMatcher};
use crate::sanitize::SanitizationStrategy;
use crate::types::RiskTier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Entity-count and confidence thresholds for risk tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskThresholds {
    pub amber_min_entities: usize,
    pub red_min_entities: usize,
    pub high_confidence_threshold: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            amber_min_entities: 1,
            red_min_entities: 4,
            high_confidence_threshold: 0.98,
        }
    }
}

/// Classification pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationConfig {
    /// Prompts longer than this are truncated for extraction only
    pub max_prompt_chars: usize,

    /// Budget for extraction + merge + scoring, in milliseconds
    pub time_budget_ms: u64,

    /// Fixed confidence reported for every regex match
    pub regex_confidence: f64,

    /// ML spans below this confidence are discarded
    pub ml_min_confidence: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 10_000,
            time_budget_ms: 2_000,
            regex_confidence: 0.85,
            ml_min_confidence: 0.5,
        }
    }
}

impl ClassificationConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

/// Sanitizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizationConfig {
    pub strategy: SanitizationStrategy,

    /// Character used by the mask strategy
    pub mask_char: char,

    /// Trailing characters left visible by the mask strategy
    pub visible_suffix: usize,

    /// Lowest tier at which prompts are sanitized
    pub sanitize_min_tier: RiskTier,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            strategy: SanitizationStrategy::Placeholder,
            mask_char: '*',
            visible_suffix: 4,
            sanitize_min_tier: RiskTier::Amber,
        }
    }
}

/// Log buffering and delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Log-ingestion endpoint (e.g. `https://firewall.example.com/api/v1/logs/batch`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token for the endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    pub device_id: String,

    /// Entries per delivery; reaching this many buffered entries wakes the worker
    pub batch_size: usize,

    pub sync_interval_ms: u64,

    /// Failed deliveries after which an entry is dropped
    pub retry_ceiling: u32,

    pub initial_backoff_ms: u64,

    /// Maximum buffered entries; oldest pending entries are evicted beyond it,
    /// then oldest in-flight ones
    pub capacity: usize,

    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            device_id: "unknown-device".to_string(),
            batch_size: 50,
            sync_interval_ms: 30_000,
            retry_ceiling: 5,
            initial_backoff_ms: 1_000,
            capacity: 1_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before retrying entries that have failed `retry_count` times
    ///
    /// `initial_backoff * 2^retry_count`, saturating.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.initial_backoff().saturating_mul(factor)
    }
}

/// Complete firewall configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallConfig {
    pub thresholds: RiskThresholds,
    pub custom_patterns: Vec<CustomPattern>,
    pub classification: ClassificationConfig,
    pub sanitization: SanitizationConfig,
    pub sync: SyncConfig,
}

impl FirewallConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            FirewallError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Check thresholds and limits for consistency
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if t.amber_min_entities < 1 {
            return Err(FirewallError::Config(
                "amberMinEntities must be at least 1".to_string(),
            ));
        }
        if t.red_min_entities < t.amber_min_entities {
            return Err(FirewallError::Config(format!(
                "redMinEntities ({}) must be >= amberMinEntities ({})",
                t.red_min_entities, t.amber_min_entities
            )));
        }
        if !(t.high_confidence_threshold > 0.0 && t.high_confidence_threshold <= 1.0) {
            return Err(FirewallError::Config(format!(
                "highConfidenceThreshold must be in (0, 1], got {}",
                t.high_confidence_threshold
            )));
        }

        let c = &self.classification;
        if !(0.0..=1.0).contains(&c.regex_confidence) || !(0.0..=1.0).contains(&c.ml_min_confidence)
        {
            return Err(FirewallError::Config(
                "regexConfidence and mlMinConfidence must be in [0, 1]".to_string(),
            ));
        }
        if c.max_prompt_chars == 0 {
            return Err(FirewallError::Config(
                "maxPromptChars must be positive".to_string(),
            ));
        }

        let s = &self.sync;
        if s.batch_size == 0 {
            return Err(FirewallError::Config("batchSize must be at least 1".to_string()));
        }
        if s.capacity < s.batch_size {
            return Err(FirewallError::Config(format!(
                "capacity ({}) must be >= batchSize ({})",
                s.capacity, s.batch_size
            )));
        }
        if s.retry_ceiling == 0 {
            return Err(FirewallError::Config(
                "retryCeiling must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// A validated configuration together with its compiled regex matcher
#[derive(Debug)]
pub struct ActiveConfig {
    pub config: FirewallConfig,
    pub matcher: RegexMatcher,

    /// Incremented on every successful update
    pub version: u64,
}

impl ActiveConfig {
    fn build(config: FirewallConfig, version: u64) -> Result<Self> {
        config.validate()?;
        let matcher = RegexMatcher::with_custom(
            &config.custom_patterns,
            config.classification.regex_confidence,
        )?;
        Ok(Self {
            config,
            matcher,
            version,
        })
    }
}

/// Shared, hot-reloadable configuration
///
/// Cloning is cheap; all clones observe the same updates.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<ActiveConfig>>>,
}

impl ConfigHandle {
    /// Validate and publish the initial configuration
    pub fn new(config: FirewallConfig) -> Result<Self> {
        let active = ActiveConfig::build(config, 1)?;
        let (tx, _rx) = watch::channel(Arc::new(active));
        Ok(Self { tx: Arc::new(tx) })
    }

    /// Current configuration snapshot
    pub fn current(&self) -> Arc<ActiveConfig> {
        self.tx.borrow().clone()
    }

    /// Replace the configuration
    ///
    /// On validation or pattern-compilation failure the previous
    /// configuration stays active.
    pub fn update(&self, config: FirewallConfig) -> Result<u64> {
        let version = self.current().version + 1;
        let active = ActiveConfig::build(config, version).map_err(|e| {
            tracing::warn!(error = %e, "Rejected configuration update");
            e
        })?;

        self.tx.send_replace(Arc::new(active));
        tracing::info!(version, "Configuration updated");
        Ok(version)
    }

    /// Receiver notified on every update
    pub fn subscribe(&self) -> watch::Receiver<Arc<ActiveConfig>> {
        self.tx.subscribe()
    }
}
