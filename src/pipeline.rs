//! Prompt firewall facade
//!
//! Ties classification, sanitization, diffing and usage logging together:
//!
//! ```text
//! prompt → classify → (tier >= sanitizeMinTier) sanitize → diff → Inspection
//! Inspection + Interaction → LogEntry → SyncManager::enqueue
//! ```

use crate::classifier::Classifier;
use crate::diff::{self, DiffResult};
use crate::error::Result;
use crate::sanitize::Sanitizer;
use crate::sync::SyncManager;
use crate::text;
use crate::types::{
    ClassificationResult, EntitySpan, Interaction, LogEntry, RiskTier, SanitizationResult,
};

/// Everything known about one prompt before it is sent
#[derive(Debug, Clone)]
pub struct Inspection {
    pub classification: ClassificationResult,

    /// Present when the tier reached the sanitization threshold
    pub sanitization: Option<SanitizationResult>,
    pub diff: Option<DiffResult>,

    /// Prompt length in characters
    pub prompt_length: usize,
}

impl Inspection {
    pub fn risk_tier(&self) -> RiskTier {
        self.classification.risk_tier
    }

    /// Sanitized prompt if sanitization applied
    pub fn sanitized_prompt(&self) -> Option<&str> {
        self.sanitization
            .as_ref()
            .map(|s| s.sanitized_prompt.as_str())
    }
}

pub struct PromptFirewall {
    classifier: Classifier,
    sync: SyncManager,
}

impl PromptFirewall {
    pub fn new(classifier: Classifier, sync: SyncManager) -> Self {
        Self { classifier, sync }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    /// Classify a prompt and, when risky enough, sanitize it
    pub async fn inspect(&self, prompt: &str) -> Inspection {
        let classification = self.classifier.classify(prompt).await;
        let settings = self.classifier.config().current().config.sanitization.clone();

        let (sanitization, diff) = if classification.risk_tier >= settings.sanitize_min_tier
            && !classification.entities.is_empty()
        {
            let sanitization =
                Sanitizer::from_config(&settings).sanitize(prompt, &classification.entities);
            let diff = diff::generate_diff(prompt, &sanitization);
            (Some(sanitization), Some(diff))
        } else {
            (None, None)
        };

        tracing::debug!(
            tier = %classification.risk_tier,
            sanitized = sanitization.is_some(),
            "Prompt inspected"
        );

        Inspection {
            classification,
            sanitization,
            diff,
            prompt_length: text::char_len(prompt),
        }
    }

    /// Sanitize with the configured strategy regardless of tier
    pub fn sanitize(&self, prompt: &str, entities: &[EntitySpan]) -> SanitizationResult {
        let settings = &self.classifier.config().current().config.sanitization;
        Sanitizer::from_config(settings).sanitize(prompt, entities)
    }

    /// Buffer a usage record for an inspected interaction
    ///
    /// The record carries counts, types and flags only. A storage error is
    /// returned, but the record stays buffered for delivery.
    pub async fn record(
        &self,
        interaction: &Interaction,
        inspection: &Inspection,
        was_sanitized: bool,
    ) -> Result<LogEntry> {
        let entry = LogEntry::from_classification(
            interaction,
            &inspection.classification,
            inspection.prompt_length,
            was_sanitized,
        );
        self.sync.enqueue(entry.clone()).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigHandle, FirewallConfig};
    use crate::dlq::MemoryDeadLetterHandler;
    use crate::extractor::ExtractorAdapter;
    use crate::sink::MemoryLogSink;
    use crate::state::MemoryKvStore;
    use crate::types::{EntityType, LogMetadata, ToolType};
    use std::sync::Arc;

    async fn firewall(config: FirewallConfig) -> PromptFirewall {
        let config = ConfigHandle::new(config).unwrap();
        let sync = SyncManager::open(
            config.clone(),
            Arc::new(MemoryKvStore::new()),
            Arc::new(MemoryLogSink::new()),
            Arc::new(MemoryDeadLetterHandler::default()),
        )
        .await
        .unwrap();
        PromptFirewall::new(Classifier::new(config, ExtractorAdapter::regex_only()), sync)
    }

    fn interaction() -> Interaction {
        Interaction {
            device_id: "device-1".to_string(),
            user_id: "user-1".to_string(),
            tool_name: "ChatGPT".to_string(),
            tool_type: ToolType::Web,
            metadata: LogMetadata {
                agent_version: "1.0.0".to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_inspect_sanitizes_amber() {
        let fw = firewall(FirewallConfig::default()).await;
        let inspection = fw.inspect("My email is john@example.com").await;

        assert_eq!(inspection.risk_tier(), RiskTier::Amber);
        assert_eq!(
            inspection.sanitized_prompt(),
            Some("My email is [PERSONAL_INFO]")
        );
        assert_eq!(inspection.diff.as_ref().unwrap().num_changes, 1);
        assert_eq!(inspection.prompt_length, 28);
    }

    #[tokio::test]
    async fn test_inspect_green_skips_sanitization() {
        let fw = firewall(FirewallConfig::default()).await;
        let inspection = fw.inspect("What is the capital of France?").await;

        assert_eq!(inspection.risk_tier(), RiskTier::Green);
        assert!(inspection.sanitization.is_none());
        assert!(inspection.diff.is_none());
    }

    #[tokio::test]
    async fn test_sanitize_min_tier_red() {
        let mut config = FirewallConfig::default();
        config.sanitization.sanitize_min_tier = RiskTier::Red;
        let fw = firewall(config).await;

        let inspection = fw.inspect("My email is john@example.com").await;
        assert_eq!(inspection.risk_tier(), RiskTier::Amber);
        assert!(inspection.sanitization.is_none());
    }

    #[tokio::test]
    async fn test_record_buffers_metadata_only() {
        let fw = firewall(FirewallConfig::default()).await;
        let inspection = fw.inspect("My email is john@example.com").await;
        let entry = fw.record(&interaction(), &inspection, true).await.unwrap();

        assert!(entry.id.starts_with("log-"));
        assert_eq!(entry.risk_level, RiskTier::Amber);
        assert_eq!(entry.detected_entity_types, vec![EntityType::Pii]);
        assert_eq!(entry.entity_count, 1);
        assert!(entry.was_sanitized);

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("john@example.com"));
        assert_eq!(fw.sync().len().await, 1);
    }
}
