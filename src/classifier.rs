//! Prompt classification
//!
//! Extraction, merging and scoring run as one unit under the configured time
//! budget. When the budget elapses the prompt is classified AMBER with no
//! entities; a classification is never partially observable.

use crate::config::{ActiveConfig, ConfigHandle};
use crate::extractor::ExtractorAdapter;
use crate::merge;
use crate::risk::{self, RiskScore};
use crate::types::{ClassificationResult, EntitySpan};
use tokio::time::Instant;

/// Classifies prompts against the current configuration
#[derive(Clone)]
pub struct Classifier {
    config: ConfigHandle,
    adapter: ExtractorAdapter,
}

impl Classifier {
    pub fn new(config: ConfigHandle, adapter: ExtractorAdapter) -> Self {
        Self { config, adapter }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn adapter(&self) -> &ExtractorAdapter {
        &self.adapter
    }

    /// Classify a prompt
    ///
    /// Never fails: degraded extraction and timeouts are reported through
    /// the result's flags.
    pub async fn classify(&self, prompt: &str) -> ClassificationResult {
        if prompt.trim().is_empty() {
            return ClassificationResult::green();
        }

        let active = self.config.current();
        let budget = active.config.classification.time_budget();
        let started = Instant::now();

        let outcome = tokio::time::timeout(budget, self.run(prompt, &active)).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(mut result) => {
                result.processing_time_ms = elapsed_ms;
                tracing::debug!(
                    tier = %result.risk_tier,
                    entities = result.entities.len(),
                    degraded = result.degraded,
                    elapsed_ms,
                    "Prompt classified"
                );
                result
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = budget.as_millis() as u64,
                    "Classification exceeded time budget, defaulting to amber"
                );
                ClassificationResult::fallback(elapsed_ms)
            }
        }
    }

    /// Risk breakdown for an entity set under the current thresholds
    pub fn score(&self, entities: &[EntitySpan]) -> RiskScore {
        risk::score(entities, &self.config.current().config.thresholds)
    }

    async fn run(&self, prompt: &str, active: &ActiveConfig) -> ClassificationResult {
        let extraction = self.adapter.extract(prompt, active).await;
        let entities = merge::merge(extraction.ml, extraction.regex);
        let score = risk::score(&entities, &active.config.thresholds);

        let confidence = if entities.is_empty() {
            1.0
        } else {
            entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64
        };

        ClassificationResult {
            risk_tier: score.tier,
            entities,
            confidence,
            processing_time_ms: 0.0,
            degraded: extraction.degraded,
            length_exceeded: extraction.length_exceeded,
            timed_out: false,
        }
    }
}
