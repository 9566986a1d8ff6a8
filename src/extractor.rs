//! Entity extractor adapter
//!
//! Normalizes the output of the external ML entity-extraction capability and
//! the regex fallback matcher into `EntitySpan`s.
//!
//! ```text
//! prompt ─┬─ (truncate) ─→ [EntityExtractor] ─→ validate ─→ ML spans
//!         └─ (truncate) ─→ [RegexMatcher]    ─────────────→ regex spans
//! ```
//!
//! ML failures never propagate: the adapter returns an empty ML sequence and
//! flags the extraction as degraded.

use crate::config::ActiveConfig;
use crate::error::{FirewallError, Result};
use crate::text;
use crate::types::{EntitySpan, EntityType, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Entity as reported by the ML capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Free-text label (e.g. "person", "credit card number")
    #[serde(rename = "type")]
    pub label: String,

    /// Matched text; when non-empty it must equal the addressed slice
    #[serde(default)]
    pub value: String,

    /// Half-open character offsets
    pub start: usize,
    pub end: usize,

    pub confidence: f64,
}

/// External ML entity-extraction capability
///
/// Implementations fail with `ExtractionUnavailable` or `ExtractionTimeout`.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<RawEntity>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Spans from both detectors for one prompt
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub ml: Vec<EntitySpan>,
    pub regex: Vec<EntitySpan>,

    /// ML capability missing or failed
    pub degraded: bool,

    /// Prompt exceeded `max_prompt_chars` and was truncated for extraction
    pub length_exceeded: bool,
}

/// Runs the ML capability and the regex matcher over a prompt
#[derive(Clone, Default)]
pub struct ExtractorAdapter {
    extractor: Option<Arc<dyn EntityExtractor>>,
}

impl ExtractorAdapter {
    /// Adapter backed by an ML capability
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self {
            extractor: Some(extractor),
        }
    }

    /// Regex-only adapter (always degraded)
    pub fn regex_only() -> Self {
        Self { extractor: None }
    }

    pub fn has_ml(&self) -> bool {
        self.extractor.is_some()
    }

    /// Extract ML and regex spans from `prompt`
    pub async fn extract(&self, prompt: &str, active: &ActiveConfig) -> Extraction {
        let settings = &active.config.classification;

        let total_chars = text::char_len(prompt);
        let length_exceeded = total_chars > settings.max_prompt_chars;
        let scanned = if length_exceeded {
            text::slice_chars(prompt, 0, settings.max_prompt_chars).unwrap_or(prompt)
        } else {
            prompt
        };

        let regex = active.matcher.find(scanned);

        let (ml, degraded) = match &self.extractor {
            None => (Vec::new(), true),
            Some(extractor) => match extractor.extract(scanned).await {
                Ok(raw) => (
                    normalize(raw, scanned, settings.ml_min_confidence),
                    false,
                ),
                Err(e) => {
                    tracing::warn!(
                        extractor = extractor.name(),
                        error = %e,
                        "Entity extraction failed, using regex only"
                    );
                    (Vec::new(), true)
                }
            },
        };

        tracing::debug!(
            ml = ml.len(),
            regex = regex.len(),
            degraded,
            length_exceeded,
            "Extraction complete"
        );

        Extraction {
            ml,
            regex,
            degraded,
            length_exceeded,
        }
    }
}

/// Validate raw ML entities against `text`, dropping malformed ones
pub fn normalize(raw: Vec<RawEntity>, text: &str, min_confidence: f64) -> Vec<EntitySpan> {
    let len = text::char_len(text);
    raw.into_iter()
        .filter_map(|entity| match validate_span(&entity, text, len) {
            Ok(span) => Some(span),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding invalid span");
                None
            }
        })
        .filter(|span| span.confidence >= min_confidence)
        .collect()
}

/// Check bounds, confidence, and value of a raw entity
///
/// The span value is always re-derived from `text`.
pub fn validate_span(entity: &RawEntity, text: &str, len: usize) -> Result<EntitySpan> {
    let invalid = |reason: &str| FirewallError::InvalidSpan {
        start: entity.start,
        end: entity.end,
        len,
        reason: reason.to_string(),
    };

    if entity.start >= entity.end {
        return Err(invalid("empty or inverted range"));
    }
    if entity.end > len {
        return Err(invalid("range past end of text"));
    }
    if !entity.confidence.is_finite() || !(0.0..=1.0).contains(&entity.confidence) {
        return Err(invalid("confidence outside [0, 1]"));
    }

    let value = text::slice_chars(text, entity.start, entity.end)
        .ok_or_else(|| invalid("range not addressable"))?;
    if !entity.value.is_empty() && entity.value != value {
        return Err(invalid("value does not match text"));
    }

    Ok(EntitySpan {
        entity_type: EntityType::from_label(&entity.label),
        label: entity.label.trim().to_lowercase(),
        value: value.to_string(),
        start: entity.start,
        end: entity.end,
        confidence: entity.confidence,
        source: Source::Ml,
    })
}
