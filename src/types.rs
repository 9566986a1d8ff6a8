//! Core types for the a3s-firewall pipeline
//!
//! All wire-facing types use camelCase JSON serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of sensitive data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Pii,
    Financial,
    Contract,
    Ip,
    Custom,
}

/// Detector label → entity type, checked by exact then substring match
const LABEL_TYPES: &[(&str, EntityType)] = &[
    ("person", EntityType::Pii),
    ("name", EntityType::Pii),
    ("email", EntityType::Pii),
    ("phone", EntityType::Pii),
    ("phone number", EntityType::Pii),
    ("address", EntityType::Pii),
    ("location", EntityType::Pii),
    ("date of birth", EntityType::Pii),
    ("ssn", EntityType::Pii),
    ("social security number", EntityType::Pii),
    ("passport", EntityType::Pii),
    ("driver license", EntityType::Pii),
    ("ip address", EntityType::Pii),
    ("medical", EntityType::Pii),
    ("health", EntityType::Pii),
    ("credit card", EntityType::Financial),
    ("credit card number", EntityType::Financial),
    ("account number", EntityType::Financial),
    ("bank account", EntityType::Financial),
    ("iban", EntityType::Financial),
    ("routing number", EntityType::Financial),
    ("amount", EntityType::Financial),
    ("money", EntityType::Financial),
    ("transaction", EntityType::Financial),
    ("contract", EntityType::Contract),
    ("agreement", EntityType::Contract),
    ("legal", EntityType::Contract),
    ("patent", EntityType::Ip),
    ("trademark", EntityType::Ip),
    ("copyright", EntityType::Ip),
    ("trade secret", EntityType::Ip),
];

impl EntityType {
    /// Map a free-text detector label to an entity type
    ///
    /// Unknown labels map to `Pii`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace('_', " ");

        if let Some((_, ty)) = LABEL_TYPES.iter().find(|(key, _)| *key == normalized) {
            return *ty;
        }

        if !normalized.is_empty() {
            if let Some((_, ty)) = LABEL_TYPES
                .iter()
                .find(|(key, _)| normalized.contains(key) || key.contains(normalized.as_str()))
            {
                return *ty;
            }
        }

        EntityType::Pii
    }

    /// Typed placeholder used by the placeholder sanitization strategy
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Pii => "[PERSONAL_INFO]",
            Self::Financial => "[FINANCIAL_INFO]",
            Self::Contract => "[CONTRACT_INFO]",
            Self::Ip => "[INTELLECTUAL_PROPERTY]",
            Self::Custom => "[SENSITIVE_DATA]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Financial => "financial",
            Self::Contract => "contract",
            Self::Ip => "ip",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detector produced a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ml,
    Regex,
}

impl Source {
    /// Tie-break rank when confidences are equal (higher wins)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Ml => 1,
            Self::Regex => 0,
        }
    }
}

/// A contiguous region of prompt text flagged as sensitive
///
/// `start`/`end` are half-open character offsets into the original prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpan {
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Detector label (e.g. "email", "credit_card", "person")
    pub label: String,

    pub value: String,
    pub start: usize,
    pub end: usize,

    /// Detection confidence in `[0, 1]`
    pub confidence: f64,

    pub source: Source,
}

impl EntitySpan {
    /// Length in characters
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two spans share at least one character
    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Prompt risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Green,
    Amber,
    Red,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Amber => write!(f, "amber"),
            Self::Red => write!(f, "red"),
        }
    }
}

/// Result of classifying a single prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub risk_tier: RiskTier,

    /// Merged, non-overlapping spans ordered by `start`
    pub entities: Vec<EntitySpan>,

    /// Mean entity confidence (1.0 when nothing was found)
    pub confidence: f64,

    pub processing_time_ms: f64,

    /// ML capability was unavailable, failed, or timed out
    #[serde(default)]
    pub degraded: bool,

    /// Prompt was truncated for extraction
    #[serde(default)]
    pub length_exceeded: bool,

    /// Classification exceeded its time budget and fell back to AMBER
    #[serde(default)]
    pub timed_out: bool,
}

impl ClassificationResult {
    /// Result for an empty or whitespace-only prompt
    pub fn green() -> Self {
        Self {
            risk_tier: RiskTier::Green,
            entities: Vec::new(),
            confidence: 1.0,
            processing_time_ms: 0.0,
            degraded: false,
            length_exceeded: false,
            timed_out: false,
        }
    }

    /// Cautious fallback when classification could not complete
    pub fn fallback(processing_time_ms: f64) -> Self {
        Self {
            risk_tier: RiskTier::Amber,
            entities: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            degraded: true,
            length_exceeded: false,
            timed_out: true,
        }
    }

    /// Distinct entity types, sorted
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.entities.iter().map(|e| e.entity_type).collect();
        types.sort();
        types.dedup();
        types
    }
}

/// A single splice performed by the sanitizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub original: String,
    pub placeholder: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub label: String,

    /// Character range in the original prompt
    pub start: usize,
    pub end: usize,
}

/// Sanitized prompt plus the replacements, in original left-to-right order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizationResult {
    pub sanitized_prompt: String,
    pub replacements: Vec<Replacement>,
    pub is_fully_sanitized: bool,
}

/// Kind of AI tool an interaction happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Web,
    Desktop,
    Cli,
}

/// Client environment attached to each log entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    pub agent_version: String,
}

/// Usage record for one AI-tool interaction
///
/// Never carries prompt content, only counts, types, and flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique id (log-<uuid>)
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub user_id: String,
    pub tool_name: String,
    pub tool_type: ToolType,
    pub risk_level: RiskTier,

    /// Prompt length in characters
    pub prompt_length: usize,

    pub detected_entity_types: Vec<EntityType>,
    pub entity_count: usize,
    pub was_sanitized: bool,
    pub metadata: LogMetadata,
}

/// Who and where an interaction happened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub device_id: String,
    pub user_id: String,
    pub tool_name: String,
    pub tool_type: ToolType,
    #[serde(default)]
    pub metadata: LogMetadata,
}

impl LogEntry {
    /// Build a log entry from a classification outcome
    ///
    /// Only the prompt length and entity types/counts are taken from the
    /// classification, never text.
    pub fn from_classification(
        interaction: &Interaction,
        classification: &ClassificationResult,
        prompt_length: usize,
        was_sanitized: bool,
    ) -> Self {
        Self {
            id: format!("log-{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            device_id: interaction.device_id.clone(),
            user_id: interaction.user_id.clone(),
            tool_name: interaction.tool_name.clone(),
            tool_type: interaction.tool_type,
            risk_level: classification.risk_tier,
            prompt_length,
            detected_entity_types: classification.entity_types(),
            entity_count: classification.entities.len(),
            was_sanitized,
            metadata: interaction.metadata.clone(),
        }
    }
}

/// Request body sent to the log-ingestion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub device_id: String,
    pub logs: Vec<LogEntry>,
}

/// Delivery state of a buffered entry
///
/// Not persisted: every entry loaded from storage starts `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryState {
    #[default]
    Pending,
    InFlight,
}

/// A pending usage record awaiting delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedLogEntry {
    pub log: LogEntry,
    pub retry_count: u32,

    #[serde(skip)]
    pub state: DeliveryState,
}

impl BufferedLogEntry {
    pub fn new(log: LogEntry) -> Self {
        Self {
            log,
            retry_count: 0,
            state: DeliveryState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> EntitySpan {
        EntitySpan {
            entity_type: EntityType::Pii,
            label: "email".to_string(),
            value: "x".repeat(end - start),
            start,
            end,
            confidence: 0.9,
            source: Source::Regex,
        }
    }

    #[test]
    fn test_label_mapping_exact() {
        assert_eq!(EntityType::from_label("email"), EntityType::Pii);
        assert_eq!(EntityType::from_label("IBAN"), EntityType::Financial);
        assert_eq!(EntityType::from_label("trade secret"), EntityType::Ip);
        assert_eq!(EntityType::from_label("agreement"), EntityType::Contract);
    }

    #[test]
    fn test_label_mapping_partial_and_default() {
        assert_eq!(EntityType::from_label("credit_card"), EntityType::Financial);
        assert_eq!(EntityType::from_label("home address"), EntityType::Pii);
        assert_eq!(EntityType::from_label("organization"), EntityType::Pii);
        assert_eq!(EntityType::from_label(""), EntityType::Pii);
    }

    #[test]
    fn test_entity_type_serde_lowercase() {
        let json = serde_json::to_string(&EntityType::Financial).unwrap();
        assert_eq!(json, "\"financial\"");
        let ty: EntityType = serde_json::from_str("\"ip\"").unwrap();
        assert_eq!(ty, EntityType::Ip);
    }

    #[test]
    fn test_risk_tier_ordering() {
        assert!(RiskTier::Red > RiskTier::Amber);
        assert!(RiskTier::Amber > RiskTier::Green);
    }

    #[test]
    fn test_span_overlap() {
        assert!(span(0, 5).overlaps(&span(4, 8)));
        assert!(!span(0, 5).overlaps(&span(5, 8)));
        assert!(span(2, 3).overlaps(&span(0, 10)));
    }

    #[test]
    fn test_log_entry_from_classification_has_no_content() {
        let classification = ClassificationResult {
            risk_tier: RiskTier::Amber,
            entities: vec![span(12, 28)],
            confidence: 0.9,
            processing_time_ms: 1.0,
            degraded: false,
            length_exceeded: false,
            timed_out: false,
        };
        let interaction = Interaction {
            device_id: "dev-1".to_string(),
            user_id: "user-1".to_string(),
            tool_name: "chatgpt".to_string(),
            tool_type: ToolType::Web,
            metadata: LogMetadata {
                agent_version: "1.0.0".to_string(),
                ..Default::default()
            },
        };

        let log = LogEntry::from_classification(&interaction, &classification, 28, true);
        assert!(log.id.starts_with("log-"));
        assert_eq!(log.entity_count, 1);
        assert_eq!(log.detected_entity_types, vec![EntityType::Pii]);

        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"riskLevel\":\"amber\""));
        assert!(json.contains("\"toolType\":\"web\""));
        assert!(!json.contains("xxxx"));
    }

    #[test]
    fn test_buffered_entry_state_not_persisted() {
        let classification = ClassificationResult::green();
        let interaction = Interaction {
            device_id: "d".to_string(),
            user_id: "u".to_string(),
            tool_name: "t".to_string(),
            tool_type: ToolType::Cli,
            metadata: LogMetadata::default(),
        };
        let mut entry =
            BufferedLogEntry::new(LogEntry::from_classification(&interaction, &classification, 0, false));
        entry.state = DeliveryState::InFlight;
        entry.retry_count = 2;

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"retryCount\":2"));
        let loaded: BufferedLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.state, DeliveryState::Pending);
        assert_eq!(loaded.retry_count, 2);
    }
}
