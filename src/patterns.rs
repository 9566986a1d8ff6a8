//! Regex fallback matcher
//!
//! Deterministic detectors for structured sensitive data (email, phone,
//! card numbers, government ids, IBAN) plus organization-defined custom
//! patterns. Used standalone when the ML capability is unavailable and to
//! augment ML output otherwise.

use crate::error::{FirewallError, Result};
use crate::text::CharMap;
use crate::types::{EntitySpan, EntityType, Source};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Organization-defined pattern, as delivered by configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPattern {
    pub id: String,
    pub name: String,
    pub pattern: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A detection rule before compilation
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub pattern: String,
    pub entity_type: EntityType,
    pub case_insensitive: bool,

    /// Capture group reported as the span (0 = whole match)
    pub group: usize,

    /// Extra check on the matched text (e.g. Luhn for card numbers)
    pub validate: Option<fn(&str) -> bool>,
}

impl PatternRule {
    fn new(name: &str, pattern: &str, entity_type: EntityType) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            entity_type,
            case_insensitive: false,
            group: 0,
            validate: None,
        }
    }

    fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    fn validate(mut self, f: fn(&str) -> bool) -> Self {
        self.validate = Some(f);
        self
    }

    /// Rule for an organization pattern (always case-insensitive)
    pub fn from_custom(custom: &CustomPattern) -> Self {
        Self::new(&custom.name, &custom.pattern, custom.entity_type).case_insensitive()
    }
}

/// Built-in detection rules, in priority order
pub fn default_patterns() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            EntityType::Pii,
        )
        .case_insensitive(),
        PatternRule::new(
            "phone",
            r"(?:\+?1[-.\s]?)?(?:\([0-9]{3}\)|\b[0-9]{3})[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
            EntityType::Pii,
        ),
        PatternRule::new(
            "phone_international",
            r"\+[0-9]{1,3}[\s.-]?[0-9]{1,4}[\s.-]?[0-9]{1,4}[\s.-]?[0-9]{1,9}",
            EntityType::Pii,
        ),
        PatternRule::new(
            "credit_card",
            r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
            EntityType::Financial,
        )
        .validate(luhn_valid),
        PatternRule::new(
            "credit_card_formatted",
            r"\b(?:4[0-9]{3}|5[1-5][0-9]{2}|3[47][0-9]{2}|6(?:011|5[0-9]{2}))[\s-]?[0-9]{4}[\s-]?[0-9]{4}[\s-]?[0-9]{4}\b",
            EntityType::Financial,
        )
        .validate(luhn_valid),
        PatternRule::new(
            "ssn",
            r"\b[0-9]{3}[-\s]?[0-9]{2}[-\s]?[0-9]{4}\b",
            EntityType::Pii,
        )
        .validate(ssn_valid),
        PatternRule::new(
            "iban",
            r"\b[A-Z]{2}[0-9]{2}[A-Z0-9]{4}[0-9]{7}[A-Z0-9]{0,16}\b",
            EntityType::Financial,
        ),
        PatternRule::new(
            "ip_address",
            r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
            EntityType::Pii,
        ),
        PatternRule::new(
            "account_number",
            r"\b(?:account|acct|acc)(?:\s*(?:no\.?|number))?[\s#:]*([0-9]{8,17})\b",
            EntityType::Financial,
        )
        .case_insensitive()
        .group(1),
        PatternRule::new(
            "passport",
            r"\bpassport(?:\s*(?:no\.?|number))?[\s#:]*([A-Z0-9]{6,9})\b",
            EntityType::Pii,
        )
        .case_insensitive()
        .group(1)
        .validate(has_digit),
    ]
}

/// Luhn checksum over the digits of `text`
pub fn luhn_valid(text: &str) -> bool {
    let digits: Vec<u32> = text.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Reject SSNs with area 000/666/9xx, group 00, or serial 0000
fn ssn_valid(text: &str) -> bool {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 {
        return false;
    }
    let (area, rest) = digits.split_at(3);
    let (group, serial) = rest.split_at(2);

    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

struct CompiledPattern {
    name: String,
    regex: Regex,
    entity_type: EntityType,
    group: usize,
    validate: Option<fn(&str) -> bool>,
}

/// Ordered set of compiled patterns
pub struct RegexMatcher {
    patterns: Vec<CompiledPattern>,
    confidence: f64,
}

impl RegexMatcher {
    /// Compile the given rules; every match reports `confidence`
    pub fn new(rules: &[PatternRule], confidence: f64) -> Result<Self> {
        let patterns = rules
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(rule.case_insensitive)
                    .build()
                    .map_err(|e| FirewallError::InvalidPattern {
                        name: rule.name.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(CompiledPattern {
                    name: rule.name.clone(),
                    regex,
                    entity_type: rule.entity_type,
                    group: rule.group,
                    validate: rule.validate,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            confidence,
        })
    }

    /// Default rules followed by the enabled custom patterns
    pub fn with_custom(custom: &[CustomPattern], confidence: f64) -> Result<Self> {
        let mut rules = default_patterns();
        rules.extend(
            custom
                .iter()
                .filter(|p| p.enabled)
                .map(PatternRule::from_custom),
        );
        Self::new(&rules, confidence)
    }

    /// Names of the compiled patterns, in evaluation order
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Find all matches, non-overlapping within each entity type
    ///
    /// Returned spans use character offsets and are ordered by `start`.
    pub fn find(&self, text: &str) -> Vec<EntitySpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars = CharMap::new(text);

        // (start, end, pattern index) in bytes, grouped by type
        let mut by_type: BTreeMap<EntityType, Vec<(usize, usize, usize)>> = BTreeMap::new();

        for (idx, pattern) in self.patterns.iter().enumerate() {
            for caps in pattern.regex.captures_iter(text) {
                let Some(m) = caps.get(pattern.group) else {
                    continue;
                };
                if m.start() == m.end() {
                    continue;
                }
                if let Some(validate) = pattern.validate {
                    if !validate(m.as_str()) {
                        continue;
                    }
                }
                by_type
                    .entry(pattern.entity_type)
                    .or_default()
                    .push((m.start(), m.end(), idx));
            }
        }

        let mut spans = Vec::new();
        for (entity_type, mut candidates) in by_type {
            // Leftmost, then longest, then earlier pattern
            candidates.sort_by(|a, b| {
                a.0.cmp(&b.0)
                    .then((b.1 - b.0).cmp(&(a.1 - a.0)))
                    .then(a.2.cmp(&b.2))
            });

            let mut cursor = 0;
            for (start, end, idx) in candidates {
                if start < cursor {
                    continue;
                }
                let (Some(char_start), Some(char_end)) = (chars.to_char(start), chars.to_char(end))
                else {
                    continue;
                };
                cursor = end;
                spans.push(EntitySpan {
                    entity_type,
                    label: self.patterns[idx].name.clone(),
                    value: text[start..end].to_string(),
                    start: char_start,
                    end: char_end,
                    confidence: self.confidence,
                    source: Source::Regex,
                });
            }
        }

        spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        spans
    }
}

impl std::fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexMatcher")
            .field("patterns", &self.pattern_names())
            .field("confidence", &self.confidence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> RegexMatcher {
        RegexMatcher::new(&default_patterns(), 0.85).unwrap()
    }

    fn labels(spans: &[EntitySpan]) -> Vec<&str> {
        spans.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_email() {
        let spans = matcher().find("My email is john@example.com");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, "email");
        assert_eq!(spans[0].entity_type, EntityType::Pii);
        assert_eq!((spans[0].start, spans[0].end), (12, 28));
        assert_eq!(spans[0].value, "john@example.com");
        assert_eq!(spans[0].confidence, 0.85);
        assert_eq!(spans[0].source, Source::Regex);
    }

    #[test]
    fn test_phone_formats() {
        let m = matcher();
        for text in ["Call 555-123-4567", "Call (555) 123-4567", "Call 555.123.4567"] {
            let spans = m.find(text);
            assert_eq!(labels(&spans), vec!["phone"], "{}", text);
        }
    }

    #[test]
    fn test_credit_card_requires_luhn() {
        let m = matcher();
        let valid = m.find("Card: 4111 1111 1111 1111");
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].entity_type, EntityType::Financial);
        assert_eq!(valid[0].value, "4111 1111 1111 1111");

        let invalid = m.find("Card: 4111 1111 1111 1112");
        assert!(invalid.iter().all(|s| s.entity_type != EntityType::Financial));
    }

    #[test]
    fn test_ssn_validation() {
        let m = matcher();
        let spans = m.find("SSN 123-45-6789");
        assert_eq!(labels(&spans), vec!["ssn"]);
        assert!(m.find("SSN 000-45-6789").is_empty());
        assert!(m.find("SSN 666-45-6789").is_empty());
        assert!(m.find("SSN 123-00-6789").is_empty());
    }

    #[test]
    fn test_iban() {
        let spans = matcher().find("Wire to DE89370400440532013000 today");
        assert_eq!(labels(&spans), vec!["iban"]);
        assert_eq!(spans[0].entity_type, EntityType::Financial);
    }

    #[test]
    fn test_account_number_reports_digits_only() {
        let text = "Use account #12345678901 please";
        let spans = matcher().find(text);
        let account: Vec<_> = spans.iter().filter(|s| s.label == "account_number").collect();
        assert_eq!(account.len(), 1);
        assert_eq!(account[0].value, "12345678901");
        assert_eq!(
            crate::text::slice_chars(text, account[0].start, account[0].end),
            Some("12345678901")
        );
    }

    #[test]
    fn test_passport_requires_digit() {
        let m = matcher();
        let spans = m.find("passport number X1234567");
        assert!(spans.iter().any(|s| s.label == "passport" && s.value == "X1234567"));
        assert!(m.find("passport holders abroad").is_empty());
    }

    #[test]
    fn test_same_type_matches_do_not_overlap() {
        // phone and phone_international both match the same digits
        let spans = matcher().find("Reach me at +1 555 123 4567 anytime");
        let pii: Vec<_> = spans.iter().filter(|s| s.entity_type == EntityType::Pii).collect();
        for pair in pii.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert!(!pii.is_empty());
    }

    #[test]
    fn test_character_offsets_with_multibyte_prefix() {
        let text = "Café: ana@example.org";
        let spans = matcher().find(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 6);
        assert_eq!(spans[0].end, 21);
        assert_eq!(
            crate::text::slice_chars(text, spans[0].start, spans[0].end),
            Some("ana@example.org")
        );
    }

    #[test]
    fn test_custom_patterns() {
        let custom = vec![
            CustomPattern {
                id: "p1".to_string(),
                name: "project_code".to_string(),
                pattern: r"\bPRJ-[0-9]{4}\b".to_string(),
                entity_type: EntityType::Ip,
                enabled: true,
            },
            CustomPattern {
                id: "p2".to_string(),
                name: "disabled".to_string(),
                pattern: r"\bsecret\b".to_string(),
                entity_type: EntityType::Custom,
                enabled: false,
            },
        ];
        let m = RegexMatcher::with_custom(&custom, 0.85).unwrap();
        assert!(m.pattern_names().contains(&"project_code"));
        assert!(!m.pattern_names().contains(&"disabled"));

        let spans = m.find("the prj-1234 secret roadmap");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity_type, EntityType::Ip);
        assert_eq!(spans[0].value, "prj-1234");
    }

    #[test]
    fn test_invalid_custom_pattern() {
        let custom = vec![CustomPattern {
            id: "bad".to_string(),
            name: "broken".to_string(),
            pattern: "([unclosed".to_string(),
            entity_type: EntityType::Custom,
            enabled: true,
        }];
        let err = RegexMatcher::with_custom(&custom, 0.85).unwrap_err();
        assert!(matches!(err, FirewallError::InvalidPattern { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_empty_and_plain_text() {
        let m = matcher();
        assert!(m.find("").is_empty());
        assert!(m.find("   \n\t").is_empty());
        assert!(m.find("Please summarize this article about gardening.").is_empty());
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500-0000-0000-0004"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("1234"));
    }
}
