//! Prompt sanitizer
//!
//! Replaces entity spans with typed placeholders, masked values, or nothing.
//! Entities are spliced in descending `start` order so the offsets of the
//! spans still to be processed stay valid; replacements are reported in
//! ascending original order. Text outside replaced spans is never touched.

use crate::config::SanitizationConfig;
use crate::text::{self, CharMap};
use crate::types::{EntitySpan, Replacement, SanitizationResult};
use serde::{Deserialize, Serialize};

/// Rule for replacing a sensitive span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizationStrategy {
    /// Typed placeholder such as `[PERSONAL_INFO]`
    #[default]
    Placeholder,
    /// Length-preserving partial mask
    Mask,
    /// Remove the span entirely
    Redact,
}

/// Rewrites prompts according to a strategy
#[derive(Debug, Clone)]
pub struct Sanitizer {
    strategy: SanitizationStrategy,
    mask_char: char,
    visible_suffix: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::from_config(&SanitizationConfig::default())
    }
}

impl Sanitizer {
    pub fn new(strategy: SanitizationStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn from_config(config: &SanitizationConfig) -> Self {
        Self {
            strategy: config.strategy,
            mask_char: config.mask_char,
            visible_suffix: config.visible_suffix,
        }
    }

    pub fn with_mask(mut self, mask_char: char, visible_suffix: usize) -> Self {
        self.mask_char = mask_char;
        self.visible_suffix = visible_suffix;
        self
    }

    pub fn strategy(&self) -> SanitizationStrategy {
        self.strategy
    }

    /// Text that replaces `value` for an entity
    pub fn replacement_for(&self, entity: &EntitySpan, value: &str) -> String {
        match self.strategy {
            SanitizationStrategy::Placeholder => entity.entity_type.placeholder().to_string(),
            SanitizationStrategy::Mask => mask_value(value, self.mask_char, self.visible_suffix),
            SanitizationStrategy::Redact => String::new(),
        }
    }

    /// Sanitize `prompt` given merged, non-overlapping entities
    pub fn sanitize(&self, prompt: &str, entities: &[EntitySpan]) -> SanitizationResult {
        if entities.is_empty() {
            return SanitizationResult {
                sanitized_prompt: prompt.to_string(),
                replacements: Vec::new(),
                is_fully_sanitized: true,
            };
        }

        let chars = CharMap::new(prompt);
        let mut ordered: Vec<&EntitySpan> = entities.iter().collect();
        ordered.sort_by(|a, b| b.start.cmp(&a.start));

        let mut sanitized = prompt.to_string();
        let mut replacements = Vec::with_capacity(entities.len());
        // lowest start spliced so far; later (smaller) spans must end before it
        let mut floor = chars.len();

        for entity in ordered {
            if entity.start >= entity.end || entity.end > floor {
                tracing::warn!(
                    start = entity.start,
                    end = entity.end,
                    "Skipping entity that is empty, out of bounds, or overlapping"
                );
                continue;
            }

            let (Some(from), Some(to)) = (
                text::byte_offset(prompt, entity.start),
                text::byte_offset(prompt, entity.end),
            ) else {
                tracing::warn!(
                    start = entity.start,
                    end = entity.end,
                    "Skipping entity with unaddressable range"
                );
                continue;
            };

            let original = &prompt[from..to];
            let placeholder = self.replacement_for(entity, original);
            sanitized.replace_range(from..to, &placeholder);

            replacements.push(Replacement {
                original: original.to_string(),
                placeholder,
                entity_type: entity.entity_type,
                label: entity.label.clone(),
                start: entity.start,
                end: entity.end,
            });
            floor = entity.start;
        }

        replacements.reverse();
        let is_fully_sanitized = replacements.len() == entities.len();

        tracing::debug!(
            strategy = ?self.strategy,
            replaced = replacements.len(),
            skipped = entities.len() - replacements.len(),
            "Prompt sanitized"
        );

        SanitizationResult {
            sanitized_prompt: sanitized,
            replacements,
            is_fully_sanitized,
        }
    }
}

/// Length-preserving partial mask
///
/// Emails keep their first character and domain. Other values longer than
/// twice `visible_suffix` keep their last `visible_suffix` characters; shorter
/// values are masked completely. Separators (`-`, `.`, `(`, `)`, `/`,
/// whitespace) are kept for readability.
pub fn mask_value(value: &str, mask_char: char, visible_suffix: usize) -> String {
    let is_separator = |c: char| c.is_whitespace() || matches!(c, '-' | '.' | '(' | ')' | '/');

    if let Some((local, domain)) = value.split_once('@') {
        if !local.is_empty() && !domain.is_empty() {
            let mut masked: String = local
                .chars()
                .enumerate()
                .map(|(i, c)| if i == 0 { c } else { mask_char })
                .collect();
            masked.push('@');
            masked.push_str(domain);
            return masked;
        }
    }

    let len = text::char_len(value);
    let keep_from = if len > visible_suffix * 2 {
        len - visible_suffix
    } else {
        len
    };

    value
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i >= keep_from || is_separator(c) {
                c
            } else {
                mask_char
            }
        })
        .collect()
}

/// Rebuild a sanitized prompt by applying `replacements` to `original`
///
/// Returns `None` when the replacements are unordered, overlapping, or out of
/// bounds.
pub fn apply_replacements(original: &str, replacements: &[Replacement]) -> Option<String> {
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;

    for r in replacements {
        if r.start < cursor || r.start > r.end {
            return None;
        }
        out.push_str(text::slice_chars(original, cursor, r.start)?);
        if text::slice_chars(original, r.start, r.end)? != r.original {
            return None;
        }
        out.push_str(&r.placeholder);
        cursor = r.end;
    }

    out.push_str(text::slice_chars(original, cursor, text::char_len(original))?);
    Some(out)
}
