//! Diff between an original prompt and its sanitized form
//!
//! Segments cover the whole original prompt, in order, with no gaps or
//! overlaps. They are derived purely from the sanitizer's replacements.

use crate::text;
use crate::types::{EntityType, SanitizationResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffSegmentKind {
    Unchanged,
    Replaced,
}

/// A contiguous run of the original prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSegment {
    pub kind: DiffSegmentKind,

    /// Original text of the run
    pub text: String,

    /// Character range in the original prompt
    pub start: usize,
    pub end: usize,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,

    /// Text that took the run's place in the sanitized prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub original: String,
    pub sanitized: String,
    pub segments: Vec<DiffSegment>,
    pub num_changes: usize,
}

impl DiffResult {
    /// Segments that were replaced
    pub fn changes(&self) -> impl Iterator<Item = &DiffSegment> {
        self.segments
            .iter()
            .filter(|s| s.kind == DiffSegmentKind::Replaced)
    }
}

fn unchanged(original: &str, start: usize, end: usize) -> Option<DiffSegment> {
    if start >= end {
        return None;
    }
    Some(DiffSegment {
        kind: DiffSegmentKind::Unchanged,
        text: text::slice_chars(original, start, end)?.to_string(),
        start,
        end,
        entity_type: None,
        replacement: None,
    })
}

/// Build the segment list for `original` and its sanitization
pub fn generate_diff(original: &str, sanitization: &SanitizationResult) -> DiffResult {
    let len = text::char_len(original);
    let mut segments = Vec::with_capacity(sanitization.replacements.len() * 2 + 1);
    let mut cursor = 0;

    for r in &sanitization.replacements {
        let Some(replaced) = text::slice_chars(original, r.start, r.end) else {
            tracing::warn!(start = r.start, end = r.end, "Replacement outside prompt, skipped in diff");
            continue;
        };
        if r.start < cursor || r.start >= r.end {
            tracing::warn!(start = r.start, end = r.end, "Overlapping replacement, skipped in diff");
            continue;
        }

        segments.extend(unchanged(original, cursor, r.start));
        segments.push(DiffSegment {
            kind: DiffSegmentKind::Replaced,
            text: replaced.to_string(),
            start: r.start,
            end: r.end,
            entity_type: Some(r.entity_type),
            replacement: Some(r.placeholder.clone()),
        });
        cursor = r.end;
    }

    segments.extend(unchanged(original, cursor, len));

    let num_changes = segments
        .iter()
        .filter(|s| s.kind == DiffSegmentKind::Replaced)
        .count();

    DiffResult {
        original: original.to_string(),
        sanitized: sanitization.sanitized_prompt.clone(),
        segments,
        num_changes,
    }
}

/// Plain-text report of a diff
pub fn format_diff_text(diff: &DiffResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ORIGINAL:");
    let _ = writeln!(out, "{}", diff.original);
    let _ = writeln!(out);
    let _ = writeln!(out, "SANITIZED:");
    let _ = writeln!(out, "{}", diff.sanitized);
    let _ = writeln!(out);
    let _ = writeln!(out, "SUMMARY: {} change(s)", diff.num_changes);

    for segment in diff.changes() {
        let _ = writeln!(
            out,
            "  - [{}..{}) {}: \"{}\" -> \"{}\"",
            segment.start,
            segment.end,
            segment.entity_type.map(|t| t.as_str()).unwrap_or("unknown"),
            segment.text,
            segment.replacement.as_deref().unwrap_or_default(),
        );
    }

    out
}
