//! Entity merger / deduplicator
//!
//! Resolves overlaps between ML and regex spans into one canonical,
//! non-overlapping set ordered by `start`.
//!
//! Spans are ranked by a total order ([`priority_cmp`]): higher confidence,
//! then ML over regex, then earlier start, then longer span. Candidates are
//! accepted from the highest rank down; a candidate overlapping an already
//! accepted span is dropped entirely (no partial spans).

use crate::types::EntitySpan;
use std::cmp::Ordering;

/// Total order on span priority; `Greater` means `a` wins over `b`
pub fn priority_cmp(a: &EntitySpan, b: &EntitySpan) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then(a.source.rank().cmp(&b.source.rank()))
        .then(b.start.cmp(&a.start))
        .then(a.len().cmp(&b.len()))
        .then(b.label.cmp(&a.label))
}

/// Merge ML and regex spans into a non-overlapping set sorted by `start`
pub fn merge(ml: Vec<EntitySpan>, regex: Vec<EntitySpan>) -> Vec<EntitySpan> {
    let mut candidates: Vec<EntitySpan> = ml
        .into_iter()
        .chain(regex)
        .filter(|span| span.start < span.end)
        .collect();

    if candidates.len() <= 1 {
        return candidates;
    }

    // Highest priority first
    candidates.sort_by(|a, b| priority_cmp(b, a));

    let mut accepted: Vec<EntitySpan> = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;

    for candidate in candidates {
        let pos = accepted.partition_point(|s| s.start < candidate.start);

        let clashes_before = pos > 0 && accepted[pos - 1].end > candidate.start;
        let clashes_after = pos < accepted.len() && accepted[pos].start < candidate.end;

        if clashes_before || clashes_after {
            dropped += 1;
            continue;
        }
        accepted.insert(pos, candidate);
    }

    if dropped > 0 {
        tracing::debug!(kept = accepted.len(), dropped, "Merged overlapping spans");
    }

    accepted
}
