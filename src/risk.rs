//! Risk scoring
//!
//! Maps a merged entity set to a risk tier:
//!
//! | Condition                                              | Tier  |
//! |--------------------------------------------------------|-------|
//! | no entities                                            | GREEN |
//! | `count >= redMinEntities` or `max_confidence >= high`  | RED   |
//! | `count >= amberMinEntities`                            | AMBER |
//! | otherwise                                              | GREEN |
//!
//! The confidence condition forces RED regardless of count.

use crate::config::RiskThresholds;
use crate::types::{EntitySpan, RiskTier};
use serde::{Deserialize, Serialize};

/// Tier plus the metrics it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub tier: RiskTier,
    pub entity_count: usize,
    pub high_confidence_count: usize,
    pub max_confidence: f64,
    pub reasoning: String,
}

/// Tier for an entity count and maximum confidence
pub fn tier_for(entity_count: usize, max_confidence: f64, thresholds: &RiskThresholds) -> RiskTier {
    if entity_count == 0 {
        RiskTier::Green
    } else if entity_count >= thresholds.red_min_entities
        || max_confidence >= thresholds.high_confidence_threshold
    {
        RiskTier::Red
    } else if entity_count >= thresholds.amber_min_entities {
        RiskTier::Amber
    } else {
        RiskTier::Green
    }
}

/// Score a merged entity set
pub fn score(entities: &[EntitySpan], thresholds: &RiskThresholds) -> RiskScore {
    let entity_count = entities.len();
    let max_confidence = entities
        .iter()
        .map(|e| e.confidence)
        .fold(0.0_f64, f64::max);
    let high_confidence_count = entities
        .iter()
        .filter(|e| e.confidence >= thresholds.high_confidence_threshold)
        .count();

    let tier = tier_for(entity_count, max_confidence, thresholds);

    let reasoning = match tier {
        RiskTier::Green if entity_count == 0 => "No sensitive data detected".to_string(),
        RiskTier::Green => format!(
            "{} entities, below the amber minimum of {}",
            entity_count, thresholds.amber_min_entities
        ),
        RiskTier::Red if max_confidence >= thresholds.high_confidence_threshold => format!(
            "High-confidence sensitive data detected ({} entities with confidence >= {})",
            high_confidence_count, thresholds.high_confidence_threshold
        ),
        RiskTier::Red => format!("Multiple sensitive entities detected ({} entities)", entity_count),
        RiskTier::Amber => format!(
            "Sensitive data detected ({} entities, max confidence {:.2})",
            entity_count, max_confidence
        ),
    };

    RiskScore {
        tier,
        entity_count,
        high_confidence_count,
        max_confidence,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, Source};

    fn entities(confidences: &[f64]) -> Vec<EntitySpan> {
        confidences
            .iter()
            .enumerate()
            .map(|(i, &confidence)| EntitySpan {
                entity_type: EntityType::Pii,
                label: "person".to_string(),
                value: "x".to_string(),
                start: i * 2,
                end: i * 2 + 1,
                confidence,
                source: Source::Ml,
            })
            .collect()
    }

    #[test]
    fn test_no_entities_is_green() {
        let s = score(&[], &RiskThresholds::default());
        assert_eq!(s.tier, RiskTier::Green);
        assert_eq!(s.entity_count, 0);
        assert_eq!(s.max_confidence, 0.0);
    }

    #[test]
    fn test_single_entity_is_amber() {
        let s = score(&entities(&[0.95]), &RiskThresholds::default());
        assert_eq!(s.tier, RiskTier::Amber);
        assert_eq!(s.high_confidence_count, 0);
    }

    #[test]
    fn test_count_threshold_is_red() {
        let s = score(&entities(&[0.9, 0.9, 0.9, 0.9]), &RiskThresholds::default());
        assert_eq!(s.tier, RiskTier::Red);
        assert!(s.reasoning.contains("4 entities"));
    }

    #[test]
    fn test_high_confidence_forces_red() {
        let thresholds = RiskThresholds {
            amber_min_entities: 1,
            red_min_entities: 4,
            high_confidence_threshold: 0.9,
        };
        let s = score(&entities(&[0.95, 0.6]), &thresholds);
        assert_eq!(s.tier, RiskTier::Red);
        assert_eq!(s.high_confidence_count, 1);
    }

    #[test]
    fn test_below_amber_minimum_is_green() {
        let thresholds = RiskThresholds {
            amber_min_entities: 2,
            red_min_entities: 5,
            high_confidence_threshold: 0.99,
        };
        assert_eq!(score(&entities(&[0.5]), &thresholds).tier, RiskTier::Green);
        assert_eq!(score(&entities(&[0.5, 0.5]), &thresholds).tier, RiskTier::Amber);
    }

    #[test]
    fn test_monotonic_in_count_and_confidence() {
        let thresholds = RiskThresholds::default();
        let confidences = [0.0, 0.3, 0.5, 0.85, 0.97, 0.98, 1.0];

        for &c in &confidences {
            let mut previous = RiskTier::Green;
            for count in 0..8 {
                let tier = tier_for(count, c, &thresholds);
                assert!(tier >= previous, "count {} conf {}", count, c);
                previous = tier;
            }
        }

        for count in 0..8 {
            let mut previous = RiskTier::Green;
            for &c in &confidences {
                let tier = tier_for(count, c, &thresholds);
                assert!(tier >= previous, "count {} conf {}", count, c);
                previous = tier;
            }
        }
    }
}
