//! Pairing pattern candidates with the swing lows they retest.
//!
//! Swing lows are visited chronologically; each one claims the first
//! chronological candidate that passes eligibility and tolerance. A swing low
//! is claimed at most once.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::swing::{SwingLowArena, SwingLowId};
use crate::{PatternCandidate, PatternType, PipelineError, Result};

/// Candidates whose low sits above the swing low must be this much closer.
pub const ABOVE_TOLERANCE_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    /// Percent of the swing low price
    pub touch_tolerance_pct: f64,
    /// Calendar days between swing low and candidate
    pub min_days_between: i64,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            touch_tolerance_pct: 0.10,
            min_days_between: 1,
        }
    }
}

impl TouchConfig {
    /// Signed distance in percent if `pattern_low` is close enough to `swing_price`.
    ///
    /// At or below the swing low the full tolerance applies; above it, only
    /// [`ABOVE_TOLERANCE_FACTOR`] of it.
    pub fn accepts(&self, pattern_low: f64, swing_price: f64) -> Option<f64> {
        let diff = pattern_low - swing_price;
        let distance_pct = diff / swing_price * 100.0;
        let limit = if diff <= 0.0 {
            self.touch_tolerance_pct
        } else {
            self.touch_tolerance_pct * ABOVE_TOLERANCE_FACTOR
        };
        (distance_pct.abs() <= limit).then_some(distance_pct)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.touch_tolerance_pct.is_finite() || self.touch_tolerance_pct <= 0.0 {
            return Err(PipelineError::OutOfRange {
                field: "touch_tolerance_pct",
                value: self.touch_tolerance_pct,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.min_days_between < 0 {
            return Err(PipelineError::InvalidConfig(
                "min_days_between must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// A pattern candidate retesting a swing low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Touch {
    pub swing_low_id: SwingLowId,
    pub swing_low_index: usize,
    pub swing_low_timestamp: NaiveDateTime,
    pub swing_low_price: f64,
    pub pattern: PatternCandidate,
    /// Signed, percent of the swing low price. Negative when the pattern
    /// undercut the swing low.
    pub distance_pct: f64,
    pub day_gap: i64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub target_price: f64,
}

impl Touch {
    pub fn pattern_type(&self) -> PatternType {
        self.pattern.pattern_type
    }

    pub fn is_live(&self) -> bool {
        self.pattern.is_live
    }
}

#[derive(Debug, Clone)]
pub struct TouchValidator {
    config: TouchConfig,
    target_pct: f64,
}

impl TouchValidator {
    pub fn new(config: TouchConfig, target_pct: f64) -> Result<Self> {
        config.validate()?;
        if !target_pct.is_finite() || target_pct <= 0.0 {
            return Err(PipelineError::OutOfRange {
                field: "target_pct",
                value: target_pct,
                min: 0.0,
                max: f64::MAX,
            });
        }
        Ok(Self { config, target_pct })
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    /// Claim swing lows for candidates. Accepted swing lows are marked touched
    /// in `arena`; touches are returned in candidate order.
    pub fn find_touches(
        &self,
        arena: &mut SwingLowArena,
        candidates: &[PatternCandidate],
    ) -> Vec<Touch> {
        let mut ordered: Vec<&PatternCandidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| (c.timestamp, c.pattern_type));

        let ids: Vec<SwingLowId> = arena.ids().collect();
        let mut touches = Vec::new();

        for id in ids {
            let Some(swing) = arena.get(id).copied() else {
                continue;
            };
            if swing.is_touched {
                continue;
            }

            for candidate in &ordered {
                let first = candidate.first_anchor().timestamp;
                if !swing.is_valid_for_pattern(first, candidate.timestamp) {
                    continue;
                }
                let day_gap = (candidate.timestamp - swing.timestamp).num_days();
                if day_gap < self.config.min_days_between {
                    continue;
                }
                let Some(distance_pct) = self.config.accepts(candidate.pattern_low(), swing.price)
                else {
                    continue;
                };

                if arena.mark_touched(id, candidate.timestamp, candidate.pattern_type) {
                    touches.push(self.build(&swing, candidate, distance_pct, day_gap));
                }
                break;
            }
        }

        touches.sort_by_key(|t| (t.pattern.timestamp, t.pattern.pattern_type, t.swing_low_id));
        debug!(
            candidates = candidates.len(),
            touches = touches.len(),
            "touch validation complete"
        );
        touches
    }

    /// Same as [`find_touches`](Self::find_touches) for grouped scanner output.
    pub fn find_touches_grouped(
        &self,
        arena: &mut SwingLowArena,
        by_type: &BTreeMap<PatternType, Vec<PatternCandidate>>,
    ) -> Vec<Touch> {
        let flat: Vec<PatternCandidate> = by_type.values().flatten().copied().collect();
        self.find_touches(arena, &flat)
    }

    fn build(
        &self,
        swing: &crate::swing::SwingLow,
        candidate: &PatternCandidate,
        distance_pct: f64,
        day_gap: i64,
    ) -> Touch {
        let entry_price = candidate.entry_price();
        Touch {
            swing_low_id: swing.id,
            swing_low_index: swing.index,
            swing_low_timestamp: swing.timestamp,
            swing_low_price: swing.price,
            pattern: *candidate,
            distance_pct,
            day_gap,
            entry_price,
            stop_loss_price: candidate.stop_price(),
            target_price: entry_price * (1.0 + self.target_pct / 100.0),
        }
    }
}
