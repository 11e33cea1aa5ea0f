//! Two-bar bullish pattern detectors
//!
//! Bullish Engulfing, Bullish Harami, Tweezer Bottom and Bullish Kicker.
//! All four start from a bearish bar and finish on a bullish one.

use serde::{Deserialize, Serialize};

use super::helpers::{
    self, body_inside, check_positive, is_body_long, pct_diff, BODY_HALF_RATIO, BODY_LONG_RATIO,
    MIN_ENGULFING_RATIO, TWEEZER_TOLERANCE_PCT,
};
use crate::{OHLCVExt, PatternDetector, PatternType, Ratio, Result, OHLCV};

impl_with_defaults!(
    BullishEngulfingDetector,
    BullishHaramiDetector,
    TweezerBottomDetector,
    BullishKickerDetector,
);

// ============================================================
// BULLISH ENGULFING
// ============================================================

/// Bullish body that wraps the previous bearish body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BullishEngulfingDetector {
    /// Current body must be at least this multiple of the previous body
    pub min_engulfing_ratio: f64,
}

impl Default for BullishEngulfingDetector {
    fn default() -> Self {
        Self {
            min_engulfing_ratio: MIN_ENGULFING_RATIO,
        }
    }
}

impl PatternDetector for BullishEngulfingDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::BullishEngulfing
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([prev, curr]) = helpers::window::<_, 2>(bars, index) else {
            return false;
        };

        prev.is_bearish()
            && curr.is_bullish()
            && curr.open() <= prev.close()
            && curr.close() >= prev.open()
            && curr.body() >= prev.body() * self.min_engulfing_ratio
    }

    fn validate_config(&self) -> Result<()> {
        check_positive("min_engulfing_ratio", self.min_engulfing_ratio)
    }
}

// ============================================================
// BULLISH HARAMI
// ============================================================

/// Small bullish body contained in a long bearish body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BullishHaramiDetector {
    /// Mother bar body as fraction of its range
    pub min_mother_body_ratio: Ratio,
    /// Inside body as fraction of the mother body
    pub max_body_ratio: Ratio,
}

impl Default for BullishHaramiDetector {
    fn default() -> Self {
        Self {
            min_mother_body_ratio: Ratio::new_const(BODY_LONG_RATIO),
            max_body_ratio: Ratio::new_const(BODY_HALF_RATIO),
        }
    }
}

impl PatternDetector for BullishHaramiDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::BullishHarami
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([prev, curr]) = helpers::window::<_, 2>(bars, index) else {
            return false;
        };

        prev.is_bearish()
            && is_body_long(prev, self.min_mother_body_ratio.get())
            && curr.is_bullish()
            && body_inside(prev, curr)
            && curr.body() <= prev.body() * self.max_body_ratio.get()
    }
}

// ============================================================
// TWEEZER BOTTOM
// ============================================================

/// Bearish then bullish bar printing the same low.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TweezerBottomDetector {
    /// Maximum difference between the two lows, percent of the first low
    pub max_low_diff_pct: f64,
}

impl Default for TweezerBottomDetector {
    fn default() -> Self {
        Self {
            max_low_diff_pct: TWEEZER_TOLERANCE_PCT,
        }
    }
}

impl PatternDetector for TweezerBottomDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::TweezerBottom
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([prev, curr]) = helpers::window::<_, 2>(bars, index) else {
            return false;
        };

        prev.is_bearish()
            && curr.is_bullish()
            && pct_diff(curr.low(), prev.low()) <= self.max_low_diff_pct
    }

    fn validate_config(&self) -> Result<()> {
        check_positive("max_low_diff_pct", self.max_low_diff_pct)
    }
}

// ============================================================
// BULLISH KICKER
// ============================================================

/// Long bearish bar followed by a long bullish bar opening at or above the
/// prior open and never trading back into the prior body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BullishKickerDetector {
    pub min_body_ratio: Ratio,
}

impl Default for BullishKickerDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: Ratio::new_const(BODY_LONG_RATIO),
        }
    }
}

impl PatternDetector for BullishKickerDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::BullishKicker
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([prev, curr]) = helpers::window::<_, 2>(bars, index) else {
            return false;
        };
        let min_body = self.min_body_ratio.get();

        prev.is_bearish()
            && curr.is_bullish()
            && is_body_long(prev, min_body)
            && is_body_long(curr, min_body)
            && curr.open() >= prev.open()
            && curr.low() >= prev.open()
    }
}
