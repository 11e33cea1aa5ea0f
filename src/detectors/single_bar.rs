//! Single-bar bullish pattern detectors
//!
//! Pin Bar, Dragonfly Doji and Bullish Marubozu look at the last bar only.

use serde::{Deserialize, Serialize};

use super::helpers::{
    self, check_positive, is_body_long, is_doji, BODY_MARUBOZU_RATIO, DOJI_RATIO,
    PIN_BAR_MAX_BODY_RATIO, PIN_BAR_MAX_UPPER_WICK_RATIO, PIN_BAR_MIN_WICK_RATIO,
    SHADOW_DRAGONFLY_RATIO, SHADOW_SHORT_RATIO, SHADOW_VERYSHORT_RATIO,
};
use crate::{OHLCVExt, PatternDetector, PatternType, Ratio, Result, OHLCV};

impl_with_defaults!(PinBarDetector, DragonflyDojiDetector, BullishMarubozuDetector);

// ============================================================
// PIN BAR
// ============================================================

/// Small body near the top of the range with a long lower wick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinBarDetector {
    /// Lower wick as a multiple of the body
    pub min_wick_ratio: f64,
    /// Body as fraction of range
    pub max_body_ratio: Ratio,
    /// Upper wick as fraction of lower wick
    pub max_upper_wick_ratio: Ratio,
}

impl Default for PinBarDetector {
    fn default() -> Self {
        Self {
            min_wick_ratio: PIN_BAR_MIN_WICK_RATIO,
            max_body_ratio: Ratio::new_const(PIN_BAR_MAX_BODY_RATIO),
            max_upper_wick_ratio: Ratio::new_const(PIN_BAR_MAX_UPPER_WICK_RATIO),
        }
    }
}

impl PatternDetector for PinBarDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::PinBar
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([bar]) = helpers::window::<_, 1>(bars, index) else {
            return false;
        };
        let lower = bar.lower_shadow();

        is_doji(bar, self.max_body_ratio.get())
            && lower > 0.0
            && lower >= bar.body() * self.min_wick_ratio
            && bar.upper_shadow() <= lower * self.max_upper_wick_ratio.get()
    }

    fn validate_config(&self) -> Result<()> {
        check_positive("min_wick_ratio", self.min_wick_ratio)
    }
}

// ============================================================
// DRAGONFLY DOJI
// ============================================================

/// Open, high and close at the top of the range, long lower shadow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DragonflyDojiDetector {
    pub max_body_ratio: Ratio,
    pub max_upper_shadow_ratio: Ratio,
    pub min_lower_shadow_ratio: Ratio,
}

impl Default for DragonflyDojiDetector {
    fn default() -> Self {
        Self {
            max_body_ratio: Ratio::new_const(DOJI_RATIO),
            max_upper_shadow_ratio: Ratio::new_const(SHADOW_SHORT_RATIO),
            min_lower_shadow_ratio: Ratio::new_const(SHADOW_DRAGONFLY_RATIO),
        }
    }
}

impl PatternDetector for DragonflyDojiDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::DragonflyDoji
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([bar]) = helpers::window::<_, 1>(bars, index) else {
            return false;
        };
        let (Some(upper), Some(lower)) = (bar.upper_shadow_ratio(), bar.lower_shadow_ratio())
        else {
            return false;
        };

        is_doji(bar, self.max_body_ratio.get())
            && upper <= self.max_upper_shadow_ratio.get()
            && lower >= self.min_lower_shadow_ratio.get()
    }
}

// ============================================================
// BULLISH MARUBOZU
// ============================================================

/// Bullish bar that is nearly all body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BullishMarubozuDetector {
    pub min_body_ratio: Ratio,
    /// Each shadow as fraction of range
    pub max_shadow_ratio: Ratio,
}

impl Default for BullishMarubozuDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: Ratio::new_const(BODY_MARUBOZU_RATIO),
            max_shadow_ratio: Ratio::new_const(SHADOW_VERYSHORT_RATIO),
        }
    }
}

impl PatternDetector for BullishMarubozuDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::BullishMarubozu
    }

    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
        let Some([bar]) = helpers::window::<_, 1>(bars, index) else {
            return false;
        };
        let (Some(upper), Some(lower)) = (bar.upper_shadow_ratio(), bar.lower_shadow_ratio())
        else {
            return false;
        };
        let max_shadow = self.max_shadow_ratio.get();

        bar.is_bullish()
            && is_body_long(bar, self.min_body_ratio.get())
            && upper <= max_shadow
            && lower <= max_shadow
    }
}
