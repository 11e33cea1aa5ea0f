//! Bullish candlestick pattern detectors
//!
//! Every detector is a pure predicate over a fixed window of bars ending at
//! the scanned index. Thresholds are plain fields with defaults, so a detector
//! can be configured from TOML and validated before any scan runs.
//!
//! # Pattern Categories
//!
//! - **Single-bar (3)**: Pin Bar, Dragonfly Doji, Bullish Marubozu
//! - **Two-bar (4)**: Bullish Engulfing, Bullish Harami, Tweezer Bottom, Bullish Kicker
//! - **Three-bar (3)**: Three Candle, Three White Soldiers, Bullish Abandoned Baby

use serde::{Deserialize, Serialize};

use crate::{BuiltinDetector, PatternType, Result};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

// Re-export all detectors for convenience
pub use helpers::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;

/// Which detectors run, and with which thresholds.
///
/// Deserializes from the `[patterns]` table of the pipeline config:
///
/// ```toml
/// enabled = ["pin_bar", "bullish_engulfing"]
///
/// [pin_bar]
/// min_wick_ratio = 2.5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub enabled: Vec<PatternType>,
    pub min_strength: Option<u8>,
    pub pin_bar: PinBarDetector,
    pub dragonfly_doji: DragonflyDojiDetector,
    pub bullish_marubozu: BullishMarubozuDetector,
    pub bullish_engulfing: BullishEngulfingDetector,
    pub bullish_harami: BullishHaramiDetector,
    pub tweezer_bottom: TweezerBottomDetector,
    pub bullish_kicker: BullishKickerDetector,
    pub three_candle: ThreeCandleDetector,
    pub three_white_soldiers: ThreeWhiteSoldiersDetector,
    pub bullish_abandoned_baby: BullishAbandonedBabyDetector,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                PatternType::PinBar,
                PatternType::BullishEngulfing,
                PatternType::ThreeCandle,
            ],
            min_strength: None,
            pin_bar: PinBarDetector::default(),
            dragonfly_doji: DragonflyDojiDetector::default(),
            bullish_marubozu: BullishMarubozuDetector::default(),
            bullish_engulfing: BullishEngulfingDetector::default(),
            bullish_harami: BullishHaramiDetector::default(),
            tweezer_bottom: TweezerBottomDetector::default(),
            bullish_kicker: BullishKickerDetector::default(),
            three_candle: ThreeCandleDetector::default(),
            three_white_soldiers: ThreeWhiteSoldiersDetector::default(),
            bullish_abandoned_baby: BullishAbandonedBabyDetector::default(),
        }
    }
}

impl PatternConfig {
    /// Configured detector for `pattern_type`
    pub fn detector(&self, pattern_type: PatternType) -> BuiltinDetector {
        match pattern_type {
            PatternType::PinBar => BuiltinDetector::PinBar(self.pin_bar.clone()),
            PatternType::DragonflyDoji => BuiltinDetector::DragonflyDoji(self.dragonfly_doji.clone()),
            PatternType::BullishMarubozu => {
                BuiltinDetector::BullishMarubozu(self.bullish_marubozu.clone())
            }
            PatternType::BullishEngulfing => {
                BuiltinDetector::BullishEngulfing(self.bullish_engulfing.clone())
            }
            PatternType::BullishHarami => BuiltinDetector::BullishHarami(self.bullish_harami.clone()),
            PatternType::TweezerBottom => BuiltinDetector::TweezerBottom(self.tweezer_bottom.clone()),
            PatternType::BullishKicker => BuiltinDetector::BullishKicker(self.bullish_kicker.clone()),
            PatternType::ThreeCandle => BuiltinDetector::ThreeCandle(self.three_candle.clone()),
            PatternType::ThreeWhiteSoldiers => {
                BuiltinDetector::ThreeWhiteSoldiers(self.three_white_soldiers.clone())
            }
            PatternType::BullishAbandonedBaby => {
                BuiltinDetector::BullishAbandonedBaby(self.bullish_abandoned_baby.clone())
            }
        }
    }

    /// Validate the thresholds of every enabled detector.
    pub fn validate(&self) -> Result<()> {
        for pattern_type in &self.enabled {
            self.detector(*pattern_type).validate_config()?;
        }
        Ok(())
    }
}
