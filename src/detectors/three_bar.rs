//! Three-bar bullish pattern detectors
//!
//! Three Candle (morning star shape), Three White Soldiers and Bullish Abandoned Baby.

use serde::{Deserialize, Serialize};

use crate::{OHLCVExt, PatternDetector, PatternType, Ratio, OHLCV};

use super::helpers::{
  self, gap_down, gap_up, is_body_long, is_doji, BODY_HALF_RATIO, BODY_LONG_RATIO,
  DOJI_RATIO, SHADOW_SOLDIER_RATIO,
};

impl_with_defaults!(
  ThreeCandleDetector,
  ThreeWhiteSoldiersDetector,
  BullishAbandonedBabyDetector,
);

// ============================================================
// THREE CANDLE
// ============================================================

/// Long bearish bar, small star at or below its close, bullish recovery
/// closing above the first body's midpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeCandleDetector {
  pub min_first_body_ratio: Ratio,
  /// Star body as fraction of the first body
  pub max_star_body_ratio: Ratio,
  /// How far into the first body the third close must recover
  pub min_recovery: Ratio,
}

impl Default for ThreeCandleDetector {
  fn default() -> Self {
    Self {
      min_first_body_ratio: Ratio::new_const(BODY_LONG_RATIO),
      max_star_body_ratio: Ratio::new_const(BODY_HALF_RATIO),
      min_recovery: Ratio::new_const(0.5),
    }
  }
}

impl PatternDetector for ThreeCandleDetector {
  fn pattern_type(&self) -> PatternType {
    PatternType::ThreeCandle
  }

  fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
    let Some([first, star, third]) = helpers::window::<_, 3>(bars, index) else {
      return false;
    };

    if !first.is_bearish() || !is_body_long(first, self.min_first_body_ratio.get()) {
      return false;
    }

    // Star: small body, sitting at or below the first close
    if star.body() > first.body() * self.max_star_body_ratio.get()
      || star.body_bottom() > first.close()
    {
      return false;
    }

    let recovery_level = first.close() + first.body() * self.min_recovery.get();
    third.is_bullish() && third.close() >= recovery_level
  }
}

// ============================================================
// THREE WHITE SOLDIERS
// ============================================================

/// Three long bullish bars with ascending closes, each opening inside the
/// previous body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeWhiteSoldiersDetector {
  pub min_body_ratio: Ratio,
  pub max_upper_shadow_ratio: Ratio,
}

impl Default for ThreeWhiteSoldiersDetector {
  fn default() -> Self {
    Self {
      min_body_ratio: Ratio::new_const(BODY_LONG_RATIO),
      max_upper_shadow_ratio: Ratio::new_const(SHADOW_SOLDIER_RATIO),
    }
  }
}

impl ThreeWhiteSoldiersDetector {
  fn is_soldier<T: OHLCV>(&self, bar: &T) -> bool {
    bar.is_bullish()
      && is_body_long(bar, self.min_body_ratio.get())
      && bar
        .upper_shadow_ratio()
        .is_some_and(|r| r <= self.max_upper_shadow_ratio.get())
  }
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
  fn pattern_type(&self) -> PatternType {
    PatternType::ThreeWhiteSoldiers
  }

  fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
    let Some(window) = helpers::window::<_, 3>(bars, index) else {
      return false;
    };

    if !window.iter().all(|b| self.is_soldier(b)) {
      return false;
    }

    // Ascending closes, each open inside the previous body
    window.windows(2).all(|pair| {
      let (prev, curr) = (&pair[0], &pair[1]);
      curr.close() > prev.close() && curr.open() > prev.open() && curr.open() <= prev.close()
    })
  }
}

// ============================================================
// BULLISH ABANDONED BABY
// ============================================================

/// Long bearish bar, doji gapping fully below it, bullish bar gapping fully
/// above the doji.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BullishAbandonedBabyDetector {
  pub min_first_body_ratio: Ratio,
  pub max_doji_body_ratio: Ratio,
}

impl Default for BullishAbandonedBabyDetector {
  fn default() -> Self {
    Self {
      min_first_body_ratio: Ratio::new_const(BODY_LONG_RATIO),
      max_doji_body_ratio: Ratio::new_const(DOJI_RATIO),
    }
  }
}

impl PatternDetector for BullishAbandonedBabyDetector {
  fn pattern_type(&self) -> PatternType {
    PatternType::BullishAbandonedBaby
  }

  fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool {
    let Some([first, baby, third]) = helpers::window::<_, 3>(bars, index) else {
      return false;
    };

    first.is_bearish()
      && is_body_long(first, self.min_first_body_ratio.get())
      && is_doji(baby, self.max_doji_body_ratio.get())
      && gap_down(first, baby)
      && third.is_bullish()
      && gap_up(baby, third)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Bar;
  use chrono::{Duration, NaiveDate};

  fn bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 2, 1)
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap();
    ohlc
      .iter()
      .enumerate()
      .map(|(i, &(o, h, l, c))| Bar::new(start + Duration::days(i as i64), o, h, l, c))
      .collect()
  }

  #[test]
  fn test_midpoint_recovery_boundary() {
    // First body 110 -> 100, midpoint 105
    let mut data = vec![
      (110.0, 111.0, 99.0, 100.0),
      (99.5, 100.5, 98.0, 99.0),
      (99.5, 105.5, 99.0, 105.0),
    ];
    let d = ThreeCandleDetector::default();
    assert!(d.matches(&bars(&data), 2));

    data[2].3 = 104.9;
    assert!(!d.matches(&bars(&data), 2));
  }

  #[test]
  fn test_soldier_open_outside_body_rejected() {
    let d = ThreeWhiteSoldiersDetector::default();
    let good = [
      (100.0, 103.2, 99.8, 103.0),
      (101.5, 105.2, 101.3, 105.0),
      (104.0, 108.2, 103.8, 108.0),
    ];
    assert!(d.matches(&bars(&good), 2));

    let mut gapped = good;
    gapped[2].0 = 105.5;
    gapped[2].2 = 105.3;
    assert!(!d.matches(&bars(&gapped), 2));
  }
}
