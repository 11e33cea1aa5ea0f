//! Common helper functions for candlestick pattern detection
//!
//! Default thresholds and comparison functions shared across all detector modules.

use crate::{OHLCVExt, PipelineError, Result, OHLCV};

// ============================================================
// DEFAULT THRESHOLDS
// ============================================================

/// Pin bar: lower wick must be at least this multiple of the body
pub const PIN_BAR_MIN_WICK_RATIO: f64 = 2.0;
/// Pin bar: body as fraction of range
pub const PIN_BAR_MAX_BODY_RATIO: f64 = 0.3;
/// Pin bar: upper wick as fraction of lower wick
pub const PIN_BAR_MAX_UPPER_WICK_RATIO: f64 = 0.5;
/// Engulfing body must exceed the prior body by this factor
pub const MIN_ENGULFING_RATIO: f64 = 1.1;

// Ratio-of-range thresholds
pub const DOJI_RATIO: f64 = 0.1;
pub const BODY_LONG_RATIO: f64 = 0.5;
pub const BODY_HALF_RATIO: f64 = 0.5;
pub const BODY_MARUBOZU_RATIO: f64 = 0.9;
pub const SHADOW_SHORT_RATIO: f64 = 0.1;
pub const SHADOW_VERYSHORT_RATIO: f64 = 0.05;
pub const SHADOW_SOLDIER_RATIO: f64 = 0.3;
pub const SHADOW_DRAGONFLY_RATIO: f64 = 0.6;

/// Tweezer lows must agree to within this percentage
pub const TWEEZER_TOLERANCE_PCT: f64 = 0.1;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Body is doji-like. Flat bars carry no shape and never qualify.
#[inline]
pub fn is_doji<T: OHLCV>(bar: &T, max_body_ratio: f64) -> bool {
    bar.body_ratio().is_some_and(|r| r <= max_body_ratio)
}

/// Body covers at least `min_body_ratio` of the range
#[inline]
pub fn is_body_long<T: OHLCV>(bar: &T, min_body_ratio: f64) -> bool {
    bar.body_ratio().is_some_and(|r| r >= min_body_ratio)
}

/// `inner` body lies within `outer` body (inclusive)
#[inline]
pub fn body_inside<O: OHLCV, I: OHLCV>(outer: &O, inner: &I) -> bool {
    inner.body_top() <= outer.body_top() && inner.body_bottom() >= outer.body_bottom()
}

/// Full gap down: `curr` trades entirely below `prev`
#[inline]
pub fn gap_down<P: OHLCV, C: OHLCV>(prev: &P, curr: &C) -> bool {
    curr.high() < prev.low()
}

/// Full gap up: `curr` trades entirely above `prev`
#[inline]
pub fn gap_up<P: OHLCV, C: OHLCV>(prev: &P, curr: &C) -> bool {
    curr.low() > prev.high()
}

/// Absolute difference between `a` and `b` as a percentage of `b`
#[inline]
pub fn pct_diff(a: f64, b: f64) -> f64 {
    if b.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    (a - b).abs() / b.abs() * 100.0
}

/// The window of `N` bars ending at `index`, if the sequence is long enough
#[inline]
pub fn window<T, const N: usize>(bars: &[T], index: usize) -> Option<&[T; N]> {
    if index + 1 < N {
        return None;
    }
    bars.get(index + 1 - N..=index)?.try_into().ok()
}

/// Reject negative or non-finite multipliers in detector configs
pub fn check_positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PipelineError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::MAX,
        });
    }
    Ok(())
}
