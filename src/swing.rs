//! Swing low detection with asymmetric confirmation windows.
//!
//! A bar is a swing low when no bar in the `left_lookback` bars before it and
//! no bar in the `right_lookback` bars after it has a strictly lower low.
//! Equal lows do not disqualify. Detected lows live in a [`SwingLowArena`]
//! and are only mutated through its one-shot transitions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Period, PatternType, PipelineError, Result, OHLCV};

/// Swing detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingLowConfig {
    pub left_lookback: Period,
    /// Defaults to `max(2, left_lookback / 3)` when absent
    pub right_lookback: Option<Period>,
    /// Advisory only. Recorded on each swing low as `depth_pct`, never used to
    /// filter.
    pub min_swing_size_pct: f64,
}

impl Default for SwingLowConfig {
    fn default() -> Self {
        Self {
            left_lookback: Period::new_const(10),
            right_lookback: None,
            min_swing_size_pct: 0.5,
        }
    }
}

impl SwingLowConfig {
    pub fn new(left_lookback: usize) -> Result<Self> {
        Ok(Self {
            left_lookback: Period::new(left_lookback)?,
            ..Default::default()
        })
    }

    pub fn with_right_lookback(mut self, right_lookback: usize) -> Result<Self> {
        self.right_lookback = Some(Period::new(right_lookback)?);
        Ok(self)
    }

    pub fn effective_right_lookback(&self) -> usize {
        self.right_lookback
            .map(Period::get)
            .unwrap_or_else(|| (self.left_lookback.get() / 3).max(2))
    }

    /// Minimum sequence length accepted by [`detect`]
    pub fn min_history(&self) -> usize {
        self.left_lookback.get() + self.effective_right_lookback()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_swing_size_pct.is_finite() || self.min_swing_size_pct < 0.0 {
            return Err(PipelineError::OutOfRange {
                field: "min_swing_size_pct",
                value: self.min_swing_size_pct,
                min: 0.0,
                max: f64::MAX,
            });
        }
        Ok(())
    }
}

/// Stable handle into a [`SwingLowArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SwingLowId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingLow {
    pub id: SwingLowId,
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// Rise from the low to the highest high of the left window, percent
    pub depth_pct: f64,
    pub is_invalidated: bool,
    pub invalidated_at: Option<NaiveDateTime>,
    pub invalidated_index: Option<usize>,
    pub is_touched: bool,
    pub touched_at: Option<NaiveDateTime>,
    pub touch_pattern: Option<PatternType>,
}

impl SwingLow {
    /// Valid at `ts`: formed strictly before it and not yet invalidated at it.
    pub fn is_valid_at(&self, ts: NaiveDateTime) -> bool {
        self.timestamp < ts && self.invalidated_at.map_or(true, |inv| inv > ts)
    }

    /// Valid for a pattern whose bars span `first..=last`: formed strictly
    /// before `last` and not undercut before `first`. A breach by the
    /// pattern's own bars is a penetrating retest.
    pub fn is_valid_for_pattern(&self, first: NaiveDateTime, last: NaiveDateTime) -> bool {
        self.timestamp < last && self.invalidated_at.map_or(true, |inv| inv >= first)
    }

    pub fn is_untouched(&self) -> bool {
        !self.is_touched && !self.is_invalidated
    }
}

/// Owns every swing low of one bar sequence, in chronological order.
#[derive(Debug, Clone, Default)]
pub struct SwingLowArena {
    lows: Vec<SwingLow>,
}

impl SwingLowArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a swing low. Callers push in chronological order.
    pub fn push(&mut self, index: usize, timestamp: NaiveDateTime, price: f64) -> SwingLowId {
        let id = SwingLowId(self.lows.len());
        self.lows.push(SwingLow {
            id,
            index,
            timestamp,
            price,
            depth_pct: 0.0,
            is_invalidated: false,
            invalidated_at: None,
            invalidated_index: None,
            is_touched: false,
            touched_at: None,
            touch_pattern: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.lows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lows.is_empty()
    }

    pub fn get(&self, id: SwingLowId) -> Option<&SwingLow> {
        self.lows.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwingLow> {
        self.lows.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = SwingLowId> {
        (0..self.lows.len()).map(SwingLowId)
    }

    /// One-shot transition. Returns `false` if already invalidated.
    pub fn invalidate(&mut self, id: SwingLowId, at: NaiveDateTime, index: usize) -> bool {
        match self.lows.get_mut(id.0) {
            Some(low) if !low.is_invalidated => {
                low.is_invalidated = true;
                low.invalidated_at = Some(at);
                low.invalidated_index = Some(index);
                true
            }
            _ => false,
        }
    }

    /// One-shot transition. Returns `false` if already touched.
    pub fn mark_touched(&mut self, id: SwingLowId, at: NaiveDateTime, pattern: PatternType) -> bool {
        match self.lows.get_mut(id.0) {
            Some(low) if !low.is_touched => {
                low.is_touched = true;
                low.touched_at = Some(at);
                low.touch_pattern = Some(pattern);
                true
            }
            _ => false,
        }
    }

    /// Swing lows valid at `ts`.
    pub fn valid_at(&self, ts: NaiveDateTime) -> Vec<&SwingLow> {
        self.lows.iter().filter(|l| l.is_valid_at(ts)).collect()
    }

    /// Neither touched nor invalidated.
    pub fn untouched(&self) -> Vec<&SwingLow> {
        self.lows.iter().filter(|l| l.is_untouched()).collect()
    }

    /// Mark every low undercut by a later bar, at the first such bar.
    pub fn apply_invalidation<T: OHLCV>(&mut self, bars: &[T]) {
        for i in 0..self.lows.len() {
            let low = self.lows[i];
            if low.is_invalidated {
                continue;
            }
            let breach = bars
                .iter()
                .enumerate()
                .skip(low.index + 1)
                .find(|(_, b)| b.timestamp() > low.timestamp && b.low() < low.price);
            if let Some((j, bar)) = breach {
                self.invalidate(low.id, bar.timestamp(), j);
            }
        }
    }
}

/// Detect swing lows and record their invalidation.
///
/// Fails with [`PipelineError::InsufficientHistory`] when the sequence is
/// shorter than `left_lookback + right_lookback`.
pub fn detect<T: OHLCV>(bars: &[T], config: &SwingLowConfig) -> Result<SwingLowArena> {
    let left = config.left_lookback.get();
    let right = config.effective_right_lookback();
    if bars.len() < left + right {
        return Err(PipelineError::InsufficientHistory {
            need: left + right,
            got: bars.len(),
        });
    }

    let mut arena = SwingLowArena::new();
    for i in left..bars.len() - right {
        let low = bars[i].low();
        let left_ok = bars[i - left..i].iter().all(|b| b.low() >= low);
        let right_ok = bars[i + 1..=i + right].iter().all(|b| b.low() >= low);
        if !(left_ok && right_ok) {
            continue;
        }

        let id = arena.push(i, bars[i].timestamp(), low);
        let left_high = bars[i - left..i]
            .iter()
            .map(|b| b.high())
            .fold(f64::NEG_INFINITY, f64::max);
        if low > 0.0 {
            arena.lows[id.0].depth_pct = (left_high - low) / low * 100.0;
        }
    }

    arena.apply_invalidation(bars);

    let shallow = arena
        .iter()
        .filter(|l| l.depth_pct < config.min_swing_size_pct)
        .count();
    debug!(
        swing_lows = arena.len(),
        invalidated = arena.iter().filter(|l| l.is_invalidated).count(),
        shallow,
        "swing detection complete"
    );

    Ok(arena)
}
