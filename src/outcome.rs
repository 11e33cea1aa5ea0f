//! Forward simulation of a trade from its entry bar.
//!
//! Within one bar the target is checked before the stop (optimistic
//! tie-break) except in partial-exit mode, where the stop comes first.
//! Intraday exits are checked before either.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::touch::Touch;
use crate::{PipelineError, Ratio, Result, Timeframe, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    TargetHit,
    StopLoss,
    TrailingStop,
    IntradayExit,
    PartialExitsComplete,
    Ongoing,
    NoData,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::TargetHit => "target_hit",
            Resolution::StopLoss => "stop_loss",
            Resolution::TrailingStop => "trailing_stop",
            Resolution::IntradayExit => "intraday_exit",
            Resolution::PartialExitsComplete => "partial_exits_complete",
            Resolution::Ongoing => "ongoing",
            Resolution::NoData => "no_data",
        }
    }

    /// The trade reached an exit inside the analysis window.
    pub fn is_closed(self) -> bool {
        !matches!(self, Resolution::Ongoing | Resolution::NoData)
    }
}

/// One leg of a partial exit plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub target_pct: f64,
    /// Fraction of the position closed by this leg
    pub share: Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitMode {
    /// Single target, single stop
    #[default]
    FixedStop,
    /// Arm a trailing stop at the target and ride the move
    TrailingStop,
    PartialExit { first: ExitLeg, second: ExitLeg },
}

impl ExitMode {
    /// Half at +0.5%, half at +0.9%
    pub fn partial_default() -> Self {
        ExitMode::PartialExit {
            first: ExitLeg {
                target_pct: 0.5,
                share: Ratio::new_const(0.5),
            },
            second: ExitLeg {
                target_pct: 0.9,
                share: Ratio::new_const(0.5),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Overrides the timeframe's default target
    pub target_pct: Option<f64>,
    pub max_bars_to_analyze: usize,
    pub mode: ExitMode,
    /// Force an exit at this wall-clock time on the entry date
    pub intraday_exit: Option<NaiveTime>,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            target_pct: None,
            max_bars_to_analyze: 200,
            mode: ExitMode::FixedStop,
            intraday_exit: None,
        }
    }
}

impl OutcomeConfig {
    pub fn target_pct_for(&self, timeframe: Timeframe) -> f64 {
        self.target_pct
            .unwrap_or_else(|| timeframe.default_target_pct())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.target_pct {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(PipelineError::OutOfRange {
                    field: "target_pct",
                    value: pct,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }
        if self.max_bars_to_analyze == 0 {
            return Err(PipelineError::InvalidValue("max_bars_to_analyze must be > 0"));
        }
        if let ExitMode::PartialExit { first, second } = self.mode {
            for leg in [first, second] {
                if !leg.target_pct.is_finite() || leg.target_pct <= 0.0 {
                    return Err(PipelineError::OutOfRange {
                        field: "partial_exit.target_pct",
                        value: leg.target_pct,
                        min: 0.0,
                        max: f64::MAX,
                    });
                }
            }
            let total = first.share.get() + second.share.get();
            if (total - 1.0).abs() > 1e-9 {
                return Err(PipelineError::InvalidConfig(format!(
                    "partial exit shares must sum to 1, got {total}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailingState {
    pub highest_price: f64,
    pub trailing_stop: f64,
    pub activated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegState {
    pub target_price: f64,
    pub share: f64,
    pub triggered_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartialExitState {
    pub legs: [LegState; 2],
}

impl PartialExitState {
    /// Share of the position still open
    pub fn remaining_share(&self) -> f64 {
        let closed: f64 = self
            .legs
            .iter()
            .filter(|l| l.triggered_at.is_some())
            .map(|l| l.share)
            .sum();
        (1.0 - closed).max(0.0)
    }

    fn all_triggered(&self) -> bool {
        self.legs.iter().all(|l| l.triggered_at.is_some())
    }

    /// Position-weighted profit when whatever is still open closes at `price`
    fn blended_pct(&self, entry: f64, price: f64) -> f64 {
        let legs: f64 = self
            .legs
            .iter()
            .filter(|l| l.triggered_at.is_some())
            .map(|l| l.share * pct(entry, l.target_price))
            .sum();
        legs + self.remaining_share() * pct(entry, price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub resolution: Resolution,
    pub profit_pct: f64,
    pub exit_price: f64,
    pub exit_timestamp: Option<NaiveDateTime>,
    pub bars_to_resolution: usize,
    /// Largest move above entry, percent
    pub max_favorable_pct: f64,
    /// Largest move below entry, percent, as a positive magnitude
    pub max_adverse_pct: f64,
    pub trailing: Option<TrailingState>,
    pub partial: Option<PartialExitState>,
}

impl TradeOutcome {
    pub fn no_data(entry_price: f64) -> Self {
        Self {
            resolution: Resolution::NoData,
            profit_pct: 0.0,
            exit_price: entry_price,
            exit_timestamp: None,
            bars_to_resolution: 0,
            max_favorable_pct: 0.0,
            max_adverse_pct: 0.0,
            trailing: None,
            partial: None,
        }
    }
}

/// A touch with its simulated outcome, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTouch {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub touch: Touch,
    pub outcome: TradeOutcome,
}

impl ResolvedTouch {
    pub fn entry_timestamp(&self) -> NaiveDateTime {
        self.touch.pattern.timestamp
    }
}

#[inline]
fn pct(entry: f64, price: f64) -> f64 {
    (price - entry) / entry * 100.0
}

/// Running excursion tracker
struct Excursion {
    entry: f64,
    favorable: f64,
    adverse: f64,
}

impl Excursion {
    fn new(entry: f64) -> Self {
        Self {
            entry,
            favorable: 0.0,
            adverse: 0.0,
        }
    }

    fn observe<T: OHLCV>(&mut self, bar: &T) {
        self.favorable = self.favorable.max(pct(self.entry, bar.high()));
        self.adverse = self.adverse.max(-pct(self.entry, bar.low()));
    }

    fn finish(
        &self,
        resolution: Resolution,
        profit_pct: f64,
        exit_price: f64,
        exit_timestamp: NaiveDateTime,
        bars: usize,
    ) -> TradeOutcome {
        TradeOutcome {
            resolution,
            profit_pct,
            exit_price,
            exit_timestamp: Some(exit_timestamp),
            bars_to_resolution: bars,
            max_favorable_pct: self.favorable,
            max_adverse_pct: self.adverse,
            trailing: None,
            partial: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeSimulator {
    config: OutcomeConfig,
}

impl OutcomeSimulator {
    pub fn new(config: OutcomeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OutcomeConfig {
        &self.config
    }

    pub fn simulate_touch<T: OHLCV>(&self, bars: &[T], touch: &Touch) -> TradeOutcome {
        self.simulate(
            bars,
            touch.pattern.index,
            touch.entry_price,
            touch.stop_loss_price,
            touch.target_price,
        )
    }

    /// Walk bars `entry_index + 1 ..` (at most `max_bars_to_analyze`) and
    /// resolve the trade.
    pub fn simulate<T: OHLCV>(
        &self,
        bars: &[T],
        entry_index: usize,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
    ) -> TradeOutcome {
        let start = entry_index + 1;
        let end = start
            .saturating_add(self.config.max_bars_to_analyze)
            .min(bars.len());
        if start >= end {
            return TradeOutcome::no_data(entry_price);
        }

        let cutoff = self
            .config
            .intraday_exit
            .map(|t| bars[entry_index].timestamp().date().and_time(t));

        match self.config.mode {
            ExitMode::FixedStop => {
                self.walk_fixed(bars, start, end, cutoff, entry_price, stop_price, target_price)
            }
            ExitMode::TrailingStop => {
                self.walk_trailing(bars, start, end, cutoff, entry_price, stop_price, target_price)
            }
            ExitMode::PartialExit { first, second } => {
                let partial = PartialExitState {
                    legs: [first, second].map(|leg| LegState {
                        target_price: entry_price * (1.0 + leg.target_pct / 100.0),
                        share: leg.share.get(),
                        triggered_at: None,
                    }),
                };
                self.walk_partial(bars, start, end, cutoff, entry_price, stop_price, partial)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_fixed<T: OHLCV>(
        &self,
        bars: &[T],
        start: usize,
        end: usize,
        cutoff: Option<NaiveDateTime>,
        entry: f64,
        stop: f64,
        target: f64,
    ) -> TradeOutcome {
        let mut exc = Excursion::new(entry);

        for (n, bar) in bars[start..end].iter().enumerate() {
            exc.observe(bar);
            let ts = bar.timestamp();
            if cutoff.is_some_and(|c| ts >= c) {
                return exc.finish(Resolution::IntradayExit, pct(entry, bar.close()), bar.close(), ts, n + 1);
            }
            if bar.high() >= target {
                return exc.finish(Resolution::TargetHit, pct(entry, target), target, ts, n + 1);
            }
            if bar.low() <= stop {
                return exc.finish(Resolution::StopLoss, pct(entry, stop), stop, ts, n + 1);
            }
        }

        let last = &bars[end - 1];
        exc.finish(Resolution::Ongoing, pct(entry, last.close()), last.close(), last.timestamp(), end - start)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_trailing<T: OHLCV>(
        &self,
        bars: &[T],
        start: usize,
        end: usize,
        cutoff: Option<NaiveDateTime>,
        entry: f64,
        stop: f64,
        target: f64,
    ) -> TradeOutcome {
        let mut exc = Excursion::new(entry);
        let mut trail: Option<TrailingState> = None;

        for i in start..end {
            let bar = &bars[i];
            let prev_low = bars[i - 1].low();
            let ts = bar.timestamp();
            let n = i - start + 1;
            exc.observe(bar);

            if cutoff.is_some_and(|c| ts >= c) {
                let mut out = exc.finish(Resolution::IntradayExit, pct(entry, bar.close()), bar.close(), ts, n);
                out.trailing = trail;
                return out;
            }

            match trail.as_mut() {
                None => {
                    if bar.high() >= target {
                        trail = Some(TrailingState {
                            highest_price: bar.high(),
                            trailing_stop: prev_low.max(stop),
                            activated_at: ts,
                        });
                    } else if bar.low() <= stop {
                        return exc.finish(Resolution::StopLoss, pct(entry, stop), stop, ts, n);
                    }
                }
                Some(state) => {
                    if bar.low() <= state.trailing_stop {
                        let exit = state.trailing_stop;
                        let mut out = exc.finish(Resolution::TrailingStop, pct(entry, exit), exit, ts, n);
                        out.trailing = Some(*state);
                        return out;
                    }
                    if bar.high() > state.highest_price {
                        state.highest_price = bar.high();
                        state.trailing_stop = state.trailing_stop.max(prev_low);
                    }
                }
            }
        }

        let last = &bars[end - 1];
        let mut out = exc.finish(Resolution::Ongoing, pct(entry, last.close()), last.close(), last.timestamp(), end - start);
        out.trailing = trail;
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_partial<T: OHLCV>(
        &self,
        bars: &[T],
        start: usize,
        end: usize,
        cutoff: Option<NaiveDateTime>,
        entry: f64,
        stop: f64,
        mut partial: PartialExitState,
    ) -> TradeOutcome {
        let mut exc = Excursion::new(entry);

        let close_at = |exc: &Excursion, partial: PartialExitState, resolution, price: f64, ts, n| {
            let profit = partial.blended_pct(entry, price);
            let mut out = exc.finish(resolution, profit, entry * (1.0 + profit / 100.0), ts, n);
            out.partial = Some(partial);
            out
        };

        for (n, bar) in bars[start..end].iter().enumerate() {
            exc.observe(bar);
            let ts = bar.timestamp();

            if cutoff.is_some_and(|c| ts >= c) {
                return close_at(&exc, partial, Resolution::IntradayExit, bar.close(), ts, n + 1);
            }
            if bar.low() <= stop {
                return close_at(&exc, partial, Resolution::StopLoss, stop, ts, n + 1);
            }
            for leg in partial.legs.iter_mut() {
                if leg.triggered_at.is_none() && bar.high() >= leg.target_price {
                    leg.triggered_at = Some(ts);
                }
            }
            if partial.all_triggered() {
                return close_at(&exc, partial, Resolution::PartialExitsComplete, entry, ts, n + 1);
            }
        }

        let last = &bars[end - 1];
        close_at(&exc, partial, Resolution::Ongoing, last.close(), last.timestamp(), end - start)
    }
}
