//! Chronological replay of resolved touches against one capital pool.
//!
//! Every admitted trade locks `capital_per_trade`; settlement releases it
//! together with the realized P&L. `available + locked` changes only by
//! realized P&L.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::outcome::{Resolution, ResolvedTouch, TradeOutcome};
use crate::{PatternType, PipelineError, Result, Timeframe};

/// When an admitted trade hands its capital back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTiming {
    /// Settle right after admission
    #[default]
    Immediate,
    /// Capital stays locked until the trade's exit timestamp
    AtExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    pub total_capital: f64,
    pub capital_per_trade: f64,
    /// Trades entered before this are ignored. Defaults to `lookback_days`
    /// before the run.
    pub start_date: Option<NaiveDateTime>,
    pub lookback_days: i64,
    pub settlement: SettlementTiming,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_capital: 100_000.0,
            capital_per_trade: 10_000.0,
            start_date: None,
            lookback_days: 180,
            settlement: SettlementTiming::Immediate,
        }
    }
}

impl CapitalConfig {
    /// Replay start for a run happening at `now`
    pub fn start_at(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.start_date
            .unwrap_or_else(|| now - Duration::days(self.lookback_days))
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("total_capital", self.total_capital),
            ("capital_per_trade", self.capital_per_trade),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }
        if self.capital_per_trade > self.total_capital {
            return Err(PipelineError::InvalidConfig(format!(
                "capital_per_trade {} exceeds total_capital {}",
                self.capital_per_trade, self.total_capital
            )));
        }
        if self.lookback_days < 0 {
            return Err(PipelineError::InvalidConfig(
                "lookback_days must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TradeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: TradeId,
    /// Position of the touch in the slice handed to [`CapitalManager::replay`]
    pub source_index: usize,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub pattern_type: PatternType,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub capital: f64,
    pub status: TradeStatus,
    pub outcome: TradeOutcome,
    pub exit_timestamp: Option<NaiveDateTime>,
    pub pnl: Option<f64>,
}

impl Trade {
    /// When capital is due back. `None` until the end of the replay.
    fn release_at(&self) -> Option<NaiveDateTime> {
        match self.outcome.resolution {
            Resolution::NoData => None,
            _ => self.outcome.exit_timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    BeforeStartDate,
    InsufficientCapital { available: f64, required: f64 },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::BeforeStartDate => f.write_str("before start date"),
            RejectionReason::InsufficientCapital { .. } => f.write_str("insufficient capital"),
        }
    }
}

/// A touch the manager declined. Not an error: the replay carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub source_index: usize,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Lock,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapitalEvent {
    pub kind: EventKind,
    pub trade_id: TradeId,
    pub timestamp: NaiveDateTime,
    pub amount: f64,
    pub pnl: f64,
    pub available_after: f64,
    pub locked_after: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapitalReport {
    pub start: NaiveDateTime,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub peak_capital: f64,
    pub max_drawdown_pct: f64,
    pub total_pnl: f64,
    pub return_pct: f64,
    pub wins: usize,
    pub losses: usize,
    /// Trades settled at exactly zero P&L. Left out of the win rate.
    pub breakeven: usize,
    pub win_rate_pct: f64,
    pub trades: Vec<Trade>,
    pub rejections: Vec<Rejection>,
    pub events: Vec<CapitalEvent>,
}

impl CapitalReport {
    pub fn trade_for(&self, source_index: usize) -> Option<&Trade> {
        self.trades.iter().find(|t| t.source_index == source_index)
    }

    pub fn rejection_for(&self, source_index: usize) -> Option<&Rejection> {
        self.rejections
            .iter()
            .find(|r| r.source_index == source_index)
    }
}

/// Replay order: entry time, then instrument, timeframe and pattern type.
pub fn replay_order(a: &ResolvedTouch, b: &ResolvedTouch) -> Ordering {
    a.entry_timestamp()
        .cmp(&b.entry_timestamp())
        .then_with(|| a.instrument.cmp(&b.instrument))
        .then_with(|| a.timeframe.cmp(&b.timeframe))
        .then_with(|| {
            a.touch
                .pattern_type()
                .ordinal()
                .cmp(&b.touch.pattern_type().ordinal())
        })
}

#[derive(Debug, Clone)]
pub struct CapitalManager {
    config: CapitalConfig,
    start: NaiveDateTime,
    available: f64,
    locked: f64,
    peak: f64,
    max_drawdown_pct: f64,
    trades: Vec<Trade>,
    open: Vec<TradeId>,
    events: Vec<CapitalEvent>,
    rejections: Vec<Rejection>,
    wins: usize,
    losses: usize,
    breakeven: usize,
}

impl CapitalManager {
    pub fn new(config: CapitalConfig, start: NaiveDateTime) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            start,
            available: config.total_capital,
            locked: 0.0,
            peak: config.total_capital,
            max_drawdown_pct: 0.0,
            trades: Vec::new(),
            open: Vec::new(),
            events: Vec::new(),
            rejections: Vec::new(),
            wins: 0,
            losses: 0,
            breakeven: 0,
        })
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn locked(&self) -> f64 {
        self.locked
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.open.iter().map(|id| &self.trades[id.0])
    }

    pub fn trade(&self, id: TradeId) -> Option<&Trade> {
        self.trades.get(id.0)
    }

    /// Admit `touch` at `as_of`, locking `capital_per_trade`.
    pub fn admit(
        &mut self,
        touch: &ResolvedTouch,
        source_index: usize,
        as_of: NaiveDateTime,
    ) -> std::result::Result<TradeId, Rejection> {
        let required = self.config.capital_per_trade;
        let reason = if as_of < self.start {
            Some(RejectionReason::BeforeStartDate)
        } else if self.available < required {
            Some(RejectionReason::InsufficientCapital {
                available: self.available,
                required,
            })
        } else {
            None
        };

        if let Some(reason) = reason {
            let rejection = Rejection {
                source_index,
                instrument: touch.instrument.clone(),
                timeframe: touch.timeframe,
                timestamp: as_of,
                reason,
            };
            self.rejections.push(rejection.clone());
            return Err(rejection);
        }

        let id = TradeId(self.trades.len());
        self.available -= required;
        self.locked += required;
        self.trades.push(Trade {
            id,
            source_index,
            instrument: touch.instrument.clone(),
            timeframe: touch.timeframe,
            pattern_type: touch.touch.pattern_type(),
            entry_timestamp: as_of,
            entry_price: touch.touch.entry_price,
            capital: required,
            status: TradeStatus::Open,
            outcome: touch.outcome,
            exit_timestamp: None,
            pnl: None,
        });
        self.open.push(id);
        self.events.push(CapitalEvent {
            kind: EventKind::Lock,
            trade_id: id,
            timestamp: as_of,
            amount: required,
            pnl: 0.0,
            available_after: self.available,
            locked_after: self.locked,
        });
        debug!(
            "[{}] locked {:.2} for {} at {}",
            touch.instrument,
            required,
            touch.touch.pattern_type(),
            as_of
        );
        Ok(id)
    }

    /// Release a trade's capital plus its realized P&L. Returns `None` if the
    /// trade is unknown or already closed.
    pub fn settle(&mut self, id: TradeId) -> Option<f64> {
        let pos = self.open.iter().position(|open| *open == id)?;
        self.open.remove(pos);

        let trade = &mut self.trades[id.0];
        let pnl = trade.capital * trade.outcome.profit_pct / 100.0;
        let at = trade.outcome.exit_timestamp.unwrap_or(trade.entry_timestamp);
        trade.status = TradeStatus::Closed;
        trade.exit_timestamp = Some(at);
        trade.pnl = Some(pnl);
        let capital = trade.capital;

        self.locked -= capital;
        self.available += capital + pnl;
        match pnl.partial_cmp(&0.0) {
            Some(Ordering::Greater) => self.wins += 1,
            Some(Ordering::Less) => self.losses += 1,
            _ => self.breakeven += 1,
        }

        let total = self.available + self.locked;
        self.peak = self.peak.max(total);
        if self.peak > 0.0 {
            self.max_drawdown_pct = self
                .max_drawdown_pct
                .max((self.peak - total) / self.peak * 100.0);
        }

        self.events.push(CapitalEvent {
            kind: EventKind::Release,
            trade_id: id,
            timestamp: at,
            amount: capital,
            pnl,
            available_after: self.available,
            locked_after: self.locked,
        });
        Some(pnl)
    }

    /// Settle open trades whose exit is at or before `as_of`, earliest first.
    pub fn settle_due(&mut self, as_of: NaiveDateTime) {
        let mut due: Vec<(NaiveDateTime, TradeId)> = self
            .open_trades()
            .filter_map(|t| t.release_at().filter(|at| *at <= as_of).map(|at| (at, t.id)))
            .collect();
        due.sort();
        for (_, id) in due {
            self.settle(id);
        }
    }

    pub fn settle_all(&mut self) {
        let mut remaining: Vec<(Option<NaiveDateTime>, TradeId)> =
            self.open_trades().map(|t| (t.release_at(), t.id)).collect();
        // Unknown exits settle last
        remaining.sort_by_key(|(at, id)| (at.is_none(), *at, *id));
        for (_, id) in remaining {
            self.settle(id);
        }
    }

    /// Replay every touch in deterministic chronological order.
    pub fn replay(mut self, touches: &[ResolvedTouch]) -> CapitalReport {
        let mut ordered: Vec<(usize, &ResolvedTouch)> = touches
            .iter()
            .enumerate()
            .filter(|(_, t)| t.entry_timestamp() >= self.start)
            .collect();
        // Stable: input order breaks remaining ties
        ordered.sort_by(|a, b| replay_order(a.1, b.1));

        info!(
            touches = touches.len(),
            eligible = ordered.len(),
            start = %self.start,
            "replaying trades"
        );

        for (source_index, touch) in ordered {
            let as_of = touch.entry_timestamp();
            if self.config.settlement == SettlementTiming::AtExit {
                self.settle_due(as_of);
            }
            match self.admit(touch, source_index, as_of) {
                Ok(id) => {
                    if self.config.settlement == SettlementTiming::Immediate {
                        self.settle(id);
                    }
                }
                Err(rejection) => {
                    info!(
                        "[{}] {} touch at {} rejected: {}",
                        rejection.instrument,
                        touch.touch.pattern_type(),
                        as_of,
                        rejection.reason
                    );
                }
            }
        }

        self.settle_all();
        self.report()
    }

    pub fn report(&self) -> CapitalReport {
        let initial = self.config.total_capital;
        let final_capital = self.available + self.locked;
        let total_pnl = final_capital - initial;
        let closed = self.wins + self.losses;

        CapitalReport {
            start: self.start,
            initial_capital: initial,
            final_capital,
            peak_capital: self.peak,
            max_drawdown_pct: self.max_drawdown_pct,
            total_pnl,
            return_pct: total_pnl / initial * 100.0,
            wins: self.wins,
            losses: self.losses,
            breakeven: self.breakeven,
            win_rate_pct: if closed > 0 {
                self.wins as f64 / closed as f64 * 100.0
            } else {
                0.0
            },
            trades: self.trades.clone(),
            rejections: self.rejections.clone(),
            events: self.events.clone(),
        }
    }
}
