//! End-to-end run over every configured instrument and timeframe.
//!
//! Pairs are analysed in parallel and share nothing. Their touches are merged,
//! sorted, and replayed against the capital pool on one thread.

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capital::{replay_order, CapitalManager, CapitalReport};
use crate::config::PipelineConfig;
use crate::export::{build_rows, ExportRow};
use crate::outcome::{OutcomeSimulator, ResolvedTouch};
use crate::swing;
use crate::touch::TouchValidator;
use crate::{validate_bars, Bar, PatternScanner, PipelineError, Result, ScannerBuilder, Timeframe};

/// Supplies chronological bars for one instrument and timeframe.
pub trait BarSource: Send + Sync {
    fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Option<Vec<Bar>>;
}

impl<F> BarSource for F
where
    F: Fn(&str, Timeframe) -> Option<Vec<Bar>> + Send + Sync,
{
    fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Option<Vec<Bar>> {
        self(instrument, timeframe)
    }
}

/// Bars held in memory, keyed by instrument and timeframe.
#[derive(Debug, Clone, Default)]
pub struct MemoryBarSource {
    bars: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl MemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        self.bars.insert((instrument.to_string(), timeframe), bars);
    }
}

impl BarSource for MemoryBarSource {
    fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Option<Vec<Bar>> {
        self.bars.get(&(instrument.to_string(), timeframe)).cloned()
    }
}

/// Receives formatted alerts for live touches.
pub trait AlertSink {
    fn deliver(&self, alert: &str) -> std::result::Result<(), String>;
}

/// Receives the flat result rows of a run.
pub trait ExportSink {
    fn export(&mut self, rows: &[ExportRow]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PairStatus {
    Analyzed,
    InsufficientHistory { need: usize, got: usize },
    DataUnavailable,
    Failed(String),
}

impl PairStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PairStatus::Analyzed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub status: PairStatus,
    pub bars: usize,
    pub candidates: usize,
    pub swing_lows: usize,
    pub untouched_swing_lows: usize,
    pub touches: usize,
}

impl PairReport {
    fn empty(instrument: &str, timeframe: Timeframe, status: PairStatus) -> Self {
        Self {
            instrument: instrument.to_string(),
            timeframe,
            status,
            bars: 0,
            candidates: 0,
            swing_lows: 0,
            untouched_swing_lows: 0,
            touches: 0,
        }
    }
}

/// Output of analysing one bar sequence.
#[derive(Debug, Clone)]
pub struct PairAnalysis {
    pub report: PairReport,
    pub touches: Vec<ResolvedTouch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_at: NaiveDateTime,
    pub pairs: Vec<PairReport>,
    pub succeeded: usize,
    pub skipped: usize,
    /// Globally sorted by entry time, instrument, timeframe, pattern type
    pub touches: Vec<ResolvedTouch>,
    pub capital: CapitalReport,
    pub alerts_sent: usize,
    pub export_error: Option<String>,
}

impl RunReport {
    pub fn rows(&self) -> Vec<ExportRow> {
        build_rows(&self.touches, &self.capital)
    }
}

/// Plain-text alert for a touch.
pub fn format_alert(resolved: &ResolvedTouch) -> String {
    let t = &resolved.touch;
    format!(
        "LIVE TOUCH: {} [{}]\n\
         Pattern: {} (strength {}) @ {}\n\
         Swing low: {:.2} @ {} (distance {:+.3}%, {} days)\n\
         Entry: {:.2}  Stop: {:.2}  Target: {:.2}",
        resolved.instrument,
        resolved.timeframe,
        t.pattern_type().display_name(),
        t.pattern.strength,
        t.pattern.timestamp.format("%Y-%m-%d %H:%M"),
        t.swing_low_price,
        t.swing_low_timestamp.format("%Y-%m-%d %H:%M"),
        t.distance_pct,
        t.day_gap,
        t.entry_price,
        t.stop_loss_price,
        t.target_price,
    )
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    scanner: PatternScanner,
    simulator: OutcomeSimulator,
}

impl Pipeline {
    /// Validates the whole configuration up front.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let scanner = ScannerBuilder::from_config(&config.patterns).build()?;
        let simulator = OutcomeSimulator::new(config.outcome)?;
        Ok(Self {
            config,
            scanner,
            simulator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Swing lows, candidates, touches and outcomes for one bar sequence.
    pub fn analyze_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> Result<PairAnalysis> {
        if bars.is_empty() {
            return Err(PipelineError::DataUnavailable {
                instrument: instrument.to_string(),
                timeframe,
            });
        }
        validate_bars(bars)?;

        let mut report = PairReport::empty(instrument, timeframe, PairStatus::Analyzed);
        report.bars = bars.len();

        let mut arena = match swing::detect(bars, &self.config.swing) {
            Ok(arena) => arena,
            Err(PipelineError::InsufficientHistory { need, got }) => {
                warn!("[{}] {} skipped: need {} bars, got {}", instrument, timeframe, need, got);
                report.status = PairStatus::InsufficientHistory { need, got };
                return Ok(PairAnalysis {
                    report,
                    touches: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let candidates = self.scanner.scan(bars, self.config.include_live)?;
        let validator = TouchValidator::new(
            self.config.touch,
            self.config.outcome.target_pct_for(timeframe),
        )?;
        let touches = validator.find_touches(&mut arena, &candidates);

        report.candidates = candidates.len();
        report.swing_lows = arena.len();
        report.untouched_swing_lows = arena.untouched().len();
        report.touches = touches.len();
        debug!(
            "[{}] {}: {} bars, {} swing lows, {} candidates, {} touches",
            instrument,
            timeframe,
            bars.len(),
            arena.len(),
            candidates.len(),
            touches.len()
        );

        let touches = touches
            .into_iter()
            .map(|touch| ResolvedTouch {
                instrument: instrument.to_string(),
                timeframe,
                outcome: self.simulator.simulate_touch(bars, &touch),
                touch,
            })
            .collect();

        Ok(PairAnalysis { report, touches })
    }

    fn analyze_pair<S: BarSource + ?Sized>(
        &self,
        source: &S,
        instrument: &str,
        timeframe: Timeframe,
    ) -> PairAnalysis {
        let Some(bars) = source.get_bars(instrument, timeframe) else {
            warn!("[{}] {} skipped: no data", instrument, timeframe);
            return PairAnalysis {
                report: PairReport::empty(instrument, timeframe, PairStatus::DataUnavailable),
                touches: Vec::new(),
            };
        };

        match self.analyze_bars(instrument, timeframe, &bars) {
            Ok(analysis) => analysis,
            Err(PipelineError::DataUnavailable { .. }) => {
                warn!("[{}] {} skipped: no data", instrument, timeframe);
                PairAnalysis {
                    report: PairReport::empty(instrument, timeframe, PairStatus::DataUnavailable),
                    touches: Vec::new(),
                }
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", instrument, timeframe, e);
                PairAnalysis {
                    report: PairReport::empty(instrument, timeframe, PairStatus::Failed(e.to_string())),
                    touches: Vec::new(),
                }
            }
        }
    }

    /// Run against the local clock.
    pub fn run<S: BarSource + ?Sized>(
        &self,
        source: &S,
        alerts: Option<&dyn AlertSink>,
        export: Option<&mut dyn ExportSink>,
    ) -> Result<RunReport> {
        self.run_at(Local::now().naive_local(), source, alerts, export)
    }

    /// Analyse every pair, replay capital, deliver alerts and export rows.
    ///
    /// Same bars and same `now` give the same report.
    pub fn run_at<S: BarSource + ?Sized>(
        &self,
        now: NaiveDateTime,
        source: &S,
        alerts: Option<&dyn AlertSink>,
        export: Option<&mut dyn ExportSink>,
    ) -> Result<RunReport> {
        let pairs = self.config.pairs();
        info!(pairs = pairs.len(), run_at = %now, "starting analysis run");

        let analyses: Vec<PairAnalysis> = pairs
            .par_iter()
            .map(|(instrument, timeframe)| self.analyze_pair(source, instrument, *timeframe))
            .collect();

        let mut reports = Vec::with_capacity(analyses.len());
        let mut touches = Vec::new();
        for analysis in analyses {
            reports.push(analysis.report);
            touches.extend(analysis.touches);
        }
        touches.sort_by(replay_order);

        let succeeded = reports.iter().filter(|r| r.status.is_success()).count();
        let skipped = reports.len() - succeeded;

        let start = self.config.capital.start_at(now);
        let capital = CapitalManager::new(self.config.capital, start)?.replay(&touches);

        let mut alerts_sent = 0;
        if let Some(sink) = alerts {
            for resolved in touches.iter().filter(|t| t.touch.is_live()) {
                match sink.deliver(&format_alert(resolved)) {
                    Ok(()) => alerts_sent += 1,
                    Err(e) => warn!("[{}] alert delivery failed: {}", resolved.instrument, e),
                }
            }
        }

        let mut report = RunReport {
            run_at: now,
            pairs: reports,
            succeeded,
            skipped,
            touches,
            capital,
            alerts_sent,
            export_error: None,
        };

        if let Some(sink) = export {
            if let Err(e) = sink.export(&report.rows()) {
                warn!("export failed: {}", e);
                report.export_error = Some(e.to_string());
            }
        }

        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            touches = report.touches.len(),
            trades = report.capital.trades.len(),
            rejections = report.capital.rejections.len(),
            final_capital = report.capital.final_capital,
            "analysis run complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn flat_bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Bar::new(start + Duration::days(i as i64), base, base + 1.0, base - 0.4, base + 0.6)
            })
            .collect()
    }

    fn pipeline(instruments: &[&str]) -> Pipeline {
        let config = PipelineConfig {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            timeframes: vec![Timeframe::D1],
            ..Default::default()
        };
        Pipeline::new(config).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_before_scan() {
        let mut config = PipelineConfig::default();
        config.touch.touch_tolerance_pct = 0.0;
        assert!(Pipeline::new(config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_short_history_is_skipped() {
        let analysis = pipeline(&["AAA"]).analyze_bars("AAA", Timeframe::D1, &flat_bars(5)).unwrap();
        assert_eq!(
            analysis.report.status,
            PairStatus::InsufficientHistory { need: 13, got: 5 }
        );
        assert!(analysis.touches.is_empty());
    }

    #[test]
    fn test_failures_isolated_per_pair() {
        let mut source = MemoryBarSource::new();
        source.insert("GOOD", Timeframe::D1, flat_bars(40));
        let mut broken = flat_bars(40);
        broken[7].high = broken[7].low - 1.0;
        source.insert("BAD", Timeframe::D1, broken);

        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let report = pipeline(&["GOOD", "BAD", "MISSING"])
            .run_at(now, &source, None, None)
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 2);
        let status = |name: &str| {
            report
                .pairs
                .iter()
                .find(|p| p.instrument == name)
                .map(|p| p.status.clone())
                .unwrap()
        };
        assert_eq!(status("GOOD"), PairStatus::Analyzed);
        assert_eq!(status("MISSING"), PairStatus::DataUnavailable);
        assert!(matches!(status("BAD"), PairStatus::Failed(_)));
    }

    #[test]
    fn test_closure_source() {
        let source = |_: &str, _: Timeframe| Some(flat_bars(30));
        let report = pipeline(&["AAA", "BBB"]).run(&source, None, None).unwrap();
        assert_eq!(report.succeeded, 2);
    }
}
