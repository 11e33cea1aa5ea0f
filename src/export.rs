//! Flat result rows, CSV output and run metadata.

use std::io::Write;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::capital::{CapitalReport, Rejection, Trade};
use crate::config::PipelineConfig;
use crate::outcome::{Resolution, ResolvedTouch};
use crate::pipeline::{ExportSink, RunReport};
use crate::{PatternType, PipelineError, Result, Timeframe};

/// One touch with its outcome and, if admitted, its trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub pattern_type: PatternType,
    pub pattern_timestamp: NaiveDateTime,
    pub is_live: bool,
    pub strength: u8,
    pub swing_low_timestamp: NaiveDateTime,
    pub swing_low_price: f64,
    pub distance_pct: f64,
    pub day_gap: i64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub target_price: f64,
    pub resolution: Resolution,
    pub profit_pct: f64,
    pub exit_price: f64,
    pub exit_timestamp: Option<NaiveDateTime>,
    pub bars_to_resolution: usize,
    pub max_favorable_pct: f64,
    pub max_adverse_pct: f64,
    pub admitted: bool,
    pub capital: Option<f64>,
    pub pnl: Option<f64>,
    pub rejection: Option<String>,
}

impl ExportRow {
    pub fn from_touch(resolved: &ResolvedTouch) -> Self {
        let touch = &resolved.touch;
        let outcome = &resolved.outcome;
        Self {
            instrument: resolved.instrument.clone(),
            timeframe: resolved.timeframe,
            pattern_type: touch.pattern_type(),
            pattern_timestamp: touch.pattern.timestamp,
            is_live: touch.is_live(),
            strength: touch.pattern.strength,
            swing_low_timestamp: touch.swing_low_timestamp,
            swing_low_price: touch.swing_low_price,
            distance_pct: touch.distance_pct,
            day_gap: touch.day_gap,
            entry_price: touch.entry_price,
            stop_loss_price: touch.stop_loss_price,
            target_price: touch.target_price,
            resolution: outcome.resolution,
            profit_pct: outcome.profit_pct,
            exit_price: outcome.exit_price,
            exit_timestamp: outcome.exit_timestamp,
            bars_to_resolution: outcome.bars_to_resolution,
            max_favorable_pct: outcome.max_favorable_pct,
            max_adverse_pct: outcome.max_adverse_pct,
            admitted: false,
            capital: None,
            pnl: None,
            rejection: None,
        }
    }

    pub fn from_trade(resolved: &ResolvedTouch, trade: &Trade) -> Self {
        Self {
            admitted: true,
            capital: Some(trade.capital),
            pnl: trade.pnl,
            ..Self::from_touch(resolved)
        }
    }

    pub fn from_rejection(resolved: &ResolvedTouch, rejection: &Rejection) -> Self {
        Self {
            rejection: Some(rejection.reason.to_string()),
            ..Self::from_touch(resolved)
        }
    }
}

/// Join touches with the capital replay, one row per touch, input order.
pub fn build_rows(touches: &[ResolvedTouch], capital: &CapitalReport) -> Vec<ExportRow> {
    touches
        .iter()
        .enumerate()
        .map(|(i, resolved)| {
            if let Some(trade) = capital.trade_for(i) {
                ExportRow::from_trade(resolved, trade)
            } else if let Some(rejection) = capital.rejection_for(i) {
                ExportRow::from_rejection(resolved, rejection)
            } else {
                ExportRow::from_touch(resolved)
            }
        })
        .collect()
}

/// Writes rows as CSV with a header line.
pub struct CsvExportSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvExportSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PipelineError::Export(e.to_string()))
    }
}

impl<W: Write> ExportSink for CsvExportSink<W> {
    fn export(&mut self, rows: &[ExportRow]) -> Result<()> {
        for row in rows {
            self.writer
                .serialize(row)
                .map_err(|e| PipelineError::Export(e.to_string()))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Render rows as a CSV string.
pub fn to_csv_string(rows: &[ExportRow]) -> Result<String> {
    let mut sink = CsvExportSink::new(vec![]);
    sink.export(rows)?;
    let data = sink.into_inner()?;
    String::from_utf8(data).map_err(|e| PipelineError::Export(e.to_string()))
}

/// Summary of the last run, kept next to the exported rows.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata<'a> {
    pub last_run: NaiveDateTime,
    pub result_count: usize,
    pub status: &'static str,
    pub pairs_succeeded: usize,
    pub pairs_skipped: usize,
    pub config: &'a PipelineConfig,
}

impl<'a> RunMetadata<'a> {
    pub fn new(report: &RunReport, config: &'a PipelineConfig) -> Self {
        Self {
            last_run: report.run_at,
            result_count: report.touches.len(),
            status: if report.export_error.is_some() {
                "export_failed"
            } else {
                "success"
            },
            pairs_succeeded: report.succeeded,
            pairs_skipped: report.skipped,
            config,
        }
    }
}

pub fn metadata_json(report: &RunReport, config: &PipelineConfig) -> Result<String> {
    serde_json::to_string_pretty(&RunMetadata::new(report, config))
        .map_err(|e| PipelineError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capital::{CapitalConfig, CapitalManager, SettlementTiming};
    use crate::outcome::TradeOutcome;
    use crate::swing::SwingLowId;
    use crate::touch::Touch;
    use crate::{Bar, PatternCandidate};
    use chrono::{Duration, NaiveDate};

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
            + Duration::days(n)
    }

    fn resolved(instrument: &str, n: i64) -> ResolvedTouch {
        let bars = vec![Bar::new(day(n), 100.0, 100.2, 98.0, 100.1)];
        let pattern = PatternCandidate::from_window(PatternType::PinBar, &bars, 0).unwrap();
        let mut outcome = TradeOutcome::no_data(100.1);
        outcome.resolution = Resolution::TargetHit;
        outcome.profit_pct = 8.0;
        outcome.exit_timestamp = Some(day(n + 2));
        ResolvedTouch {
            instrument: instrument.into(),
            timeframe: Timeframe::D1,
            touch: Touch {
                swing_low_id: SwingLowId(0),
                swing_low_index: 0,
                swing_low_timestamp: day(n - 4),
                swing_low_price: 98.0,
                pattern,
                distance_pct: 0.0,
                day_gap: 4,
                entry_price: 100.1,
                stop_loss_price: 98.0,
                target_price: 108.108,
            },
            outcome,
        }
    }

    #[test]
    fn test_rows_join_capital_replay() {
        let touches = vec![resolved("AAA", 0), resolved("BBB", 0)];
        let config = CapitalConfig {
            total_capital: 10_000.0,
            capital_per_trade: 10_000.0,
            settlement: SettlementTiming::AtExit,
            ..Default::default()
        };
        let report = CapitalManager::new(config, day(-10)).unwrap().replay(&touches);
        let rows = build_rows(&touches, &report);

        assert_eq!(rows.len(), 2);
        assert!(rows[0].admitted);
        assert_eq!(rows[0].pnl, Some(800.0));
        assert!(!rows[1].admitted);
        assert_eq!(rows[1].rejection.as_deref(), Some("insufficient capital"));
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let rows = vec![ExportRow::from_touch(&resolved("AAA", 0))];
        let csv = to_csv_string(&rows).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("instrument,timeframe,pattern_type,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("AAA,1D,pin_bar,"));
        assert!(row.contains("target_hit"));
        assert!(lines.next().is_none());
    }
}
