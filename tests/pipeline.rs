//! End-to-end scenarios through the full pipeline.

use std::sync::Mutex;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use swingtouch::export::{metadata_json, to_csv_string, CsvExportSink};
use swingtouch::pipeline::{MemoryBarSource, PairStatus};
use swingtouch::prelude::*;
use swingtouch::swing;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap()
}

fn run_time() -> NaiveDateTime {
    start() + Duration::days(60)
}

fn bar(i: usize, o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar::new(start() + Duration::days(i as i64), o, h, l, c)
}

/// 50 daily bars: steady uptrend, a dip to 105 at bar 20, a bullish
/// engulfing at bar 35 whose low returns exactly to 105, then a rally.
fn swing_retest_bars() -> Vec<Bar> {
    retest_bars(105.0)
}

/// Same shape as [`swing_retest_bars`] with the engulfing bar's low at `retest_low`.
fn retest_bars(retest_low: f64) -> Vec<Bar> {
    (0..50)
        .map(|i| match i {
            20 => bar(i, 119.0, 121.0, 105.0, 120.6),
            34 => bar(i, 130.0, 130.5, 109.0, 110.0),
            35 => bar(i, 109.5, 133.5, retest_low, 133.0),
            36.. => {
                let o = 130.0 + (i - 35) as f64 * 3.0;
                bar(i, o, o + 2.5, o - 0.5, o + 2.0)
            }
            _ => {
                let base = 100.0 + i as f64;
                bar(i, base, base + 1.0, base - 0.4, base + 0.6)
            }
        })
        .collect()
}

fn engulfing_only_config(instruments: &[&str]) -> PipelineConfig {
    PipelineConfig {
        instruments: instruments.iter().map(|s| s.to_string()).collect(),
        timeframes: vec![Timeframe::D1],
        include_live: false,
        patterns: PatternConfig {
            enabled: vec![PatternType::BullishEngulfing],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[derive(Default)]
struct RecordingAlerts {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl AlertSink for RecordingAlerts {
    fn deliver(&self, alert: &str) -> std::result::Result<(), String> {
        if self.fail {
            return Err("channel closed".into());
        }
        self.sent.lock().unwrap().push(alert.to_string());
        Ok(())
    }
}

#[test]
fn test_swing_low_retest_hits_target() {
    let bars = swing_retest_bars();

    let arena = swing::detect(&bars, &SwingLowConfig::default()).unwrap();
    let before_pattern: Vec<&SwingLow> = arena.iter().filter(|l| l.index < 35).collect();
    assert_eq!(before_pattern.len(), 1);
    assert_eq!(before_pattern[0].index, 20);
    assert_eq!(before_pattern[0].price, 105.0);
    assert!(!before_pattern[0].is_invalidated);

    let pipeline = Pipeline::new(engulfing_only_config(&["RELIANCE"])).unwrap();
    let analysis = pipeline.analyze_bars("RELIANCE", Timeframe::D1, &bars).unwrap();

    assert_eq!(analysis.touches.len(), 1);
    let resolved = &analysis.touches[0];
    assert_eq!(resolved.touch.swing_low_index, 20);
    assert_eq!(resolved.touch.pattern.index, 35);
    assert_eq!(resolved.touch.pattern_type(), PatternType::BullishEngulfing);
    assert_eq!(resolved.touch.distance_pct, 0.0);
    assert_eq!(resolved.touch.day_gap, 15);
    assert_eq!(resolved.touch.entry_price, 133.0);
    assert_eq!(resolved.touch.stop_loss_price, 105.0);

    // 1D default target is 8%: 143.64, first reached at bar 39
    assert_eq!(resolved.outcome.resolution, Resolution::TargetHit);
    assert_eq!(resolved.outcome.bars_to_resolution, 4);
    assert!((resolved.outcome.profit_pct - 8.0).abs() < 1e-9);
    assert_eq!(resolved.outcome.exit_timestamp, Some(bars[39].timestamp));
}

#[test]
fn test_penetrating_retest_claims_swing_low() {
    // 0.05% under the swing low, inside the 0.10% tolerance
    let bars = retest_bars(104.95);

    let arena = swing::detect(&bars, &SwingLowConfig::default()).unwrap();
    let low = arena.iter().find(|l| l.index == 20).unwrap();
    assert_eq!(low.invalidated_index, Some(35));

    let pipeline = Pipeline::new(engulfing_only_config(&["RELIANCE"])).unwrap();
    let analysis = pipeline.analyze_bars("RELIANCE", Timeframe::D1, &bars).unwrap();

    assert_eq!(analysis.touches.len(), 1);
    let resolved = &analysis.touches[0];
    assert_eq!(resolved.touch.swing_low_index, 20);
    assert_eq!(resolved.touch.pattern.index, 35);
    assert!(resolved.touch.distance_pct < 0.0);
    assert!((resolved.touch.distance_pct + 0.05 / 1.05).abs() < 1e-9);
    assert_eq!(resolved.touch.stop_loss_price, 104.95);
    assert_eq!(resolved.outcome.resolution, Resolution::TargetHit);

    // Too deep: the breach exceeds the tolerance
    let deep = retest_bars(104.8);
    let analysis = pipeline.analyze_bars("RELIANCE", Timeframe::D1, &deep).unwrap();
    assert!(analysis.touches.is_empty());
}

#[test]
fn test_run_report_and_capital() {
    let mut source = MemoryBarSource::new();
    source.insert("RELIANCE", Timeframe::D1, swing_retest_bars());

    let pipeline = Pipeline::new(engulfing_only_config(&["RELIANCE"])).unwrap();
    let report = pipeline.run_at(run_time(), &source, None, None).unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.pairs[0].status, PairStatus::Analyzed);
    assert_eq!(report.pairs[0].touches, 1);
    assert_eq!(report.touches.len(), 1);

    let capital = &report.capital;
    assert_eq!(capital.trades.len(), 1);
    assert!((capital.total_pnl - 800.0).abs() < 1e-6);
    assert!((capital.final_capital - 100_800.0).abs() < 1e-6);
    assert_eq!(capital.wins, 1);
}

#[test]
fn test_same_timestamp_touches_compete_for_capital() {
    let mut source = MemoryBarSource::new();
    source.insert("AAA", Timeframe::D1, swing_retest_bars());
    source.insert("BBB", Timeframe::D1, swing_retest_bars());

    let mut config = engulfing_only_config(&["BBB", "AAA"]);
    config.capital.total_capital = 10_000.0;
    config.capital.capital_per_trade = 10_000.0;
    config.capital.settlement = SettlementTiming::AtExit;
    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run_at(run_time(), &source, None, None).unwrap();

    assert_eq!(report.touches.len(), 2);
    assert_eq!(report.touches[0].instrument, "AAA");

    let capital = &report.capital;
    assert_eq!(capital.trades.len(), 1);
    assert_eq!(capital.trades[0].instrument, "AAA");
    assert_eq!(capital.rejections.len(), 1);
    assert_eq!(capital.rejections[0].instrument, "BBB");
    assert_eq!(capital.rejections[0].reason.to_string(), "insufficient capital");

    let rows = report.rows();
    assert!(rows[0].admitted);
    assert_eq!(rows[1].rejection.as_deref(), Some("insufficient capital"));
}

#[test]
fn test_same_timestamp_winners_both_admitted_by_default() {
    let mut source = MemoryBarSource::new();
    source.insert("AAA", Timeframe::D1, swing_retest_bars());
    source.insert("BBB", Timeframe::D1, swing_retest_bars());

    let mut config = engulfing_only_config(&["BBB", "AAA"]);
    config.capital.total_capital = 10_000.0;
    config.capital.capital_per_trade = 10_000.0;
    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run_at(run_time(), &source, None, None).unwrap();

    // AAA settles at +8% before BBB is admitted
    let capital = &report.capital;
    assert_eq!(capital.trades.len(), 2);
    assert!(capital.rejections.is_empty());
    assert!((capital.final_capital - 11_600.0).abs() < 1e-6);
}

#[test]
fn test_run_is_idempotent() {
    let mut source = MemoryBarSource::new();
    source.insert("AAA", Timeframe::D1, swing_retest_bars());
    source.insert("BBB", Timeframe::D1, swing_retest_bars());
    let pipeline = Pipeline::new(engulfing_only_config(&["AAA", "BBB"])).unwrap();

    let first = pipeline.run_at(run_time(), &source, None, None).unwrap();
    let second = pipeline.run_at(run_time(), &source, None, None).unwrap();

    assert_eq!(first.touches, second.touches);
    assert_eq!(first.capital.trades, second.capital.trades);
    assert_eq!(first.capital.events, second.capital.events);
}

#[test]
fn test_live_touch_alerts() {
    // Cut the series right after the engulfing bar so it is the live bar
    let bars: Vec<Bar> = swing_retest_bars().into_iter().take(36).collect();
    let mut source = MemoryBarSource::new();
    source.insert("RELIANCE", Timeframe::D1, bars);

    let mut config = engulfing_only_config(&["RELIANCE"]);
    config.include_live = true;
    let pipeline = Pipeline::new(config).unwrap();

    let alerts = RecordingAlerts::default();
    let report = pipeline.run_at(run_time(), &source, Some(&alerts), None).unwrap();

    assert_eq!(report.alerts_sent, 1);
    let sent = alerts.sent.lock().unwrap();
    assert!(sent[0].starts_with("LIVE TOUCH: RELIANCE [1D]"));
    assert!(sent[0].contains("Bullish Engulfing"));
    assert_eq!(report.touches[0].outcome.resolution, Resolution::NoData);
}

#[test]
fn test_closed_bar_scan_skips_live_touch() {
    let bars: Vec<Bar> = swing_retest_bars().into_iter().take(36).collect();
    let pipeline = Pipeline::new(engulfing_only_config(&["RELIANCE"])).unwrap();
    let analysis = pipeline.analyze_bars("RELIANCE", Timeframe::D1, &bars).unwrap();
    assert!(analysis.touches.is_empty());
    assert_eq!(analysis.report.untouched_swing_lows, 1);
}

#[test]
fn test_alert_failure_is_not_fatal() {
    let bars: Vec<Bar> = swing_retest_bars().into_iter().take(36).collect();
    let mut source = MemoryBarSource::new();
    source.insert("RELIANCE", Timeframe::D1, bars);

    let mut config = engulfing_only_config(&["RELIANCE"]);
    config.include_live = true;
    let pipeline = Pipeline::new(config).unwrap();

    let alerts = RecordingAlerts {
        fail: true,
        ..Default::default()
    };
    let report = pipeline.run_at(run_time(), &source, Some(&alerts), None).unwrap();
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(report.touches.len(), 1);
}

#[test]
fn test_csv_export_and_metadata() {
    let mut source = MemoryBarSource::new();
    source.insert("RELIANCE", Timeframe::D1, swing_retest_bars());
    let config = engulfing_only_config(&["RELIANCE"]);
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let mut sink = CsvExportSink::new(Vec::new());
    let report = pipeline
        .run_at(run_time(), &source, None, Some(&mut sink))
        .unwrap();
    assert!(report.export_error.is_none());

    let written = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(written, to_csv_string(&report.rows()).unwrap());
    assert_eq!(written.lines().count(), 2);
    assert!(written.contains("RELIANCE,1D,bullish_engulfing"));

    let json: serde_json::Value =
        serde_json::from_str(&metadata_json(&report, &config).unwrap()).unwrap();
    assert_eq!(json["result_count"], 1);
    assert_eq!(json["status"], "success");
    assert_eq!(json["config"]["timeframes"][0], "1D");
}
