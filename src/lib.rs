//! # swingtouch
//!
//! Swing-low touch detection, trade outcome simulation and capital-constrained replay.
//!
//! The pipeline runs leaf-first over one bar sequence per instrument and timeframe:
//!
//! 1. [`swing::detect`] finds asymmetric local minima and records invalidation.
//! 2. [`PatternScanner`] runs the bullish candlestick detectors.
//! 3. [`touch::TouchValidator`] pairs candidates with still-valid, untouched swing lows.
//! 4. [`outcome::OutcomeSimulator`] walks forward from every entry.
//! 5. [`capital::CapitalManager`] replays all touches against one shared capital pool.
//!
//! [`pipeline::Pipeline`] wires the stages together across instruments.
//!
//! ## Quick Start
//!
//! ```rust
//! use swingtouch::prelude::*;
//!
//! let scanner = ScannerBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! let bars: Vec<Bar> = vec![];
//! let candidates = scanner.scan(&bars, false).unwrap();
//! assert!(candidates.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod capital;
pub mod config;
pub mod detectors;
pub mod export;
pub mod outcome;
pub mod pipeline;
pub mod swing;
pub mod timeframe;
pub mod touch;

pub use timeframe::Timeframe;

pub mod prelude {
    pub use crate::{
        // Stages
        capital::{CapitalConfig, CapitalManager, CapitalReport, Rejection, SettlementTiming},
        config::PipelineConfig,
        // Detectors
        detectors::*,
        outcome::{ExitLeg, ExitMode, OutcomeConfig, OutcomeSimulator, Resolution, ResolvedTouch, TradeOutcome},
        pipeline::{AlertSink, BarSource, ExportSink, Pipeline, RunReport},
        swing::{SwingLow, SwingLowArena, SwingLowConfig, SwingLowId},
        touch::{Touch, TouchConfig, TouchValidator},
        // Types
        AnchorBar,
        Bar,
        BuiltinDetector,
        OHLCVExt,
        PatternCandidate,
        PatternDetector,
        PatternScanner,
        PatternType,
        Period,
        // Errors
        PipelineError,
        Ratio,
        Result,
        ScannerBuilder,
        Timeframe,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the analysis pipeline.
///
/// Capital admission refusals are not errors; see [`capital::Rejection`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient history: need {need} bars, got {got}")]
    InsufficientHistory { need: usize, got: usize },

    #[error("No bars available for {instrument} {timeframe}")]
    DataUnavailable {
        instrument: String,
        timeframe: Timeframe,
    },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl PipelineError {
    /// True for the errors that must stop a run before any scan starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidValue(_)
                | PipelineError::OutOfRange { .. }
                | PipelineError::InvalidConfig(_)
                | PipelineError::ConfigParse(_)
        )
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PipelineError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PipelineError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PipelineError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core bar data trait
pub trait OHLCV {
    fn timestamp(&self) -> NaiveDateTime;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn volume(&self) -> f64 {
        0.0
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.body_top()
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.body_bottom() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }

    /// Validate OHLC consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PipelineError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PipelineError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(PipelineError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate every bar and require strictly increasing timestamps.
pub fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PipelineError::InvalidBar { reason, .. } => PipelineError::InvalidBar { index: i, reason },
            other => other,
        })?;
        if i > 0 && bar.timestamp() <= bars[i - 1].timestamp() {
            return Err(PipelineError::InvalidBar {
                index: i,
                reason: "timestamps not strictly increasing",
            });
        }
    }
    Ok(())
}

/// Timestamped OHLCV bar as supplied by a bar source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// PATTERN CANDIDATE - result of detection (Copy, no allocations)
// ============================================================

/// The ten bullish candlestick shapes the scanner knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    PinBar,
    BullishEngulfing,
    ThreeCandle,
    DragonflyDoji,
    ThreeWhiteSoldiers,
    BullishMarubozu,
    BullishHarami,
    BullishAbandonedBaby,
    TweezerBottom,
    BullishKicker,
}

impl PatternType {
    pub const ALL: [PatternType; 10] = [
        PatternType::PinBar,
        PatternType::BullishEngulfing,
        PatternType::ThreeCandle,
        PatternType::DragonflyDoji,
        PatternType::ThreeWhiteSoldiers,
        PatternType::BullishMarubozu,
        PatternType::BullishHarami,
        PatternType::BullishAbandonedBaby,
        PatternType::TweezerBottom,
        PatternType::BullishKicker,
    ];

    /// Machine identifier, e.g. `"bullish_engulfing"`.
    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::PinBar => "pin_bar",
            PatternType::BullishEngulfing => "bullish_engulfing",
            PatternType::ThreeCandle => "three_candle",
            PatternType::DragonflyDoji => "dragonfly_doji",
            PatternType::ThreeWhiteSoldiers => "three_white_soldiers",
            PatternType::BullishMarubozu => "bullish_marubozu",
            PatternType::BullishHarami => "bullish_harami",
            PatternType::BullishAbandonedBaby => "bullish_abandoned_baby",
            PatternType::TweezerBottom => "tweezer_bottom",
            PatternType::BullishKicker => "bullish_kicker",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PatternType::PinBar => "Pin Bar",
            PatternType::BullishEngulfing => "Bullish Engulfing",
            PatternType::ThreeCandle => "Three Candle",
            PatternType::DragonflyDoji => "Dragonfly Doji",
            PatternType::ThreeWhiteSoldiers => "Three White Soldiers",
            PatternType::BullishMarubozu => "Bullish Marubozu",
            PatternType::BullishHarami => "Bullish Harami",
            PatternType::BullishAbandonedBaby => "Bullish Abandoned Baby",
            PatternType::TweezerBottom => "Tweezer Bottom",
            PatternType::BullishKicker => "Bullish Kicker",
        }
    }

    /// Fixed empirical score, used for reporting and filtering only.
    pub fn strength(self) -> u8 {
        match self {
            PatternType::PinBar => 68,
            PatternType::BullishEngulfing => 75,
            PatternType::ThreeCandle => 78,
            PatternType::DragonflyDoji => 60,
            PatternType::ThreeWhiteSoldiers => 82,
            PatternType::BullishMarubozu => 65,
            PatternType::BullishHarami => 54,
            PatternType::BullishAbandonedBaby => 85,
            PatternType::TweezerBottom => 58,
            PatternType::BullishKicker => 80,
        }
    }

    /// Number of consecutive bars the shape is built from.
    pub fn anchor_count(self) -> usize {
        match self {
            PatternType::PinBar | PatternType::DragonflyDoji | PatternType::BullishMarubozu => 1,
            PatternType::BullishEngulfing
            | PatternType::BullishHarami
            | PatternType::TweezerBottom
            | PatternType::BullishKicker => 2,
            PatternType::ThreeCandle
            | PatternType::ThreeWhiteSoldiers
            | PatternType::BullishAbandonedBaby => 3,
        }
    }

    #[inline]
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        PatternType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown pattern type '{s}'")))
    }
}

/// OHLC snapshot of one bar a pattern was built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnchorBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl AnchorBar {
    pub fn from_bar<T: OHLCV>(bar: &T) -> Self {
        Self {
            timestamp: bar.timestamp(),
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
        }
    }
}

/// A detected candlestick signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternCandidate {
    /// Index of the last anchor bar in the scanned sequence
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub pattern_type: PatternType,
    pub is_bullish: bool,
    /// Formed on the most recent bar of a live scan
    pub is_live: bool,
    pub strength: u8,
    anchors: [AnchorBar; 3],
    anchor_len: u8,
}

impl PatternCandidate {
    /// Snapshot the anchor window ending at `index`.
    pub fn from_window<T: OHLCV>(pattern_type: PatternType, bars: &[T], index: usize) -> Option<Self> {
        let count = pattern_type.anchor_count();
        if index + 1 < count || index >= bars.len() {
            return None;
        }
        let start = index + 1 - count;
        let mut anchors = [AnchorBar::default(); 3];
        for (slot, bar) in anchors.iter_mut().zip(&bars[start..=index]) {
            *slot = AnchorBar::from_bar(bar);
        }

        Some(Self {
            index,
            timestamp: bars[index].timestamp(),
            pattern_type,
            is_bullish: true,
            is_live: false,
            strength: pattern_type.strength(),
            anchors,
            anchor_len: count as u8,
        })
    }

    #[inline]
    pub fn anchors(&self) -> &[AnchorBar] {
        &self.anchors[..self.anchor_len as usize]
    }

    #[inline]
    pub fn first_anchor(&self) -> &AnchorBar {
        &self.anchors[0]
    }

    #[inline]
    pub fn last_anchor(&self) -> &AnchorBar {
        &self.anchors[self.anchor_len as usize - 1]
    }

    /// Lowest low across the anchor bars.
    pub fn pattern_low(&self) -> f64 {
        self.anchors()
            .iter()
            .map(|a| a.low)
            .fold(f64::INFINITY, f64::min)
    }

    /// Entry is always the close of the last anchor bar.
    #[inline]
    pub fn entry_price(&self) -> f64 {
        self.last_anchor().close
    }

    pub fn stop_price(&self) -> f64 {
        match self.pattern_type {
            PatternType::PinBar | PatternType::DragonflyDoji => self.last_anchor().low,
            PatternType::BullishMarubozu => self.last_anchor().open,
            _ => self.pattern_low(),
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// A stateless rule over a small fixed window of bars ending at `index`.
pub trait PatternDetector: Send + Sync {
    fn pattern_type(&self) -> PatternType;

    fn min_bars(&self) -> usize {
        self.pattern_type().anchor_count()
    }

    /// Geometric predicate for the window ending at `index`.
    fn matches<T: OHLCV>(&self, bars: &[T], index: usize) -> bool;

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize) -> Option<PatternCandidate> {
        if index + 1 < self.min_bars() || !self.matches(bars, index) {
            return None;
        }
        PatternCandidate::from_window(self.pattern_type(), bars, index)
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate.
/// Variant names must match the [`PatternType`] variants.
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch, no vtable
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            /// Detector for `pattern_type` with default thresholds
            pub fn with_defaults(pattern_type: PatternType) -> Self {
                match pattern_type {
                    $(PatternType::$variant => Self::$variant(<$detector>::default())),*
                }
            }

            #[inline]
            pub fn detect<T: OHLCV>(&self, bars: &[T], index: usize) -> Option<PatternCandidate> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, index)),*
                }
            }

            #[inline]
            pub fn pattern_type(&self) -> PatternType {
                match self {
                    $(Self::$variant(d) => PatternDetector::pattern_type(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar
    PinBar(PinBarDetector),
    DragonflyDoji(DragonflyDojiDetector),
    BullishMarubozu(BullishMarubozuDetector),

    // Two bar
    BullishEngulfing(BullishEngulfingDetector),
    BullishHarami(BullishHaramiDetector),
    TweezerBottom(TweezerBottomDetector),
    BullishKicker(BullishKickerDetector),

    // Three bar
    ThreeCandle(ThreeCandleDetector),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    BullishAbandonedBaby(BullishAbandonedBabyDetector),
}

// ============================================================
// PATTERN SCANNER
// ============================================================

/// Scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    pub min_strength: Option<u8>,
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternType>>,
}

/// Runs a set of detectors over a bar sequence.
///
/// Detectors share no state, so the set and its order never change what
/// any single detector reports.
#[derive(Debug, Clone)]
pub struct PatternScanner {
    detectors: Vec<BuiltinDetector>,
    config: ScannerConfig,
}

impl PatternScanner {
    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.detectors
    }

    /// Detect patterns whose last anchor bar is `index`.
    pub fn scan_at<T: OHLCV>(&self, bars: &[T], index: usize) -> Vec<PatternCandidate> {
        let mut results = Vec::new();

        for detector in &self.detectors {
            if index + 1 >= detector.min_bars() {
                if let Some(c) = detector.detect(bars, index) {
                    if self.should_include(&c) {
                        results.push(c);
                    }
                }
            }
        }

        results
    }

    /// Scan left to right and return a flat, chronological list.
    ///
    /// With `include_live == false` the last bar (possibly still forming) is
    /// never an anchor. With `include_live == true`, candidates ending on it
    /// are flagged `is_live`.
    pub fn scan<T: OHLCV>(&self, bars: &[T], include_live: bool) -> Result<Vec<PatternCandidate>> {
        if self.config.validate_data {
            validate_bars(bars)?;
        }

        let Some(last) = bars.len().checked_sub(1) else {
            return Ok(Vec::new());
        };
        let end = if include_live { bars.len() } else { last };

        let mut results = Vec::new();
        for i in 0..end {
            for mut candidate in self.scan_at(bars, i) {
                candidate.is_live = include_live && i == last;
                results.push(candidate);
            }
        }
        Ok(results)
    }

    /// Scan and group candidates by pattern type.
    pub fn scan_by_type<T: OHLCV>(
        &self,
        bars: &[T],
        include_live: bool,
    ) -> Result<BTreeMap<PatternType, Vec<PatternCandidate>>> {
        let mut grouped: BTreeMap<PatternType, Vec<PatternCandidate>> = BTreeMap::new();
        for candidate in self.scan(bars, include_live)? {
            grouped.entry(candidate.pattern_type).or_default().push(candidate);
        }
        Ok(grouped)
    }

    fn should_include(&self, c: &PatternCandidate) -> bool {
        if let Some(min) = self.config.min_strength {
            if c.strength < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&c.pattern_type) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        for d in &self.detectors {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternScanner instances
#[derive(Debug, Clone, Default)]
pub struct ScannerBuilder {
    detectors: Vec<BuiltinDetector>,
    config: ScannerConfig,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled detectors with the configured thresholds.
    pub fn from_config(config: &PatternConfig) -> Self {
        let mut builder = Self::new();
        for pattern_type in PatternType::ALL {
            if config.enabled.contains(&pattern_type) {
                builder = builder.add(config.detector(pattern_type));
            }
        }
        builder.config.min_strength = config.min_strength;
        builder
    }

    /// Add all ten detectors with default thresholds
    pub fn with_all_defaults(mut self) -> Self {
        self.detectors
            .extend(PatternType::ALL.into_iter().map(BuiltinDetector::with_defaults));
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.detectors.push(detector);
        Ok(self)
    }

    /// Set minimum strength filter
    pub fn min_strength(mut self, strength: u8) -> Self {
        self.config.min_strength = Some(strength);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, types: impl IntoIterator<Item = PatternType>) -> Self {
        self.config.pattern_filter = Some(types.into_iter().collect());
        self
    }

    /// Build the scanner
    pub fn build(self) -> Result<PatternScanner> {
        let scanner = PatternScanner {
            detectors: self.detectors,
            config: self.config,
        };
        scanner.validate()?;
        Ok(scanner)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    fn bar(day: u32, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(ts(day), o, h, l, c)
    }

    /// Bearish bar followed by a bullish engulfing bar
    fn engulfing_pair() -> Vec<Bar> {
        vec![
            bar(1, 100.0, 100.5, 99.5, 100.2),
            bar(2, 100.0, 100.4, 95.0, 96.0),
            bar(3, 95.5, 101.0, 94.0, 100.5),
        ]
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let b = bar(1, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(b.body(), 5.0);
        assert_eq!(b.range(), 20.0);
        assert_eq!(b.upper_shadow(), 5.0);
        assert_eq!(b.lower_shadow(), 10.0);
        assert!(b.is_bullish());
        assert!(!b.is_bearish());
        assert!((b.body_ratio().unwrap() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_flat_bar_has_no_ratios() {
        let b = bar(1, 100.0, 100.0, 100.0, 100.0);
        assert!(b.body_ratio().is_none());
        assert!(b.lower_shadow_ratio().is_none());
    }

    #[test]
    fn test_validate_bars() {
        let mut bars = engulfing_pair();
        assert!(validate_bars(&bars).is_ok());

        bars[1].high = 90.0;
        match validate_bars(&bars) {
            Err(PipelineError::InvalidBar { index, reason }) => {
                assert_eq!(index, 1);
                assert_eq!(reason, "high < low");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut bars = engulfing_pair();
        bars[2].timestamp = bars[1].timestamp;
        assert!(matches!(
            validate_bars(&bars),
            Err(PipelineError::InvalidBar { index: 2, .. })
        ));
    }

    #[test]
    fn test_pattern_type_roundtrip() {
        for p in PatternType::ALL {
            assert_eq!(p.as_str().parse::<PatternType>().unwrap(), p);
        }
        assert!("hammer".parse::<PatternType>().is_err());
        assert_eq!(PatternType::ThreeWhiteSoldiers.strength(), 82);
        assert_eq!(PatternType::BullishHarami.strength(), 54);
    }

    #[test]
    fn test_candidate_window_and_prices() {
        let bars = engulfing_pair();
        let c = PatternCandidate::from_window(PatternType::BullishEngulfing, &bars, 2).unwrap();
        assert_eq!(c.anchors().len(), 2);
        assert_eq!(c.timestamp, ts(3));
        assert_eq!(c.pattern_low(), 94.0);
        assert_eq!(c.entry_price(), 100.5);
        assert_eq!(c.stop_price(), 94.0);

        assert!(PatternCandidate::from_window(PatternType::ThreeCandle, &bars, 1).is_none());
        assert!(PatternCandidate::from_window(PatternType::PinBar, &bars, 3).is_none());
    }

    #[test]
    fn test_single_bar_stop_extraction() {
        let bars = vec![bar(1, 100.0, 105.0, 99.0, 104.8)];
        let marubozu = PatternCandidate::from_window(PatternType::BullishMarubozu, &bars, 0).unwrap();
        assert_eq!(marubozu.stop_price(), 100.0);
        assert_eq!(marubozu.entry_price(), 104.8);

        let pin = PatternCandidate::from_window(PatternType::PinBar, &bars, 0).unwrap();
        assert_eq!(pin.stop_price(), 99.0);
    }

    #[test]
    fn test_scanner_builder() {
        let scanner = ScannerBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(scanner.detectors().len(), 10);
    }

    #[test]
    fn test_empty_scan() {
        let scanner = ScannerBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Bar> = vec![];
        assert!(scanner.scan(&bars, true).unwrap().is_empty());
    }

    #[test]
    fn test_live_bar_excluded_unless_requested() {
        let scanner = ScannerBuilder::new()
            .add(BuiltinDetector::with_defaults(PatternType::BullishEngulfing))
            .build()
            .unwrap();
        let bars = engulfing_pair();

        assert!(scanner.scan(&bars, false).unwrap().is_empty());

        let live = scanner.scan(&bars, true).unwrap();
        assert_eq!(live.len(), 1);
        assert!(live[0].is_live);
        assert_eq!(live[0].index, 2);
    }

    #[test]
    fn test_min_strength_filter() {
        let scanner = ScannerBuilder::new()
            .add(BuiltinDetector::with_defaults(PatternType::BullishEngulfing))
            .min_strength(90)
            .build()
            .unwrap();
        assert!(scanner.scan(&engulfing_pair(), true).unwrap().is_empty());
    }

    #[test]
    fn test_pattern_filter() {
        let scanner = ScannerBuilder::new()
            .with_all_defaults()
            .only_patterns([PatternType::PinBar])
            .build()
            .unwrap();
        let found = scanner.scan(&engulfing_pair(), true).unwrap();
        assert!(found.iter().all(|c| c.pattern_type == PatternType::PinBar));
    }

    #[test]
    fn test_scan_by_type_groups() {
        let scanner = ScannerBuilder::new().with_all_defaults().build().unwrap();
        let grouped = scanner.scan_by_type(&engulfing_pair(), true).unwrap();
        let engulfing = grouped.get(&PatternType::BullishEngulfing).unwrap();
        assert_eq!(engulfing.len(), 1);
        for (pattern_type, list) in &grouped {
            assert!(list.iter().all(|c| c.pattern_type == *pattern_type));
        }
    }

    #[test]
    fn test_validate_data_rejects_bad_bars() {
        let scanner = ScannerBuilder::new()
            .with_all_defaults()
            .validate_data(true)
            .build()
            .unwrap();
        let mut bars = engulfing_pair();
        bars[0].close = f64::NAN;
        assert!(scanner.scan(&bars, false).is_err());
    }

    #[test]
    fn test_add_checked_rejects_bad_threshold() {
        let detector = BuiltinDetector::PinBar(PinBarDetector {
            min_wick_ratio: -1.0,
            ..Default::default()
        });
        assert!(ScannerBuilder::new().add_checked(detector).is_err());
    }
}
