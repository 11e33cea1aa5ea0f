//! Run configuration, loaded from TOML.
//!
//! ```toml
//! instruments = ["RELIANCE", "TCS"]
//! timeframes = ["4H", "1D"]
//!
//! [swing]
//! left_lookback = 10
//! right_lookback = 3
//!
//! [patterns]
//! enabled = ["pin_bar", "bullish_engulfing", "three_candle"]
//!
//! [outcome]
//! max_bars_to_analyze = 200
//! mode = { kind = "trailing_stop" }
//!
//! [capital]
//! capital_per_trade = 10000.0
//! ```

use serde::{Deserialize, Serialize};

use crate::capital::CapitalConfig;
use crate::detectors::PatternConfig;
use crate::outcome::OutcomeConfig;
use crate::swing::SwingLowConfig;
use crate::touch::TouchConfig;
use crate::{PipelineError, Result, Timeframe};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub instruments: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    /// Scan the most recent (possibly forming) bar and alert on it
    pub include_live: bool,
    pub swing: SwingLowConfig,
    pub patterns: PatternConfig,
    pub touch: TouchConfig,
    pub outcome: OutcomeConfig,
    pub capital: CapitalConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instruments: ["RELIANCE", "TCS", "HDFCBANK", "INFY", "ICICIBANK"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeframes: vec![Timeframe::H4],
            include_live: true,
            swing: SwingLowConfig::default(),
            patterns: PatternConfig::default(),
            touch: TouchConfig::default(),
            outcome: OutcomeConfig::default(),
            capital: CapitalConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PipelineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| PipelineError::ConfigParse(e.to_string()))
    }

    /// Fail fast on anything a run could trip over later.
    pub fn validate(&self) -> Result<()> {
        if self.timeframes.is_empty() {
            return Err(PipelineError::InvalidConfig("no timeframes configured".into()));
        }
        if self.instruments.iter().any(|i| i.trim().is_empty()) {
            return Err(PipelineError::InvalidConfig("empty instrument name".into()));
        }
        self.swing.validate()?;
        self.patterns.validate()?;
        self.touch.validate()?;
        self.outcome.validate()?;
        self.capital.validate()?;
        Ok(())
    }

    /// Every (instrument, timeframe) pair, instrument-major.
    pub fn pairs(&self) -> Vec<(String, Timeframe)> {
        self.instruments
            .iter()
            .flat_map(|i| self.timeframes.iter().map(move |tf| (i.clone(), *tf)))
            .collect()
    }
}

/// Parse a comma-separated watchlist: trimmed, upper-cased, empties dropped.
pub fn parse_instrument_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}
