//! Bar interval labels and their default profit targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

/// Supported bar intervals, shortest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1H")]
    H1,
    #[serde(rename = "4H")]
    H4,
    #[serde(rename = "1D")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }

    /// Default profit target in percent. Longer bars carry wider targets.
    pub fn default_target_pct(self) -> f64 {
        match self {
            Timeframe::M1 => 0.5,
            Timeframe::M5 => 1.0,
            Timeframe::M15 => 1.5,
            Timeframe::M30 => 2.0,
            Timeframe::H1 => 3.0,
            Timeframe::H4 => 5.0,
            Timeframe::D1 => 8.0,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown timeframe '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!("4H".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert!("1h".parse::<Timeframe>().is_err());
        assert!("2H".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_targets_grow_with_interval() {
        let targets: Vec<f64> = Timeframe::ALL.iter().map(|tf| tf.default_target_pct()).collect();
        assert!(targets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Timeframe::M15.default_target_pct(), 1.5);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&Timeframe::H1).unwrap();
        assert_eq!(json, "\"1H\"");
        let back: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(back, Timeframe::M30);
        assert!(serde_json::from_str::<Timeframe>("\"2D\"").is_err());
    }
}
