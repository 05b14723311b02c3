use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown timeframe: {0}")]
pub struct ParseTimeframeError(pub String);

/// Bar timeframe. Serialized upper-case (`"M1"`, `"H4"`), parsed
/// case-insensitively and also from the `1m`/`4h` style.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
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

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    /// Bar duration in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tf = match s.trim().to_ascii_lowercase().as_str() {
            "m1" | "1m" => Timeframe::M1,
            "m5" | "5m" => Timeframe::M5,
            "m15" | "15m" => Timeframe::M15,
            "m30" | "30m" => Timeframe::M30,
            "h1" | "1h" => Timeframe::H1,
            "h4" | "4h" => Timeframe::H4,
            "d1" | "1d" => Timeframe::D1,
            _ => return Err(ParseTimeframeError(s.to_string())),
        };
        Ok(tf)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseTimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_both_styles() {
        assert_eq!("M1".parse::<Timeframe>().unwrap(), Timeframe::M1);
        assert_eq!("m15".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!(" D1 ".parse::<Timeframe>().unwrap(), Timeframe::D1);
    }

    #[test]
    fn parse_unknown_fails() {
        let err = "M2".parse::<Timeframe>().unwrap_err();
        assert_eq!(err, ParseTimeframeError("M2".to_string()));
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Timeframe::H1).unwrap(), "\"H1\"");
        let tf: Timeframe = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(tf, Timeframe::M5);
        assert!(serde_json::from_str::<Timeframe>("\"W1\"").is_err());
    }

    #[test]
    fn display_matches_as_str() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string(), tf.as_str());
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }
}
