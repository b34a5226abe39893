//! Regime labels and filters
//!
//! A regime is the trend character of a daily or hourly window. Labels come
//! from an external labeler; strategy parameters filter on them with either a
//! concrete regime or the `Any` wildcard.

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::types::Candle;

/// Closed set of regime labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Regime {
    TrendUp,
    TrendDown,
    Balance,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::TrendUp => "trend_up",
            Regime::TrendDown => "trend_down",
            Regime::Balance => "balance",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Regime {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "trend_up" | "TrendUp" | "TREND_UP" => Ok(Regime::TrendUp),
            "trend_down" | "TrendDown" | "TREND_DOWN" => Ok(Regime::TrendDown),
            "balance" | "Balance" | "Balanced" | "BALANCE" => Ok(Regime::Balance),
            other => Err(BacktestError::config(format!("unknown regime label '{other}'"))),
        }
    }
}

impl TryFrom<String> for Regime {
    type Error = BacktestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Regime> for String {
    fn from(value: Regime) -> Self {
        value.as_str().to_string()
    }
}

/// Regime filter carried by strategy parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegimeFilter {
    #[default]
    Any,
    Only(Regime),
}

impl RegimeFilter {
    /// Whether a bar with the given (possibly missing) label passes.
    /// Unlabelled bars only pass the wildcard.
    pub fn matches(&self, label: Option<Regime>) -> bool {
        match self {
            RegimeFilter::Any => true,
            RegimeFilter::Only(wanted) => label == Some(*wanted),
        }
    }
}

impl std::fmt::Display for RegimeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegimeFilter::Any => f.write_str("any"),
            RegimeFilter::Only(r) => f.write_str(r.as_str()),
        }
    }
}

impl std::str::FromStr for RegimeFilter {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || ["any", "all", "none"].contains(&trimmed.to_lowercase().as_str()) {
            return Ok(RegimeFilter::Any);
        }
        trimmed.parse().map(RegimeFilter::Only)
    }
}

impl TryFrom<String> for RegimeFilter {
    type Error = BacktestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RegimeFilter> for String {
    fn from(value: RegimeFilter) -> Self {
        value.to_string()
    }
}

/// Assigns regime labels to a candle series
pub trait RegimeLabeler {
    fn label(&self, candles: &[Candle]) -> Vec<Option<Regime>>;
}

/// Labels each bar by its own body: up close, down close or flat
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleDirectionLabeler;

impl RegimeLabeler for CandleDirectionLabeler {
    fn label(&self, candles: &[Candle]) -> Vec<Option<Regime>> {
        candles
            .iter()
            .map(|c| {
                let regime = if c.close > c.open {
                    Regime::TrendUp
                } else if c.close < c.open {
                    Regime::TrendDown
                } else {
                    Regime::Balance
                };
                Some(regime)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_filter_parsing() {
        assert_eq!("any".parse::<RegimeFilter>().unwrap(), RegimeFilter::Any);
        assert_eq!("ALL".parse::<RegimeFilter>().unwrap(), RegimeFilter::Any);
        assert_eq!("".parse::<RegimeFilter>().unwrap(), RegimeFilter::Any);
        assert_eq!(
            "TrendUp".parse::<RegimeFilter>().unwrap(),
            RegimeFilter::Only(Regime::TrendUp)
        );
        assert_eq!(
            "balance".parse::<RegimeFilter>().unwrap(),
            RegimeFilter::Only(Regime::Balance)
        );
        assert!("sideways".parse::<RegimeFilter>().is_err());
    }

    #[test]
    fn test_filter_matching() {
        let up = RegimeFilter::Only(Regime::TrendUp);
        assert!(up.matches(Some(Regime::TrendUp)));
        assert!(!up.matches(Some(Regime::TrendDown)));
        assert!(!up.matches(None));
        assert!(RegimeFilter::Any.matches(None));
    }

    #[test]
    fn test_filter_string_round_trip() {
        let f = RegimeFilter::Only(Regime::TrendDown);
        let s: String = f.into();
        assert_eq!(s, "trend_down");
        assert_eq!(RegimeFilter::try_from(s).unwrap(), f);
    }

    #[test]
    fn test_candle_direction_labeler() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let c = |open: f64, close: f64| Candle {
            time: t,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 0.0,
        };
        let labels = CandleDirectionLabeler.label(&[c(1.0, 2.0), c(2.0, 1.0), c(1.0, 1.0)]);
        assert_eq!(
            labels,
            vec![Some(Regime::TrendUp), Some(Regime::TrendDown), Some(Regime::Balance)]
        );
    }
}
