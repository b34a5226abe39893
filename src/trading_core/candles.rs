//! Labeled candle series
//!
//! The simulator consumes three aligned series per symbol: fine-grained bars
//! (5m), hourly bars and daily bars. Each bar carries an optional regime label.

use chrono::{DateTime, Datelike, Utc};

use super::regime::Regime;
use crate::error::{BacktestError, Result};
use crate::types::Candle;

/// Ascending-time candles with a parallel regime label column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    regimes: Vec<Option<Regime>>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>, regimes: Vec<Option<Regime>>) -> Result<Self> {
        if candles.len() != regimes.len() {
            return Err(BacktestError::config(format!(
                "regime column has {} labels for {} candles",
                regimes.len(),
                candles.len()
            )));
        }
        Ok(Self { candles, regimes })
    }

    /// Series without any regime labels
    pub fn unlabeled(candles: Vec<Candle>) -> Self {
        let regimes = vec![None; candles.len()];
        Self { candles, regimes }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn regimes(&self) -> &[Option<Regime>] {
        &self.regimes
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Candle, Option<Regime>)> {
        self.candles.iter().zip(self.regimes.iter().copied())
    }

    /// Check the series is non-empty, strictly ascending and OHLC-consistent
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.candles.is_empty() {
            return Err(BacktestError::config(format!("{name} candles are empty")));
        }
        self.validate_integrity(name)
    }

    /// Ordering and OHLC checks only; an empty series passes
    pub fn validate_integrity(&self, name: &str) -> Result<()> {
        for (i, c) in self.candles.iter().enumerate() {
            if !c.is_consistent() {
                return Err(BacktestError::integrity(format!(
                    "{name} candle {i} at {} violates OHLC bounds (o={} h={} l={} c={} v={})",
                    c.time, c.open, c.high, c.low, c.close, c.volume
                )));
            }
        }

        for (i, pair) in self.candles.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                return Err(BacktestError::integrity(format!(
                    "{name} candles not strictly ascending at row {}: {} then {}",
                    i + 1,
                    pair[0].time,
                    pair[1].time
                )));
            }
        }

        Ok(())
    }

    /// Bars with `start <= time < end`
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (candles, regimes) = self
            .iter()
            .filter(|(c, _)| c.time >= start && c.time < end)
            .map(|(c, r)| (*c, r))
            .unzip();
        Self { candles, regimes }
    }

    /// Distinct calendar years present, ascending
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.candles.iter().map(|c| c.time.year()).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// The three series the simulator needs for one symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleBundle {
    pub fine: CandleSeries,
    pub hourly: CandleSeries,
    pub daily: CandleSeries,
}

impl CandleBundle {
    pub fn validate(&self) -> Result<()> {
        self.fine.validate("fine")?;
        self.hourly.validate("hourly")?;
        self.daily.validate("daily")?;
        Ok(())
    }

    /// Ordering and OHLC checks on all three series, tolerating empty ones
    pub fn validate_integrity(&self) -> Result<()> {
        self.fine.validate_integrity("fine")?;
        self.hourly.validate_integrity("hourly")?;
        self.daily.validate_integrity("daily")?;
        Ok(())
    }

    /// Restrict all three series to `[start, end)`
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            fine: self.fine.window(start, end),
            hourly: self.hourly.window(start, end),
            daily: self.daily.window(start, end),
        }
    }

    /// True if any of the three series has no bars
    pub fn has_empty_series(&self) -> bool {
        self.fine.is_empty() || self.hourly.is_empty() || self.daily.is_empty()
    }
}
