//! Strategy parameters
//!
//! `RawParams` is what a grid or a persisted row holds before validation;
//! `StrategyParams` is the validated value the simulator runs with.

use serde::{Deserialize, Serialize};

use super::regime::RegimeFilter;
use crate::error::{BacktestError, Result};

/// Validated parameter set for one simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Stop distance from entry in price units
    pub stop_loss: f64,
    /// Target distance from entry in price units
    pub take_profit: f64,
    /// Confirmation window for a pending breakout and timeout for an open trade
    pub max_bars: usize,
    /// Rolling channel length in fine bars
    pub breakout_lookback: usize,
    /// Distance beyond the channel needed to flag a breakout
    pub entry_offset: f64,
    pub daily_regime: RegimeFilter,
    pub hourly_regime: RegimeFilter,
}

impl StrategyParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.stop_loss.is_finite() && self.stop_loss > 0.0) {
            return Err(BacktestError::config(format!(
                "stop_loss must be positive, got {}",
                self.stop_loss
            )));
        }
        if !(self.take_profit.is_finite() && self.take_profit > 0.0) {
            return Err(BacktestError::config(format!(
                "take_profit must be positive, got {}",
                self.take_profit
            )));
        }
        if self.max_bars == 0 {
            return Err(BacktestError::config("max_bars must be at least 1"));
        }
        if self.breakout_lookback == 0 {
            return Err(BacktestError::config("breakout_lookback must be at least 1"));
        }
        if !(self.entry_offset.is_finite() && self.entry_offset >= 0.0) {
            return Err(BacktestError::config(format!(
                "entry_offset must be non-negative, got {}",
                self.entry_offset
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sl={} tp={} bars={} lookback={} offset={} daily={} hourly={}",
            self.stop_loss,
            self.take_profit,
            self.max_bars,
            self.breakout_lookback,
            self.entry_offset,
            self.daily_regime,
            self.hourly_regime
        )
    }
}

/// Unvalidated parameter values as they appear in a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawParams {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_bars: i64,
    pub breakout_lookback: i64,
    pub entry_offset: f64,
    pub daily_regime: String,
    pub hourly_regime: String,
}

impl TryFrom<RawParams> for StrategyParams {
    type Error = BacktestError;

    fn try_from(raw: RawParams) -> Result<Self> {
        let max_bars = usize::try_from(raw.max_bars)
            .map_err(|_| BacktestError::config(format!("max_bars must be positive, got {}", raw.max_bars)))?;
        let breakout_lookback = usize::try_from(raw.breakout_lookback).map_err(|_| {
            BacktestError::config(format!(
                "breakout_lookback must be positive, got {}",
                raw.breakout_lookback
            ))
        })?;

        let params = StrategyParams {
            stop_loss: raw.stop_loss,
            take_profit: raw.take_profit,
            max_bars,
            breakout_lookback,
            entry_offset: raw.entry_offset,
            daily_regime: raw.daily_regime.parse()?,
            hourly_regime: raw.hourly_regime.parse()?,
        };
        params.validate()?;
        Ok(params)
    }
}
