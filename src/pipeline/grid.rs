//! Parameter grid
//!
//! A grid is one candidate list per strategy parameter. Combinations are
//! enumerated in Cartesian-product order with the last dimension varying
//! fastest, so index `i` always names the same combination for a given grid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use edge_backtest::trading_core::RawParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamGrid {
    pub stop_loss: Vec<f64>,
    pub take_profit: Vec<f64>,
    pub max_bars: Vec<i64>,
    pub breakout_lookback: Vec<i64>,
    pub entry_offset: Vec<f64>,
    #[serde(default = "any_regime")]
    pub daily_regime: Vec<String>,
    #[serde(default = "any_regime")]
    pub hourly_regime: Vec<String>,
}

fn any_regime() -> Vec<String> {
    vec!["any".to_string()]
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            stop_loss: vec![5.0, 10.0, 15.0],
            take_profit: vec![5.0, 10.0, 20.0],
            max_bars: vec![3, 6, 9],
            breakout_lookback: vec![8, 12, 20],
            entry_offset: vec![0.0, 0.5, 1.0],
            daily_regime: any_regime(),
            hourly_regime: any_regime(),
        }
    }
}

impl ParamGrid {
    /// Load a grid from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read grid file: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse grid file: {:?}", path))
    }

    /// Dimension sizes in enumeration order
    fn radices(&self) -> [usize; 7] {
        [
            self.stop_loss.len(),
            self.take_profit.len(),
            self.max_bars.len(),
            self.breakout_lookback.len(),
            self.entry_offset.len(),
            self.daily_regime.len(),
            self.hourly_regime.len(),
        ]
    }

    /// Number of combinations; zero if any dimension is empty
    pub fn len(&self) -> usize {
        self.radices().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The combination at product index `index`
    pub fn combination(&self, index: usize) -> Option<RawParams> {
        if index >= self.len() {
            return None;
        }

        let radices = self.radices();
        let mut digits = [0usize; 7];
        let mut rest = index;
        for (digit, radix) in digits.iter_mut().zip(radices.iter()).rev() {
            *digit = rest % radix;
            rest /= radix;
        }

        Some(RawParams {
            stop_loss: self.stop_loss[digits[0]],
            take_profit: self.take_profit[digits[1]],
            max_bars: self.max_bars[digits[2]],
            breakout_lookback: self.breakout_lookback[digits[3]],
            entry_offset: self.entry_offset[digits[4]],
            daily_regime: self.daily_regime[digits[5]].clone(),
            hourly_regime: self.hourly_regime[digits[6]].clone(),
        })
    }

    /// Indices assigned to `worker_id` out of `n_workers`
    pub fn partition(&self, worker_id: usize, n_workers: usize) -> impl Iterator<Item = usize> {
        (0..self.len()).filter(move |i| n_workers > 0 && i % n_workers == worker_id)
    }
}
