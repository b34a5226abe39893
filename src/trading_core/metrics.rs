//! Metrics Aggregator
//!
//! Reduces a trade list to a scalar performance summary. Degenerate inputs
//! (no trades, no losses, zero variance) map to fixed sentinel values rather
//! than errors.

use serde::{Deserialize, Serialize};

use crate::types::Trade;

/// Performance summary of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub trades: usize,
    /// Fraction of trades with positive P&L (0.0 - 1.0)
    pub winrate: f64,
    /// Mean P&L per trade
    pub expectancy: f64,
    #[serde(rename = "avg_MAE")]
    pub avg_mae: f64,
    #[serde(rename = "avg_MFE")]
    pub avg_mfe: f64,
    /// Deepest peak-to-trough fall of cumulative P&L, as a positive number
    pub max_drawdown: f64,
    /// Gross profit / gross loss; infinite when there are wins and no losses
    pub profit_factor: f64,
    /// mean / sample stddev * sqrt(n)
    pub sharpe: f64,
}

impl Metrics {
    /// Aggregate a trade list
    pub fn from_trades(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let n = trades.len() as f64;
        let pnls: Vec<f64> = trades.iter().map(Trade::pnl).collect();

        let wins = pnls.iter().filter(|p| **p > 0.0).count();
        let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).sum();

        Self {
            trades: trades.len(),
            winrate: wins as f64 / n,
            expectancy: pnls.iter().sum::<f64>() / n,
            avg_mae: trades.iter().map(|t| t.mae).sum::<f64>() / n,
            avg_mfe: trades.iter().map(|t| t.mfe).sum::<f64>() / n,
            max_drawdown: max_drawdown(&pnls),
            profit_factor: profit_factor(gross_profit, gross_loss),
            sharpe: sharpe(&pnls),
        }
    }
}

fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss < 0.0 {
        gross_profit / gross_loss.abs()
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Largest drop of the cumulative P&L curve below its running peak.
/// The peak starts at the first trade's equity, not at zero.
fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0f64;
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0f64;
    for pnl in pnls {
        equity += pnl;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

fn sharpe(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let n = pnls.len() as f64;
    let mean = pnls.iter().sum::<f64>() / n;
    let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        mean / std_dev * n.sqrt()
    } else {
        0.0
    }
}
