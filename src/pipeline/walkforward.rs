//! Walk-forward evaluation
//!
//! Takes the best persisted sweep runs and re-runs each on expanding yearly
//! splits: train on everything from the first year up to the split year,
//! test on the split year alone.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::{info, warn};
use uuid::Uuid;

use edge_backtest::trading_core::{run_strategy, CandleBundle, Metrics, StrategyParams};
use edge_backtest::BacktestError;

use super::store::{ResultStore, RunRecord, WalkForwardRecord};

/// Train/test boundaries for one split year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearSplit {
    pub split_year: i32,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

impl YearSplit {
    pub fn test_start(&self) -> DateTime<Utc> {
        self.train_end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkForwardSummary {
    pub candidates: usize,
    pub rows_appended: usize,
    pub splits_skipped: usize,
}

fn year_start(year: i32) -> Result<DateTime<Utc>, BacktestError> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| BacktestError::config(format!("year {} out of range", year)))
}

/// One split per year after the first, ascending
pub fn year_splits(years: &[i32]) -> Result<Vec<YearSplit>, BacktestError> {
    let Some(&first) = years.first() else {
        return Ok(Vec::new());
    };
    let train_start = year_start(first)?;

    years
        .iter()
        .skip(1)
        .map(|&year| {
            Ok(YearSplit {
                split_year: year,
                train_start,
                train_end: year_start(year)?,
                test_end: year_start(year + 1)?,
            })
        })
        .collect()
}

/// Best runs by expectancy, highest first. Ties keep store order; NaN sorts last.
pub fn rank_runs(mut runs: Vec<RunRecord>, top_n: usize) -> Vec<RunRecord> {
    runs.sort_by(|a, b| match (a.expectancy.is_nan(), b.expectancy.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.expectancy.partial_cmp(&a.expectancy).unwrap_or(Ordering::Equal),
    });
    runs.truncate(top_n);
    runs
}

/// Run the top `top_n` stored runs over every yearly split and append one row
/// per (run, split). A no-op when the fine series spans fewer than two years
/// or no split has data in all three series; unordered or inconsistent bars
/// are still fatal.
pub fn run_walk_forward(
    bundle: &CandleBundle,
    store: &dyn ResultStore,
    top_n: usize,
) -> Result<WalkForwardSummary> {
    bundle.validate_integrity()?;

    let years = bundle.fine.years();
    if years.len() < 2 {
        info!(
            "Walk-forward skipped: need at least two calendar years, found {:?}",
            years
        );
        return Ok(WalkForwardSummary::default());
    }

    let candidates = rank_runs(store.load_runs()?, top_n);
    if candidates.is_empty() {
        info!("Walk-forward skipped: no stored runs");
        return Ok(WalkForwardSummary::default());
    }

    let mut windows = Vec::new();
    let mut splits_skipped = 0;
    for split in year_splits(&years)? {
        let train = bundle.window(split.train_start, split.train_end);
        let test = bundle.window(split.test_start(), split.test_end);
        if train.has_empty_series() || test.has_empty_series() {
            warn!(
                "Skipping split {}: a train or test series is empty",
                split.split_year
            );
            splits_skipped += 1;
            continue;
        }
        windows.push((split, train, test));
    }

    info!(
        "Walk-forward: {} candidates x {} splits (years {:?})",
        candidates.len(),
        windows.len(),
        years
    );

    let appended = candidates
        .par_iter()
        .map(|run| -> Result<usize> {
            let params = match StrategyParams::try_from(run.raw_params()) {
                Ok(params) => params,
                Err(e) => {
                    warn!("Skipping run {}: {}", run.run_id, e);
                    return Ok(0);
                }
            };

            let mut rows = 0;
            for (split, train, test) in &windows {
                let train_metrics = Metrics::from_trades(&run_strategy(train, &params)?);
                let test_metrics = Metrics::from_trades(&run_strategy(test, &params)?);
                let record = WalkForwardRecord::new(
                    Uuid::new_v4(),
                    run,
                    split.split_year,
                    &train_metrics,
                    &test_metrics,
                );
                store.append_walk_forward(&record)?;
                rows += 1;
            }
            Ok(rows)
        })
        .collect::<Result<Vec<usize>>>()?;

    Ok(WalkForwardSummary {
        candidates: candidates.len(),
        rows_appended: appended.iter().sum(),
        splits_skipped,
    })
}
