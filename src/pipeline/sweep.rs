//! Parameter Sweep Module
//!
//! Each worker evaluates its own slice of the grid (`index % n_workers ==
//! worker_id`) and appends one row per combination. Workers share nothing
//! but the append-only store, so they can run as separate processes or as
//! rayon tasks in one process.

use anyhow::Result;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use edge_backtest::trading_core::{run_strategy, CandleBundle, Metrics, StrategyParams};
use edge_backtest::BacktestError;

use super::grid::ParamGrid;
use super::store::{ResultStore, RunRecord};

/// This process's position in the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub worker_id: usize,
    pub n_workers: usize,
}

impl WorkerSlot {
    pub fn new(worker_id: usize, n_workers: usize) -> Result<Self, BacktestError> {
        if n_workers == 0 {
            return Err(BacktestError::config("n_workers must be at least 1"));
        }
        if worker_id >= n_workers {
            return Err(BacktestError::config(format!(
                "worker_id {} out of range for {} workers",
                worker_id, n_workers
            )));
        }
        Ok(Self { worker_id, n_workers })
    }
}

/// Counts for one worker's pass over its partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub assigned: usize,
    pub evaluated: usize,
    pub skipped: usize,
}

impl std::ops::Add for SweepSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            assigned: self.assigned + other.assigned,
            evaluated: self.evaluated + other.evaluated,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Evaluate every combination assigned to `slot` and append a row for each.
///
/// Invalid combinations are logged and skipped. Data errors from the
/// simulator are fatal.
pub fn run_grid_search(
    bundle: &CandleBundle,
    grid: &ParamGrid,
    slot: WorkerSlot,
    store: &dyn ResultStore,
) -> Result<SweepSummary> {
    bundle.validate()?;

    let indices: Vec<usize> = grid.partition(slot.worker_id, slot.n_workers).collect();
    let total = indices.len();
    let mut summary = SweepSummary {
        assigned: total,
        ..Default::default()
    };

    info!(
        "Worker {}/{}: {} of {} combinations assigned",
        slot.worker_id,
        slot.n_workers,
        total,
        grid.len()
    );

    let start = Instant::now();
    for (done, index) in indices.into_iter().enumerate() {
        let Some(raw) = grid.combination(index) else {
            continue;
        };

        match StrategyParams::try_from(raw) {
            Ok(params) => {
                let trades = run_strategy(bundle, &params)?;
                let metrics = Metrics::from_trades(&trades);
                let record = RunRecord::new(Uuid::new_v4(), &params, &metrics);
                store.append_run(&record)?;
                debug!(
                    "Combination {} [{}]: {} trades, expectancy {:.3}",
                    index, params, metrics.trades, metrics.expectancy
                );
                summary.evaluated += 1;
            }
            Err(e) => {
                warn!("Skipping combination {}: {}", index, e);
                summary.skipped += 1;
            }
        }

        let done = done + 1;
        if done % 50 == 0 || done == total {
            let elapsed = start.elapsed().as_secs_f64();
            let rate = done as f64 / elapsed.max(1e-9);
            info!(
                "Worker {}: [{}/{}] {:.1}/s, ETA: {:.0}s",
                slot.worker_id,
                done,
                total,
                rate,
                (total - done) as f64 / rate
            );
        }
    }

    Ok(summary)
}

/// Run every worker partition in this process on the rayon pool
pub fn run_all_workers(
    bundle: &CandleBundle,
    grid: &ParamGrid,
    n_workers: usize,
    store: &dyn ResultStore,
) -> Result<SweepSummary> {
    let slots = (0..n_workers)
        .map(|w| WorkerSlot::new(w, n_workers))
        .collect::<Result<Vec<_>, _>>()?;
    if slots.is_empty() {
        return Err(BacktestError::config("n_workers must be at least 1").into());
    }

    let summaries = slots
        .par_iter()
        .map(|slot| run_grid_search(bundle, grid, *slot, store))
        .collect::<Result<Vec<_>>>()?;

    Ok(summaries.into_iter().fold(SweepSummary::default(), |acc, s| acc + s))
}
