mod grid;
mod report;
mod repository;
mod store;
mod sweep;
mod walkforward;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use edge_backtest::trading_core::{run_strategy, Metrics, RawParams, StrategyParams};

use grid::ParamGrid;
use repository::{CandleRepository, CsvCandleRepository};
use store::{CsvResultStore, ResultStore};
use sweep::WorkerSlot;

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(about = "Breakout strategy sweep & walk-forward pipeline")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing <SYMBOL>_5m.csv, <SYMBOL>_1h.csv and <SYMBOL>_1d.csv
    #[arg(long, global = true, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory for the append-only result files
    #[arg(long, global = true, env = "RESULTS_DIR", default_value = "results")]
    results_dir: PathBuf,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate this worker's share of the parameter grid
    Sweep {
        /// JSON grid file (built-in grid when omitted)
        #[arg(short, long)]
        grid: Option<PathBuf>,

        #[arg(long, env = "WORKER_ID", default_value = "0")]
        worker_id: usize,

        #[arg(long, env = "N_WORKERS", default_value = "1")]
        n_workers: usize,

        /// Run all n_workers partitions in this process
        #[arg(long)]
        all_workers: bool,

        #[arg(short, long, env = "SYMBOL", default_value = "US500")]
        symbol: String,
    },

    /// Re-run the best stored runs on yearly train/test splits
    WalkForward {
        /// Number of stored runs to evaluate, by expectancy
        #[arg(long, env = "TOP_N", default_value = "50")]
        top_n: usize,

        #[arg(short, long, env = "SYMBOL", default_value = "US500")]
        symbol: String,
    },

    /// Run one parameter set and print its trades
    Simulate {
        #[arg(short, long, env = "SYMBOL", default_value = "US500")]
        symbol: String,

        /// Stop loss in points
        #[arg(long, default_value = "10.0")]
        stop_loss: f64,

        /// Take profit in points
        #[arg(long, default_value = "20.0")]
        take_profit: f64,

        /// Confirmation window and trade timeout in bars
        #[arg(long, default_value = "6")]
        max_bars: i64,

        /// Rolling channel length in bars
        #[arg(long, default_value = "12")]
        breakout_lookback: i64,

        /// Distance beyond the channel to flag a breakout
        #[arg(long, default_value = "0.5")]
        entry_offset: f64,

        #[arg(long, default_value = "any")]
        daily_regime: String,

        #[arg(long, default_value = "any")]
        hourly_regime: String,
    },

    /// Show stored runs ranked by expectancy
    Top {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Candle source and results location shared by every command
struct Pipeline {
    repository: CsvCandleRepository,
    results_dir: PathBuf,
}

impl Pipeline {
    fn new(data_dir: &Path, results_dir: &Path) -> Self {
        Self {
            repository: CsvCandleRepository::new(data_dir),
            results_dir: results_dir.to_path_buf(),
        }
    }

    /// Store for commands that append; creates the directory and file headers
    fn open_store(&self) -> Result<CsvResultStore> {
        CsvResultStore::open(&self.results_dir)
    }

    /// Store for commands that only read
    fn read_store(&self) -> CsvResultStore {
        CsvResultStore::new(&self.results_dir)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pipeline = Pipeline::new(&args.data_dir, &args.results_dir);

    match args.command {
        Commands::Sweep { grid, worker_id, n_workers, all_workers, symbol } => {
            run_sweep(&pipeline, grid, worker_id, n_workers, all_workers, &symbol)?;
        }
        Commands::WalkForward { top_n, symbol } => {
            run_walk_forward(&pipeline, top_n, &symbol)?;
        }
        Commands::Simulate {
            symbol,
            stop_loss, take_profit, max_bars,
            breakout_lookback, entry_offset,
            daily_regime, hourly_regime,
        } => {
            let raw = RawParams {
                stop_loss,
                take_profit,
                max_bars,
                breakout_lookback,
                entry_offset,
                daily_regime,
                hourly_regime,
            };
            run_simulate(&pipeline, raw, &symbol)?;
        }
        Commands::Top { limit } => {
            run_top(&pipeline, limit)?;
        }
    }

    Ok(())
}

fn run_sweep(
    pipeline: &Pipeline,
    grid_path: Option<PathBuf>,
    worker_id: usize,
    n_workers: usize,
    all_workers: bool,
    symbol: &str,
) -> Result<()> {
    info!("=== SWEEP MODE ===");

    let slot = WorkerSlot::new(if all_workers { 0 } else { worker_id }, n_workers)?;
    let grid = match grid_path {
        Some(path) => {
            info!("Grid file: {:?}", path);
            ParamGrid::from_file(&path)?
        }
        None => {
            info!("Using built-in grid");
            ParamGrid::default()
        }
    };
    info!("Grid has {} combinations", grid.len());
    if grid.is_empty() {
        warn!("Grid has an empty dimension, nothing to evaluate");
    }

    let bundle = pipeline
        .repository
        .load(symbol)
        .with_context(|| format!("Failed to load candles for {}", symbol))?;

    let store = pipeline.open_store()?;

    let start = Instant::now();
    let summary = if all_workers {
        info!("Running all {} workers in-process", n_workers);
        sweep::run_all_workers(&bundle, &grid, n_workers, &store)?
    } else {
        sweep::run_grid_search(&bundle, &grid, slot, &store)?
    };

    report::print_sweep_summary(&summary, start.elapsed().as_secs_f64());
    info!("Results appended to {:?}", store.runs_path());
    Ok(())
}

fn run_walk_forward(pipeline: &Pipeline, top_n: usize, symbol: &str) -> Result<()> {
    info!("=== WALK-FORWARD MODE ===");

    let bundle = pipeline
        .repository
        .load(symbol)
        .with_context(|| format!("Failed to load candles for {}", symbol))?;

    let store = pipeline.open_store()?;
    let summary = walkforward::run_walk_forward(&bundle, &store, top_n)?;

    report::print_walk_forward_summary(&summary);
    info!("Results appended to {:?}", store.walk_forward_path());
    Ok(())
}

fn run_simulate(pipeline: &Pipeline, raw: RawParams, symbol: &str) -> Result<()> {
    info!("=== SIMULATE MODE ===");

    let params = StrategyParams::try_from(raw)?;
    let bundle = pipeline
        .repository
        .load(symbol)
        .with_context(|| format!("Failed to load candles for {}", symbol))?;

    let trades = run_strategy(&bundle, &params)?;
    let metrics = Metrics::from_trades(&trades);

    report::print_simulation(&params, &trades, &metrics);
    Ok(())
}

fn run_top(pipeline: &Pipeline, limit: usize) -> Result<()> {
    let runs = pipeline.read_store().load_runs()?;
    info!("Loaded {} stored runs", runs.len());

    let top = walkforward::rank_runs(runs, limit);
    report::print_top_runs(&top);
    Ok(())
}
