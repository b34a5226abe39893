//! Result store
//!
//! Append-only CSV files for sweep runs and walk-forward evaluations. Headers
//! are written once when a file is created. Each row is serialised into memory
//! first and written with one append call, so rows from concurrent workers,
//! threads or processes, never interleave.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use edge_backtest::trading_core::{Metrics, RawParams, StrategyParams};

pub const RUNS_FILE: &str = "strategy_runs.csv";
pub const WALK_FORWARD_FILE: &str = "strategy_walkforward_results.csv";

/// Persisted row for one sweep evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_bars: i64,
    pub breakout_lookback: i64,
    pub entry_offset: f64,
    pub daily_regime: String,
    pub hourly_regime: String,
    pub trades: usize,
    pub winrate: f64,
    pub expectancy: f64,
    #[serde(rename = "avg_MAE")]
    pub avg_mae: f64,
    #[serde(rename = "avg_MFE")]
    pub avg_mfe: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
}

impl RunRecord {
    pub fn new(run_id: Uuid, params: &StrategyParams, m: &Metrics) -> Self {
        Self {
            run_id: run_id.simple().to_string(),
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            max_bars: params.max_bars as i64,
            breakout_lookback: params.breakout_lookback as i64,
            entry_offset: params.entry_offset,
            daily_regime: params.daily_regime.to_string(),
            hourly_regime: params.hourly_regime.to_string(),
            trades: m.trades,
            winrate: m.winrate,
            expectancy: m.expectancy,
            avg_mae: m.avg_mae,
            avg_mfe: m.avg_mfe,
            max_drawdown: m.max_drawdown,
            profit_factor: m.profit_factor,
            sharpe: m.sharpe,
        }
    }

    pub fn raw_params(&self) -> RawParams {
        RawParams {
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            max_bars: self.max_bars,
            breakout_lookback: self.breakout_lookback,
            entry_offset: self.entry_offset,
            daily_regime: self.daily_regime.clone(),
            hourly_regime: self.hourly_regime.clone(),
        }
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            trades: self.trades,
            winrate: self.winrate,
            expectancy: self.expectancy,
            avg_mae: self.avg_mae,
            avg_mfe: self.avg_mfe,
            max_drawdown: self.max_drawdown,
            profit_factor: self.profit_factor,
            sharpe: self.sharpe,
        }
    }
}

/// Persisted row for one walk-forward split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardRecord {
    pub walk_id: String,
    pub parent_run_id: String,
    pub split_year: i32,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_bars: i64,
    pub breakout_lookback: i64,
    pub entry_offset: f64,
    pub daily_regime: String,
    pub hourly_regime: String,
    pub train_trades: usize,
    pub train_winrate: f64,
    pub train_expectancy: f64,
    #[serde(rename = "train_avg_MAE")]
    pub train_avg_mae: f64,
    #[serde(rename = "train_avg_MFE")]
    pub train_avg_mfe: f64,
    pub train_max_drawdown: f64,
    pub train_profit_factor: f64,
    pub train_sharpe: f64,
    pub test_trades: usize,
    pub test_winrate: f64,
    pub test_expectancy: f64,
    #[serde(rename = "test_avg_MAE")]
    pub test_avg_mae: f64,
    #[serde(rename = "test_avg_MFE")]
    pub test_avg_mfe: f64,
    pub test_max_drawdown: f64,
    pub test_profit_factor: f64,
    pub test_sharpe: f64,
}

impl WalkForwardRecord {
    pub fn new(
        walk_id: Uuid,
        parent: &RunRecord,
        split_year: i32,
        train: &Metrics,
        test: &Metrics,
    ) -> Self {
        Self {
            walk_id: walk_id.simple().to_string(),
            parent_run_id: parent.run_id.clone(),
            split_year,
            stop_loss: parent.stop_loss,
            take_profit: parent.take_profit,
            max_bars: parent.max_bars,
            breakout_lookback: parent.breakout_lookback,
            entry_offset: parent.entry_offset,
            daily_regime: parent.daily_regime.clone(),
            hourly_regime: parent.hourly_regime.clone(),
            train_trades: train.trades,
            train_winrate: train.winrate,
            train_expectancy: train.expectancy,
            train_avg_mae: train.avg_mae,
            train_avg_mfe: train.avg_mfe,
            train_max_drawdown: train.max_drawdown,
            train_profit_factor: train.profit_factor,
            train_sharpe: train.sharpe,
            test_trades: test.trades,
            test_winrate: test.winrate,
            test_expectancy: test.expectancy,
            test_avg_mae: test.avg_mae,
            test_avg_mfe: test.avg_mfe,
            test_max_drawdown: test.max_drawdown,
            test_profit_factor: test.profit_factor,
            test_sharpe: test.sharpe,
        }
    }
}

/// Append-only sink for run and walk-forward rows
pub trait ResultStore: Send + Sync {
    fn append_run(&self, record: &RunRecord) -> Result<()>;
    fn append_walk_forward(&self, record: &WalkForwardRecord) -> Result<()>;
    /// All persisted runs in file order
    fn load_runs(&self) -> Result<Vec<RunRecord>>;
}

/// Column order of `strategy_runs.csv`
pub const RUN_COLUMNS: [&str; 16] = [
    "run_id", "stop_loss", "take_profit", "max_bars", "breakout_lookback", "entry_offset",
    "daily_regime", "hourly_regime", "trades", "winrate", "expectancy", "avg_MAE", "avg_MFE",
    "max_drawdown", "profit_factor", "sharpe",
];

/// Column order of `strategy_walkforward_results.csv`
pub const WALK_FORWARD_COLUMNS: [&str; 26] = [
    "walk_id", "parent_run_id", "split_year", "stop_loss", "take_profit", "max_bars",
    "breakout_lookback", "entry_offset", "daily_regime", "hourly_regime",
    "train_trades", "train_winrate", "train_expectancy", "train_avg_MAE", "train_avg_MFE",
    "train_max_drawdown", "train_profit_factor", "train_sharpe",
    "test_trades", "test_winrate", "test_expectancy", "test_avg_MAE", "test_avg_MFE",
    "test_max_drawdown", "test_profit_factor", "test_sharpe",
];

/// CSV files inside a results directory
pub struct CsvResultStore {
    dir: PathBuf,
}

impl CsvResultStore {
    /// Store rooted at `dir` without touching the filesystem. Reads work on a
    /// missing directory; appends need `open`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the results directory and write each file's header if the file is new
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        std::fs::create_dir_all(&store.dir)
            .with_context(|| format!("Failed to create results directory: {:?}", store.dir))?;
        ensure_header(&store.runs_path(), &RUN_COLUMNS)?;
        ensure_header(&store.walk_forward_path(), &WALK_FORWARD_COLUMNS)?;
        Ok(store)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.dir.join(RUNS_FILE)
    }

    pub fn walk_forward_path(&self) -> PathBuf {
        self.dir.join(WALK_FORWARD_FILE)
    }
}

/// Write the header of a results file exactly once.
///
/// Only the process that creates the file writes the header; everyone else
/// sees `AlreadyExists`. A pre-existing empty file gets the header appended.
fn ensure_header(path: &Path, columns: &[&str]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    let header = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush header buffer: {}", e))?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let len = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat {:?}", path))?
                .len();
            if len > 0 {
                return Ok(());
            }
            OpenOptions::new()
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {:?} for append", path))?
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to create {:?}", path)),
    };

    file.write_all(&header)
        .with_context(|| format!("Failed to write header to {:?}", path))?;
    debug!("Wrote header to {:?}", path);
    Ok(())
}

/// Serialise one row and append it in one write. The header is owned by `open`.
fn append_row<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .serialize(record)
        .with_context(|| format!("Failed to serialise row for {:?}", path))?;
    let buf = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush row buffer: {}", e))?;

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?} for append", path))?;
    file.write_all(&buf)
        .with_context(|| format!("Failed to append row to {:?}", path))?;

    debug!("Appended {} bytes to {:?}", buf.len(), path);
    Ok(())
}

impl ResultStore for CsvResultStore {
    fn append_run(&self, record: &RunRecord) -> Result<()> {
        append_row(&self.runs_path(), record)
    }

    fn append_walk_forward(&self, record: &WalkForwardRecord) -> Result<()> {
        append_row(&self.walk_forward_path(), record)
    }

    fn load_runs(&self) -> Result<Vec<RunRecord>> {
        let path = self.runs_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        let mut runs = Vec::new();
        for (row, result) in reader.deserialize().enumerate() {
            let record: RunRecord =
                result.with_context(|| format!("Failed to parse row {} of {:?}", row + 1, path))?;
            runs.push(record);
        }
        Ok(runs)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use edge_backtest::trading_core::{Regime, RegimeFilter};
    use std::sync::Barrier;

    fn params() -> StrategyParams {
        StrategyParams {
            stop_loss: 10.0,
            take_profit: 20.0,
            max_bars: 6,
            breakout_lookback: 12,
            entry_offset: 0.5,
            daily_regime: RegimeFilter::Any,
            hourly_regime: RegimeFilter::Only(Regime::TrendUp),
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            trades: 3,
            winrate: 1.0,
            expectancy: 4.5,
            avg_mae: 1.25,
            avg_mfe: 6.0,
            max_drawdown: 0.0,
            profit_factor: f64::INFINITY,
            sharpe: 2.5,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResultStore::open(dir.path()).unwrap();

        store.append_run(&RunRecord::new(Uuid::new_v4(), &params(), &metrics())).unwrap();
        store.append_run(&RunRecord::new(Uuid::new_v4(), &params(), &Metrics::default())).unwrap();

        let text = std::fs::read_to_string(store.runs_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "run_id,stop_loss,take_profit,max_bars,breakout_lookback,entry_offset,daily_regime,\
             hourly_regime,trades,winrate,expectancy,avg_MAE,avg_MFE,max_drawdown,profit_factor,sharpe"
        );
        assert!(lines[1].contains(",trend_up,"));
        assert!(lines[1].contains(",inf,"));
    }

    #[test]
    fn test_runs_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResultStore::open(dir.path()).unwrap();
        assert!(store.load_runs().unwrap().is_empty());

        let record = RunRecord::new(Uuid::new_v4(), &params(), &metrics());
        store.append_run(&record).unwrap();

        let runs = store.load_runs().unwrap();
        assert_eq!(runs, vec![record.clone()]);
        assert!(runs[0].profit_factor.is_infinite());
        assert_eq!(runs[0].run_id.len(), 32);

        let back = StrategyParams::try_from(runs[0].raw_params()).unwrap();
        assert_eq!(back, params());
        assert_eq!(runs[0].metrics(), metrics());
    }

    #[test]
    fn test_walk_forward_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResultStore::open(dir.path()).unwrap();
        let parent = RunRecord::new(Uuid::new_v4(), &params(), &metrics());
        let record = WalkForwardRecord::new(Uuid::new_v4(), &parent, 2023, &metrics(), &Metrics::default());
        store.append_walk_forward(&record).unwrap();

        let text = std::fs::read_to_string(store.walk_forward_path()).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), 26);
        assert_eq!(&header[..3], &["walk_id", "parent_run_id", "split_year"]);
        assert_eq!(header[10], "train_trades");
        assert_eq!(header[13], "train_avg_MAE");
        assert_eq!(header[18], "test_trades");
        assert_eq!(header[25], "test_sharpe");
    }

    fn header_line<T: Serialize>(record: &T) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        text.lines().next().unwrap().to_string()
    }

    #[test]
    fn test_header_constants_match_record_fields() {
        let parent = RunRecord::new(Uuid::new_v4(), &params(), &metrics());
        let walk = WalkForwardRecord::new(Uuid::new_v4(), &parent, 2023, &metrics(), &metrics());
        assert_eq!(header_line(&parent), RUN_COLUMNS.join(","));
        assert_eq!(header_line(&walk), WALK_FORWARD_COLUMNS.join(","));
    }

    #[test]
    fn test_concurrent_appends_keep_single_header() {
        const THREADS: usize = 8;
        const ROWS: usize = 5;

        for _ in 0..20 {
            let dir = tempfile::tempdir().unwrap();
            let store = CsvResultStore::open(dir.path()).unwrap();
            let barrier = Barrier::new(THREADS);

            std::thread::scope(|scope| {
                for _ in 0..THREADS {
                    scope.spawn(|| {
                        barrier.wait();
                        for _ in 0..ROWS {
                            let record = RunRecord::new(Uuid::new_v4(), &params(), &metrics());
                            store.append_run(&record).unwrap();
                        }
                    });
                }
            });

            let text = std::fs::read_to_string(store.runs_path()).unwrap();
            assert_eq!(text.matches("run_id,").count(), 1);
            assert_eq!(store.load_runs().unwrap().len(), THREADS * ROWS);
        }
    }

    #[test]
    fn test_reopen_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResultStore::open(dir.path()).unwrap();
        store.append_run(&RunRecord::new(Uuid::new_v4(), &params(), &metrics())).unwrap();

        let store = CsvResultStore::open(dir.path()).unwrap();
        store.append_run(&RunRecord::new(Uuid::new_v4(), &params(), &metrics())).unwrap();
        assert_eq!(store.load_runs().unwrap().len(), 2);

        // An empty file left behind still gets its header
        std::fs::write(store.walk_forward_path(), "").unwrap();
        let store = CsvResultStore::open(dir.path()).unwrap();
        let text = std::fs::read_to_string(store.walk_forward_path()).unwrap();
        assert!(text.starts_with("walk_id,parent_run_id,split_year,"));
    }

    #[test]
    fn test_new_store_leaves_filesystem_alone() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let store = CsvResultStore::new(&results);

        assert!(store.load_runs().unwrap().is_empty());
        assert!(!results.exists());
        assert!(store.append_run(&RunRecord::new(Uuid::new_v4(), &params(), &metrics())).is_err());
    }
}
