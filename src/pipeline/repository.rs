//! Candle repository
//!
//! Loads the fine (5m), hourly and daily series for a symbol from CSV files
//! laid out as `<data_dir>/<SYMBOL>_5m.csv`, `_1h.csv` and `_1d.csv`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use edge_backtest::trading_core::{
    CandleBundle, CandleDirectionLabeler, CandleSeries, Regime, RegimeLabeler,
};
use edge_backtest::{BacktestError, Candle};

/// Source of labeled candle series for one symbol
pub trait CandleRepository {
    fn load(&self, symbol: &str) -> Result<CandleBundle>;
}

/// Reads candle series from per-timeframe CSV files
pub struct CsvCandleRepository {
    data_dir: PathBuf,
    labeler: Box<dyn RegimeLabeler + Send + Sync>,
}

impl CsvCandleRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_labeler(data_dir, Box::new(CandleDirectionLabeler))
    }

    pub fn with_labeler(
        data_dir: impl Into<PathBuf>,
        labeler: Box<dyn RegimeLabeler + Send + Sync>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            labeler,
        }
    }

    fn path_for(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.data_dir.join(format!("{}_{}.csv", symbol, timeframe))
    }

    /// Load a series; hourly and daily series without a label column are
    /// labeled with the configured labeler.
    fn load_series(&self, path: &Path, label_missing: bool) -> Result<CandleSeries> {
        let (candles, labels) = read_candles_csv(path)?;

        let regimes = match labels {
            Some(labels) => labels,
            None if label_missing => {
                info!(
                    "{:?} has no regime column, labeling {} bars by candle direction",
                    path,
                    candles.len()
                );
                self.labeler.label(&candles)
            }
            None => vec![None; candles.len()],
        };

        Ok(CandleSeries::new(candles, regimes)?)
    }
}

impl CandleRepository for CsvCandleRepository {
    fn load(&self, symbol: &str) -> Result<CandleBundle> {
        let fine = self.load_series(&self.path_for(symbol, "5m"), false)?;
        let hourly = self.load_series(&self.path_for(symbol, "1h"), true)?;
        let daily = self.load_series(&self.path_for(symbol, "1d"), true)?;

        info!(
            "Loaded {}: {} fine, {} hourly, {} daily bars",
            symbol,
            fine.len(),
            hourly.len(),
            daily.len()
        );

        Ok(CandleBundle { fine, hourly, daily })
    }
}

/// Column positions resolved from a header row
struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    regime: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord, path: &Path) -> Result<Self, BacktestError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();

        let required = |name: &str| {
            index.get(name).copied().ok_or_else(|| {
                BacktestError::config(format!("{:?} is missing required column '{}'", path, name))
            })
        };

        Ok(Self {
            time: required("time")?,
            open: required("open")?,
            high: required("high")?,
            low: required("low")?,
            close: required("close")?,
            volume: index.get("volume").copied(),
            regime: ["regime", "daily_regime", "hourly_regime"]
                .iter()
                .find_map(|name| index.get(*name).copied()),
        })
    }
}

/// Parse a candle CSV; returns the regime labels only if the file has a label column
fn read_candles_csv(path: &Path) -> Result<(Vec<Candle>, Option<Vec<Option<Regime>>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open candle file: {:?}", path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .clone();
    let columns = Columns::from_headers(&headers, path)?;

    let mut candles = Vec::new();
    let mut labels = columns.regime.map(|_| Vec::new());

    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {} of {:?}", row + 1, path))?;

        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |idx: usize, name: &str| -> Result<f64, BacktestError> {
            field(idx).parse::<f64>().map_err(|_| {
                BacktestError::config(format!(
                    "{:?} row {}: invalid {} value '{}'",
                    path,
                    row + 1,
                    name,
                    field(idx)
                ))
            })
        };

        let time = parse_time(field(columns.time)).ok_or_else(|| {
            BacktestError::config(format!(
                "{:?} row {}: invalid time '{}'",
                path,
                row + 1,
                field(columns.time)
            ))
        })?;

        let volume = match columns.volume {
            Some(idx) if !field(idx).is_empty() => number(idx, "volume")?,
            _ => 0.0,
        };

        candles.push(Candle {
            time,
            open: number(columns.open, "open")?,
            high: number(columns.high, "high")?,
            low: number(columns.low, "low")?,
            close: number(columns.close, "close")?,
            volume,
        });

        if let (Some(labels), Some(idx)) = (labels.as_mut(), columns.regime) {
            let raw = field(idx);
            let label = if raw.is_empty() {
                None
            } else {
                Some(raw.parse::<Regime>().map_err(|e| {
                    BacktestError::config(format!("{:?} row {}: {}", path, row + 1, e))
                })?)
            };
            labels.push(label);
        }
    }

    debug!("Parsed {} candles from {:?}", candles.len(), path);
    Ok((candles, labels))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC)
fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}
