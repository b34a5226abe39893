// Library crate - exports shared types and the simulation core

pub mod types;
pub mod error;
pub mod trading_core;

// Re-export commonly used types
pub use types::*;
pub use error::{BacktestError, Result};
pub use trading_core::{run_strategy, CandleBundle, CandleSeries, Metrics, StrategyParams};
