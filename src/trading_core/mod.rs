//! Trading Core - simulation logic shared by every pipeline command
//!
//! This module contains the strategy components:
//! - Labeled candle series and validation
//! - Regime labels and filters
//! - Strategy parameters
//! - Breakout state machine
//! - Strategy simulator
//! - Metrics aggregation

pub mod candles;
pub mod regime;
pub mod params;
pub mod state_machine;
pub mod simulator;
pub mod metrics;

// Re-export commonly used types
pub use candles::{CandleBundle, CandleSeries};
pub use regime::{CandleDirectionLabeler, Regime, RegimeFilter, RegimeLabeler};
pub use params::{RawParams, StrategyParams};
pub use state_machine::{BreakoutStateMachine, StateTransition, TradingState};
pub use simulator::run_strategy;
pub use metrics::Metrics;
