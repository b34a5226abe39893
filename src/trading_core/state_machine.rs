//! Breakout State Machine
//!
//! Per-bar state machine for the channel breakout strategy:
//! 1. IDLE - Wait for an eligible bar to poke through the rolling channel
//! 2. PENDING - Breakout recorded, wait for a close back through the level
//! 3. ACTIVE - Position open, track excursions until stop, target or timeout
//!
//! Exactly one state is live at a time. Pending and active data live inside
//! the state variant, so a breakout and an open trade can never coexist.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::params::StrategyParams;
use crate::types::{Candle, Direction, ExitReason, Trade};

/// Rolling extremes over the bars strictly before the current one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub high: f64,
    pub low: f64,
}

/// Everything the machine needs to know about one fine bar
#[derive(Debug, Clone, Copy)]
pub struct BarInput<'a> {
    pub index: usize,
    pub candle: &'a Candle,
    /// Regime filters pass for this bar
    pub eligible: bool,
    /// None until a full lookback window exists
    pub channel: Option<Channel>,
}

/// Breakout waiting for confirmation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingBreakout {
    pub direction: Direction,
    /// Channel extreme that was broken
    pub level: f64,
    pub detected_at: usize,
}

/// Open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTrade {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_index: usize,
    pub max_high: f64,
    pub min_low: f64,
    pub mae: f64,
    pub mfe: f64,
}

impl ActiveTrade {
    fn open(direction: Direction, index: usize, candle: &Candle) -> Self {
        Self {
            direction,
            entry_time: candle.time,
            entry_price: candle.close,
            entry_index: index,
            max_high: candle.close,
            min_low: candle.close,
            mae: 0.0,
            mfe: 0.0,
        }
    }

    /// Fold a bar's range into the running extremes
    fn update_excursions(&mut self, high: f64, low: f64) {
        self.max_high = self.max_high.max(high);
        self.min_low = self.min_low.min(low);

        let (adverse, favorable) = match self.direction {
            Direction::Long => (self.entry_price - self.min_low, self.max_high - self.entry_price),
            Direction::Short => (self.max_high - self.entry_price, self.entry_price - self.min_low),
        };
        self.mae = self.mae.max(adverse);
        self.mfe = self.mfe.max(favorable);
    }

    /// Stop is checked before target when both trigger on the same bar
    fn check_exit(&self, high: f64, low: f64, stop_loss: f64, take_profit: f64) -> Option<(f64, ExitReason)> {
        let entry = self.entry_price;
        match self.direction {
            Direction::Long => {
                if low <= entry - stop_loss {
                    return Some((entry - stop_loss, ExitReason::StopLoss));
                }
                if high >= entry + take_profit {
                    return Some((entry + take_profit, ExitReason::TakeProfit));
                }
            }
            Direction::Short => {
                if high >= entry + stop_loss {
                    return Some((entry + stop_loss, ExitReason::StopLoss));
                }
                if low <= entry - take_profit {
                    return Some((entry - take_profit, ExitReason::TakeProfit));
                }
            }
        }
        None
    }

    fn close(&self, exit_time: DateTime<Utc>, exit_price: f64, exit_reason: ExitReason) -> Trade {
        Trade {
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            exit_time,
            exit_price,
            direction: self.direction,
            mae: self.mae,
            mfe: self.mfe,
            exit_reason,
        }
    }
}

/// Live state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TradingState {
    #[default]
    Idle,
    Pending(PendingBreakout),
    Active(ActiveTrade),
}

impl std::fmt::Display for TradingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingState::Idle => write!(f, "IDLE"),
            TradingState::Pending(_) => write!(f, "PENDING"),
            TradingState::Active(_) => write!(f, "ACTIVE"),
        }
    }
}

/// State transition events
#[derive(Debug, Clone, PartialEq)]
pub enum StateTransition {
    /// Channel broken, waiting for confirmation
    BreakoutDetected { direction: Direction, level: f64 },
    /// Confirmation window ran out
    BreakoutExpired { direction: Direction },
    /// Close confirmed the breakout, position opened
    Entered { direction: Direction, price: f64 },
    /// Position closed
    Closed(Trade),
}

/// Subset of the strategy parameters the machine reads on every bar
#[derive(Debug, Clone, Copy)]
struct MachineConfig {
    stop_loss: f64,
    take_profit: f64,
    max_bars: usize,
    entry_offset: f64,
}

/// The breakout state machine
pub struct BreakoutStateMachine {
    config: MachineConfig,
    state: TradingState,
}

impl BreakoutStateMachine {
    pub fn new(params: &StrategyParams) -> Self {
        Self {
            config: MachineConfig {
                stop_loss: params.stop_loss,
                take_profit: params.take_profit,
                max_bars: params.max_bars,
                entry_offset: params.entry_offset,
            },
            state: TradingState::Idle,
        }
    }

    pub fn state(&self) -> TradingState {
        self.state
    }

    /// Process a bar and return the transition it caused, if any
    pub fn process_bar(&mut self, bar: &BarInput<'_>) -> Option<StateTransition> {
        match self.state {
            TradingState::Idle => self.process_idle(bar),
            TradingState::Pending(pending) => self.process_pending(bar, pending),
            TradingState::Active(trade) => self.process_active(bar, trade),
        }
    }

    fn process_idle(&mut self, bar: &BarInput<'_>) -> Option<StateTransition> {
        if !bar.eligible {
            return None;
        }
        let channel = bar.channel?;

        // Short side is checked first; only one direction per bar
        let (direction, level) = if bar.candle.high >= channel.high + self.config.entry_offset {
            (Direction::Short, channel.high)
        } else if bar.candle.low <= channel.low - self.config.entry_offset {
            (Direction::Long, channel.low)
        } else {
            return None;
        };

        self.state = TradingState::Pending(PendingBreakout {
            direction,
            level,
            detected_at: bar.index,
        });
        Some(StateTransition::BreakoutDetected { direction, level })
    }

    fn process_pending(&mut self, bar: &BarInput<'_>, pending: PendingBreakout) -> Option<StateTransition> {
        // Countdown runs on absolute bar distance, eligible or not
        let elapsed = bar.index - pending.detected_at;
        if elapsed > self.config.max_bars {
            trace!(
                "{} breakout at bar {} expired after {} bars",
                pending.direction,
                pending.detected_at,
                elapsed
            );
            self.state = TradingState::Idle;
            // The releasing bar gets a fresh look for a new breakout
            return self
                .process_idle(bar)
                .or(Some(StateTransition::BreakoutExpired {
                    direction: pending.direction,
                }));
        }

        if !bar.eligible {
            return None;
        }

        let close = bar.candle.close;
        let confirmed = match pending.direction {
            Direction::Short => close <= pending.level,
            Direction::Long => close >= pending.level,
        };
        if !confirmed {
            return None;
        }

        self.state = TradingState::Active(ActiveTrade::open(pending.direction, bar.index, bar.candle));
        Some(StateTransition::Entered {
            direction: pending.direction,
            price: close,
        })
    }

    fn process_active(&mut self, bar: &BarInput<'_>, mut trade: ActiveTrade) -> Option<StateTransition> {
        let candle = bar.candle;
        trade.update_excursions(candle.high, candle.low);

        let exit = trade
            .check_exit(candle.high, candle.low, self.config.stop_loss, self.config.take_profit)
            .or_else(|| {
                let held = bar.index - trade.entry_index;
                (held >= self.config.max_bars).then_some((candle.close, ExitReason::TimeExit))
            });

        match exit {
            Some((price, reason)) => {
                self.state = TradingState::Idle;
                Some(StateTransition::Closed(trade.close(candle.time, price, reason)))
            }
            None => {
                self.state = TradingState::Active(trade);
                None
            }
        }
    }
}
