//! Strategy Simulator
//!
//! Runs the breakout state machine over a fine-grained candle series, filtered
//! by the daily and hourly regime of each bar. Pure function of its inputs:
//! the same bundle and parameters always produce the same trade list.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use super::candles::{CandleBundle, CandleSeries};
use super::params::StrategyParams;
use super::regime::Regime;
use super::state_machine::{BarInput, BreakoutStateMachine, Channel, StateTransition, TradingState};
use crate::error::Result;
use crate::types::{Candle, Trade};

const SECS_PER_HOUR: i64 = 3_600;

fn hour_bucket(time: DateTime<Utc>) -> i64 {
    time.timestamp().div_euclid(SECS_PER_HOUR)
}

/// Regime labels keyed by UTC calendar day and by clock hour
struct RegimeIndex {
    daily: HashMap<NaiveDate, Option<Regime>>,
    hourly: HashMap<i64, Option<Regime>>,
}

impl RegimeIndex {
    fn build(hourly: &CandleSeries, daily: &CandleSeries) -> Self {
        // Later bars overwrite earlier ones sharing a key
        let daily = daily
            .iter()
            .map(|(c, r)| (c.time.date_naive(), r))
            .collect();
        let hourly = hourly
            .iter()
            .map(|(c, r)| (hour_bucket(c.time), r))
            .collect();
        Self { daily, hourly }
    }

    fn daily_regime(&self, time: DateTime<Utc>) -> Option<Regime> {
        self.daily.get(&time.date_naive()).copied().flatten()
    }

    fn hourly_regime(&self, time: DateTime<Utc>) -> Option<Regime> {
        self.hourly.get(&hour_bucket(time)).copied().flatten()
    }
}

/// Per-bar eligibility under the parameter set's regime filters
pub fn eligibility(bundle: &CandleBundle, params: &StrategyParams) -> Vec<bool> {
    let index = RegimeIndex::build(&bundle.hourly, &bundle.daily);
    bundle
        .fine
        .candles()
        .iter()
        .map(|c| {
            params.daily_regime.matches(index.daily_regime(c.time))
                && params.hourly_regime.matches(index.hourly_regime(c.time))
        })
        .collect()
}

/// Highest high and lowest low over the `lookback` bars before each bar.
/// Bars without a full window get `None`.
pub fn rolling_channels(candles: &[Candle], lookback: usize) -> Vec<Option<Channel>> {
    let mut channels = Vec::with_capacity(candles.len());
    // Monotonic deques of indices into `candles`
    let mut highs: VecDeque<usize> = VecDeque::new();
    let mut lows: VecDeque<usize> = VecDeque::new();

    for i in 0..candles.len() {
        if i >= lookback {
            let window_start = i - lookback;
            while highs.front().is_some_and(|&j| j < window_start) {
                highs.pop_front();
            }
            while lows.front().is_some_and(|&j| j < window_start) {
                lows.pop_front();
            }
            match (highs.front(), lows.front()) {
                (Some(&h), Some(&l)) => channels.push(Some(Channel {
                    high: candles[h].high,
                    low: candles[l].low,
                })),
                _ => channels.push(None),
            }
        } else {
            channels.push(None);
        }

        // Current bar joins the window for the bars after it
        let bar = &candles[i];
        while highs.back().is_some_and(|&j| candles[j].high <= bar.high) {
            highs.pop_back();
        }
        highs.push_back(i);
        while lows.back().is_some_and(|&j| candles[j].low >= bar.low) {
            lows.pop_back();
        }
        lows.push_back(i);
    }

    channels
}

/// Simulate the strategy and return its completed trades in entry order
pub fn run_strategy(bundle: &CandleBundle, params: &StrategyParams) -> Result<Vec<Trade>> {
    params.validate()?;
    bundle.validate()?;

    let candles = bundle.fine.candles();
    let eligible = eligibility(bundle, params);
    let channels = rolling_channels(candles, params.breakout_lookback);

    let mut machine = BreakoutStateMachine::new(params);
    let mut trades = Vec::new();

    for (index, candle) in candles.iter().enumerate() {
        let bar = BarInput {
            index,
            candle,
            eligible: eligible[index],
            channel: channels[index],
        };
        if let Some(StateTransition::Closed(trade)) = machine.process_bar(&bar) {
            trades.push(trade);
        }
    }

    if let TradingState::Active(open) = machine.state() {
        debug!(
            "Discarding {} trade opened at {} still open at end of data",
            open.direction, open.entry_time
        );
    }

    debug!(
        "Simulated {} bars ({} eligible) -> {} trades [{}]",
        candles.len(),
        eligible.iter().filter(|e| **e).count(),
        trades.len(),
        params
    );

    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BacktestError;
    use crate::trading_core::regime::RegimeFilter;
    use crate::types::{Direction, ExitReason};
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 13, 0, 0).unwrap()
    }

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: start() + Duration::minutes(5 * i),
            open,
            high,
            low,
            close,
            volume: 50.0,
        }
    }

    fn flat(i: i64) -> Candle {
        bar(i, 100.0, 100.5, 99.5, 100.0)
    }

    /// Hourly and daily series covering the fine bars, all labeled `regime`
    fn context(fine: &[Candle], regime: Regime) -> (CandleSeries, CandleSeries) {
        let first = fine[0].time;
        let last = fine[fine.len() - 1].time;
        let mut hours = Vec::new();
        let mut t = first;
        while t <= last {
            hours.push(Candle {
                time: t,
                ..fine[0]
            });
            t += Duration::hours(1);
        }
        let day = Candle {
            time: first.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
            ..fine[0]
        };
        let hourly_labels = vec![Some(regime); hours.len()];
        (
            CandleSeries::new(hours, hourly_labels).unwrap(),
            CandleSeries::new(vec![day], vec![Some(regime)]).unwrap(),
        )
    }

    fn bundle(fine: Vec<Candle>) -> CandleBundle {
        let (hourly, daily) = context(&fine, Regime::TrendUp);
        CandleBundle {
            fine: CandleSeries::unlabeled(fine),
            hourly,
            daily,
        }
    }

    fn params() -> StrategyParams {
        StrategyParams {
            stop_loss: 2.0,
            take_profit: 3.0,
            max_bars: 4,
            breakout_lookback: 3,
            entry_offset: 0.25,
            daily_regime: RegimeFilter::Any,
            hourly_regime: RegimeFilter::Any,
        }
    }

    #[test]
    fn test_rolling_channel_excludes_current_bar() {
        let candles = vec![
            bar(0, 10.0, 11.0, 9.0, 10.0),
            bar(1, 10.0, 12.0, 8.0, 10.0),
            bar(2, 10.0, 10.5, 9.5, 10.0),
            bar(3, 10.0, 20.0, 1.0, 10.0),
            bar(4, 10.0, 10.2, 9.8, 10.0),
        ];
        let channels = rolling_channels(&candles, 2);
        assert_eq!(channels[0], None);
        assert_eq!(channels[1], None);
        assert_eq!(channels[2], Some(Channel { high: 12.0, low: 8.0 }));
        assert_eq!(channels[3], Some(Channel { high: 12.0, low: 8.0 }));
        assert_eq!(channels[4], Some(Channel { high: 20.0, low: 1.0 }));
    }

    #[test]
    fn test_breakout_then_confirm_gives_one_short() {
        let mut fine: Vec<Candle> = (0..3).map(flat).collect();
        // Pokes above 100.5 + 0.25
        fine.push(bar(3, 100.0, 101.0, 99.8, 100.9));
        // Closes back under the broken level
        fine.push(bar(4, 100.9, 100.95, 100.1, 100.2));
        fine.extend((5..12).map(flat));

        let trades = run_strategy(&bundle(fine.clone()), &params()).unwrap();
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.direction, Direction::Short);
        assert_eq!(t.entry_price, 100.2);
        assert_eq!(t.entry_time, fine[4].time);
        // Four flat bars later it times out at the close
        assert_eq!(t.exit_reason, ExitReason::TimeExit);
        assert_eq!(t.exit_time, fine[8].time);
        assert_eq!(t.exit_price, 100.0);
    }

    #[test]
    fn test_regime_filter_blocks_entries() {
        let mut fine: Vec<Candle> = (0..3).map(flat).collect();
        fine.push(bar(3, 100.0, 101.0, 99.8, 100.9));
        fine.push(bar(4, 100.9, 100.95, 100.1, 100.2));
        fine.extend((5..12).map(flat));

        let mut p = params();
        p.daily_regime = RegimeFilter::Only(Regime::TrendDown);
        assert!(run_strategy(&bundle(fine.clone()), &p).unwrap().is_empty());

        p.daily_regime = RegimeFilter::Only(Regime::TrendUp);
        p.hourly_regime = RegimeFilter::Only(Regime::TrendUp);
        assert_eq!(run_strategy(&bundle(fine), &p).unwrap().len(), 1);
    }

    #[test]
    fn test_unmapped_bars_only_pass_wildcard() {
        let fine: Vec<Candle> = (0..6).map(flat).collect();
        let b = CandleBundle {
            fine: CandleSeries::unlabeled(fine.clone()),
            // Hourly bar from a different day, so nothing maps
            hourly: CandleSeries::new(
                vec![Candle {
                    time: start() - Duration::days(3),
                    ..fine[0]
                }],
                vec![Some(Regime::TrendUp)],
            )
            .unwrap(),
            daily: context(&fine, Regime::TrendUp).1,
        };

        let mut p = params();
        assert!(eligibility(&b, &p).iter().all(|e| *e));

        p.hourly_regime = RegimeFilter::Only(Regime::TrendUp);
        assert!(eligibility(&b, &p).iter().all(|e| !*e));
    }

    #[test]
    fn test_open_trade_at_end_is_not_emitted() {
        let mut fine: Vec<Candle> = (0..3).map(flat).collect();
        fine.push(bar(3, 100.0, 101.0, 99.8, 100.9));
        fine.push(bar(4, 100.9, 100.95, 100.1, 100.2));
        fine.push(flat(5));

        assert!(run_strategy(&bundle(fine), &params()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_inputs_fail() {
        let fine: Vec<Candle> = (0..5).map(flat).collect();
        let mut p = params();
        p.max_bars = 0;
        assert!(matches!(
            run_strategy(&bundle(fine.clone()), &p),
            Err(BacktestError::Configuration(_))
        ));

        let mut shuffled = fine.clone();
        shuffled.swap(1, 2);
        let mut b = bundle(fine);
        b.fine = CandleSeries::unlabeled(shuffled);
        assert!(matches!(
            run_strategy(&b, &params()),
            Err(BacktestError::DataIntegrity(_))
        ));

        let mut b = bundle((0..5).map(flat).collect());
        b.daily = CandleSeries::default();
        assert!(matches!(
            run_strategy(&b, &params()),
            Err(BacktestError::Configuration(_))
        ));
    }

    fn random_walk(seed: u64, n: i64) -> Vec<Candle> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price: f64 = 4_500.0;
        (0..n)
            .map(|i| {
                let open = price;
                let close = open + rng.gen_range(-3.0..3.0);
                let high = open.max(close) + rng.gen_range(0.0..2.0);
                let low = open.min(close) - rng.gen_range(0.0..2.0);
                price = close;
                bar(i, open, high, low, close)
            })
            .collect()
    }

    #[test]
    fn test_deterministic_and_non_overlapping() {
        let b = bundle(random_walk(7, 2_000));
        let p = StrategyParams {
            stop_loss: 4.0,
            take_profit: 6.0,
            max_bars: 6,
            breakout_lookback: 12,
            entry_offset: 0.5,
            daily_regime: RegimeFilter::Any,
            hourly_regime: RegimeFilter::Any,
        };

        let first = run_strategy(&b, &p).unwrap();
        let second = run_strategy(&b, &p).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        // One position at a time: each entry comes after the previous exit
        for pair in first.windows(2) {
            assert!(pair[1].entry_time > pair[0].exit_time);
        }
        for t in &first {
            assert!(t.exit_time > t.entry_time);
            assert!(t.mae >= 0.0 && t.mfe >= 0.0);
            let expected = match t.direction {
                Direction::Long => t.exit_price - t.entry_price,
                Direction::Short => t.entry_price - t.exit_price,
            };
            assert_eq!(t.pnl(), expected);
            match t.exit_reason {
                ExitReason::StopLoss => assert!((t.pnl() + p.stop_loss).abs() < 1e-9),
                ExitReason::TakeProfit => assert!((t.pnl() - p.take_profit).abs() < 1e-9),
                ExitReason::TimeExit => {}
            }
        }
    }
}
