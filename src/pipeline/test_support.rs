//! Synthetic candle data for pipeline tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use edge_backtest::trading_core::{CandleBundle, CandleDirectionLabeler, CandleSeries, RegimeLabeler};
use edge_backtest::Candle;

/// Random-walk fine bars with hourly and daily series aggregated from them
pub fn synthetic_bundle(start: DateTime<Utc>, step: Duration, n: usize, seed: u64) -> CandleBundle {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 4000.0;

    let fine: Vec<Candle> = (0..n)
        .map(|i| {
            let open: f64 = price;
            let close = open + rng.gen_range(-5.0..5.0);
            let high = open.max(close) + rng.gen_range(0.0..3.0);
            let low = open.min(close) - rng.gen_range(0.0..3.0);
            price = close;
            Candle {
                time: start + step * i as i32,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(0.0..1000.0),
            }
        })
        .collect();

    let hourly = aggregate(&fine, |t| {
        Utc.timestamp_opt(t.timestamp().div_euclid(3600) * 3600, 0).unwrap()
    });
    let daily = aggregate(&fine, |t| t.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc());

    let labeler = CandleDirectionLabeler;
    let hourly_labels = labeler.label(&hourly);
    let daily_labels = labeler.label(&daily);

    CandleBundle {
        fine: CandleSeries::unlabeled(fine),
        hourly: CandleSeries::new(hourly, hourly_labels).unwrap(),
        daily: CandleSeries::new(daily, daily_labels).unwrap(),
    }
}

/// Merge consecutive bars sharing a bucket start
fn aggregate(bars: &[Candle], bucket: impl Fn(DateTime<Utc>) -> DateTime<Utc>) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for bar in bars {
        let key = bucket(bar.time);
        match out.last_mut() {
            Some(agg) if agg.time == key => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => out.push(Candle { time: key, ..*bar }),
        }
    }
    out
}
