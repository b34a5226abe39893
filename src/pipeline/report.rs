//! Console reports

use edge_backtest::trading_core::{Metrics, StrategyParams};
use edge_backtest::Trade;

use super::store::RunRecord;
use super::sweep::SweepSummary;
use super::walkforward::WalkForwardSummary;

fn format_profit_factor(pf: f64) -> String {
    if pf.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.2}", pf)
    }
}

pub fn print_simulation(params: &StrategyParams, trades: &[Trade], metrics: &Metrics) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("                BREAKOUT STRATEGY RESULTS                   ");
    println!("═══════════════════════════════════════════════════════════\n");
    println!("Params: {}\n", params);

    if !trades.is_empty() {
        println!(
            "{:<20} {:<6} {:>10} {:<20} {:>10} {:>8} {:>8} {:>8} {:<5}",
            "Entry", "Dir", "Price", "Exit", "Price", "P&L", "MAE", "MFE", "Why"
        );
        for t in trades {
            println!(
                "{:<20} {:<6} {:>10.2} {:<20} {:>10.2} {:>+8.2} {:>8.2} {:>8.2} {:<5}",
                t.entry_time.format("%Y-%m-%d %H:%M").to_string(),
                t.direction.to_string(),
                t.entry_price,
                t.exit_time.format("%Y-%m-%d %H:%M").to_string(),
                t.exit_price,
                t.pnl(),
                t.mae,
                t.mfe,
                t.exit_reason.to_string()
            );
        }
        println!();
    }

    print_metrics(metrics);
}

pub fn print_metrics(m: &Metrics) {
    println!("Overall Performance:");
    println!("  Total Trades:    {}", m.trades);
    println!("  Win Rate:        {:.1}%", m.winrate * 100.0);
    println!("  Expectancy:      {:+.3} pts", m.expectancy);
    println!();
    println!("  Profit Factor:   {}", format_profit_factor(m.profit_factor));
    println!("  Sharpe Ratio:    {:.2}", m.sharpe);
    println!("  Max Drawdown:    {:.2} pts", m.max_drawdown);
    println!();
    println!("  Avg MAE:         {:.2} pts", m.avg_mae);
    println!("  Avg MFE:         {:.2} pts", m.avg_mfe);
}

pub fn print_top_runs(runs: &[RunRecord]) {
    println!("\nTop {} runs by expectancy:", runs.len());
    for (i, r) in runs.iter().enumerate() {
        let m = r.metrics();
        println!(
            "  {}. E={:+.3} PF={} Sharpe={:.2} Trades={} WR={:.1}% DD={:.1}",
            i + 1,
            m.expectancy,
            format_profit_factor(m.profit_factor),
            m.sharpe,
            m.trades,
            m.winrate * 100.0,
            m.max_drawdown
        );
        println!(
            "     sl={} tp={} bars={} lookback={} offset={} daily={} hourly={}  [{}]",
            r.stop_loss,
            r.take_profit,
            r.max_bars,
            r.breakout_lookback,
            r.entry_offset,
            r.daily_regime,
            r.hourly_regime,
            r.run_id
        );
    }
}

pub fn print_sweep_summary(summary: &SweepSummary, elapsed_secs: f64) {
    println!("\n=== SWEEP SUMMARY ===");
    println!("Assigned combinations: {}", summary.assigned);
    println!("Evaluated:             {}", summary.evaluated);
    println!("Skipped (invalid):     {}", summary.skipped);
    println!(
        "Completed in {:.1}s ({:.1} tests/second)",
        elapsed_secs,
        summary.evaluated as f64 / elapsed_secs.max(1e-9)
    );
}

pub fn print_walk_forward_summary(summary: &WalkForwardSummary) {
    println!("\n=== WALK-FORWARD SUMMARY ===");
    println!("Candidates:     {}", summary.candidates);
    println!("Rows appended:  {}", summary.rows_appended);
    println!("Splits skipped: {}", summary.splits_skipped);
}
