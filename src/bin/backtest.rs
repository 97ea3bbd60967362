use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;

use matchday_edge::backtest::run_backtest;
use matchday_edge::config::BacktestConfig;
use matchday_edge::historical_store::{SqliteStore, default_db_path};
use matchday_edge::logging::init_tracing;
use matchday_edge::report_export::export_backtest;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let db_path = parse_str_arg("--db")
        .map(PathBuf::from)
        .or_else(default_db_path)
        .context("unable to resolve sqlite path")?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open match store {}", db_path.display()))?;

    let (first, last) = store
        .date_range()?
        .ok_or_else(|| anyhow!("match store {} is empty", db_path.display()))?;
    let from = parse_date_arg("--from")?.unwrap_or(first);
    let to = parse_date_arg("--to")?.unwrap_or(last);
    if from > to {
        return Err(anyhow!("--from {from} is after --to {to}"));
    }

    let mut cfg = BacktestConfig::from_env();
    if has_flag("--simulate-prices") {
        cfg.allow_simulated_prices = true;
    }
    if let Some(ev) = parse_f64_arg("--min-ev") {
        cfg.min_edge_ev_pct = ev.clamp(0.0, 100.0);
    }

    let report = run_backtest(&store, from, to, &cfg).context("backtest aborted")?;

    println!("Backtest {} .. {} ({})", report.from, report.to, db_path.display());
    println!(
        "Trials: {} (skipped {})  Bets: {} settled / {} placed",
        report.total_trials, report.skipped_trials, report.bets_settled, report.bets_placed
    );
    println!(
        "Win rate: {:.1}%  Staked: {:.2}  Return: {:.2}  Profit: {:+.2}  ROI: {:+.2}%",
        report.win_rate * 100.0,
        report.total_staked,
        report.total_return,
        report.profit,
        report.roi_percent
    );
    println!(
        "Accuracy: {:.3}  Brier: {:.4}  LogLoss: {:.4}",
        report.accuracy, report.metrics.brier, report.metrics.log_loss
    );
    let ev = &report.ev_calibration;
    println!(
        "+EV bets: {} hit {:.1}%   -EV bets: {} hit {:.1}%",
        ev.positive_ev_bets,
        ev.positive_ev_hit_rate * 100.0,
        ev.negative_ev_bets,
        ev.negative_ev_hit_rate * 100.0
    );
    for o in &report.per_outcome {
        println!(
            "  {:<5} bets {:>5} wins {:>5} profit {:>+9.2} ROI {:>+7.2}%",
            o.outcome.label(),
            o.bets,
            o.wins,
            o.profit,
            o.roi_percent
        );
    }
    if report.simulated_price_bets > 0 {
        println!(
            "NOTE: {} bet(s) settled at simulated prices",
            report.simulated_price_bets
        );
    }
    if report.unpriced_bets > 0 {
        println!(
            "NOTE: {} bet(s) had no price and are excluded from ROI",
            report.unpriced_bets
        );
    }

    if let Some(out) = parse_str_arg("--xlsx").map(PathBuf::from) {
        let written = export_backtest(&out, &report)?;
        println!(
            "Wrote {} trial(s), {} bet(s) to {}",
            written.trials,
            written.bets,
            out.display()
        );
    }
    if let Some(out) = parse_str_arg("--json").map(PathBuf::from) {
        let body = serde_json::to_string_pretty(&report)?;
        std::fs::write(&out, body).with_context(|| format!("write {}", out.display()))?;
    }
    Ok(())
}

fn parse_date_arg(name: &str) -> Result<Option<NaiveDate>> {
    parse_str_arg(name)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("bad {name} {raw:?}, expected YYYY-MM-DD"))
        })
        .transpose()
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_str_arg(name).and_then(|raw| raw.parse::<f64>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
