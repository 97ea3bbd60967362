use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::backtest::{BacktestReport, BacktestTrial, PriceSource};

pub struct ExportSummary {
    pub trials: usize,
    pub bets: usize,
    pub calibration_rows: usize,
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt4(v: f64) -> String {
    format!("{v:.4}")
}

fn source_label(source: PriceSource) -> &'static str {
    match source {
        PriceSource::Actual => "actual",
        PriceSource::Simulated => "simulated",
        PriceSource::Missing => "missing",
    }
}

fn summary_rows(report: &BacktestReport) -> Vec<Vec<String>> {
    let pair = |k: &str, v: String| vec![k.to_string(), v];
    vec![
        header(&["Metric", "Value"]),
        pair("From", report.from.to_string()),
        pair("To", report.to.to_string()),
        pair("Trials", report.total_trials.to_string()),
        pair("Skipped", report.skipped_trials.to_string()),
        pair("Bets placed", report.bets_placed.to_string()),
        pair("Bets settled", report.bets_settled.to_string()),
        pair("Unpriced bets", report.unpriced_bets.to_string()),
        pair("Simulated-price bets", report.simulated_price_bets.to_string()),
        pair("Wins", report.wins.to_string()),
        pair("Win rate", fmt4(report.win_rate)),
        pair("Staked", fmt4(report.total_staked)),
        pair("Returned", fmt4(report.total_return)),
        pair("Profit", fmt4(report.profit)),
        pair("ROI %", fmt4(report.roi_percent)),
        pair("Accuracy", fmt4(report.accuracy)),
        pair("Brier", fmt4(report.metrics.brier)),
        pair("Log loss", fmt4(report.metrics.log_loss)),
        pair(
            "+EV hit rate",
            fmt4(report.ev_calibration.positive_ev_hit_rate),
        ),
        pair(
            "-EV hit rate",
            fmt4(report.ev_calibration.negative_ev_hit_rate),
        ),
        pair(
            "Actual historical prices",
            if report.using_actual_historical_prices {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ),
    ]
}

fn trial_row(t: &BacktestTrial) -> Vec<String> {
    let bet = t.bet.as_ref();
    vec![
        t.match_id.to_string(),
        t.date.to_string(),
        t.home_team.clone(),
        t.away_team.clone(),
        fmt4(t.probabilities.home),
        fmt4(t.probabilities.draw),
        fmt4(t.probabilities.away),
        t.actual.label().to_string(),
        source_label(t.price_source).to_string(),
        opt_to_string(bet.map(|b| b.outcome.label())),
        opt_to_string(bet.map(|b| format!("{:?}", b.reason))),
        opt_to_string(bet.and_then(|b| b.price)),
        opt_to_string(bet.and_then(|b| b.ev_percent).map(fmt4)),
        opt_to_string(bet.and_then(|b| b.profit).map(fmt4)),
    ]
}

/// Write the report as a workbook with summary, per-outcome, calibration and
/// per-trial sheets.
pub fn export_backtest(path: &Path, report: &BacktestReport) -> Result<ExportSummary> {
    let summary = summary_rows(report);

    let mut outcome_rows = vec![header(&[
        "Outcome", "Bets", "Wins", "Staked", "Returned", "Profit", "ROI %",
    ])];
    for o in &report.per_outcome {
        outcome_rows.push(vec![
            o.outcome.label().to_string(),
            o.bets.to_string(),
            o.wins.to_string(),
            fmt4(o.staked),
            fmt4(o.returned),
            fmt4(o.profit),
            fmt4(o.roi_percent),
        ]);
    }

    let mut calibration_rows = vec![header(&[
        "Bucket start",
        "Bucket end",
        "Count",
        "Avg predicted",
        "Actual rate",
    ])];
    for b in report.home_calibration.iter().filter(|b| b.count > 0) {
        calibration_rows.push(vec![
            fmt4(b.bucket_start),
            fmt4(b.bucket_end),
            b.count.to_string(),
            fmt4(b.avg_pred),
            fmt4(b.actual_rate),
        ]);
    }

    let mut trial_rows = vec![header(&[
        "Match ID", "Date", "Home", "Away", "P(home)", "P(draw)", "P(away)", "Actual",
        "Price source", "Bet", "Reason", "Price", "EV %", "Profit",
    ])];
    trial_rows.extend(report.trials.iter().map(trial_row));

    let mut workbook = Workbook::new();
    for (name, rows) in [
        ("Summary", &summary),
        ("ByOutcome", &outcome_rows),
        ("HomeCalibration", &calibration_rows),
        ("Trials", &trial_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        trials: report.trials.len(),
        bets: report.bets_placed,
        calibration_rows: calibration_rows.len().saturating_sub(1),
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
