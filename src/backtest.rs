use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::calibration::{
    self, CalibrationBin, Metrics, Outcome, Prob3, calibration_bins, evaluate_probs,
};
use crate::config::BacktestConfig;
use crate::error::StoreError;
use crate::ev::{ev_percent, priced_with_margin};
use crate::match_store::{
    Lookback, MatchRecord, MatchRecordStore, MoneylinePrices, PointInTimeView, TeamView,
};

const CALIBRATION_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceSource {
    /// The price recorded for that match before kickoff.
    Actual,
    /// League base rates before the cutoff, with a margin applied.
    Simulated,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BetReason {
    PositiveEdge,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamStrength {
    pub season_win_rate: f64,
    pub recent_win_rate: f64,
    pub attack: f64,
    pub defense: f64,
}

impl TeamStrength {
    pub fn blended(&self) -> f64 {
        0.4 * self.season_win_rate + 0.6 * self.recent_win_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedBet {
    pub outcome: Outcome,
    pub probability: f64,
    pub reason: BetReason,
    pub price: Option<f64>,
    pub price_source: PriceSource,
    pub ev_percent: Option<f64>,
    pub stake: f64,
    pub won: bool,
    /// Stake plus winnings; `None` when unpriced.
    pub payoff: Option<f64>,
    pub profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestTrial {
    pub match_id: u64,
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub probabilities: Prob3,
    pub actual: Outcome,
    pub price_source: PriceSource,
    pub bet: Option<PlacedBet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrialOutcome {
    Predicted(BacktestTrial),
    Skipped { match_id: u64, reason: String },
}

/// Every query is answered from matches strictly before `cutoff`.
pub struct PointInTimeBacktester<'s, S: ?Sized> {
    view: PointInTimeView<'s, S>,
    cfg: BacktestConfig,
    strengths: RefCell<HashMap<String, Option<TeamStrength>>>,
}

impl<'s, S: MatchRecordStore + ?Sized> PointInTimeBacktester<'s, S> {
    pub fn new(store: &'s S, cutoff: NaiveDate, cfg: &BacktestConfig) -> Self {
        Self {
            view: PointInTimeView::new(store, cutoff),
            cfg: cfg.clone(),
            strengths: RefCell::new(HashMap::new()),
        }
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.view.cutoff()
    }

    fn since(&self) -> Option<NaiveDate> {
        Lookback::Years(self.cfg.lookback_years).since(self.cutoff())
    }

    pub fn team_strength(&self, team: &str) -> Result<Option<TeamStrength>, StoreError> {
        if let Some(hit) = self.strengths.borrow().get(team) {
            return Ok(*hit);
        }
        let rows = self.view.team_matches(team, self.cutoff(), self.since())?;
        let views: Vec<_> = rows.iter().filter_map(|m| m.view_for(team)).collect();
        let strength = if views.is_empty() {
            None
        } else {
            let win_rate = |vs: &[TeamView]| {
                vs.iter().filter(|v| v.points() == 3).count() as f64 / vs.len() as f64
            };
            let recent = &views[views.len().saturating_sub(self.cfg.form_window)..];
            let n = views.len() as f64;
            let avg_for = views.iter().map(|v| v.goals_for as f64).sum::<f64>() / n;
            let avg_against = views.iter().map(|v| v.goals_against as f64).sum::<f64>() / n;
            Some(TeamStrength {
                season_win_rate: win_rate(&views),
                recent_win_rate: win_rate(recent),
                attack: avg_for / self.cfg.league_avg_goals,
                defense: avg_against / self.cfg.league_avg_goals,
            })
        };
        self.strengths
            .borrow_mut()
            .insert(team.to_string(), strength);
        Ok(strength)
    }

    /// Moneyline distribution for the fixture, `None` if either side has no
    /// matches in the window.
    pub fn predict(&self, home: &str, away: &str) -> Result<Option<Prob3>, StoreError> {
        let (Some(h), Some(a)) = (self.team_strength(home)?, self.team_strength(away)?) else {
            return Ok(None);
        };
        let home_power = (h.blended() + self.cfg.home_advantage) * h.attack * a.defense;
        let away_power = a.blended() * a.attack * h.defense;
        let total = home_power + away_power + self.cfg.draw_weight;
        let raw = if total > 0.0 {
            Prob3 {
                home: home_power / total,
                draw: self.cfg.draw_weight / total,
                away: away_power / total,
            }
        } else {
            Prob3::uniform()
        };
        Ok(Some(raw.fit_to_bounds(self.cfg.bounds.min, self.cfg.bounds.max)))
    }

    /// League-wide outcome rates before the cutoff, priced with the margin.
    fn simulated_prices(&self) -> Result<Option<MoneylinePrices>, StoreError> {
        let rows = self.view.matches_between(self.since(), self.cutoff())?;
        if rows.is_empty() {
            return Ok(None);
        }
        let outcomes: Vec<Outcome> = rows.iter().map(MatchRecord::outcome).collect();
        let base = calibration::empirical_outcome_probs(&outcomes).fit_to_bounds(0.05, 0.90);
        Ok(Some(priced_with_margin(base, self.cfg.simulated_margin)))
    }

    fn prices_for(
        &self,
        record: &MatchRecord,
    ) -> Result<(Option<MoneylinePrices>, PriceSource), StoreError> {
        if let Some(p) = record.moneyline_prices.filter(MoneylinePrices::is_valid) {
            return Ok((Some(p), PriceSource::Actual));
        }
        if self.cfg.allow_simulated_prices
            && let Some(p) = self.simulated_prices()?
        {
            return Ok((Some(p), PriceSource::Simulated));
        }
        Ok((None, PriceSource::Missing))
    }

    /// EV edge first, then the most likely outcome if it is likely enough.
    pub fn select_bet(
        &self,
        probs: Prob3,
        prices: Option<&MoneylinePrices>,
    ) -> Option<(Outcome, BetReason)> {
        let edge = prices.and_then(|prices| {
            Outcome::ALL
                .into_iter()
                .map(|o| (o, probs.get(o), ev_percent(probs.get(o), prices.price(o))))
                .filter(|(_, p, ev)| {
                    *ev >= self.cfg.min_edge_ev_pct && *p >= self.cfg.min_edge_probability
                })
                .max_by(|a, b| a.2.total_cmp(&b.2))
                .map(|(o, _, _)| (o, BetReason::PositiveEdge))
        });
        edge.or_else(|| {
            let best = calibration::argmax(probs);
            (probs.get(best) >= self.cfg.fallback_probability)
                .then_some((best, BetReason::Fallback))
        })
    }

    /// Re-analyze `record` as of its own date. The record supplies only the
    /// result and its recorded price.
    pub fn run_trial(&self, record: &MatchRecord) -> Result<TrialOutcome, StoreError> {
        if record.date < self.cutoff() {
            return Ok(TrialOutcome::Skipped {
                match_id: record.id,
                reason: format!("match dated {} precedes cutoff {}", record.date, self.cutoff()),
            });
        }
        let Some(probs) = self.predict(&record.home_team, &record.away_team)? else {
            return Ok(TrialOutcome::Skipped {
                match_id: record.id,
                reason: "insufficient history before cutoff".to_string(),
            });
        };

        let actual = record.outcome();
        let (prices, price_source) = self.prices_for(record)?;
        let bet = self
            .select_bet(probs, prices.as_ref())
            .map(|(outcome, reason)| {
                let price = prices.map(|p| p.price(outcome));
                let won = outcome == actual;
                let stake = self.cfg.stake;
                let payoff = price.map(|p| if won { stake * p } else { 0.0 });
                PlacedBet {
                    outcome,
                    probability: probs.get(outcome),
                    reason,
                    price,
                    price_source,
                    ev_percent: price.map(|p| ev_percent(probs.get(outcome), p)),
                    stake,
                    won,
                    payoff,
                    profit: payoff.map(|r| r - stake),
                }
            });

        debug!(
            match_id = record.id,
            cutoff = %self.cutoff(),
            home = probs.home,
            draw = probs.draw,
            away = probs.away,
            bet = bet.is_some(),
            "trial"
        );

        Ok(TrialOutcome::Predicted(BacktestTrial {
            match_id: record.id,
            date: record.date,
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            probabilities: probs,
            actual,
            price_source,
            bet,
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvCalibration {
    pub positive_ev_bets: usize,
    pub positive_ev_hits: usize,
    pub positive_ev_hit_rate: f64,
    pub negative_ev_bets: usize,
    pub negative_ev_hits: usize,
    pub negative_ev_hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeBreakdown {
    pub outcome: Outcome,
    pub bets: usize,
    pub wins: usize,
    pub staked: f64,
    pub returned: f64,
    pub profit: f64,
    pub roi_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_trials: usize,
    pub skipped_trials: usize,
    pub bets_placed: usize,
    /// Bets with a price; only these enter stake/return/ROI.
    pub bets_settled: usize,
    pub unpriced_bets: usize,
    pub simulated_price_bets: usize,
    /// Over every placed bet, priced or not.
    pub wins: usize,
    pub win_rate: f64,
    pub total_staked: f64,
    pub total_return: f64,
    pub profit: f64,
    pub roi_percent: f64,
    pub ev_calibration: EvCalibration,
    pub per_outcome: Vec<OutcomeBreakdown>,
    pub accuracy: f64,
    pub metrics: Metrics,
    pub home_calibration: Vec<CalibrationBin>,
    /// True only when at least one bet settled and none at a simulated price.
    pub using_actual_historical_prices: bool,
    /// Ascending by date, then match id.
    pub trials: Vec<BacktestTrial>,
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

pub fn summarize_trials(
    from: NaiveDate,
    to: NaiveDate,
    outcomes: Vec<TrialOutcome>,
) -> BacktestReport {
    let mut trials = Vec::new();
    let mut skipped = 0usize;
    for o in outcomes {
        match o {
            TrialOutcome::Predicted(t) => trials.push(t),
            TrialOutcome::Skipped { .. } => skipped += 1,
        }
    }
    trials.sort_by(|a, b| a.date.cmp(&b.date).then(a.match_id.cmp(&b.match_id)));

    let bets: Vec<&PlacedBet> = trials.iter().filter_map(|t| t.bet.as_ref()).collect();
    let settled: Vec<&PlacedBet> = bets.iter().copied().filter(|b| b.payoff.is_some()).collect();
    // Results are known without a price; only money aggregates need one.
    let wins = bets.iter().filter(|b| b.won).count();
    let total_staked: f64 = settled.iter().map(|b| b.stake).sum();
    let total_return: f64 = settled.iter().filter_map(|b| b.payoff).sum();
    let profit = total_return - total_staked;

    let mut ev = EvCalibration::default();
    for b in &settled {
        let Some(e) = b.ev_percent else { continue };
        if e > 0.0 {
            ev.positive_ev_bets += 1;
            ev.positive_ev_hits += b.won as usize;
        } else {
            ev.negative_ev_bets += 1;
            ev.negative_ev_hits += b.won as usize;
        }
    }
    ev.positive_ev_hit_rate = ratio(ev.positive_ev_hits as f64, ev.positive_ev_bets as f64);
    ev.negative_ev_hit_rate = ratio(ev.negative_ev_hits as f64, ev.negative_ev_bets as f64);

    let per_outcome = Outcome::ALL
        .into_iter()
        .map(|outcome| {
            let of: Vec<&&PlacedBet> = settled.iter().filter(|b| b.outcome == outcome).collect();
            let staked: f64 = of.iter().map(|b| b.stake).sum();
            let returned: f64 = of.iter().filter_map(|b| b.payoff).sum();
            OutcomeBreakdown {
                outcome,
                bets: of.len(),
                wins: of.iter().filter(|b| b.won).count(),
                staked,
                returned,
                profit: returned - staked,
                roi_percent: ratio(returned - staked, staked) * 100.0,
            }
        })
        .collect();

    let predictions: Vec<Prob3> = trials.iter().map(|t| t.probabilities).collect();
    let actuals: Vec<Outcome> = trials.iter().map(|t| t.actual).collect();
    let metrics = evaluate_probs(&predictions, &actuals);
    let simulated_price_bets = settled
        .iter()
        .filter(|b| b.price_source == PriceSource::Simulated)
        .count();

    BacktestReport {
        from,
        to,
        total_trials: trials.len(),
        skipped_trials: skipped,
        bets_placed: bets.len(),
        bets_settled: settled.len(),
        unpriced_bets: bets.len() - settled.len(),
        simulated_price_bets,
        wins,
        win_rate: ratio(wins as f64, bets.len() as f64),
        total_staked,
        total_return,
        profit,
        roi_percent: ratio(profit, total_staked) * 100.0,
        ev_calibration: ev,
        per_outcome,
        accuracy: metrics.accuracy,
        metrics,
        home_calibration: calibration_bins(&predictions, &actuals, Outcome::Home, CALIBRATION_BINS),
        using_actual_historical_prices: !settled.is_empty() && simulated_price_bets == 0,
        trials,
    }
}

/// Replay every match dated in `[from, to]`, each trial against its own
/// point-in-time view. Trials run in parallel.
pub fn run_backtest<S>(
    store: &S,
    from: NaiveDate,
    to: NaiveDate,
    cfg: &BacktestConfig,
) -> Result<BacktestReport, StoreError>
where
    S: MatchRecordStore + ?Sized,
{
    let before = to.checked_add_days(Days::new(1)).unwrap_or(to);
    let targets = store.matches_between(Some(from), before)?;

    let outcomes = targets
        .par_iter()
        .map(|record| PointInTimeBacktester::new(store, record.date, cfg).run_trial(record))
        .collect::<Result<Vec<_>, _>>()?;

    let report = summarize_trials(from, to, outcomes);
    info!(
        trials = report.total_trials,
        skipped = report.skipped_trials,
        bets = report.bets_settled,
        win_rate = report.win_rate,
        roi_percent = report.roi_percent,
        actual_prices = report.using_actual_historical_prices,
        "backtest complete"
    );
    Ok(report)
}
