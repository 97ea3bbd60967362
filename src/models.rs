use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::{Outcome, Prob3};
use crate::config::EngineConfig;
use crate::error::{ModelError, StoreError};
use crate::form::{FormMomentumEngine, line_probability};
use crate::market::{Market, Period, Side, TotalStat};
use crate::match_store::{Lookback, MatchRecordStore, Venue};
use crate::sentiment::{SentimentExternalEngine, SentimentExternalModel, SignalTable};
use crate::team_stats::{TeamStatsAggregator, TeamWindowStats, empirical_side_frequency};

const TOTALS_LOOKBACK: Lookback = Lookback::Years(3);
const GOAL_DIFF_ADJUSTMENT: f64 = 0.05;
const ADJUSTED_RATE_FLOOR: f64 = 0.05;
const CURRENT_SEASON_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Baseline,
    OpponentAdjusted,
    MultiFactor,
    FormMomentum,
    SentimentExternal,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Baseline,
        ModelKind::OpponentAdjusted,
        ModelKind::MultiFactor,
        ModelKind::FormMomentum,
        ModelKind::SentimentExternal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::OpponentAdjusted => "opponent_adjusted",
            ModelKind::MultiFactor => "multi_factor",
            ModelKind::FormMomentum => "form_momentum",
            ModelKind::SentimentExternal => "sentiment_external",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fixture {
    pub home: String,
    pub away: String,
}

impl Fixture {
    pub fn new(home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
        }
    }
}

/// Why a model produced no estimate. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Abstention {
    InsufficientData { team: String },
    MissingExternalSignal { team: String },
    UnsupportedMarket,
}

impl fmt::Display for Abstention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abstention::InsufficientData { team } => write!(f, "no matches in window for {team}"),
            Abstention::MissingExternalSignal { team } => {
                write!(f, "no external signal for {team}")
            }
            Abstention::UnsupportedMarket => f.write_str("market not supported by this model"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Estimate {
    Probability(f64),
    Abstain(Abstention),
}

impl Estimate {
    pub fn probability(&self) -> Option<f64> {
        match self {
            Estimate::Probability(p) => Some(*p),
            Estimate::Abstain(_) => None,
        }
    }

    fn insufficient(team: &str) -> Self {
        Estimate::Abstain(Abstention::InsufficientData {
            team: team.to_string(),
        })
    }
}

/// One probability estimator. Outputs lie inside the configured bounds.
pub trait ProbabilityModel {
    fn kind(&self) -> ModelKind;

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError>;

    fn explain(&self, fixture: &Fixture, market: &Market) -> String;
}

/// Three-way distribution that sums to 1 with every outcome inside bounds.
pub(crate) fn bounded_outcome(p: Prob3, outcome: Outcome, cfg: &EngineConfig) -> f64 {
    p.fit_to_bounds(cfg.bounds.min, cfg.bounds.max).get(outcome)
}

fn explain_with(
    model: &dyn ProbabilityModel,
    fixture: &Fixture,
    market: &Market,
    detail: String,
) -> String {
    match model.estimate(fixture, market) {
        Ok(Estimate::Probability(p)) => format!(
            "{}: {market} for {} v {} = {:.1}% ({detail})",
            model.kind().label(),
            fixture.home,
            fixture.away,
            p * 100.0
        ),
        Ok(Estimate::Abstain(reason)) => format!("{}: abstained ({reason})", model.kind().label()),
        Err(err) => format!("{}: failed ({err})", model.kind().label()),
    }
}

/// Windowed team stats for one as-of date, memoized per (team, venue, window).
pub struct StatsContext<S> {
    aggregator: TeamStatsAggregator<S>,
    as_of: NaiveDate,
    cfg: EngineConfig,
    cache: RefCell<HashMap<(String, Venue, Lookback), Option<Rc<TeamWindowStats>>>>,
}

impl<S: MatchRecordStore> StatsContext<S> {
    pub fn new(store: S, as_of: NaiveDate, cfg: &EngineConfig) -> Self {
        Self {
            aggregator: TeamStatsAggregator::new(store),
            as_of,
            cfg: cfg.clone(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn stats(
        &self,
        team: &str,
        venue: Venue,
        lookback: Lookback,
    ) -> Result<Option<Rc<TeamWindowStats>>, StoreError> {
        let key = (team.to_string(), venue, lookback);
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let stats = self
            .aggregator
            .team_stats(team, venue, lookback, self.as_of)?
            .map(Rc::new);
        self.cache.borrow_mut().insert(key, stats.clone());
        Ok(stats)
    }

    /// Home side at home and away side away, or the first team with no data.
    fn venue_pair(
        &self,
        fixture: &Fixture,
        lookback: Lookback,
    ) -> Result<Result<(Rc<TeamWindowStats>, Rc<TeamWindowStats>), Estimate>, StoreError> {
        let Some(home) = self.stats(&fixture.home, Venue::Home, lookback)? else {
            return Ok(Err(Estimate::insufficient(&fixture.home)));
        };
        let Some(away) = self.stats(&fixture.away, Venue::Away, lookback)? else {
            return Ok(Err(Estimate::insufficient(&fixture.away)));
        };
        Ok(Ok((home, away)))
    }

    fn first_half_corners_estimated(&self, fixture: &Fixture) -> bool {
        matches!(
            self.venue_pair(fixture, TOTALS_LOOKBACK),
            Ok(Ok((h, a))) if h.first_half_corners_estimated || a.first_half_corners_estimated
        )
    }

    fn pooled_sample(
        home: &TeamWindowStats,
        away: &TeamWindowStats,
        period: Period,
        stat: TotalStat,
    ) -> Vec<u32> {
        let mut sample = home.totals_sample(period, stat).to_vec();
        sample.extend_from_slice(away.totals_sample(period, stat));
        sample
    }
}

/// Current-season win rates with the mean draw rate; empirical totals.
pub struct BaselineModel<S> {
    ctx: Rc<StatsContext<S>>,
}

impl<S: MatchRecordStore> BaselineModel<S> {
    pub fn new(ctx: Rc<StatsContext<S>>) -> Self {
        Self { ctx }
    }
}

impl<S: MatchRecordStore> ProbabilityModel for BaselineModel<S> {
    fn kind(&self) -> ModelKind {
        ModelKind::Baseline
    }

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError> {
        let cfg = self.ctx.config();
        match *market {
            Market::Moneyline(outcome) => {
                let (h, a) = match self.ctx.venue_pair(fixture, Lookback::Seasons(1))? {
                    Ok(pair) => pair,
                    Err(abstain) => return Ok(abstain),
                };
                let p = Prob3 {
                    home: h.overall.win_rate(),
                    draw: (h.overall.draw_rate() + a.overall.draw_rate()) / 2.0,
                    away: a.overall.win_rate(),
                }
                .normalized();
                Ok(Estimate::Probability(bounded_outcome(p, outcome, cfg)))
            }
            Market::Total {
                period,
                stat,
                side,
                line,
            } => {
                // Pool whichever side has history; abstain only if neither does.
                let h = self.ctx.stats(&fixture.home, Venue::Home, TOTALS_LOOKBACK)?;
                let a = self.ctx.stats(&fixture.away, Venue::Away, TOTALS_LOOKBACK)?;
                if h.is_none() && a.is_none() {
                    return Ok(Estimate::insufficient(&fixture.home));
                }
                let sample: Vec<u32> = h
                    .iter()
                    .chain(a.iter())
                    .flat_map(|s| s.totals_sample(period, stat).iter().copied())
                    .collect();
                let p = empirical_side_frequency(&sample, line, side == Side::Over).unwrap_or(0.5);
                Ok(Estimate::Probability(cfg.bounds.clamp(p)))
            }
        }
    }

    fn explain(&self, fixture: &Fixture, market: &Market) -> String {
        let detail = match market {
            Market::Moneyline(_) => "current-season venue win rates, mean draw rate".to_string(),
            Market::Total { .. } => "empirical frequency over pooled venue totals".to_string(),
        };
        explain_with(self, fixture, market, detail)
    }
}

/// Baseline shifted by the venue goal-difference gap; totals from attack and
/// defense averages.
pub struct OpponentAdjustedModel<S> {
    ctx: Rc<StatsContext<S>>,
}

impl<S: MatchRecordStore> OpponentAdjustedModel<S> {
    pub fn new(ctx: Rc<StatsContext<S>>) -> Self {
        Self { ctx }
    }
}

impl<S: MatchRecordStore> ProbabilityModel for OpponentAdjustedModel<S> {
    fn kind(&self) -> ModelKind {
        ModelKind::OpponentAdjusted
    }

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError> {
        let cfg = self.ctx.config();
        match *market {
            Market::Moneyline(outcome) => {
                let (h, a) = match self.ctx.venue_pair(fixture, Lookback::Seasons(1))? {
                    Ok(pair) => pair,
                    Err(abstain) => return Ok(abstain),
                };
                let adj = GOAL_DIFF_ADJUSTMENT
                    * (h.overall.goal_diff_per_match() - a.overall.goal_diff_per_match());
                let p = Prob3 {
                    home: (h.overall.win_rate() + adj).max(ADJUSTED_RATE_FLOOR),
                    draw: (h.overall.draw_rate() + a.overall.draw_rate()) / 2.0,
                    away: (a.overall.win_rate() - adj).max(ADJUSTED_RATE_FLOOR),
                }
                .normalized();
                Ok(Estimate::Probability(bounded_outcome(p, outcome, cfg)))
            }
            Market::Total {
                period,
                stat,
                side,
                line,
            } => {
                let (h, a) = match self.ctx.venue_pair(fixture, TOTALS_LOOKBACK)? {
                    Ok(pair) => pair,
                    Err(abstain) => return Ok(abstain),
                };
                let hp = h.period(period);
                let ap = a.period(period);
                let expected = (hp.attack(stat) + ap.defense(stat)) / 2.0
                    + (ap.attack(stat) + hp.defense(stat)) / 2.0;
                let p = line_probability(expected, line, side, cfg.opponent_line_slope);
                Ok(Estimate::Probability(cfg.bounds.clamp(p)))
            }
        }
    }

    fn explain(&self, fixture: &Fixture, market: &Market) -> String {
        let detail = match market {
            Market::Moneyline(_) => format!(
                "win rates shifted by {GOAL_DIFF_ADJUSTMENT} per goal of goal-difference gap"
            ),
            Market::Total { .. } => "attack v opposing defense per period".to_string(),
        };
        explain_with(self, fixture, market, detail)
    }
}

/// Current and two-season win rates blended, plus a home edge; totals damped
/// toward even by sample size.
pub struct MultiFactorModel<S> {
    ctx: Rc<StatsContext<S>>,
}

impl<S: MatchRecordStore> MultiFactorModel<S> {
    pub fn new(ctx: Rc<StatsContext<S>>) -> Self {
        Self { ctx }
    }
}

impl<S: MatchRecordStore> ProbabilityModel for MultiFactorModel<S> {
    fn kind(&self) -> ModelKind {
        ModelKind::MultiFactor
    }

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError> {
        let cfg = self.ctx.config();
        match *market {
            Market::Moneyline(outcome) => {
                let (h2, a2) = match self.ctx.venue_pair(fixture, Lookback::Seasons(2))? {
                    Ok(pair) => pair,
                    Err(abstain) => return Ok(abstain),
                };
                // Early in a season the current window can be empty.
                let h1 = self
                    .ctx
                    .stats(&fixture.home, Venue::Home, Lookback::Seasons(1))?
                    .unwrap_or_else(|| Rc::clone(&h2));
                let a1 = self
                    .ctx
                    .stats(&fixture.away, Venue::Away, Lookback::Seasons(1))?
                    .unwrap_or_else(|| Rc::clone(&a2));

                let blend = |cur: f64, two: f64| {
                    CURRENT_SEASON_WEIGHT * cur + (1.0 - CURRENT_SEASON_WEIGHT) * two
                };
                let p = Prob3 {
                    home: blend(h1.overall.win_rate(), h2.overall.win_rate())
                        + cfg.complex_home_advantage,
                    draw: (h1.overall.draw_rate() + a1.overall.draw_rate()) / 2.0,
                    away: blend(a1.overall.win_rate(), a2.overall.win_rate()),
                }
                .normalized();
                Ok(Estimate::Probability(bounded_outcome(p, outcome, cfg)))
            }
            Market::Total {
                period,
                stat,
                side,
                line,
            } => {
                let (h, a) = match self.ctx.venue_pair(fixture, TOTALS_LOOKBACK)? {
                    Ok(pair) => pair,
                    Err(abstain) => return Ok(abstain),
                };
                let sample = StatsContext::<S>::pooled_sample(&h, &a, period, stat);
                let full_confidence = match stat {
                    TotalStat::Goals => cfg.goals_confidence_sample,
                    TotalStat::Corners => cfg.corners_confidence_sample,
                };
                let p = damped_frequency(&sample, line, side, full_confidence);
                Ok(Estimate::Probability(cfg.bounds.clamp(p)))
            }
        }
    }

    fn explain(&self, fixture: &Fixture, market: &Market) -> String {
        let cfg = self.ctx.config();
        let detail = match market {
            Market::Moneyline(_) => format!(
                "0.7 current + 0.3 two-season win rate, home edge {:.2}",
                cfg.complex_home_advantage
            ),
            Market::Total {
                period: Period::FirstHalf,
                stat: TotalStat::Corners,
                ..
            } if self.ctx.first_half_corners_estimated(fixture) => {
                "empirical frequency damped by sample size; first-half corners partly \
                 estimated at 40% of full-time"
                    .to_string()
            }
            Market::Total { .. } => "empirical frequency damped by sample size".to_string(),
        };
        explain_with(self, fixture, market, detail)
    }
}

/// Empirical side frequency pulled toward 0.5 until the sample reaches
/// `full_confidence` matches.
pub fn damped_frequency(sample: &[u32], line: f64, side: Side, full_confidence: f64) -> f64 {
    let Some(freq) = empirical_side_frequency(sample, line, side == Side::Over) else {
        return 0.5;
    };
    if full_confidence <= 0.0 {
        return freq;
    }
    let confidence = (sample.len() as f64 / full_confidence).min(1.0);
    freq * confidence + 0.5 * (1.0 - confidence)
}

/// ELO, form, head-to-head and momentum via [`FormMomentumEngine`].
pub struct FormMomentumModel<S> {
    engine: Rc<FormMomentumEngine<S>>,
    cfg: EngineConfig,
}

impl<S: MatchRecordStore> FormMomentumModel<S> {
    pub fn new(engine: Rc<FormMomentumEngine<S>>, cfg: &EngineConfig) -> Self {
        Self {
            engine,
            cfg: cfg.clone(),
        }
    }

    fn missing_form(&self, fixture: &Fixture) -> Result<Estimate, ModelError> {
        let team = if self.engine.recent_form(&fixture.home, Venue::Home)?.is_none() {
            &fixture.home
        } else {
            &fixture.away
        };
        Ok(Estimate::insufficient(team))
    }
}

impl<S: MatchRecordStore> ProbabilityModel for FormMomentumModel<S> {
    fn kind(&self) -> ModelKind {
        ModelKind::FormMomentum
    }

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError> {
        match *market {
            Market::Moneyline(outcome) => {
                match self.engine.moneyline(&fixture.home, &fixture.away)? {
                    Some(p) => Ok(Estimate::Probability(bounded_outcome(p, outcome, &self.cfg))),
                    None => self.missing_form(fixture),
                }
            }
            Market::Total {
                period,
                stat,
                side,
                line,
            } => {
                let Some(expected) =
                    self.engine
                        .expected_total(&fixture.home, &fixture.away, period, stat)?
                else {
                    return self.missing_form(fixture);
                };
                let p = line_probability(expected, line, side, self.cfg.line_slope);
                Ok(Estimate::Probability(self.cfg.bounds.clamp(p)))
            }
        }
    }

    fn explain(&self, fixture: &Fixture, market: &Market) -> String {
        let detail = match (
            self.engine.elo(&fixture.home),
            self.engine.elo(&fixture.away),
        ) {
            (Ok(h), Ok(a)) => format!("elo {h:.0} v {a:.0}, form/h2h/momentum blend"),
            _ => "elo unavailable".to_string(),
        };
        explain_with(self, fixture, market, detail)
    }
}

/// Every model for one analysis session, all bound to the same as-of date.
pub struct ModelSet<'a> {
    models: Vec<Rc<dyn ProbabilityModel + 'a>>,
}

impl<'a> ModelSet<'a> {
    pub fn new<S>(
        store: S,
        as_of: NaiveDate,
        cfg: &EngineConfig,
        signals: Option<SignalTable>,
    ) -> Self
    where
        S: MatchRecordStore + Clone + 'a,
    {
        let ctx = Rc::new(StatsContext::new(store.clone(), as_of, cfg));
        let baseline: Rc<dyn ProbabilityModel + 'a> =
            Rc::new(BaselineModel::new(Rc::clone(&ctx)));
        let engine = Rc::new(FormMomentumEngine::new(store, as_of, cfg));
        let sentiment = SentimentExternalModel::new(
            SentimentExternalEngine::new(signals, cfg),
            Rc::clone(&baseline),
            cfg,
        );
        debug!(%as_of, "model set built");
        Self {
            models: vec![
                baseline,
                Rc::new(OpponentAdjustedModel::new(Rc::clone(&ctx))),
                Rc::new(MultiFactorModel::new(ctx)),
                Rc::new(FormMomentumModel::new(engine, cfg)),
                Rc::new(sentiment),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn ProbabilityModel + 'a)> {
        self.models.iter().map(|m| m.as_ref())
    }

    pub fn get(&self, kind: ModelKind) -> Option<&(dyn ProbabilityModel + 'a)> {
        self.iter().find(|m| m.kind() == kind)
    }
}
