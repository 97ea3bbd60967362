use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calibration::Outcome;
use crate::config::EngineConfig;
use crate::error::{FeedError, ModelError};
use crate::form::{line_probability, period_scale, split_with_draw};
use crate::market::{Market, TotalStat};
use crate::models::{
    Abstention, Estimate, Fixture, ModelKind, ProbabilityModel, bounded_outcome,
};

const TRANSFER_SCALE: f64 = 300_000.0;

/// Per-team proxy signals from an external fantasy/transfer market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalTeamSignal {
    /// Average ownership percentage across the squad.
    pub ownership: f64,
    /// Share of the squad fit to play, 0..1.
    pub availability: f64,
    /// Net transfers in minus out.
    #[serde(default)]
    pub transfer_momentum: f64,
    #[serde(default)]
    pub price_rises: f64,
    #[serde(default)]
    pub price_falls: f64,
    /// Recent form on a 0..10 scale.
    pub form_metric: f64,
}

impl ExternalTeamSignal {
    pub fn strength_index(&self) -> f64 {
        (50.0
            + (self.ownership * 2.0).min(20.0)
            + 2.0 * self.form_metric
            + 20.0 * (self.availability - 0.5))
            .clamp(20.0, 80.0)
    }

    pub fn injury_impact(&self) -> f64 {
        0.5 * (self.availability - 0.8)
    }

    pub fn sentiment_score(&self) -> f64 {
        0.7 * (self.transfer_momentum / TRANSFER_SCALE).clamp(-1.0, 1.0)
            + 0.3 * (self.price_rises - self.price_falls) / 10.0
    }
}

pub type SignalTable = Arc<HashMap<String, ExternalTeamSignal>>;

pub trait ExternalSignalFeed {
    fn fetch_signals(&self) -> Result<HashMap<String, ExternalTeamSignal>, FeedError>;
}

/// Signals read from a JSON object keyed by team name.
pub struct JsonSignalFile {
    path: PathBuf,
}

impl JsonSignalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExternalSignalFeed for JsonSignalFile {
    fn fetch_signals(&self) -> Result<HashMap<String, ExternalTeamSignal>, FeedError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                FeedError::Unavailable(format!("no signal file at {}", self.path.display()))
            }
            _ => FeedError::Unavailable(format!("{}: {err}", self.path.display())),
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSignalFeed {
    signals: HashMap<String, ExternalTeamSignal>,
}

impl StaticSignalFeed {
    pub fn new(signals: HashMap<String, ExternalTeamSignal>) -> Self {
        Self { signals }
    }
}

impl ExternalSignalFeed for StaticSignalFeed {
    fn fetch_signals(&self) -> Result<HashMap<String, ExternalTeamSignal>, FeedError> {
        Ok(self.signals.clone())
    }
}

/// Fetch once for a whole pass; a failing feed only disables the sentiment model.
pub fn load_signals(feed: Option<&dyn ExternalSignalFeed>) -> Option<SignalTable> {
    let feed = feed?;
    match feed.fetch_signals() {
        Ok(table) => Some(Arc::new(table)),
        Err(err) => {
            warn!(error = %err, "external signal feed unavailable");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamSignalSummary {
    pub strength: f64,
    pub injury: f64,
    pub sentiment: f64,
    pub form_metric: f64,
}

/// Derived strength/injury/sentiment per team, memoized for one session.
pub struct SentimentExternalEngine {
    signals: Option<SignalTable>,
    cache: RefCell<HashMap<String, TeamSignalSummary>>,
    cfg: EngineConfig,
}

impl SentimentExternalEngine {
    pub fn new(signals: Option<SignalTable>, cfg: &EngineConfig) -> Self {
        Self {
            signals,
            cache: RefCell::new(HashMap::new()),
            cfg: cfg.clone(),
        }
    }

    pub fn team(&self, team: &str) -> Option<TeamSignalSummary> {
        if let Some(hit) = self.cache.borrow().get(team) {
            return Some(*hit);
        }
        let signal = self.signals.as_ref()?.get(team)?;
        let summary = TeamSignalSummary {
            strength: signal.strength_index(),
            injury: signal.injury_impact(),
            sentiment: signal.sentiment_score(),
            form_metric: signal.form_metric,
        };
        self.cache.borrow_mut().insert(team.to_string(), summary);
        Some(summary)
    }

    fn pair(
        &self,
        fixture: &Fixture,
    ) -> Result<(TeamSignalSummary, TeamSignalSummary), Abstention> {
        let missing = |team: &str| Abstention::MissingExternalSignal {
            team: team.to_string(),
        };
        let h = self.team(&fixture.home).ok_or_else(|| missing(&fixture.home))?;
        let a = self.team(&fixture.away).ok_or_else(|| missing(&fixture.away))?;
        Ok((h, a))
    }

    /// Raw home share before the draw split; `baseline_home` is the baseline
    /// model's home probability (0.5 when it abstained).
    pub fn raw_home_share(h: &TeamSignalSummary, a: &TeamSignalSummary, baseline_home: f64) -> f64 {
        let strength_prob = h.strength / (h.strength + a.strength);
        0.40 * strength_prob
            + 0.25 * (0.5 + (h.injury - a.injury) * 0.5)
            + 0.20 * (0.5 + (h.sentiment - a.sentiment) * 0.15)
            + 0.15 * baseline_home
    }

    pub fn expected_goals(&self, h: &TeamSignalSummary, a: &TeamSignalSummary) -> f64 {
        self.cfg.league_avg_total_goals
            + ((h.strength + a.strength) - 100.0) / 100.0
            + 2.0 * (h.injury + a.injury)
            + 0.3 * (h.sentiment + a.sentiment)
    }
}

pub struct SentimentExternalModel<'a> {
    engine: SentimentExternalEngine,
    baseline: Rc<dyn ProbabilityModel + 'a>,
    cfg: EngineConfig,
}

impl<'a> SentimentExternalModel<'a> {
    pub fn new(
        engine: SentimentExternalEngine,
        baseline: Rc<dyn ProbabilityModel + 'a>,
        cfg: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            baseline,
            cfg: cfg.clone(),
        }
    }
}

impl ProbabilityModel for SentimentExternalModel<'_> {
    fn kind(&self) -> ModelKind {
        ModelKind::SentimentExternal
    }

    fn estimate(&self, fixture: &Fixture, market: &Market) -> Result<Estimate, ModelError> {
        if let Market::Total {
            stat: TotalStat::Corners,
            ..
        } = market
        {
            return Ok(Estimate::Abstain(Abstention::UnsupportedMarket));
        }
        let (h, a) = match self.engine.pair(fixture) {
            Ok(pair) => pair,
            Err(reason) => return Ok(Estimate::Abstain(reason)),
        };

        match *market {
            Market::Moneyline(outcome) => {
                let baseline_home = self
                    .baseline
                    .estimate(fixture, &Market::Moneyline(Outcome::Home))?
                    .probability()
                    .unwrap_or(0.5);
                let raw = SentimentExternalEngine::raw_home_share(&h, &a, baseline_home);
                let similarity = 1.0 - ((h.form_metric - a.form_metric).abs() / 10.0).min(1.0);
                let p = split_with_draw(raw, similarity, &self.cfg);
                Ok(Estimate::Probability(bounded_outcome(p, outcome, &self.cfg)))
            }
            Market::Total {
                period, side, line, ..
            } => {
                let expected =
                    self.engine.expected_goals(&h, &a).max(0.0) * period_scale(period, &self.cfg);
                let p = line_probability(expected, line, side, self.cfg.line_slope);
                Ok(Estimate::Probability(self.cfg.bounds.clamp(p)))
            }
        }
    }

    fn explain(&self, fixture: &Fixture, market: &Market) -> String {
        let label = self.kind().label();
        match (self.engine.pair(fixture), self.estimate(fixture, market)) {
            (_, Err(err)) => format!("{label}: failed ({err})"),
            (_, Ok(Estimate::Abstain(reason))) => format!("{label}: abstained ({reason})"),
            (Ok((h, a)), Ok(Estimate::Probability(p))) => format!(
                "{label}: {market} = {:.1}% (strength {:.0} v {:.0}, injury {:+.2} v {:+.2}, \
                 sentiment {:+.2} v {:+.2})",
                p * 100.0,
                h.strength,
                a.strength,
                h.injury,
                a.injury,
                h.sentiment,
                a.sentiment
            ),
            (Err(reason), Ok(_)) => format!("{label}: abstained ({reason})"),
        }
    }
}
