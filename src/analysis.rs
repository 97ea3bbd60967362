use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyDetector, PriceAnomaly};
use crate::config::EngineConfig;
use crate::ensemble::{EnsembleCombiner, EnsembleResult};
use crate::error::StoreError;
use crate::ev::{ev_percent, implied_probability};
use crate::market::Market;
use crate::match_store::MatchRecordStore;
use crate::models::{Fixture, ModelKind, ModelSet};
use crate::odds_feed::{BookmakerQuoteFeed, QuoteEvent, find_event};
use crate::sentiment::{ExternalSignalFeed, SignalTable, load_signals};

/// Outcome of asking an external feed for data during one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FeedStatus {
    NotConfigured,
    Unavailable(String),
    Available { events: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketAnalysis {
    pub market: Market,
    pub model_probability: f64,
    pub implied_probability: Option<f64>,
    /// Baseline model estimate, for comparison.
    pub historical_probability: Option<f64>,
    pub ev_percent: Option<f64>,
    pub best_price: Option<f64>,
    pub quote_source: Option<String>,
    pub explanation: String,
    pub anomaly: Option<PriceAnomaly>,
    pub ensemble: EnsembleResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBetCandidate {
    pub market: Market,
    pub model_probability: f64,
    pub implied_probability: f64,
    pub historical_probability: Option<f64>,
    pub ev_percent: f64,
    pub best_price: f64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedMarket {
    pub specifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureAnalysis {
    pub fixture: Fixture,
    pub as_of: NaiveDate,
    pub markets: Vec<MarketAnalysis>,
    /// Highest EV first.
    pub value_bets: Vec<ValueBetCandidate>,
    pub rejected: Vec<RejectedMarket>,
    pub quote_feed: FeedStatus,
    pub signal_feed: FeedStatus,
}

/// External data fetched once for a whole pass over any number of fixtures.
pub struct PassInputs {
    events: Vec<QuoteEvent>,
    quote_status: FeedStatus,
    signals: Option<SignalTable>,
    signal_status: FeedStatus,
}

impl PassInputs {
    pub fn fetch(
        quote_feed: Option<&dyn BookmakerQuoteFeed>,
        league: &str,
        signal_feed: Option<&dyn ExternalSignalFeed>,
    ) -> Self {
        let (events, quote_status) = match quote_feed {
            None => (Vec::new(), FeedStatus::NotConfigured),
            Some(feed) => match feed.fetch(league) {
                Ok(events) => {
                    let n = events.len();
                    (events, FeedStatus::Available { events: n })
                }
                Err(err) => {
                    warn!(error = %err, league, "bookmaker feed unavailable");
                    (Vec::new(), FeedStatus::Unavailable(err.to_string()))
                }
            },
        };

        let signals = load_signals(signal_feed);
        let signal_status = match (signal_feed, &signals) {
            (None, _) => FeedStatus::NotConfigured,
            (Some(_), None) => FeedStatus::Unavailable("signal feed failed".to_string()),
            (Some(_), Some(table)) => FeedStatus::Available {
                events: table.len(),
            },
        };

        Self {
            events,
            quote_status,
            signals,
            signal_status,
        }
    }

    pub fn offline() -> Self {
        Self::fetch(None, "", None)
    }

    pub fn quote_status(&self) -> &FeedStatus {
        &self.quote_status
    }
}

/// Analyze one fixture across `specifiers`. A malformed specifier rejects
/// only itself; a failing model only drops out of the ensemble. Only a store
/// failure aborts.
pub fn analyze_fixture<S>(
    store: S,
    as_of: NaiveDate,
    fixture: &Fixture,
    specifiers: &[String],
    inputs: &PassInputs,
    cfg: &EngineConfig,
) -> Result<FixtureAnalysis, StoreError>
where
    S: MatchRecordStore + Clone,
{
    // Surface an unreachable store before any model swallows it.
    store.head_to_head(&fixture.home, &fixture.away, as_of, 1)?;

    let models = ModelSet::new(store, as_of, cfg, inputs.signals.clone());
    let combiner = EnsembleCombiner::new(cfg);
    let detector = AnomalyDetector::new(cfg.anomaly_threshold_pct);
    let event = find_event(&inputs.events, fixture);
    if event.is_none() && !inputs.events.is_empty() {
        debug!(home = %fixture.home, away = %fixture.away, "no bookmaker event for fixture");
    }

    let mut markets = Vec::new();
    let mut rejected = Vec::new();
    for spec in specifiers {
        let market: Market = match spec.parse() {
            Ok(m) => m,
            Err(err) => {
                warn!(specifier = %spec, error = %err, "rejected market specifier");
                rejected.push(RejectedMarket {
                    specifier: spec.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let quotes = event.map(|e| e.quotes_for(&market)).unwrap_or_default();
        let anomaly = detector.detect(&quotes);
        let ensemble = combiner.run(&models, fixture, &market, anomaly.as_ref());

        let best = quotes
            .iter()
            .max_by(|a, b| a.price.total_cmp(&b.price))
            .cloned();
        let historical_probability = models
            .get(ModelKind::Baseline)
            .and_then(|m| m.estimate(fixture, &market).ok())
            .and_then(|e| e.probability());

        let mut explanation = vec![format!(
            "ensemble {:.1}% from {} model(s), {} abstained, {} failed",
            ensemble.probability * 100.0,
            ensemble.votes.len(),
            ensemble.abstained.len(),
            ensemble.failed.len()
        )];
        if ensemble.anomaly_bonus > 0.0 {
            explanation.push(format!(
                "price anomaly bonus +{:.1}pp",
                ensemble.anomaly_bonus * 100.0
            ));
        }
        explanation.extend(models.iter().map(|m| m.explain(fixture, &market)));

        markets.push(MarketAnalysis {
            market,
            model_probability: ensemble.probability,
            implied_probability: best.as_ref().map(|q| implied_probability(q.price)),
            historical_probability,
            ev_percent: best
                .as_ref()
                .filter(|_| ensemble.has_votes())
                .map(|q| ev_percent(ensemble.probability, q.price)),
            best_price: best.as_ref().map(|q| q.price),
            quote_source: best.map(|q| q.source),
            explanation: explanation.join("\n"),
            anomaly,
            ensemble,
        });
    }

    let mut value_bets: Vec<ValueBetCandidate> = markets
        .iter()
        .filter_map(|m| {
            let ev = m.ev_percent?;
            if ev < cfg.value_bet_min_ev_pct {
                return None;
            }
            Some(ValueBetCandidate {
                market: m.market,
                model_probability: m.model_probability,
                implied_probability: m.implied_probability?,
                historical_probability: m.historical_probability,
                ev_percent: ev,
                best_price: m.best_price?,
                source: m.quote_source.clone()?,
            })
        })
        .collect();
    value_bets.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));

    info!(
        home = %fixture.home,
        away = %fixture.away,
        markets = markets.len(),
        rejected = rejected.len(),
        value_bets = value_bets.len(),
        "fixture analyzed"
    );

    Ok(FixtureAnalysis {
        fixture: fixture.clone(),
        as_of,
        markets,
        value_bets,
        rejected,
        quote_feed: inputs.quote_status.clone(),
        signal_feed: inputs.signal_status.clone(),
    })
}
