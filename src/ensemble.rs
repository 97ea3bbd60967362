use serde::Serialize;
use tracing::{debug, warn};

use crate::anomaly::PriceAnomaly;
use crate::config::{EngineConfig, EnsembleWeights, ProbabilityBounds};
use crate::error::ModelError;
use crate::market::Market;
use crate::models::{Abstention, Estimate, Fixture, ModelKind, ModelSet};

const NEUTRAL_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelVote {
    pub kind: ModelKind,
    pub probability: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    pub probability: f64,
    /// Weights are renormalized over these only.
    pub votes: Vec<ModelVote>,
    pub abstained: Vec<(ModelKind, Abstention)>,
    pub failed: Vec<(ModelKind, String)>,
    pub anomaly_bonus: f64,
}

impl EnsembleResult {
    pub fn has_votes(&self) -> bool {
        !self.votes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    weights: EnsembleWeights,
    bonus_share: f64,
    bonus_cap: f64,
    bounds: ProbabilityBounds,
}

impl EnsembleCombiner {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            weights: cfg.weights,
            bonus_share: cfg.anomaly_bonus_share,
            bonus_cap: cfg.anomaly_bonus_cap,
            bounds: cfg.bounds,
        }
    }

    /// Blend per-model outcomes. Models without a weight are ignored; an
    /// abstaining or failing model leaves the denominator entirely.
    pub fn combine<I>(
        &self,
        market: &Market,
        outcomes: I,
        anomaly: Option<&PriceAnomaly>,
    ) -> EnsembleResult
    where
        I: IntoIterator<Item = (ModelKind, Result<Estimate, ModelError>)>,
    {
        let mut votes = Vec::new();
        let mut abstained = Vec::new();
        let mut failed = Vec::new();

        for (kind, outcome) in outcomes {
            let Some(weight) = self.weights.weight_for(kind) else {
                continue;
            };
            match outcome {
                Ok(Estimate::Probability(p)) => votes.push(ModelVote {
                    kind,
                    probability: p,
                    weight,
                }),
                Ok(Estimate::Abstain(reason)) => {
                    debug!(model = kind.label(), %market, %reason, "model abstained");
                    abstained.push((kind, reason));
                }
                Err(err) => {
                    warn!(model = kind.label(), %market, error = %err, "model failed");
                    failed.push((kind, err.to_string()));
                }
            }
        }

        let total_weight: f64 = votes.iter().map(|v| v.weight).sum();
        let blended = if total_weight > 0.0 {
            votes.iter().map(|v| v.probability * v.weight).sum::<f64>() / total_weight
        } else {
            NEUTRAL_PROBABILITY
        };

        let anomaly_bonus = match anomaly {
            Some(a) if market.is_moneyline() && a.is_anomaly && total_weight > 0.0 => {
                a.pct_better / 100.0 * self.bonus_share
            }
            _ => 0.0,
        };
        let probability = if anomaly_bonus > 0.0 {
            self.bounds.clamp((blended + anomaly_bonus).min(self.bonus_cap))
        } else {
            self.bounds.clamp(blended)
        };

        EnsembleResult {
            probability,
            votes,
            abstained,
            failed,
            anomaly_bonus,
        }
    }

    /// Run every weighted model of the set on one market and blend.
    pub fn run(
        &self,
        models: &ModelSet<'_>,
        fixture: &Fixture,
        market: &Market,
        anomaly: Option<&PriceAnomaly>,
    ) -> EnsembleResult {
        let outcomes = models
            .iter()
            .filter(|m| self.weights.weight_for(m.kind()).is_some())
            .map(|m| (m.kind(), m.estimate(fixture, market)));
        self.combine(market, outcomes, anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyDetector, PriceQuote};
    use crate::calibration::Outcome;

    fn home() -> Market {
        Market::Moneyline(Outcome::Home)
    }

    #[test]
    fn renormalizes_over_present_models() {
        let c = EnsembleCombiner::new(&EngineConfig::default());
        let r = c.combine(
            &home(),
            vec![
                (ModelKind::MultiFactor, Ok(Estimate::Probability(0.5))),
                (ModelKind::FormMomentum, Ok(Estimate::Probability(0.6))),
                (
                    ModelKind::SentimentExternal,
                    Ok(Estimate::Abstain(Abstention::MissingExternalSignal {
                        team: "X".to_string(),
                    })),
                ),
            ],
            None,
        );
        let expected = (0.5 * 0.25 + 0.6 * 0.30) / (0.25 + 0.30);
        assert!((r.probability - expected).abs() < 1e-12);
        assert_eq!(r.votes.len(), 2);
        assert_eq!(r.abstained.len(), 1);
    }

    #[test]
    fn failed_model_is_recorded_separately() {
        let c = EnsembleCombiner::new(&EngineConfig::default());
        let r = c.combine(
            &home(),
            vec![
                (ModelKind::MultiFactor, Ok(Estimate::Probability(0.4))),
                (
                    ModelKind::FormMomentum,
                    Err(ModelError::Degenerate("empty".to_string())),
                ),
                (ModelKind::Baseline, Ok(Estimate::Probability(0.9))),
            ],
            None,
        );
        assert!((r.probability - 0.4).abs() < 1e-12);
        assert_eq!(r.failed.len(), 1);
        assert!(r.abstained.is_empty());
    }

    #[test]
    fn no_votes_is_neutral() {
        let c = EnsembleCombiner::new(&EngineConfig::default());
        let r = c.combine(&home(), Vec::new(), None);
        assert_eq!(r.probability, 0.5);
        assert!(!r.has_votes());
    }

    #[test]
    fn anomaly_bonus_is_capped() {
        let c = EnsembleCombiner::new(&EngineConfig::default());
        let quotes: Vec<PriceQuote> = [2.0, 2.0, 2.0, 3.0]
            .iter()
            .map(|p| PriceQuote::new("b", *p))
            .collect();
        let anomaly = AnomalyDetector::default().detect(&quotes).unwrap();
        let r = c.combine(
            &home(),
            vec![(ModelKind::FormMomentum, Ok(Estimate::Probability(0.5)))],
            Some(&anomaly),
        );
        assert!((r.anomaly_bonus - anomaly.pct_better / 100.0 * 0.20).abs() < 1e-12);
        assert!((r.probability - (0.5 + r.anomaly_bonus)).abs() < 1e-12);

        let r = c.combine(
            &home(),
            vec![(ModelKind::FormMomentum, Ok(Estimate::Probability(0.93)))],
            Some(&anomaly),
        );
        assert_eq!(r.probability, 0.95);

        let totals: Market = "full_over_2.5".parse().unwrap();
        let r = c.combine(
            &totals,
            vec![(ModelKind::FormMomentum, Ok(Estimate::Probability(0.5)))],
            Some(&anomaly),
        );
        assert_eq!(r.anomaly_bonus, 0.0);
    }
}
