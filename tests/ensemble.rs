use chrono::NaiveDate;
use matchday_edge::anomaly::{AnomalyDetector, PriceQuote};
use matchday_edge::config::{EngineConfig, EnsembleWeights};
use matchday_edge::ensemble::EnsembleCombiner;
use matchday_edge::market::Market;
use matchday_edge::match_store::InMemoryStore;
use matchday_edge::models::{Abstention, Fixture, ModelKind, ModelSet};
use matchday_edge::sample_data::{SampleConfig, generate_history};

fn store() -> InMemoryStore {
    InMemoryStore::new(generate_history(&SampleConfig {
        seasons: 3,
        ..SampleConfig::default()
    }))
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 2, 1).expect("valid date")
}

#[test]
fn unweighted_models_never_vote() {
    let store = store();
    let cfg = EngineConfig::default();
    let models = ModelSet::new(&store, as_of(), &cfg, None);
    let combiner = EnsembleCombiner::new(&cfg);
    let fixture = Fixture::new("Arsenal", "Chelsea");
    let market: Market = "moneyline_home".parse().expect("market");

    let r = combiner.run(&models, &fixture, &market, None);
    assert!(
        r.votes
            .iter()
            .all(|v| !matches!(v.kind, ModelKind::Baseline | ModelKind::OpponentAdjusted))
    );
    assert!(
        r.abstained
            .iter()
            .all(|(kind, _)| !matches!(kind, ModelKind::Baseline | ModelKind::OpponentAdjusted))
    );
}

#[test]
fn missing_signals_renormalize_over_the_rest() {
    let store = store();
    let cfg = EngineConfig::default();
    let models = ModelSet::new(&store, as_of(), &cfg, None);
    let combiner = EnsembleCombiner::new(&cfg);
    let fixture = Fixture::new("Liverpool", "Everton");
    let market: Market = "moneyline_home".parse().expect("market");

    let r = combiner.run(&models, &fixture, &market, None);
    assert_eq!(r.votes.len(), 2);
    assert_eq!(r.abstained.len(), 1);
    assert_eq!(r.abstained[0].0, ModelKind::SentimentExternal);
    assert!(matches!(
        r.abstained[0].1,
        Abstention::MissingExternalSignal { .. }
    ));

    let total: f64 = r.votes.iter().map(|v| v.weight).sum();
    let expected = r
        .votes
        .iter()
        .map(|v| v.probability * v.weight)
        .sum::<f64>()
        / total;
    assert!((r.probability - cfg.bounds.clamp(expected)).abs() < 1e-12);
}

#[test]
fn single_weighted_model_passes_through() {
    let store = store();
    let cfg = EngineConfig {
        weights: EnsembleWeights {
            multi_factor: 0.0,
            form_momentum: 1.0,
            sentiment: 0.0,
        },
        ..EngineConfig::default()
    };
    let models = ModelSet::new(&store, as_of(), &cfg, None);
    let combiner = EnsembleCombiner::new(&cfg);
    let fixture = Fixture::new("Brighton", "Fulham");
    let market: Market = "full_over_2.5".parse().expect("market");

    let r = combiner.run(&models, &fixture, &market, None);
    let direct = models
        .get(ModelKind::FormMomentum)
        .expect("model")
        .estimate(&fixture, &market)
        .expect("no failure")
        .probability()
        .expect("estimate");
    assert_eq!(r.votes.len(), 1);
    assert!((r.probability - direct).abs() < 1e-12);
}

#[test]
fn anomaly_only_lifts_voted_moneyline_probabilities() {
    let store = store();
    let cfg = EngineConfig::default();
    let models = ModelSet::new(&store, as_of(), &cfg, None);
    let combiner = EnsembleCombiner::new(&cfg);
    let fixture = Fixture::new("Wolves", "Burnley");
    let anomaly = AnomalyDetector::default()
        .detect(&[
            PriceQuote::new("a", 2.0),
            PriceQuote::new("b", 2.0),
            PriceQuote::new("c", 2.0),
            PriceQuote::new("d", 3.0),
        ])
        .expect("anomaly");

    let market: Market = "moneyline_away".parse().expect("market");
    let plain = combiner.run(&models, &fixture, &market, None);
    let lifted = combiner.run(&models, &fixture, &market, Some(&anomaly));
    assert!(lifted.anomaly_bonus > 0.0);
    assert!(lifted.probability >= plain.probability);
    assert!(lifted.probability <= cfg.anomaly_bonus_cap);

    let unknown = Fixture::new("Atlantis", "El Dorado");
    let none = combiner.run(&models, &unknown, &market, Some(&anomaly));
    assert!(!none.has_votes());
    assert_eq!(none.anomaly_bonus, 0.0);
    assert_eq!(none.probability, 0.5);
}
