use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::NaiveDate;
use matchday_edge::backtest::run_backtest;
use matchday_edge::config::{BacktestConfig, EngineConfig};
use matchday_edge::ensemble::EnsembleCombiner;
use matchday_edge::market::Market;
use matchday_edge::match_store::InMemoryStore;
use matchday_edge::models::{Fixture, ModelSet};
use matchday_edge::odds_feed::parse_events_json;
use matchday_edge::sample_data::{SampleConfig, generate_history};

const MARKETS: [&str; 6] = [
    "moneyline_home",
    "moneyline_draw",
    "moneyline_away",
    "full_over_2.5",
    "first_half_under_1.5",
    "full_corners_over_9.5",
];

fn sample_store(seasons: u32) -> InMemoryStore {
    InMemoryStore::new(generate_history(&SampleConfig {
        seasons,
        ..SampleConfig::default()
    }))
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 2, 1).unwrap()
}

fn bench_market_parse(c: &mut Criterion) {
    c.bench_function("market_parse", |b| {
        b.iter(|| {
            for spec in MARKETS {
                let m: Market = black_box(spec).parse().unwrap();
                black_box(m);
            }
        })
    });
}

fn bench_model_set_cold(c: &mut Criterion) {
    let store = sample_store(3);
    let cfg = EngineConfig::default();
    let markets: Vec<Market> = MARKETS.iter().map(|s| s.parse().unwrap()).collect();
    let fixture = Fixture::new("Arsenal", "Chelsea");

    c.bench_function("model_set_cold_fixture", |b| {
        b.iter(|| {
            let models = ModelSet::new(&store, as_of(), &cfg, None);
            for market in &markets {
                for model in models.iter() {
                    black_box(model.estimate(black_box(&fixture), market).ok());
                }
            }
        })
    });
}

fn bench_ensemble_warm(c: &mut Criterion) {
    let store = sample_store(3);
    let cfg = EngineConfig::default();
    let models = ModelSet::new(&store, as_of(), &cfg, None);
    let combiner = EnsembleCombiner::new(&cfg);
    let markets: Vec<Market> = MARKETS.iter().map(|s| s.parse().unwrap()).collect();
    let fixture = Fixture::new("Liverpool", "Everton");

    c.bench_function("ensemble_warm_fixture", |b| {
        b.iter(|| {
            for market in &markets {
                let r = combiner.run(&models, black_box(&fixture), market, None);
                black_box(r.probability);
            }
        })
    });
}

fn bench_odds_parse(c: &mut Criterion) {
    c.bench_function("odds_events_parse", |b| {
        b.iter(|| {
            let events = parse_events_json(black_box(ODDS_JSON)).unwrap();
            black_box(events.len());
        })
    });
}

fn bench_backtest_season(c: &mut Criterion) {
    let store = sample_store(2);
    let cfg = BacktestConfig::default();
    let from = NaiveDate::from_ymd_opt(2016, 8, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2017, 5, 31).unwrap();

    let mut group = c.benchmark_group("backtest");
    group.sample_size(10);
    group.bench_function("one_season", |b| {
        b.iter(|| {
            let report = run_backtest(&store, from, to, &cfg).unwrap();
            black_box(report.total_trials);
        })
    });
    group.finish();
}

criterion_group!(
    perf,
    bench_market_parse,
    bench_model_set_cold,
    bench_ensemble_warm,
    bench_odds_parse,
    bench_backtest_season
);
criterion_main!(perf);

static ODDS_JSON: &str = include_str!("../tests/fixtures/odds_events.json");
