use std::collections::HashMap;

use chrono::NaiveDate;
use matchday_edge::analysis::{FeedStatus, PassInputs, analyze_fixture};
use matchday_edge::config::EngineConfig;
use matchday_edge::error::{FeedError, StoreError};
use matchday_edge::market::Market;
use matchday_edge::match_store::{InMemoryStore, MatchRecord, MatchRecordStore};
use matchday_edge::models::Fixture;
use matchday_edge::odds_feed::{BookmakerQuote, BookmakerQuoteFeed, QuoteEvent, StaticQuoteFeed};
use matchday_edge::sample_data::{SampleConfig, generate_history};
use matchday_edge::sentiment::{
    ExternalSignalFeed, ExternalTeamSignal, JsonSignalFile, StaticSignalFeed,
};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 2, 1).expect("valid date")
}

fn store() -> InMemoryStore {
    InMemoryStore::new(generate_history(&SampleConfig {
        seasons: 3,
        ..SampleConfig::default()
    }))
}

fn specs(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn quote(bookmaker: &str, market: &str, price: f64) -> BookmakerQuote {
    BookmakerQuote {
        bookmaker: bookmaker.to_string(),
        market: market.parse().expect("market"),
        price,
        as_of: None,
    }
}

fn event(home: &str, away: &str) -> QuoteEvent {
    QuoteEvent {
        home_team: home.to_string(),
        away_team: away.to_string(),
        kickoff: None,
        quotes: vec![
            quote("Longshot Books", "moneyline_home", 30.0),
            quote("Steady Bet", "moneyline_home", 29.0),
            quote("Steady Bet", "moneyline_draw", 1.05),
            quote("Steady Bet", "full_over_2.5", 1.1),
        ],
    }
}

struct DownFeed;

impl BookmakerQuoteFeed for DownFeed {
    fn fetch(&self, _league: &str) -> Result<Vec<QuoteEvent>, FeedError> {
        Err(FeedError::Unavailable("connection refused".to_string()))
    }
}

#[derive(Clone)]
struct BrokenStore;

impl MatchRecordStore for BrokenStore {
    fn team_matches(
        &self,
        _team: &str,
        _before: NaiveDate,
        _since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        Err(StoreError::InvalidRow {
            id: 1,
            reason: "corrupt".to_string(),
        })
    }

    fn head_to_head(
        &self,
        _team_a: &str,
        _team_b: &str,
        _before: NaiveDate,
        _limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        Err(StoreError::InvalidRow {
            id: 1,
            reason: "corrupt".to_string(),
        })
    }

    fn matches_between(
        &self,
        _since: Option<NaiveDate>,
        _before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        Ok(Vec::new())
    }
}

#[test]
fn malformed_specifiers_are_rejected_alone() {
    let store = store();
    let inputs = PassInputs::offline();
    let fixture = Fixture::new("Arsenal", "Burnley");
    let a = analyze_fixture(
        &store,
        as_of(),
        &fixture,
        &specs(&[
            "moneyline_home",
            "moneyline_banana",
            "halftime_over_2.5",
            "full_over_2.5",
        ]),
        &inputs,
        &EngineConfig::default(),
    )
    .expect("analysis");

    assert_eq!(a.markets.len(), 2);
    let rejected: Vec<&str> = a.rejected.iter().map(|r| r.specifier.as_str()).collect();
    assert_eq!(rejected, vec!["moneyline_banana", "halftime_over_2.5"]);
    assert_eq!(a.quote_feed, FeedStatus::NotConfigured);
    assert_eq!(a.signal_feed, FeedStatus::NotConfigured);
    for m in &a.markets {
        assert!(m.best_price.is_none());
        assert!(m.ev_percent.is_none());
        assert!(m.historical_probability.is_some());
        assert!(!m.explanation.is_empty());
    }
    assert!(a.value_bets.is_empty());
}

#[test]
fn generous_price_becomes_a_value_bet() {
    let store = store();
    let feed = StaticQuoteFeed::new(vec![event("Arsenal", "Burnley")]);
    let inputs = PassInputs::fetch(Some(&feed), "epl", None);
    let fixture = Fixture::new("Arsenal", "Burnley");
    let cfg = EngineConfig::default();
    let a = analyze_fixture(
        &store,
        as_of(),
        &fixture,
        &specs(&["moneyline_home", "moneyline_draw", "full_over_2.5"]),
        &inputs,
        &cfg,
    )
    .expect("analysis");

    assert_eq!(a.quote_feed, FeedStatus::Available { events: 1 });
    let home = &a.markets[0];
    assert_eq!(home.best_price, Some(30.0));
    assert_eq!(home.quote_source.as_deref(), Some("Longshot Books"));
    assert!((home.implied_probability.expect("implied") - 1.0 / 30.0).abs() < 1e-12);

    assert_eq!(a.value_bets.len(), 1);
    let bet = &a.value_bets[0];
    let home_market: Market = "moneyline_home".parse().expect("market");
    assert_eq!(bet.market, home_market);
    assert!((bet.ev_percent - (bet.model_probability * 30.0 - 1.0) * 100.0).abs() < 1e-9);
    assert!(bet.ev_percent >= cfg.value_bet_min_ev_pct);

    // A 1.05 draw is never value.
    assert!(a.markets[1].ev_percent.expect("priced") < 0.0);
}

#[test]
fn unknown_teams_get_no_value_bets_even_with_prices() {
    let store = store();
    let feed = StaticQuoteFeed::new(vec![event("Atlantis", "El Dorado")]);
    let inputs = PassInputs::fetch(Some(&feed), "epl", None);
    let a = analyze_fixture(
        &store,
        as_of(),
        &Fixture::new("Atlantis", "El Dorado"),
        &specs(&["moneyline_home"]),
        &inputs,
        &EngineConfig::default(),
    )
    .expect("analysis");

    let m = &a.markets[0];
    assert_eq!(m.model_probability, 0.5);
    assert!(!m.ensemble.has_votes());
    assert_eq!(m.best_price, Some(30.0));
    assert!(m.ev_percent.is_none());
    assert!(a.value_bets.is_empty());
}

#[test]
fn unavailable_feeds_degrade_gracefully() {
    let store = store();
    let missing = JsonSignalFile::new("/nonexistent/signals.json");
    let inputs = PassInputs::fetch(
        Some(&DownFeed),
        "epl",
        Some(&missing as &dyn ExternalSignalFeed),
    );
    assert!(matches!(inputs.quote_status(), FeedStatus::Unavailable(_)));

    let a = analyze_fixture(
        &store,
        as_of(),
        &Fixture::new("Chelsea", "Fulham"),
        &specs(&["moneyline_away"]),
        &inputs,
        &EngineConfig::default(),
    )
    .expect("analysis");
    assert!(matches!(a.quote_feed, FeedStatus::Unavailable(_)));
    assert!(matches!(a.signal_feed, FeedStatus::Unavailable(_)));
    assert!(a.markets[0].ensemble.has_votes());
}

#[test]
fn signal_feed_enables_the_sentiment_model() {
    let store = store();
    let signal = ExternalTeamSignal {
        ownership: 8.0,
        availability: 0.9,
        transfer_momentum: 50_000.0,
        price_rises: 2.0,
        price_falls: 0.0,
        form_metric: 6.0,
    };
    let table: HashMap<String, ExternalTeamSignal> = ["Chelsea", "Fulham"]
        .iter()
        .map(|t| (t.to_string(), signal))
        .collect();
    let feed = StaticSignalFeed::new(table);
    let inputs = PassInputs::fetch(None, "", Some(&feed));

    let a = analyze_fixture(
        &store,
        as_of(),
        &Fixture::new("Chelsea", "Fulham"),
        &specs(&["moneyline_home"]),
        &inputs,
        &EngineConfig::default(),
    )
    .expect("analysis");
    assert_eq!(a.signal_feed, FeedStatus::Available { events: 2 });
    assert_eq!(a.markets[0].ensemble.votes.len(), 3);
    assert!(a.markets[0].ensemble.abstained.is_empty());
}

#[test]
fn store_failure_aborts_the_fixture() {
    let err = analyze_fixture(
        BrokenStore,
        as_of(),
        &Fixture::new("Arsenal", "Burnley"),
        &specs(&["moneyline_home"]),
        &PassInputs::offline(),
        &EngineConfig::default(),
    )
    .expect_err("store failure");
    assert!(matches!(err, StoreError::InvalidRow { id: 1, .. }));
}
