use chrono::{Days, NaiveDate};
use matchday_edge::config::EngineConfig;
use matchday_edge::elo::{DEFAULT_RATING, EloConfig, replay_team_elo};
use matchday_edge::form::{FormMomentumEngine, MomentumTrend};
use matchday_edge::market::{Period, TotalStat};
use matchday_edge::match_store::{InMemoryStore, MatchRecord, Venue};

fn rec(id: u64, date: NaiveDate, home: &str, away: &str, hg: u8, ag: u8) -> MatchRecord {
    MatchRecord {
        id,
        date,
        season: "2023/2024".to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: hg,
        away_goals: ag,
        home_goals_ht: hg / 2,
        away_goals_ht: ag / 2,
        home_corners: 5,
        away_corners: 5,
        home_corners_ht: 2,
        away_corners_ht: 2,
        corners_ht_estimated: false,
        moneyline_prices: None,
    }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 2).expect("valid date")
}

fn week(n: u64) -> NaiveDate {
    start() + Days::new(7 * n)
}

/// "Rising" loses its first three and wins its last three; "Fading" the reverse.
fn trend_store() -> InMemoryStore {
    let mut rows = Vec::new();
    for n in 0..6u64 {
        let (hg, ag) = if n >= 3 { (3, 0) } else { (0, 2) };
        rows.push(rec(n + 1, week(n), "Rising", &format!("Other {n}"), hg, ag));
        rows.push(rec(n + 11, week(n), &format!("Host {n}"), "Fading", hg, ag));
    }
    InMemoryStore::new(rows)
}

#[test]
fn elo_replay_is_order_sensitive_and_repeatable() {
    let forward = vec![
        rec(1, week(0), "Lions", "Bears", 3, 0),
        rec(2, week(1), "Bears", "Lions", 1, 0),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let a = replay_team_elo("Lions", &forward, EloConfig::default());
    let b = replay_team_elo("Lions", &forward, EloConfig::default());
    let c = replay_team_elo("Lions", &reversed, EloConfig::default());
    assert_eq!(a, b);
    assert!((a - c).abs() > 1.0, "forward {a} reversed {c}");
    assert_eq!(replay_team_elo("Lions", &[], EloConfig::default()), DEFAULT_RATING);
}

#[test]
fn engine_elo_only_sees_matches_before_as_of() {
    let store = trend_store();
    let cfg = EngineConfig::default();
    let early = FormMomentumEngine::new(&store, week(3), &cfg);
    let late = FormMomentumEngine::new(&store, week(6), &cfg);

    // Three straight defeats so far.
    assert!(early.elo("Rising").expect("elo") < DEFAULT_RATING);
    assert!(late.elo("Rising").expect("elo") > early.elo("Rising").expect("elo"));
    assert_eq!(early.elo("Nobody").expect("elo"), DEFAULT_RATING);
}

#[test]
fn momentum_tracks_the_later_half_of_the_window() {
    let store = trend_store();
    let cfg = EngineConfig::default();
    let engine = FormMomentumEngine::new(&store, week(6), &cfg);

    let rising = engine.momentum("Rising").expect("store").expect("momentum");
    assert!((rising.value - 5.0).abs() < 1e-12);
    assert_eq!(rising.trend, MomentumTrend::StrongPositive);

    let fading = engine.momentum("Fading").expect("store").expect("momentum");
    assert!((fading.value + 5.0).abs() < 1e-12);
    assert_eq!(fading.trend, MomentumTrend::StrongNegative);

    let single = FormMomentumEngine::new(&store, week(1), &cfg);
    assert!(single.momentum("Rising").expect("store").is_none());
}

#[test]
fn trend_thresholds() {
    assert_eq!(MomentumTrend::from_value(0.5), MomentumTrend::StrongPositive);
    assert_eq!(MomentumTrend::from_value(0.0), MomentumTrend::Positive);
    assert_eq!(MomentumTrend::from_value(-0.2), MomentumTrend::Negative);
    assert_eq!(MomentumTrend::from_value(-0.5), MomentumTrend::StrongNegative);
}

#[test]
fn recent_form_respects_venue() {
    let store = trend_store();
    let cfg = EngineConfig::default();
    let engine = FormMomentumEngine::new(&store, week(6), &cfg);

    assert!(engine.recent_form("Rising", Venue::Away).expect("store").is_none());
    let home = engine
        .recent_form("Rising", Venue::Home)
        .expect("store")
        .expect("form");
    assert_eq!(home.matches, cfg.form_window);
    assert!(home.form_score > 0.5);
}

#[test]
fn moneyline_is_a_distribution_favouring_the_form_side() {
    let store = trend_store();
    let cfg = EngineConfig::default();
    let engine = FormMomentumEngine::new(&store, week(6), &cfg);

    let p = engine
        .moneyline("Rising", "Fading")
        .expect("store")
        .expect("both sides have form");
    assert!((p.sum() - 1.0).abs() < 1e-9);
    assert!(p.home > p.away);

    assert!(engine.moneyline("Fading", "Rising").expect("store").is_none());
}

#[test]
fn expected_totals_scale_by_period() {
    let store = trend_store();
    let cfg = EngineConfig::default();
    let engine = FormMomentumEngine::new(&store, week(6), &cfg);

    let full = engine
        .expected_total("Rising", "Fading", Period::FullTime, TotalStat::Goals)
        .expect("store")
        .expect("expected total");
    let first = engine
        .expected_total("Rising", "Fading", Period::FirstHalf, TotalStat::Goals)
        .expect("store")
        .expect("expected total");
    assert!(full > 0.0);
    assert!((first - full * cfg.first_half_share).abs() < 1e-9);
}

#[test]
fn head_to_head_counts_both_venues() {
    let rows = vec![
        rec(1, week(0), "Lions", "Bears", 2, 0),
        rec(2, week(1), "Bears", "Lions", 1, 1),
        rec(3, week(2), "Lions", "Bears", 0, 1),
        rec(4, week(3), "Lions", "Tigers", 5, 0),
    ];
    let store = InMemoryStore::new(rows);
    let cfg = EngineConfig::default();
    let engine = FormMomentumEngine::new(&store, week(4), &cfg);
    let h2h = engine
        .head_to_head("Lions", "Bears")
        .expect("store")
        .expect("meetings");
    assert_eq!(h2h.meetings, 3);
    assert!((h2h.home_win_rate - 1.0 / 3.0).abs() < 1e-12);
    assert!((h2h.draw_rate - 1.0 / 3.0).abs() < 1e-12);
}
