use chrono::{Days, NaiveDate};
use matchday_edge::error::StoreError;
use matchday_edge::historical_store::SqliteStore;
use matchday_edge::league_summary::LeagueReporter;
use matchday_edge::market::Period;
use matchday_edge::match_store::Lookback;
use matchday_edge::match_store::{InMemoryStore, MatchRecord, MatchRecordStore, MoneylinePrices};
use matchday_edge::sample_data::{SampleConfig, generate_history};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn rec(id: u64, date: NaiveDate, home: &str, away: &str, hg: u8, ag: u8) -> MatchRecord {
    MatchRecord {
        id,
        date,
        season: "2024/2025".to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: hg,
        away_goals: ag,
        home_goals_ht: hg.min(1),
        away_goals_ht: 0,
        home_corners: 7,
        away_corners: 3,
        home_corners_ht: 3,
        away_corners_ht: 1,
        corners_ht_estimated: false,
        moneyline_prices: Some(MoneylinePrices {
            home: 2.1,
            draw: 3.4,
            away: 3.6,
        }),
    }
}

fn seeded() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("open sqlite");
    let rows = vec![
        rec(1, day(2024, 9, 1), "Lions", "Bears", 2, 0),
        rec(2, day(2024, 9, 8), "Bears", "Tigers", 1, 1),
        rec(3, day(2024, 9, 15), "Tigers", "Lions", 0, 3),
        rec(4, day(2024, 9, 22), "Lions", "Bears", 1, 2),
        rec(5, day(2024, 9, 29), "Bears", "Lions", 0, 0),
    ];
    assert_eq!(store.upsert_matches(&rows).expect("upsert"), 5);
    store
}

#[test]
fn team_matches_are_strictly_before_the_cutoff() {
    let store = seeded();
    let rows = store
        .team_matches("Lions", day(2024, 9, 22), None)
        .expect("query");
    let ids: Vec<u64> = rows.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 3]);

    let bounded = store
        .team_matches("Lions", day(2024, 10, 1), Some(day(2024, 9, 15)))
        .expect("query");
    let ids: Vec<u64> = bounded.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
}

#[test]
fn head_to_head_keeps_the_latest_meetings_ascending() {
    let store = seeded();
    let rows = store
        .head_to_head("Lions", "Bears", day(2024, 12, 1), 2)
        .expect("query");
    let ids: Vec<u64> = rows.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![4, 5]);

    let none = store
        .head_to_head("Lions", "Bears", day(2024, 9, 1), 10)
        .expect("query");
    assert!(none.is_empty());
}

#[test]
fn upsert_replaces_by_id_and_round_trips_fields() {
    let store = seeded();
    let mut corrected = rec(2, day(2024, 9, 8), "Bears", "Tigers", 2, 1);
    corrected.moneyline_prices = None;
    corrected.corners_ht_estimated = true;
    store.upsert_matches(&[corrected.clone()]).expect("upsert");

    assert_eq!(store.count().expect("count"), 5);
    let rows = store
        .matches_between(None, day(2025, 1, 1))
        .expect("query");
    let back = rows.iter().find(|m| m.id == 2).expect("row 2");
    assert_eq!(back, &corrected);
    assert_eq!(
        rows.iter().find(|m| m.id == 1).expect("row 1"),
        &rec(1, day(2024, 9, 1), "Lions", "Bears", 2, 0)
    );
    assert_eq!(
        store.date_range().expect("range"),
        Some((day(2024, 9, 1), day(2024, 9, 29)))
    );
}

#[test]
fn empty_store_has_no_range() {
    let store = SqliteStore::in_memory().expect("open sqlite");
    assert_eq!(store.count().expect("count"), 0);
    assert_eq!(store.date_range().expect("range"), None);
}

#[test]
fn sqlite_and_memory_stores_agree() {
    let rows = generate_history(&SampleConfig {
        seasons: 1,
        ..SampleConfig::default()
    });
    let sqlite = SqliteStore::in_memory().expect("open sqlite");
    sqlite.upsert_matches(&rows).expect("upsert");
    let memory = InMemoryStore::new(rows);

    let cutoff = day(2015, 8, 15) + Days::new(7 * 20);
    let since = Some(day(2015, 10, 1));
    assert_eq!(
        sqlite.team_matches("Arsenal", cutoff, since).expect("sqlite"),
        memory.team_matches("Arsenal", cutoff, since).expect("memory")
    );
    assert_eq!(
        sqlite.head_to_head("Arsenal", "Chelsea", cutoff, 3).expect("sqlite"),
        memory.head_to_head("Arsenal", "Chelsea", cutoff, 3).expect("memory")
    );
    assert_eq!(
        sqlite.matches_between(since, cutoff).expect("sqlite"),
        memory.matches_between(since, cutoff).expect("memory")
    );
}

#[test]
fn league_reports_respect_the_as_of_date() {
    let store = seeded();
    let reporter = LeagueReporter::new(&store);

    let early = reporter
        .team_summaries(day(2024, 9, 22), Lookback::All)
        .expect("summaries");
    let order: Vec<&str> = early.iter().map(|r| r.team.as_str()).collect();
    assert_eq!(order, vec!["Lions", "Bears", "Tigers"]);
    assert_eq!(early[0].matches, 2);
    assert!((early[0].goal_difference - 2.5).abs() < 1e-12);

    let overview = reporter.data_summary(day(2024, 12, 1), 1).expect("summary");
    assert_eq!(overview.total_matches, 5);
    assert_eq!(overview.total_teams, 3);
    assert!((overview.home_win_pct - 20.0).abs() < 1e-9);
    assert!((overview.draw_pct - 40.0).abs() < 1e-9);

    let cdf = reporter
        .team_cdf("Lions", Period::FullTime, day(2024, 12, 1), Lookback::All)
        .expect("cdf");
    let values: Vec<u32> = cdf.goals_scored.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[test]
fn oversized_id_is_rejected_without_partial_writes() {
    let store = seeded();
    let batch = vec![
        rec(6, day(2024, 10, 6), "Tigers", "Bears", 2, 2),
        rec(u64::MAX, day(2024, 10, 13), "Lions", "Tigers", 1, 0),
    ];
    let err = store.upsert_matches(&batch).expect_err("id out of range");
    assert!(matches!(err, StoreError::InvalidRow { id: u64::MAX, .. }));
    assert_eq!(store.count().expect("count"), 5);
}

#[test]
fn unusable_store_directory_is_an_io_error() {
    let name = format!("matchday_edge_blocker_{}", std::process::id());
    let blocker = std::env::temp_dir().join(name);
    std::fs::write(&blocker, b"not a directory").expect("write blocker file");
    let err = SqliteStore::open(&blocker.join("hist.sqlite")).err().expect("open fails");
    std::fs::remove_file(&blocker).ok();
    assert!(matches!(err, StoreError::Io { .. }), "{err}");
}
