use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::calibration::Outcome;
use crate::error::StoreError;
use crate::market::Period;
use crate::match_store::{Lookback, MatchRecord, MatchRecordStore, TeamView};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSummary {
    pub team: String,
    pub matches: usize,
    pub avg_goals_scored: f64,
    pub avg_goals_conceded: f64,
    pub avg_corners_for: f64,
    pub avg_corners_against: f64,
    /// Per match.
    pub goal_difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CdfPoint {
    pub value: u32,
    /// P(X <= value).
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamCdf {
    pub team: String,
    pub period: Period,
    pub goals_scored: Vec<CdfPoint>,
    pub goals_conceded: Vec<CdfPoint>,
    pub corners: Vec<CdfPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonSummary {
    pub season: String,
    pub matches: usize,
    pub total_goals: u32,
    pub avg_goals: f64,
    pub avg_corners: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRanking {
    pub team: String,
    pub matches: usize,
    pub average: f64,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalBucket {
    pub total_goals: u32,
    pub matches: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub total_matches: usize,
    pub total_seasons: usize,
    pub total_teams: usize,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
    pub avg_goals_per_match: f64,
    pub avg_corners_per_match: f64,
    pub seasons: Vec<SeasonSummary>,
    pub top_scoring: Vec<TeamRanking>,
    pub top_defensive: Vec<TeamRanking>,
    pub goal_distribution: Vec<GoalBucket>,
    pub home_win_pct: f64,
    pub draw_pct: f64,
    pub away_win_pct: f64,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
}

fn mean(total: f64, n: usize) -> f64 {
    if n == 0 { 0.0 } else { total / n as f64 }
}

fn team_views(matches: &[MatchRecord]) -> BTreeMap<&str, Vec<TeamView>> {
    let mut out: BTreeMap<&str, Vec<TeamView>> = BTreeMap::new();
    for m in matches {
        for team in [m.home_team.as_str(), m.away_team.as_str()] {
            if let Some(v) = m.view_for(team) {
                out.entry(team).or_default().push(v);
            }
        }
    }
    out
}

/// One row per team, best goal difference first.
pub fn team_summaries(matches: &[MatchRecord]) -> Vec<TeamSummary> {
    let mut out: Vec<TeamSummary> = team_views(matches)
        .into_iter()
        .map(|(team, views)| {
            let n = views.len();
            let sum = |f: fn(&TeamView) -> u8| views.iter().map(|v| f(v) as f64).sum::<f64>();
            let scored = mean(sum(|v| v.goals_for), n);
            let conceded = mean(sum(|v| v.goals_against), n);
            TeamSummary {
                team: team.to_string(),
                matches: n,
                avg_goals_scored: scored,
                avg_goals_conceded: conceded,
                avg_corners_for: mean(sum(|v| v.corners_for), n),
                avg_corners_against: mean(sum(|v| v.corners_against), n),
                goal_difference: scored - conceded,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.goal_difference
            .total_cmp(&a.goal_difference)
            .then_with(|| a.team.cmp(&b.team))
    });
    out
}

fn cdf(values: impl IntoIterator<Item = u32>) -> Vec<CdfPoint> {
    let mut hist: BTreeMap<u32, usize> = BTreeMap::new();
    for v in values {
        *hist.entry(v).or_default() += 1;
    }
    let total: usize = hist.values().sum();
    let mut cumulative = 0usize;
    hist.into_iter()
        .map(|(value, count)| {
            cumulative += count;
            CdfPoint {
                value,
                probability: cumulative as f64 / total as f64,
            }
        })
        .collect()
}

/// Cumulative distributions of one team's goals and corners in `period`,
/// both venues combined.
pub fn team_cdf(team: &str, matches: &[MatchRecord], period: Period) -> TeamCdf {
    let views: Vec<TeamView> = matches.iter().filter_map(|m| m.view_for(team)).collect();
    let pick = |v: &TeamView| -> (u8, u8, u8) {
        match period {
            Period::FullTime => (v.goals_for, v.goals_against, v.corners_for),
            Period::FirstHalf => (v.goals_for_ht, v.goals_against_ht, v.corners_for_ht),
            Period::SecondHalf => (
                v.goals_for_2h(),
                v.goals_against_2h(),
                v.corners_for.saturating_sub(v.corners_for_ht),
            ),
        }
    };
    TeamCdf {
        team: team.to_string(),
        period,
        goals_scored: cdf(views.iter().map(|v| pick(v).0 as u32)),
        goals_conceded: cdf(views.iter().map(|v| pick(v).1 as u32)),
        corners: cdf(views.iter().map(|v| pick(v).2 as u32)),
    }
}

fn rankings(
    per_team: &BTreeMap<&str, Vec<TeamView>>,
    min_matches: usize,
    value: fn(&TeamView) -> u8,
    best_first_ascending: bool,
) -> Vec<TeamRanking> {
    let mut out: Vec<TeamRanking> = per_team
        .iter()
        .filter(|(_, views)| views.len() >= min_matches.max(1))
        .map(|(team, views)| {
            let total: u32 = views.iter().map(|v| value(v) as u32).sum();
            TeamRanking {
                team: team.to_string(),
                matches: views.len(),
                average: total as f64 / views.len() as f64,
                total,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        let ord = a.average.total_cmp(&b.average);
        let ord = if best_first_ascending { ord } else { ord.reverse() };
        ord.then_with(|| a.team.cmp(&b.team))
    });
    out.truncate(10);
    out
}

/// Whole-dataset overview. Teams need `min_matches` to enter the top-10
/// attack and defence rankings.
pub fn data_summary(matches: &[MatchRecord], min_matches: usize) -> DataSummary {
    let n = matches.len();
    let per_team = team_views(matches);

    let mut by_season: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for m in matches {
        by_season.entry(m.season.as_str()).or_default().push(m);
    }
    let seasons = by_season
        .into_iter()
        .map(|(season, rows)| {
            let total_goals: u32 = rows.iter().map(|m| m.total_goals()).sum();
            let corners: u32 = rows.iter().map(|m| m.total_corners()).sum();
            SeasonSummary {
                season: season.to_string(),
                matches: rows.len(),
                total_goals,
                avg_goals: mean(total_goals as f64, rows.len()),
                avg_corners: mean(corners as f64, rows.len()),
            }
        })
        .collect::<Vec<_>>();

    let mut goal_hist: BTreeMap<u32, usize> = BTreeMap::new();
    let mut outcomes: HashMap<Outcome, usize> = HashMap::new();
    for m in matches {
        *goal_hist.entry(m.total_goals()).or_default() += 1;
        *outcomes.entry(m.outcome()).or_default() += 1;
    }
    let pct = |count: usize| mean(count as f64 * 100.0, n);
    let outcome_pct = |o: Outcome| pct(outcomes.get(&o).copied().unwrap_or(0));

    DataSummary {
        total_matches: n,
        total_seasons: seasons.len(),
        total_teams: per_team.len(),
        earliest: matches.iter().map(|m| m.date).min(),
        latest: matches.iter().map(|m| m.date).max(),
        avg_goals_per_match: mean(matches.iter().map(|m| m.total_goals() as f64).sum(), n),
        avg_corners_per_match: mean(matches.iter().map(|m| m.total_corners() as f64).sum(), n),
        seasons,
        top_scoring: rankings(&per_team, min_matches, |v| v.goals_for, false),
        top_defensive: rankings(&per_team, min_matches, |v| v.goals_against, true),
        goal_distribution: goal_hist
            .into_iter()
            .map(|(total_goals, count)| GoalBucket {
                total_goals,
                matches: count,
                percentage: pct(count),
            })
            .collect(),
        home_win_pct: outcome_pct(Outcome::Home),
        draw_pct: outcome_pct(Outcome::Draw),
        away_win_pct: outcome_pct(Outcome::Away),
        avg_home_goals: mean(matches.iter().map(|m| m.home_goals as f64).sum(), n),
        avg_away_goals: mean(matches.iter().map(|m| m.away_goals as f64).sum(), n),
    }
}

/// Store-backed entry points for the summaries above, bounded by `as_of`.
pub struct LeagueReporter<S> {
    store: S,
}

impl<S: MatchRecordStore> LeagueReporter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn window(
        &self,
        as_of: NaiveDate,
        lookback: Lookback,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.store.matches_between(lookback.since(as_of), as_of)
    }

    pub fn team_summaries(
        &self,
        as_of: NaiveDate,
        lookback: Lookback,
    ) -> Result<Vec<TeamSummary>, StoreError> {
        Ok(team_summaries(&self.window(as_of, lookback)?))
    }

    pub fn team_cdf(
        &self,
        team: &str,
        period: Period,
        as_of: NaiveDate,
        lookback: Lookback,
    ) -> Result<TeamCdf, StoreError> {
        let rows = self.store.team_matches(team, as_of, lookback.since(as_of))?;
        Ok(team_cdf(team, &rows, period))
    }

    pub fn data_summary(
        &self,
        as_of: NaiveDate,
        min_matches: usize,
    ) -> Result<DataSummary, StoreError> {
        Ok(data_summary(&self.window(as_of, Lookback::All)?, min_matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u64, season: &str, home: &str, away: &str, hg: u8, ag: u8) -> MatchRecord {
        MatchRecord {
            id,
            date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap() + chrono::Days::new(id),
            season: season.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: hg,
            away_goals: ag,
            home_goals_ht: hg.min(1),
            away_goals_ht: 0,
            home_corners: 6,
            away_corners: 3,
            home_corners_ht: 2,
            away_corners_ht: 1,
            corners_ht_estimated: false,
            moneyline_prices: None,
        }
    }

    fn sample() -> Vec<MatchRecord> {
        vec![
            rec(1, "2023/2024", "A", "B", 3, 0),
            rec(2, "2023/2024", "B", "C", 1, 1),
            rec(3, "2024/2025", "C", "A", 0, 2),
            rec(4, "2024/2025", "B", "A", 2, 1),
        ]
    }

    #[test]
    fn summaries_sorted_by_goal_difference() {
        let rows = team_summaries(&sample());
        let order: Vec<&str> = rows.iter().map(|r| r.team.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        let a = &rows[0];
        assert_eq!(a.matches, 3);
        assert!((a.avg_goals_scored - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cdf_ends_at_one() {
        let c = team_cdf("A", &sample(), Period::FullTime);
        assert_eq!(
            c.goals_scored.iter().map(|p| p.value).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!((c.goals_scored.last().unwrap().probability - 1.0).abs() < 1e-12);
        assert!(team_cdf("Z", &sample(), Period::FirstHalf).corners.is_empty());
    }

    #[test]
    fn dataset_overview() {
        let s = data_summary(&sample(), 1);
        assert_eq!(s.total_matches, 4);
        assert_eq!(s.total_seasons, 2);
        assert_eq!(s.total_teams, 3);
        assert!((s.home_win_pct - 50.0).abs() < 1e-12);
        assert!((s.draw_pct - 25.0).abs() < 1e-12);
        assert_eq!(s.top_scoring[0].team, "A");
        assert_eq!(s.seasons[0].total_goals, 5);
    }
}
