use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, classify_outcome};
use crate::error::StoreError;

/// Share of total corners assumed to fall in the first half when a source only
/// records full-time corner counts.
pub const ESTIMATED_FIRST_HALF_CORNER_SHARE: f64 = 0.4;

/// Decimal prices quoted for the three-way market, as settled for that match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoneylinePrices {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl MoneylinePrices {
    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.home > 1.0 && self.draw > 1.0 && self.away > 1.0
    }
}

/// One finished match. Records are produced by ingestion and never mutated by
/// the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: u64,
    pub date: NaiveDate,
    pub season: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u8,
    pub away_goals: u8,
    pub home_goals_ht: u8,
    pub away_goals_ht: u8,
    pub home_corners: u8,
    pub away_corners: u8,
    pub home_corners_ht: u8,
    pub away_corners_ht: u8,
    /// First-half corners are the 40% estimate, not a measurement.
    pub corners_ht_estimated: bool,
    pub moneyline_prices: Option<MoneylinePrices>,
}

/// A match seen from one team's side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamView {
    pub is_home: bool,
    pub goals_for: u8,
    pub goals_against: u8,
    pub goals_for_ht: u8,
    pub goals_against_ht: u8,
    pub corners_for: u8,
    pub corners_against: u8,
    pub corners_for_ht: u8,
    pub corners_against_ht: u8,
}

impl TeamView {
    pub fn points(&self) -> u8 {
        match self.goals_for.cmp(&self.goals_against) {
            std::cmp::Ordering::Greater => 3,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 0,
        }
    }

    /// 1 for a win, 0.5 for a draw, 0 for a loss.
    pub fn result_score(&self) -> f64 {
        match self.goals_for.cmp(&self.goals_against) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Equal => 0.5,
            std::cmp::Ordering::Less => 0.0,
        }
    }

    pub fn goal_diff(&self) -> i32 {
        self.goals_for as i32 - self.goals_against as i32
    }

    pub fn goals_for_2h(&self) -> u8 {
        self.goals_for.saturating_sub(self.goals_for_ht)
    }

    pub fn goals_against_2h(&self) -> u8 {
        self.goals_against.saturating_sub(self.goals_against_ht)
    }
}

impl MatchRecord {
    pub fn outcome(&self) -> Outcome {
        classify_outcome(self.home_goals as i32, self.away_goals as i32)
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn is_meeting(&self, a: &str, b: &str) -> bool {
        (self.home_team == a && self.away_team == b) || (self.home_team == b && self.away_team == a)
    }

    pub fn total_goals(&self) -> u32 {
        self.home_goals as u32 + self.away_goals as u32
    }

    pub fn total_corners(&self) -> u32 {
        self.home_corners as u32 + self.away_corners as u32
    }

    pub fn view_for(&self, team: &str) -> Option<TeamView> {
        if self.home_team == team {
            Some(TeamView {
                is_home: true,
                goals_for: self.home_goals,
                goals_against: self.away_goals,
                goals_for_ht: self.home_goals_ht,
                goals_against_ht: self.away_goals_ht,
                corners_for: self.home_corners,
                corners_against: self.away_corners,
                corners_for_ht: self.home_corners_ht,
                corners_against_ht: self.away_corners_ht,
            })
        } else if self.away_team == team {
            Some(TeamView {
                is_home: false,
                goals_for: self.away_goals,
                goals_against: self.home_goals,
                goals_for_ht: self.away_goals_ht,
                goals_against_ht: self.home_goals_ht,
                corners_for: self.away_corners,
                corners_against: self.home_corners,
                corners_for_ht: self.away_corners_ht,
                corners_against_ht: self.home_corners_ht,
            })
        } else {
            None
        }
    }
}

/// Floor of 40% of the full-time count, flagged as an estimate by the caller.
pub fn estimate_first_half_corners(total: u8) -> u8 {
    (total as f64 * ESTIMATED_FIRST_HALF_CORNER_SHARE).floor() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
    Both,
}

impl Venue {
    pub fn admits(self, view: &TeamView) -> bool {
        match self {
            Venue::Home => view.is_home,
            Venue::Away => !view.is_home,
            Venue::Both => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lookback {
    All,
    Years(u32),
    /// Seasons counted back from the one containing the as-of date; 1 is the
    /// current season only.
    Seasons(u32),
    /// Last N matches after venue filtering.
    Matches(usize),
}

impl Lookback {
    /// Inclusive lower date bound implied for a query bounded above by `before`.
    pub fn since(self, before: NaiveDate) -> Option<NaiveDate> {
        match self {
            Lookback::All | Lookback::Matches(_) => None,
            Lookback::Years(n) => before.checked_sub_months(Months::new(12 * n)),
            Lookback::Seasons(n) => {
                let start = season_start(before);
                start.checked_sub_months(Months::new(12 * n.saturating_sub(1)))
            }
        }
    }

    pub fn match_limit(self) -> Option<usize> {
        match self {
            Lookback::Matches(n) => Some(n),
            _ => None,
        }
    }
}

/// Seasons start on 1 August; a date in July belongs to the season that
/// started the previous August.
pub fn season_start(date: NaiveDate) -> NaiveDate {
    let year = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    NaiveDate::from_ymd_opt(year, 8, 1).unwrap_or(date)
}

/// Read-only access to historical matches. Every query is bounded above by an
/// exclusive `before` date and returns matches in ascending date order.
pub trait MatchRecordStore: Send + Sync {
    fn team_matches(
        &self,
        team: &str,
        before: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError>;

    /// The most recent `limit` meetings of the two teams, either venue.
    fn head_to_head(
        &self,
        team_a: &str,
        team_b: &str,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError>;

    fn matches_between(
        &self,
        since: Option<NaiveDate>,
        before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError>;
}

impl<S: MatchRecordStore + ?Sized> MatchRecordStore for &S {
    fn team_matches(
        &self,
        team: &str,
        before: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        (**self).team_matches(team, before, since)
    }

    fn head_to_head(
        &self,
        team_a: &str,
        team_b: &str,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        (**self).head_to_head(team_a, team_b, before, limit)
    }

    fn matches_between(
        &self,
        since: Option<NaiveDate>,
        before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        (**self).matches_between(since, before)
    }
}

/// Vec-backed store, kept sorted by (date, id).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    matches: Vec<MatchRecord>,
}

impl InMemoryStore {
    pub fn new(mut matches: Vec<MatchRecord>) -> Self {
        matches.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.matches
    }

    fn in_window(m: &MatchRecord, since: Option<NaiveDate>, before: NaiveDate) -> bool {
        m.date < before && since.is_none_or(|s| m.date >= s)
    }
}

impl MatchRecordStore for InMemoryStore {
    fn team_matches(
        &self,
        team: &str,
        before: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|m| Self::in_window(m, since, before) && m.involves(team))
            .cloned()
            .collect())
    }

    fn head_to_head(
        &self,
        team_a: &str,
        team_b: &str,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let meetings: Vec<&MatchRecord> = self
            .matches
            .iter()
            .filter(|m| m.date < before && m.is_meeting(team_a, team_b))
            .collect();
        let skip = meetings.len().saturating_sub(limit);
        Ok(meetings.into_iter().skip(skip).cloned().collect())
    }

    fn matches_between(
        &self,
        since: Option<NaiveDate>,
        before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|m| Self::in_window(m, since, before))
            .cloned()
            .collect())
    }
}

/// A store seen as of `cutoff`: every query's upper bound is pulled down to
/// the cutoff, so nothing dated on or after it is ever returned.
#[derive(Debug, Clone, Copy)]
pub struct PointInTimeView<'s, S: ?Sized> {
    store: &'s S,
    cutoff: NaiveDate,
}

impl<'s, S: MatchRecordStore + ?Sized> PointInTimeView<'s, S> {
    pub fn new(store: &'s S, cutoff: NaiveDate) -> Self {
        Self { store, cutoff }
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }
}

impl<S: MatchRecordStore + ?Sized> MatchRecordStore for PointInTimeView<'_, S> {
    fn team_matches(
        &self,
        team: &str,
        before: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.store
            .team_matches(team, before.min(self.cutoff), since)
    }

    fn head_to_head(
        &self,
        team_a: &str,
        team_b: &str,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.store
            .head_to_head(team_a, team_b, before.min(self.cutoff), limit)
    }

    fn matches_between(
        &self,
        since: Option<NaiveDate>,
        before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.store.matches_between(since, before.min(self.cutoff))
    }
}
