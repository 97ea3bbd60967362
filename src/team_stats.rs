use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::StoreError;
use crate::market::{Period, TotalStat};
use crate::match_store::{Lookback, MatchRecord, MatchRecordStore, TeamView, Venue};

/// Win/draw/loss and scoring aggregates over one venue context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VenueSplit {
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: f64,
    pub goals_against: f64,
    pub corners_for: f64,
    pub corners_against: f64,
}

impl VenueSplit {
    fn push(&mut self, v: &TeamView) {
        self.matches += 1;
        match v.points() {
            3 => self.wins += 1,
            1 => self.draws += 1,
            _ => self.losses += 1,
        }
        self.goals_for += v.goals_for as f64;
        self.goals_against += v.goals_against as f64;
        self.corners_for += v.corners_for as f64;
        self.corners_against += v.corners_against as f64;
    }

    fn rate(&self, count: usize) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            count as f64 / self.matches as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        self.rate(self.wins)
    }

    pub fn draw_rate(&self) -> f64 {
        self.rate(self.draws)
    }

    pub fn loss_rate(&self) -> f64 {
        self.rate(self.losses)
    }

    fn avg(&self, total: f64) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            total / self.matches as f64
        }
    }

    pub fn avg_goals_for(&self) -> f64 {
        self.avg(self.goals_for)
    }

    pub fn avg_goals_against(&self) -> f64 {
        self.avg(self.goals_against)
    }

    pub fn avg_corners_for(&self) -> f64 {
        self.avg(self.corners_for)
    }

    pub fn avg_corners_against(&self) -> f64 {
        self.avg(self.corners_against)
    }

    pub fn goal_diff_per_match(&self) -> f64 {
        self.avg(self.goals_for - self.goals_against)
    }
}

/// Average per-match figures for one period of play.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodAverages {
    pub goals_for: f64,
    pub goals_against: f64,
    pub corners_for: f64,
    pub corners_against: f64,
}

impl PeriodAverages {
    pub fn attack(&self, stat: TotalStat) -> f64 {
        match stat {
            TotalStat::Goals => self.goals_for,
            TotalStat::Corners => self.corners_for,
        }
    }

    pub fn defense(&self, stat: TotalStat) -> f64 {
        match stat {
            TotalStat::Goals => self.goals_against,
            TotalStat::Corners => self.corners_against,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSamples {
    pub goals: Vec<u32>,
    pub corners: Vec<u32>,
}

impl PeriodSamples {
    pub fn get(&self, stat: TotalStat) -> &[u32] {
        match stat {
            TotalStat::Goals => &self.goals,
            TotalStat::Corners => &self.corners,
        }
    }
}

/// Windowed aggregates for one team. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamWindowStats {
    pub team: String,
    pub overall: VenueSplit,
    pub home: VenueSplit,
    pub away: VenueSplit,
    pub full_time: PeriodAverages,
    pub first_half: PeriodAverages,
    pub second_half: PeriodAverages,
    /// Match total goals (both sides) -> share of matches.
    pub total_goals_distribution: BTreeMap<u32, f64>,
    pub total_corners_distribution: BTreeMap<u32, f64>,
    pub full_time_samples: PeriodSamples,
    pub first_half_samples: PeriodSamples,
    pub second_half_samples: PeriodSamples,
    /// At least one first-half corner figure is the 40% estimate.
    pub first_half_corners_estimated: bool,
}

impl TeamWindowStats {
    pub fn matches(&self) -> usize {
        self.overall.matches
    }

    pub fn period(&self, period: Period) -> &PeriodAverages {
        match period {
            Period::FullTime => &self.full_time,
            Period::FirstHalf => &self.first_half,
            Period::SecondHalf => &self.second_half,
        }
    }

    /// Per-match totals (scored + conceded) for the period and stat.
    pub fn totals_sample(&self, period: Period, stat: TotalStat) -> &[u32] {
        match period {
            Period::FullTime => self.full_time_samples.get(stat),
            Period::FirstHalf => self.first_half_samples.get(stat),
            Period::SecondHalf => self.second_half_samples.get(stat),
        }
    }
}

/// Aggregate a team's matches (ascending by date). The venue filter is applied
/// before the optional match limit, which keeps the most recent matches.
pub fn summarize(
    team: &str,
    matches: &[MatchRecord],
    venue: Venue,
    limit: Option<usize>,
) -> Option<TeamWindowStats> {
    let mut rows: Vec<(&MatchRecord, TeamView)> = matches
        .iter()
        .filter_map(|m| m.view_for(team).map(|v| (m, v)))
        .filter(|(_, v)| venue.admits(v))
        .collect();
    if let Some(n) = limit {
        let skip = rows.len().saturating_sub(n);
        rows.drain(..skip);
    }
    if rows.is_empty() {
        return None;
    }

    let mut overall = VenueSplit::default();
    let mut home = VenueSplit::default();
    let mut away = VenueSplit::default();
    let mut sums = [[0.0_f64; 4]; 3];
    let mut full_time_samples = PeriodSamples::default();
    let mut first_half_samples = PeriodSamples::default();
    let mut second_half_samples = PeriodSamples::default();
    let mut goals_hist: BTreeMap<u32, usize> = BTreeMap::new();
    let mut corners_hist: BTreeMap<u32, usize> = BTreeMap::new();
    let mut estimated = false;

    for (m, v) in &rows {
        overall.push(v);
        if v.is_home {
            home.push(v);
        } else {
            away.push(v);
        }
        estimated |= m.corners_ht_estimated;

        let cf_2h = v.corners_for.saturating_sub(v.corners_for_ht);
        let ca_2h = v.corners_against.saturating_sub(v.corners_against_ht);
        let per_period = [
            [v.goals_for, v.goals_against, v.corners_for, v.corners_against],
            [
                v.goals_for_ht,
                v.goals_against_ht,
                v.corners_for_ht,
                v.corners_against_ht,
            ],
            [v.goals_for_2h(), v.goals_against_2h(), cf_2h, ca_2h],
        ];
        for (acc, vals) in sums.iter_mut().zip(per_period) {
            for (a, x) in acc.iter_mut().zip(vals) {
                *a += x as f64;
            }
        }
        for (samples, vals) in [
            &mut full_time_samples,
            &mut first_half_samples,
            &mut second_half_samples,
        ]
        .into_iter()
        .zip(per_period)
        {
            samples.goals.push(vals[0] as u32 + vals[1] as u32);
            samples.corners.push(vals[2] as u32 + vals[3] as u32);
        }

        *goals_hist.entry(m.total_goals()).or_default() += 1;
        *corners_hist.entry(m.total_corners()).or_default() += 1;
    }

    let n = rows.len() as f64;
    let averages = |s: [f64; 4]| PeriodAverages {
        goals_for: s[0] / n,
        goals_against: s[1] / n,
        corners_for: s[2] / n,
        corners_against: s[3] / n,
    };

    Some(TeamWindowStats {
        team: team.to_string(),
        overall,
        home,
        away,
        full_time: averages(sums[0]),
        first_half: averages(sums[1]),
        second_half: averages(sums[2]),
        total_goals_distribution: to_distribution(goals_hist),
        total_corners_distribution: to_distribution(corners_hist),
        full_time_samples,
        first_half_samples,
        second_half_samples,
        first_half_corners_estimated: estimated,
    })
}

fn to_distribution(hist: BTreeMap<u32, usize>) -> BTreeMap<u32, f64> {
    let total: usize = hist.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    hist.into_iter()
        .map(|(k, c)| (k, c as f64 / total as f64))
        .collect()
}

/// Share of `sample` strictly above (over) or below (under) `line`.
/// `None` for an empty sample.
pub fn empirical_side_frequency(sample: &[u32], line: f64, over: bool) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    let hits = sample
        .iter()
        .filter(|&&t| {
            let t = t as f64;
            if over { t > line } else { t < line }
        })
        .count();
    Some(hits as f64 / sample.len() as f64)
}

pub struct TeamStatsAggregator<S> {
    store: S,
}

impl<S: MatchRecordStore> TeamStatsAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stats for `team` from matches strictly before `as_of`. `Ok(None)` when
    /// the window holds no matches.
    pub fn team_stats(
        &self,
        team: &str,
        venue: Venue,
        lookback: Lookback,
        as_of: NaiveDate,
    ) -> Result<Option<TeamWindowStats>, StoreError> {
        let rows = self.store.team_matches(team, as_of, lookback.since(as_of))?;
        Ok(summarize(team, &rows, venue, lookback.match_limit()))
    }
}
