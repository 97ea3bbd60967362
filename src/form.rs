use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::calibration::Prob3;
use crate::config::EngineConfig;
use crate::elo::{self, EloConfig};
use crate::error::StoreError;
use crate::market::{Period, Side, TotalStat};
use crate::match_store::{Lookback, MatchRecord, MatchRecordStore, TeamView, Venue};

const FORM_DECAY: f64 = 0.3;
const MIN_H2H_MEETINGS: usize = 3;

/// Recency-weighted form over the last N matches in one venue context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormSnapshot {
    pub matches: usize,
    /// Weighted points as a share of the maximum, in [0, 1].
    pub form_score: f64,
    pub weighted_ppg: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub corners_for: f64,
    pub corners_against: f64,
}

impl FormSnapshot {
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

/// Record between two teams, seen from the side passed as `home` regardless of
/// where each meeting was played.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadToHeadRecord {
    pub meetings: usize,
    pub home_win_rate: f64,
    pub draw_rate: f64,
    pub away_win_rate: f64,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
    pub avg_home_corners: f64,
    pub avg_away_corners: f64,
}

impl HeadToHeadRecord {
    pub fn avg_total(&self, stat: TotalStat) -> f64 {
        match stat {
            TotalStat::Goals => self.avg_home_goals + self.avg_away_goals,
            TotalStat::Corners => self.avg_home_corners + self.avg_away_corners,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MomentumTrend {
    StrongPositive,
    Positive,
    Negative,
    StrongNegative,
}

impl MomentumTrend {
    pub fn from_value(v: f64) -> Self {
        if v >= 0.5 {
            MomentumTrend::StrongPositive
        } else if v >= 0.0 {
            MomentumTrend::Positive
        } else if v > -0.5 {
            MomentumTrend::Negative
        } else {
            MomentumTrend::StrongNegative
        }
    }

    /// Shift applied to a team's expected goals.
    pub fn goals_bonus(self) -> f64 {
        match self {
            MomentumTrend::StrongPositive => 0.2,
            MomentumTrend::Positive => 0.1,
            MomentumTrend::Negative => -0.1,
            MomentumTrend::StrongNegative => -0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Momentum {
    pub value: f64,
    pub trend: MomentumTrend,
}

/// `form_score` and weighted figures over `views`, most recent last.
pub fn form_snapshot(views: &[TeamView]) -> Option<FormSnapshot> {
    if views.is_empty() {
        return None;
    }
    let mut w_sum = 0.0;
    let mut acc = [0.0_f64; 5];
    for (i, v) in views.iter().rev().enumerate() {
        let w = (-FORM_DECAY * i as f64).exp();
        w_sum += w;
        let vals = [
            v.points() as f64,
            v.goals_for as f64,
            v.goals_against as f64,
            v.corners_for as f64,
            v.corners_against as f64,
        ];
        for (a, x) in acc.iter_mut().zip(vals) {
            *a += x * w;
        }
    }
    let weighted_ppg = acc[0] / w_sum;
    Some(FormSnapshot {
        matches: views.len(),
        form_score: weighted_ppg / 3.0,
        weighted_ppg,
        goals_for: acc[1] / w_sum,
        goals_against: acc[2] / w_sum,
        corners_for: acc[3] / w_sum,
        corners_against: acc[4] / w_sum,
    })
}

/// Later-half minus earlier-half average goal difference. Needs two matches.
pub fn momentum_of(views: &[TeamView]) -> Option<Momentum> {
    if views.len() < 2 {
        return None;
    }
    let later_len = views.len() / 2;
    let (earlier, later) = views.split_at(views.len() - later_len);
    let avg = |vs: &[TeamView]| {
        vs.iter().map(|v| v.goal_diff() as f64).sum::<f64>() / vs.len() as f64
    };
    let value = avg(later) - avg(earlier);
    Some(Momentum {
        value,
        trend: MomentumTrend::from_value(value),
    })
}

pub fn head_to_head_record(home: &str, meetings: &[MatchRecord]) -> Option<HeadToHeadRecord> {
    let views: Vec<TeamView> = meetings.iter().filter_map(|m| m.view_for(home)).collect();
    if views.is_empty() {
        return None;
    }
    let n = views.len() as f64;
    let count = |pts: u8| views.iter().filter(|v| v.points() == pts).count() as f64 / n;
    let avg = |f: fn(&TeamView) -> u8| views.iter().map(|v| f(v) as f64).sum::<f64>() / n;
    Some(HeadToHeadRecord {
        meetings: views.len(),
        home_win_rate: count(3),
        draw_rate: count(1),
        away_win_rate: count(0),
        avg_home_goals: avg(|v| v.goals_for),
        avg_away_goals: avg(|v| v.goals_against),
        avg_home_corners: avg(|v| v.corners_for),
        avg_away_corners: avg(|v| v.corners_against),
    })
}

/// Split a blended home-strength share into a three-way distribution.
/// The away component is the complement of `raw_home` before the draw rescale.
pub fn split_with_draw(raw_home: f64, form_similarity: f64, cfg: &EngineConfig) -> Prob3 {
    let draw = (cfg.draw_base * (1.0 + form_similarity.clamp(0.0, 1.0) * 0.3)).min(cfg.draw_cap);
    let raw_home = raw_home.clamp(0.0, 1.0);
    Prob3 {
        home: raw_home * (1.0 - draw),
        draw,
        away: (1.0 - raw_home) * (1.0 - draw),
    }
    .normalized()
}

/// Map an expected total against a line; over and under use the negated diff.
pub fn line_probability(expected: f64, line: f64, side: Side, slope: f64) -> f64 {
    (0.5 + slope * side.sign() * (expected - line)).clamp(0.05, 0.95)
}

pub fn period_scale(period: Period, cfg: &EngineConfig) -> f64 {
    match period {
        Period::FullTime => 1.0,
        Period::FirstHalf => cfg.first_half_share,
        Period::SecondHalf => cfg.second_half_share,
    }
}

/// ELO, form, head-to-head and momentum for one fixed as-of date.
///
/// Caches live and die with the instance, which is bound to a single as-of
/// date; a different cutoff needs a new engine.
pub struct FormMomentumEngine<S> {
    store: S,
    as_of: NaiveDate,
    cfg: EngineConfig,
    history: RefCell<HashMap<String, Rc<Vec<TeamView>>>>,
    elo: RefCell<HashMap<String, f64>>,
}

impl<S: MatchRecordStore> FormMomentumEngine<S> {
    pub fn new(store: S, as_of: NaiveDate, cfg: &EngineConfig) -> Self {
        Self {
            store,
            as_of,
            cfg: cfg.clone(),
            history: RefCell::new(HashMap::new()),
            elo: RefCell::new(HashMap::new()),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// The team's matches inside the replay window, ascending.
    fn team_history(&self, team: &str) -> Result<Rc<Vec<TeamView>>, StoreError> {
        if let Some(h) = self.history.borrow().get(team) {
            return Ok(Rc::clone(h));
        }
        let since = Lookback::Years(self.cfg.elo_lookback_years).since(self.as_of);
        let mut rows = self.store.team_matches(team, self.as_of, since)?;
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let elo = elo::replay_team_elo(team, &rows, EloConfig::default());
        self.elo.borrow_mut().insert(team.to_string(), elo);

        let views = Rc::new(rows.iter().filter_map(|m| m.view_for(team)).collect::<Vec<_>>());
        self.history
            .borrow_mut()
            .insert(team.to_string(), Rc::clone(&views));
        Ok(views)
    }

    pub fn elo(&self, team: &str) -> Result<f64, StoreError> {
        if let Some(e) = self.elo.borrow().get(team) {
            return Ok(*e);
        }
        self.team_history(team)?;
        Ok(self
            .elo
            .borrow()
            .get(team)
            .copied()
            .unwrap_or(elo::DEFAULT_RATING))
    }

    pub fn recent_form(
        &self,
        team: &str,
        venue: Venue,
    ) -> Result<Option<FormSnapshot>, StoreError> {
        let history = self.team_history(team)?;
        let in_context: Vec<TeamView> = history
            .iter()
            .filter(|v| venue.admits(v))
            .copied()
            .collect();
        let skip = in_context.len().saturating_sub(self.cfg.form_window);
        Ok(form_snapshot(&in_context[skip..]))
    }

    pub fn momentum(&self, team: &str) -> Result<Option<Momentum>, StoreError> {
        let history = self.team_history(team)?;
        let skip = history.len().saturating_sub(self.cfg.momentum_window);
        Ok(momentum_of(&history[skip..]))
    }

    pub fn head_to_head(
        &self,
        home: &str,
        away: &str,
    ) -> Result<Option<HeadToHeadRecord>, StoreError> {
        let meetings = self
            .store
            .head_to_head(home, away, self.as_of, self.cfg.h2h_window)?;
        Ok(head_to_head_record(home, &meetings))
    }

    /// Three-way probabilities; `None` when either side has no form in its
    /// venue context.
    pub fn moneyline(&self, home: &str, away: &str) -> Result<Option<Prob3>, StoreError> {
        let (Some(form_h), Some(form_a)) = (
            self.recent_form(home, Venue::Home)?,
            self.recent_form(away, Venue::Away)?,
        ) else {
            return Ok(None);
        };

        let elo_term = elo::home_strength(
            self.elo(home)?,
            self.elo(away)?,
            self.cfg.elo_home_advantage_pts,
        );
        let form_term =
            (0.5 + (form_h.form_score - form_a.form_score + 0.10) * 0.4).clamp(0.1, 0.9);
        let h2h_term = match self.head_to_head(home, away)? {
            Some(h) if h.meetings >= MIN_H2H_MEETINGS => h.home_win_rate + 0.4 * h.draw_rate,
            _ => 0.5,
        };
        let mom = |m: Option<Momentum>| m.map(|m| m.value).unwrap_or(0.0);
        let momentum_gap = mom(self.momentum(home)?) - mom(self.momentum(away)?);
        let momentum_term = (0.5 + 0.15 * momentum_gap).clamp(0.2, 0.8);

        let raw_home = 0.30 * elo_term + 0.35 * form_term + 0.15 * h2h_term + 0.20 * momentum_term;
        let similarity = 1.0 - (form_h.form_score - form_a.form_score).abs();
        debug!(
            home,
            away,
            raw_home,
            elo_term,
            form_term,
            h2h_term,
            momentum_term,
            "form moneyline"
        );
        Ok(Some(split_with_draw(raw_home, similarity, &self.cfg)))
    }

    /// Expected match total for the period; `None` when either side has no
    /// form in its venue context.
    pub fn expected_total(
        &self,
        home: &str,
        away: &str,
        period: Period,
        stat: TotalStat,
    ) -> Result<Option<f64>, StoreError> {
        let (Some(form_h), Some(form_a)) = (
            self.recent_form(home, Venue::Home)?,
            self.recent_form(away, Venue::Away)?,
        ) else {
            return Ok(None);
        };

        let home_side = (form_h.attack(stat) + form_a.defense(stat)) / 2.0;
        let away_side = (form_a.attack(stat) + form_h.defense(stat)) / 2.0;
        let mut expected = home_side + away_side;

        if stat == TotalStat::Goals {
            for team in [home, away] {
                if let Some(m) = self.momentum(team)? {
                    expected += m.trend.goals_bonus();
                }
            }
        }
        match self.head_to_head(home, away)? {
            Some(h) if h.meetings >= MIN_H2H_MEETINGS => {
                expected = 0.7 * expected + 0.3 * h.avg_total(stat);
            }
            _ => {}
        }
        Ok(Some(expected.max(0.0) * period_scale(period, &self.cfg)))
    }
}
