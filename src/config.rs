use std::env;

use serde::{Deserialize, Serialize};

use crate::models::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityBounds {
    pub min: f64,
    pub max: f64,
}

impl ProbabilityBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, p: f64) -> f64 {
        p.clamp(self.min, self.max)
    }
}

impl Default for ProbabilityBounds {
    fn default() -> Self {
        Self::new(0.05, 0.95)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub multi_factor: f64,
    pub form_momentum: f64,
    pub sentiment: f64,
}

impl EnsembleWeights {
    /// Weight of a model inside the ensemble; models without one never vote.
    pub fn weight_for(&self, kind: ModelKind) -> Option<f64> {
        let w = match kind {
            ModelKind::MultiFactor => self.multi_factor,
            ModelKind::FormMomentum => self.form_momentum,
            ModelKind::SentimentExternal => self.sentiment,
            ModelKind::Baseline | ModelKind::OpponentAdjusted => return None,
        };
        (w > 0.0).then_some(w)
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            multi_factor: 0.25,
            form_momentum: 0.30,
            sentiment: 0.25,
        }
    }
}

/// Knobs for the live analysis pass and every model behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub form_window: usize,
    pub h2h_window: usize,
    pub momentum_window: usize,
    pub elo_lookback_years: u32,
    pub elo_home_advantage_pts: f64,
    pub complex_home_advantage: f64,
    pub draw_base: f64,
    pub draw_cap: f64,
    pub first_half_share: f64,
    pub second_half_share: f64,
    pub line_slope: f64,
    pub opponent_line_slope: f64,
    pub goals_confidence_sample: f64,
    pub corners_confidence_sample: f64,
    pub league_avg_total_goals: f64,
    pub anomaly_threshold_pct: f64,
    pub anomaly_bonus_share: f64,
    pub anomaly_bonus_cap: f64,
    pub value_bet_min_ev_pct: f64,
    pub weights: EnsembleWeights,
    pub bounds: ProbabilityBounds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            form_window: 5,
            h2h_window: 10,
            momentum_window: 10,
            elo_lookback_years: 3,
            elo_home_advantage_pts: 65.0,
            complex_home_advantage: 0.15,
            draw_base: 0.26,
            draw_cap: 0.35,
            first_half_share: 0.42,
            second_half_share: 0.58,
            line_slope: 0.18,
            opponent_line_slope: 0.15,
            goals_confidence_sample: 15.0,
            corners_confidence_sample: 20.0,
            league_avg_total_goals: 2.7,
            anomaly_threshold_pct: 25.0,
            anomaly_bonus_share: 0.20,
            anomaly_bonus_cap: 0.95,
            value_bet_min_ev_pct: 5.0,
            weights: EnsembleWeights::default(),
            bounds: ProbabilityBounds::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            form_window: env_usize("MATCHDAY_FORM_WINDOW", d.form_window).clamp(1, 20),
            h2h_window: env_usize("MATCHDAY_H2H_WINDOW", d.h2h_window).clamp(1, 40),
            momentum_window: env_usize("MATCHDAY_MOMENTUM_WINDOW", d.momentum_window)
                .clamp(2, 40),
            elo_lookback_years: env_usize("MATCHDAY_ELO_LOOKBACK_YEARS", 3).clamp(1, 30) as u32,
            elo_home_advantage_pts: env_f64("MATCHDAY_ELO_HOME_ADV", d.elo_home_advantage_pts)
                .clamp(0.0, 200.0),
            complex_home_advantage: env_f64("MATCHDAY_COMPLEX_HOME_ADV", d.complex_home_advantage)
                .clamp(0.0, 0.5),
            anomaly_threshold_pct: env_f64("MATCHDAY_ANOMALY_PCT", d.anomaly_threshold_pct)
                .clamp(1.0, 200.0),
            anomaly_bonus_share: env_f64("MATCHDAY_ANOMALY_BONUS", d.anomaly_bonus_share)
                .clamp(0.0, 1.0),
            value_bet_min_ev_pct: env_f64("MATCHDAY_MIN_EV_PCT", d.value_bet_min_ev_pct)
                .clamp(0.0, 100.0),
            weights: EnsembleWeights {
                multi_factor: env_f64("MATCHDAY_WEIGHT_COMPLEX", d.weights.multi_factor)
                    .clamp(0.0, 1.0),
                form_momentum: env_f64("MATCHDAY_WEIGHT_FORM", d.weights.form_momentum)
                    .clamp(0.0, 1.0),
                sentiment: env_f64("MATCHDAY_WEIGHT_SENTIMENT", d.weights.sentiment)
                    .clamp(0.0, 1.0),
            },
            bounds: env_bounds("MATCHDAY_PROB_MIN", "MATCHDAY_PROB_MAX", d.bounds),
            ..d
        }
    }
}

/// Knobs for the point-in-time backtester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub lookback_years: u32,
    pub form_window: usize,
    pub home_advantage: f64,
    pub draw_weight: f64,
    pub league_avg_goals: f64,
    pub min_edge_ev_pct: f64,
    pub min_edge_probability: f64,
    pub fallback_probability: f64,
    pub stake: f64,
    pub allow_simulated_prices: bool,
    pub simulated_margin: f64,
    pub bounds: ProbabilityBounds,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            lookback_years: 3,
            form_window: 5,
            home_advantage: 0.12,
            draw_weight: 0.25,
            league_avg_goals: 1.5,
            min_edge_ev_pct: 5.0,
            min_edge_probability: 0.30,
            fallback_probability: 0.40,
            stake: 1.0,
            allow_simulated_prices: false,
            simulated_margin: 0.05,
            bounds: ProbabilityBounds::new(0.05, 0.85),
        }
    }
}

impl BacktestConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            lookback_years: env_usize("BACKTEST_LOOKBACK_YEARS", 3).clamp(1, 30) as u32,
            form_window: env_usize("BACKTEST_FORM_WINDOW", d.form_window).clamp(1, 20),
            min_edge_ev_pct: env_f64("BACKTEST_MIN_EV_PCT", d.min_edge_ev_pct).clamp(0.0, 100.0),
            fallback_probability: env_f64("BACKTEST_FALLBACK_PROB", d.fallback_probability)
                .clamp(0.0, 1.0),
            stake: env_f64("BACKTEST_STAKE", d.stake).clamp(0.01, 1_000_000.0),
            allow_simulated_prices: env_bool("BACKTEST_SIMULATED_PRICES", false),
            simulated_margin: env_f64("BACKTEST_SIMULATED_MARGIN", d.simulated_margin)
                .clamp(0.0, 0.5),
            ..d
        }
    }
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_bounds(min_key: &str, max_key: &str, default: ProbabilityBounds) -> ProbabilityBounds {
    let min = env_f64(min_key, default.min).clamp(0.001, 0.49);
    let max = env_f64(max_key, default.max).clamp(0.51, 0.999);
    ProbabilityBounds::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_weights_skip_non_voting_models() {
        let w = EnsembleWeights::default();
        assert_eq!(w.weight_for(ModelKind::FormMomentum), Some(0.30));
        assert_eq!(w.weight_for(ModelKind::Baseline), None);
        assert_eq!(w.weight_for(ModelKind::OpponentAdjusted), None);
    }

    #[test]
    fn zero_weight_removes_model() {
        let w = EnsembleWeights {
            sentiment: 0.0,
            ..EnsembleWeights::default()
        };
        assert_eq!(w.weight_for(ModelKind::SentimentExternal), None);
    }
}
