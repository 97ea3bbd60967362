use crate::match_store::MatchRecord;

pub const DEFAULT_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    pub k_min: f64,
    pub k_max: f64,
    pub scale: f64,
    pub margin_step: f64,
    pub margin_cap: u32,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k_min: 16.0,
            k_max: 32.0,
            scale: 400.0,
            margin_step: 0.1,
            margin_cap: 3,
        }
    }
}

/// Replay `team`'s matches in the order given and return its rating.
///
/// The caller must pass matches in ascending date order: the K-factor grows
/// with position in the replay, so a reordered sequence yields a different
/// rating. Every opponent is treated as a fixed 1500 baseline.
pub fn replay_team_elo(team: &str, matches: &[MatchRecord], cfg: EloConfig) -> f64 {
    let played: Vec<_> = matches.iter().filter_map(|m| m.view_for(team)).collect();
    let n = played.len();

    let mut elo = DEFAULT_RATING;
    for (i, view) in played.iter().enumerate() {
        let progress = if n <= 1 {
            1.0
        } else {
            i as f64 / (n - 1) as f64
        };
        let k = cfg.k_min + (cfg.k_max - cfg.k_min) * progress;
        let expected = expected_score(elo, DEFAULT_RATING, cfg.scale);
        let margin = view.goal_diff().unsigned_abs().min(cfg.margin_cap);
        let multiplier = 1.0 + cfg.margin_step * margin as f64;
        elo += k * multiplier * (view.result_score() - expected);
    }
    elo
}

pub fn expected_score(r_a: f64, r_b: f64, scale: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) / scale))
}

/// Home win share implied by two ratings plus a home edge in rating points.
pub fn home_strength(elo_home: f64, elo_away: f64, home_adv_pts: f64) -> f64 {
    expected_score(elo_home + home_adv_pts, elo_away, 400.0)
}
