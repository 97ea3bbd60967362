use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Scale to sum 1; a non-positive total falls back to uniform.
    pub fn normalized(self) -> Self {
        let home = self.home.max(0.0);
        let draw = self.draw.max(0.0);
        let away = self.away.max(0.0);
        let sum = home + draw + away;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::uniform();
        }
        Self {
            home: home / sum,
            draw: draw / sum,
            away: away / sum,
        }
    }

    /// Normalize, then keep every outcome inside `[lo, hi]` while still summing
    /// to 1. Outcomes above `hi` are pinned first and their excess spread over
    /// the rest in proportion; outcomes below `lo` are then pinned and the
    /// shortfall taken from the rest in proportion.
    pub fn fit_to_bounds(self, lo: f64, hi: f64) -> Self {
        if 3.0 * lo > 1.0 || 3.0 * hi < 1.0 {
            return Self::uniform();
        }
        let n = self.normalized();
        let mut p = [n.home, n.draw, n.away];
        let mut pinned = [false; 3];

        for upper in [true, false] {
            for _ in 0..3 {
                let Some(i) = (0..3).find(|&i| {
                    !pinned[i] && if upper { p[i] > hi } else { p[i] < lo }
                }) else {
                    break;
                };
                p[i] = if upper { hi } else { lo };
                pinned[i] = true;
                spread_remaining_mass(&mut p, &pinned);
            }
        }

        Self {
            home: p[0],
            draw: p[1],
            away: p[2],
        }
    }
}

fn spread_remaining_mass(p: &mut [f64; 3], pinned: &[bool; 3]) {
    let fixed: f64 = (0..3).filter(|&i| pinned[i]).map(|i| p[i]).sum();
    let free: f64 = (0..3).filter(|&i| !pinned[i]).map(|i| p[i]).sum();
    let free_count = pinned.iter().filter(|x| !**x).count();
    if free_count == 0 {
        return;
    }
    let target = 1.0 - fixed;
    for i in 0..3 {
        if pinned[i] {
            continue;
        }
        p[i] = if free > 0.0 {
            p[i] * target / free
        } else {
            target / free_count as f64
        };
    }
}

pub fn classify_outcome(home_goals: i32, away_goals: i32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }

    let mut home = 0usize;
    let mut draw = 0usize;
    let mut away = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Home => home += 1,
            Outcome::Draw => draw += 1,
            Outcome::Away => away += 1,
        }
    }
    let n = outcomes.len() as f64;
    Prob3 {
        home: home as f64 / n,
        draw: draw as f64 / n,
        away: away as f64 / n,
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);

        let actual_prob = p.get(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);

        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    let mut out = Vec::with_capacity(bins);
    for i in 0..bins {
        let start = i as f64 / bins as f64;
        let end = (i + 1) as f64 / bins as f64;
        let count = counts[i];
        let (avg_pred, actual_rate) = if count > 0 {
            (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
        } else {
            (0.0, 0.0)
        };
        out.push(CalibrationBin {
            bucket_start: start,
            bucket_end: end,
            count,
            avg_pred,
            actual_rate,
        });
    }
    out
}

pub fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}
