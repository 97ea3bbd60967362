use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;
use crate::error::MarketParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    FullTime,
    FirstHalf,
    SecondHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TotalStat {
    Goals,
    Corners,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Over,
    Under,
}

impl Side {
    /// +1 for over, -1 for under; multiplies `expected - line`.
    pub fn sign(self) -> f64 {
        match self {
            Side::Over => 1.0,
            Side::Under => -1.0,
        }
    }
}

/// A structured market, parsed once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Market {
    Moneyline(Outcome),
    Total {
        period: Period,
        stat: TotalStat,
        side: Side,
        line: f64,
    },
}

impl Market {
    pub fn is_moneyline(&self) -> bool {
        matches!(self, Market::Moneyline(_))
    }
}

impl FromStr for Market {
    type Err = MarketParseError;

    /// Accepts `moneyline_home|draw|away` and
    /// `<period>[_goals|_corners]_<over|under>_<line>`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Err(MarketParseError::Empty);
        }

        if let Some(rest) = token
            .strip_prefix("moneyline_")
            .or_else(|| token.strip_prefix("1x2_"))
            .or_else(|| token.strip_prefix("h2h_"))
        {
            let outcome = match rest {
                "home" | "1" => Outcome::Home,
                "draw" | "x" => Outcome::Draw,
                "away" | "2" => Outcome::Away,
                _ => return Err(MarketParseError::UnknownOutcome(raw.to_string())),
            };
            return Ok(Market::Moneyline(outcome));
        }

        let (period, rest) = split_period(&token)
            .ok_or_else(|| MarketParseError::UnknownPeriod(raw.to_string()))?;

        let (stat, rest) = if let Some(r) = rest.strip_prefix("goals_") {
            (TotalStat::Goals, r)
        } else if let Some(r) = rest.strip_prefix("corners_") {
            (TotalStat::Corners, r)
        } else {
            (TotalStat::Goals, rest)
        };

        let (side, line_raw) = if let Some(r) = rest.strip_prefix("over_") {
            (Side::Over, r)
        } else if let Some(r) = rest.strip_prefix("under_") {
            (Side::Under, r)
        } else {
            return Err(MarketParseError::MissingSide(raw.to_string()));
        };

        let line = line_raw
            .parse::<f64>()
            .ok()
            .filter(|l| l.is_finite() && *l >= 0.0)
            .ok_or_else(|| MarketParseError::BadLine(raw.to_string()))?;

        Ok(Market::Total {
            period,
            stat,
            side,
            line,
        })
    }
}

fn split_period(token: &str) -> Option<(Period, &str)> {
    const PREFIXES: &[(&str, Period)] = &[
        ("first_half_", Period::FirstHalf),
        ("second_half_", Period::SecondHalf),
        ("full_time_", Period::FullTime),
        ("full_", Period::FullTime),
        ("ft_", Period::FullTime),
        ("1h_", Period::FirstHalf),
        ("2h_", Period::SecondHalf),
    ];
    PREFIXES
        .iter()
        .find_map(|(prefix, period)| token.strip_prefix(prefix).map(|rest| (*period, rest)))
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Moneyline(outcome) => {
                let o = match outcome {
                    Outcome::Home => "home",
                    Outcome::Draw => "draw",
                    Outcome::Away => "away",
                };
                write!(f, "moneyline_{o}")
            }
            Market::Total {
                period,
                stat,
                side,
                line,
            } => {
                let p = match period {
                    Period::FullTime => "full",
                    Period::FirstHalf => "first_half",
                    Period::SecondHalf => "second_half",
                };
                let s = match stat {
                    TotalStat::Goals => "goals",
                    TotalStat::Corners => "corners",
                };
                let d = match side {
                    Side::Over => "over",
                    Side::Under => "under",
                };
                write!(f, "{p}_{s}_{d}_{line}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_period_direction_line_token() {
        let m: Market = "first_half_over_1.5".parse().unwrap();
        assert_eq!(
            m,
            Market::Total {
                period: Period::FirstHalf,
                stat: TotalStat::Goals,
                side: Side::Over,
                line: 1.5
            }
        );
    }

    #[test]
    fn parses_corners_and_moneyline() {
        let m: Market = "second_half_corners_under_4.5".parse().unwrap();
        assert!(matches!(
            m,
            Market::Total {
                stat: TotalStat::Corners,
                side: Side::Under,
                ..
            }
        ));
        let m: Market = "MONEYLINE_draw".parse().unwrap();
        assert_eq!(m, Market::Moneyline(Outcome::Draw));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["full_goals_over_2.5", "moneyline_away", "first_half_corners_under_4.5"] {
            let m: Market = raw.parse().unwrap();
            assert_eq!(m.to_string(), raw);
            assert_eq!(m.to_string().parse::<Market>().unwrap(), m);
        }
    }

    #[test]
    fn rejects_malformed_specifiers() {
        assert_eq!("".parse::<Market>(), Err(MarketParseError::Empty));
        assert!(matches!(
            "full_over_abc".parse::<Market>(),
            Err(MarketParseError::BadLine(_))
        ));
        assert!(matches!(
            "third_half_over_1.5".parse::<Market>(),
            Err(MarketParseError::UnknownPeriod(_))
        ));
        assert!(matches!(
            "full_sideways_1.5".parse::<Market>(),
            Err(MarketParseError::MissingSide(_))
        ));
        assert!(matches!(
            "moneyline_both".parse::<Market>(),
            Err(MarketParseError::UnknownOutcome(_))
        ));
    }
}
