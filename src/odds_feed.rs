use std::collections::HashSet;
use std::env;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::anomaly::PriceQuote;
use crate::calibration::Outcome;
use crate::config::env_bool;
use crate::error::FeedError;
use crate::http_client::http_client;
use crate::market::{Market, Period, Side, TotalStat};
use crate::models::Fixture;

const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
const LINE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct OddsFeedConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub regions: String,
    pub markets: String,
    pub sport_key: String,
    pub base_url: String,
}

impl OddsFeedConfig {
    pub fn from_env() -> Self {
        let api_key = env::var("ODDS_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let var = |key: &str, default: &str| {
            env::var(key)
                .ok()
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            enabled: env_bool("ODDS_ENABLED", true),
            api_key,
            regions: var("ODDS_REGIONS", "uk,eu"),
            markets: var("ODDS_MARKETS", "h2h,totals"),
            sport_key: var("ODDS_SPORT_KEY", "soccer_epl"),
            base_url: env::var("ODDS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// One bookmaker price for one structured market outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmakerQuote {
    pub bookmaker: String,
    pub market: Market,
    pub price: f64,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteEvent {
    pub home_team: String,
    pub away_team: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub quotes: Vec<BookmakerQuote>,
}

impl QuoteEvent {
    /// Every bookmaker's price for `market`, as anomaly-detector input.
    pub fn quotes_for(&self, market: &Market) -> Vec<PriceQuote> {
        self.quotes
            .iter()
            .filter(|q| same_market(&q.market, market))
            .map(|q| PriceQuote::new(q.bookmaker.clone(), q.price))
            .collect()
    }
}

fn same_market(a: &Market, b: &Market) -> bool {
    match (a, b) {
        (Market::Moneyline(x), Market::Moneyline(y)) => x == y,
        (
            Market::Total {
                period: p1,
                stat: s1,
                side: d1,
                line: l1,
            },
            Market::Total {
                period: p2,
                stat: s2,
                side: d2,
                line: l2,
            },
        ) => p1 == p2 && s1 == s2 && d1 == d2 && (l1 - l2).abs() < LINE_EPSILON,
        _ => false,
    }
}

/// Source of bookmaker prices. `Ok(vec![])` means the feed answered with no
/// events; any `Err` means the feed is unavailable.
pub trait BookmakerQuoteFeed {
    fn fetch(&self, league: &str) -> Result<Vec<QuoteEvent>, FeedError>;
}

/// Fixed events, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticQuoteFeed {
    events: Vec<QuoteEvent>,
}

impl StaticQuoteFeed {
    pub fn new(events: Vec<QuoteEvent>) -> Self {
        Self { events }
    }
}

impl BookmakerQuoteFeed for StaticQuoteFeed {
    fn fetch(&self, _league: &str) -> Result<Vec<QuoteEvent>, FeedError> {
        Ok(self.events.clone())
    }
}

pub struct TheOddsApiFeed {
    cfg: OddsFeedConfig,
    api_key: String,
}

impl TheOddsApiFeed {
    /// `None` when the feed is disabled or has no API key.
    pub fn from_config(cfg: OddsFeedConfig) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let api_key = cfg.api_key.clone()?;
        Some(Self { cfg, api_key })
    }

    fn sport_key<'a>(&'a self, league: &'a str) -> &'a str {
        match league.trim().to_ascii_lowercase().as_str() {
            "" => self.cfg.sport_key.as_str(),
            "epl" | "premier-league" | "premier_league" => "soccer_epl",
            "championship" => "soccer_efl_champ",
            "laliga" | "la-liga" => "soccer_spain_la_liga",
            "bundesliga" => "soccer_germany_bundesliga",
            "serie-a" | "seriea" => "soccer_italy_serie_a",
            "ligue-1" | "ligue1" => "soccer_france_ligue_one",
            _ => league.trim(),
        }
    }
}

impl BookmakerQuoteFeed for TheOddsApiFeed {
    fn fetch(&self, league: &str) -> Result<Vec<QuoteEvent>, FeedError> {
        let sport_key = self.sport_key(league);
        let url = format!("{}/sports/{sport_key}/odds", self.cfg.base_url);
        let client = http_client()?;
        let resp = client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.cfg.regions.as_str()),
                ("markets", self.cfg.markets.as_str()),
                ("oddsFormat", "decimal"),
                ("dateFormat", "iso"),
            ])
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            let snippet = body
                .trim()
                .replace(['\n', '\r'], " ")
                .chars()
                .take(220)
                .collect::<String>();
            return Err(FeedError::Http {
                status: status.as_u16(),
                body: snippet,
            });
        }
        let events = parse_events_json(&body)?;
        info!(sport_key, events = events.len(), "fetched bookmaker quotes");
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
struct OddsEvent {
    commence_time: Option<String>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Deserialize)]
struct OddsBookmaker {
    key: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsOutcome {
    name: String,
    price: f64,
    #[serde(default)]
    point: Option<f64>,
}

/// Decode an events -> bookmakers -> markets -> outcomes payload. Markets the
/// engine does not model (spreads and the like) are dropped.
pub fn parse_events_json(body: &str) -> Result<Vec<QuoteEvent>, FeedError> {
    let raw: Vec<OddsEvent> = serde_json::from_str(body)?;
    Ok(raw.iter().map(to_quote_event).collect())
}

fn to_quote_event(event: &OddsEvent) -> QuoteEvent {
    let home_aliases = team_aliases(&event.home_team);
    let away_aliases = team_aliases(&event.away_team);
    let mut quotes = Vec::new();

    for book in &event.bookmakers {
        let bookmaker = book.title.clone().unwrap_or_else(|| book.key.clone());
        for market in &book.markets {
            let as_of = market
                .last_update
                .as_deref()
                .or(book.last_update.as_deref())
                .and_then(parse_timestamp);
            for outcome in &market.outcomes {
                if !(outcome.price.is_finite() && outcome.price > 1.0) {
                    continue;
                }
                let Some(m) = outcome_market(&market.key, outcome, &home_aliases, &away_aliases)
                else {
                    continue;
                };
                quotes.push(BookmakerQuote {
                    bookmaker: bookmaker.clone(),
                    market: m,
                    price: outcome.price,
                    as_of,
                });
            }
        }
    }

    QuoteEvent {
        home_team: event.home_team.clone(),
        away_team: event.away_team.clone(),
        kickoff: event.commence_time.as_deref().and_then(parse_timestamp),
        quotes,
    }
}

fn outcome_market(
    key: &str,
    outcome: &OddsOutcome,
    home_aliases: &HashSet<String>,
    away_aliases: &HashSet<String>,
) -> Option<Market> {
    let key = key.to_ascii_lowercase();
    if key == "h2h" {
        let name = outcome.name.trim();
        if is_draw_label(name) {
            return Some(Market::Moneyline(Outcome::Draw));
        }
        let aliases = team_aliases(name);
        let home = alias_overlap(&aliases, home_aliases);
        let away = alias_overlap(&aliases, away_aliases);
        return match home.cmp(&away) {
            std::cmp::Ordering::Greater => Some(Market::Moneyline(Outcome::Home)),
            std::cmp::Ordering::Less => Some(Market::Moneyline(Outcome::Away)),
            std::cmp::Ordering::Equal => None,
        };
    }

    let (period, stat) = match key.as_str() {
        "totals" | "alternate_totals" => (Period::FullTime, TotalStat::Goals),
        "totals_h1" | "alternate_totals_h1" => (Period::FirstHalf, TotalStat::Goals),
        "totals_h2" | "alternate_totals_h2" => (Period::SecondHalf, TotalStat::Goals),
        "totals_corners" | "alternate_totals_corners" => (Period::FullTime, TotalStat::Corners),
        "totals_corners_h1" | "alternate_totals_corners_h1" => {
            (Period::FirstHalf, TotalStat::Corners)
        }
        _ => return None,
    };
    let side = match normalize_word(&outcome.name).as_str() {
        "over" => Side::Over,
        "under" => Side::Under,
        _ => return None,
    };
    let line = outcome.point.filter(|l| l.is_finite() && *l >= 0.0)?;
    Some(Market::Total {
        period,
        stat,
        side,
        line,
    })
}

/// The event best matching the fixture's team names, if both sides match.
pub fn find_event<'e>(events: &'e [QuoteEvent], fixture: &Fixture) -> Option<&'e QuoteEvent> {
    let f_home = team_aliases(&fixture.home);
    let f_away = team_aliases(&fixture.away);
    let f_home_key = canonical_words(&fixture.home).join("");
    let f_away_key = canonical_words(&fixture.away).join("");

    let mut best: Option<(usize, &QuoteEvent)> = None;
    for event in events {
        let exact = canonical_words(&event.home_team).join("") == f_home_key
            && canonical_words(&event.away_team).join("") == f_away_key;
        let home = alias_overlap(&f_home, &team_aliases(&event.home_team));
        let away = alias_overlap(&f_away, &team_aliases(&event.away_team));
        if !exact && (home == 0 || away == 0) {
            continue;
        }
        let score = if exact { usize::MAX } else { home.min(away) };
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, event));
        }
    }
    if let Some((score, event)) = best {
        debug!(
            home = %fixture.home,
            away = %fixture.away,
            event_home = %event.home_team,
            event_away = %event.away_team,
            score,
            "matched quote event"
        );
    }
    best.map(|(_, e)| e)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn is_draw_label(name: &str) -> bool {
    let n = normalize_word(name);
    n == "draw" || n == "tie" || n == "x"
}

pub fn team_aliases(name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let words = canonical_words(name);
    if words.is_empty() {
        return out;
    }

    let collapsed = words.join("");
    if collapsed.len() >= 2 {
        out.insert(collapsed.clone());
    }
    if let Some(p) = prefix(&collapsed, 3) {
        out.insert(p);
    }

    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    if acronym.len() >= 2 {
        out.insert(acronym);
    }
    if words.len() >= 2 {
        let mut first_plus_last = String::new();
        if let Some(ch) = words[0].chars().next() {
            first_plus_last.push(ch);
        }
        if let Some(s) = words.last().and_then(|last| prefix(last, 2)) {
            first_plus_last.push_str(&s);
        }
        if first_plus_last.len() >= 2 {
            out.insert(first_plus_last);
        }
    }

    for w in &words {
        if w.len() >= 2 {
            out.insert(w.clone());
        }
        if let Some(p3) = prefix(w, 3) {
            out.insert(p3);
        }
    }

    out
}

fn alias_overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.iter().filter(|x| b.contains(*x)).count()
}

fn canonical_words(name: &str) -> Vec<String> {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .filter(|w| !matches!(w.as_str(), "fc" | "cf" | "afc" | "sc" | "ac" | "club"))
        .collect()
}

fn normalize_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn prefix(raw: &str, n: usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_drop_club_suffixes() {
        let a = team_aliases("Arsenal FC");
        assert!(a.contains("arsenal"));
        assert!(!a.iter().any(|x| x == "fc"));
    }

    #[test]
    fn unknown_market_keys_are_skipped() {
        let outcome = OddsOutcome {
            name: "Arsenal".to_string(),
            price: 1.9,
            point: Some(-0.5),
        };
        let h = team_aliases("Arsenal");
        let a = team_aliases("Chelsea");
        assert_eq!(outcome_market("spreads", &outcome, &h, &a), None);
        assert_eq!(
            outcome_market("h2h", &outcome, &h, &a),
            Some(Market::Moneyline(Outcome::Home))
        );
    }

    #[test]
    fn parses_iso_kickoff() {
        let ts = parse_timestamp("2025-03-01T15:00:00Z").unwrap();
        assert_eq!(ts.timestamp(), 1_740_841_200);
        assert!(parse_timestamp("").is_none());
    }
}
