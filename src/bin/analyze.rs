use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};

use matchday_edge::analysis::{FeedStatus, FixtureAnalysis, PassInputs, analyze_fixture};
use matchday_edge::config::EngineConfig;
use matchday_edge::historical_store::{SqliteStore, default_db_path};
use matchday_edge::league_summary::{LeagueReporter, TeamSummary};
use matchday_edge::logging::init_tracing;
use matchday_edge::market::Period;
use matchday_edge::match_store::Lookback;
use matchday_edge::models::Fixture;
use matchday_edge::odds_feed::{BookmakerQuoteFeed, OddsFeedConfig, TheOddsApiFeed};
use matchday_edge::sentiment::{ExternalSignalFeed, JsonSignalFile};

const DEFAULT_MARKETS: &str = "moneyline_home,moneyline_draw,moneyline_away,full_over_2.5,\
full_under_2.5,first_half_over_0.5,second_half_over_1.5,full_corners_over_9.5";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let home = parse_str_arg("--home").context("missing --home <team>")?;
    let away = parse_str_arg("--away").context("missing --away <team>")?;
    if home == away {
        return Err(anyhow!("home and away must differ"));
    }
    let as_of = match parse_str_arg("--as-of") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("bad --as-of {raw:?}, expected YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };
    let markets: Vec<String> = parse_str_arg("--markets")
        .unwrap_or_else(|| DEFAULT_MARKETS.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let league = parse_str_arg("--league").unwrap_or_default();

    let db_path = parse_str_arg("--db")
        .map(PathBuf::from)
        .or_else(default_db_path)
        .context("unable to resolve sqlite path")?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open match store {}", db_path.display()))?;

    let quote_feed = if has_flag("--offline") {
        None
    } else {
        TheOddsApiFeed::from_config(OddsFeedConfig::from_env())
    };
    let signal_feed = parse_str_arg("--signals")
        .or_else(|| std::env::var("SIGNALS_PATH").ok())
        .map(JsonSignalFile::new);
    let inputs = PassInputs::fetch(
        quote_feed.as_ref().map(|f| f as &dyn BookmakerQuoteFeed),
        &league,
        signal_feed.as_ref().map(|f| f as &dyn ExternalSignalFeed),
    );

    let cfg = EngineConfig::from_env();
    let fixture = Fixture::new(home, away);
    let analysis = analyze_fixture(&store, as_of, &fixture, &markets, &inputs, &cfg)
        .context("analysis aborted")?;

    if has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis);
    }

    if has_flag("--summary") {
        let reporter = LeagueReporter::new(&store);
        let table = reporter
            .team_summaries(as_of, Lookback::Seasons(1))
            .context("season summary")?;
        println!();
        print_summary(&table, &fixture);
        for team in [&fixture.home, &fixture.away] {
            let cdf = reporter
                .team_cdf(team, Period::FullTime, as_of, Lookback::Seasons(1))
                .context("team goal distribution")?;
            let points = cdf
                .goals_scored
                .iter()
                .map(|p| format!("<={}:{:.0}%", p.value, p.probability * 100.0))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{team} goals scored CDF: {points}");
        }
    }
    Ok(())
}

fn print_summary(table: &[TeamSummary], fixture: &Fixture) {
    println!("Season table by goal difference (fixture teams marked *)");
    println!(
        "{:<4} {:<24} {:>4} {:>6} {:>6} {:>6} {:>6}",
        "#", "Team", "P", "GF", "GA", "GD", "CF"
    );
    for (idx, row) in table.iter().enumerate() {
        let mark = if row.team == fixture.home || row.team == fixture.away {
            "*"
        } else {
            ""
        };
        println!(
            "{:<4} {:<24} {:>4} {:>6.2} {:>6.2} {:>+6.2} {:>6.2}",
            idx + 1,
            format!("{}{mark}", row.team),
            row.matches,
            row.avg_goals_scored,
            row.avg_goals_conceded,
            row.goal_difference,
            row.avg_corners_for,
        );
    }
}

fn print_analysis(a: &FixtureAnalysis) {
    println!("{} vs {} (as of {})", a.fixture.home, a.fixture.away, a.as_of);
    println!("Bookmaker feed: {}", feed_label(&a.quote_feed));
    println!("Signal feed:    {}", feed_label(&a.signal_feed));
    println!();
    println!(
        "{:<32} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Market", "Model", "Hist", "Implied", "Price", "EV %"
    );
    for m in &a.markets {
        let pct = |v: Option<f64>| {
            v.map(|x| format!("{:.1}", x * 100.0))
                .unwrap_or_else(|| "-".into())
        };
        println!(
            "{:<32} {:>8.1} {:>8} {:>8} {:>8} {:>8}",
            m.market.to_string(),
            m.model_probability * 100.0,
            pct(m.historical_probability),
            pct(m.implied_probability),
            m.best_price.map(|p| format!("{p:.2}")).unwrap_or_else(|| "-".into()),
            m.ev_percent.map(|e| format!("{e:+.1}")).unwrap_or_else(|| "-".into()),
        );
    }
    for r in &a.rejected {
        println!("rejected {:?}: {}", r.specifier, r.reason);
    }
    println!();
    if a.value_bets.is_empty() {
        println!("No value bets.");
    }
    for v in &a.value_bets {
        println!(
            "VALUE {} @ {:.2} ({}) model {:.1}% vs implied {:.1}% -> EV {:+.1}%",
            v.market,
            v.best_price,
            v.source,
            v.model_probability * 100.0,
            v.implied_probability * 100.0,
            v.ev_percent
        );
    }
}

fn feed_label(status: &FeedStatus) -> String {
    match status {
        FeedStatus::NotConfigured => "not configured".to_string(),
        FeedStatus::Unavailable(reason) => format!("unavailable ({reason})"),
        FeedStatus::Available { events } => format!("{events} event(s)"),
    }
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
