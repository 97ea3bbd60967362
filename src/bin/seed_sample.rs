use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use matchday_edge::historical_store::{SqliteStore, default_db_path};
use matchday_edge::logging::init_tracing;
use matchday_edge::sample_data::{SampleConfig, generate_history};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let db_path = parse_str_arg("--db")
        .map(PathBuf::from)
        .or_else(default_db_path)
        .context("unable to resolve sqlite path")?;

    let defaults = SampleConfig::default();
    let cfg = SampleConfig {
        seed: parse_u64_arg("--seed").unwrap_or(defaults.seed),
        first_season: parse_u64_arg("--first-season")
            .map(|y| y as i32)
            .unwrap_or(defaults.first_season),
        seasons: parse_u64_arg("--seasons")
            .map(|n| n.clamp(1, 50) as u32)
            .unwrap_or(defaults.seasons),
        with_prices: !has_flag("--no-prices"),
        ..defaults
    };

    let rows = generate_history(&cfg);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open match store {}", db_path.display()))?;
    let written = store.upsert_matches(&rows).context("write sample matches")?;
    info!(matches = written, seed = cfg.seed, db = %db_path.display(), "seeded sample history");

    println!(
        "Seeded {written} matches ({} seasons from {}) into {}",
        cfg.seasons,
        cfg.first_season,
        db_path.display()
    );
    println!("Store now holds {} matches", store.count()?);
    Ok(())
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

fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_str_arg(name).and_then(|raw| raw.parse::<u64>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
