use std::env;

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber. `RUST_LOG` picks the filter
/// (default `info`), `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // A second init (tests, embedded use) keeps the first subscriber.
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        init_tracing();
        init_tracing();
        tracing::info!("still logging");
    }
}
