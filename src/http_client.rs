use std::env;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

use crate::error::FeedError;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("matchday-edge/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared blocking client. Every request is bounded by `FEED_TIMEOUT_SECS`
/// (default 10); a timeout surfaces as [`FeedError::Unavailable`].
pub fn http_client() -> Result<&'static Client, FeedError> {
    CLIENT.get_or_try_init(|| {
        let timeout = env::var("FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 120);
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FeedError::Unavailable(format!("failed to build http client: {err}")))
    })
}
