use thiserror::Error;

/// Failure of the historical match store. Unlike everything else in the
/// engine, this aborts the pass that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("undecodable match row {id}: {reason}")]
    InvalidRow { id: u64, reason: String },
}

/// A market specifier that could not be parsed. Only that market is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketParseError {
    #[error("empty market specifier")]
    Empty,
    #[error("unknown moneyline outcome {0:?}")]
    UnknownOutcome(String),
    #[error("unknown period in {0:?}")]
    UnknownPeriod(String),
    #[error("expected over/under in {0:?}")]
    MissingSide(String),
    #[error("unparseable line {0:?}")]
    BadLine(String),
}

/// Bookmaker or external-signal feed failure.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unavailable: {0}")]
    Unavailable(String),
    #[error("feed http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("feed payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Unavailable(format!("timed out: {err}"))
        } else {
            FeedError::Unavailable(err.to_string())
        }
    }
}

/// An unexpected fault inside a probability model, as opposed to an abstention.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("degenerate model input: {0}")]
    Degenerate(String),
}
