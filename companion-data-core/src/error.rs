use std::time::Duration;

/// Errors produced by the card data layer
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    // Upstream outcomes
    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to parse upstream response: {0}")]
    Parse(String),

    /// Both the ratings upstream and the fallback cache failed.
    #[error("ratings unavailable: {message}")]
    StatsUnavailable {
        message: String,
        #[source]
        source: Option<Box<DataError>>,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("upstream in backoff, {remaining:?} remaining")]
    BackoffActive { remaining: Duration },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    // Local storage
    #[error("card store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataError::Cancelled)
    }

    /// Whether this error should count towards an upstream client's failure
    /// and backoff accounting. Caller cancellation, local validation errors and
    /// refusals during an active cooldown do not.
    pub fn counts_as_upstream_failure(&self) -> bool {
        matches!(
            self,
            DataError::Transport(_) | DataError::Status { .. } | DataError::Parse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
