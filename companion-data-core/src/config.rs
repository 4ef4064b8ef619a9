use crate::bayesian::BayesianConfig;
use crate::error::DataError;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

const APP_NAME: &str = "companion-data";
const CARD_DB_FILENAME: &str = "cards.sqlite3";
const RATINGS_CACHE_DIRNAME: &str = "ratings";

pub const DEFAULT_SCRYFALL_BASE_URL: &str = "https://api.scryfall.com";
pub const DEFAULT_RATINGS_BASE_URL: &str = "https://www.17lands.com";
// Scryfall asks for a descriptive user agent: https://scryfall.com/docs/api/
pub const DEFAULT_USER_AGENT: &str = "companion-data-core/0.1";

/// Settings for the card resolution service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Use the in-memory TTL cache
    pub enable_cache: bool,
    pub cache_size: usize,
    pub cache_ttl: Duration,
    /// Read from and write to the persistent card store
    pub enable_store: bool,
    /// Ask Scryfall when both caches miss
    pub fallback_to_api: bool,
    pub batch_concurrency: usize,
    /// Stored metadata older than this is due for a refresh
    pub stale_after: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_size: 10_000,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            enable_store: true,
            fallback_to_api: true,
            batch_concurrency: 10,
            stale_after: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl ServiceConfig {
    pub fn with_cache(mut self, cache_size: usize, cache_ttl: Duration) -> Self {
        self.enable_cache = true;
        self.cache_size = cache_size;
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.enable_cache = false;
        self
    }

    pub fn without_store(mut self) -> Self {
        self.enable_store = false;
        self
    }

    pub fn with_fallback_to_api(mut self, fallback_to_api: bool) -> Self {
        self.fallback_to_api = fallback_to_api;
        self
    }

    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Settings for the Scryfall card metadata client
#[derive(Debug, Clone, PartialEq)]
pub struct ScryfallConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub rate_interval: Duration,
    /// Parallel single-card requests when resolving many arena ids
    pub batch_concurrency: usize,
}

impl Default for ScryfallConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCRYFALL_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            rate_interval: Duration::from_millis(100),
            batch_concurrency: 10,
        }
    }
}

impl ScryfallConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_interval(mut self, rate_interval: Duration) -> Self {
        self.rate_interval = rate_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Cooldown policy applied after repeated upstream failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Consecutive failures before the cooldown kicks in
    pub failure_threshold: u32,
    pub initial_backoff: Duration,
    pub factor: f64,
    pub max_backoff: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            initial_backoff: Duration::from_secs(2),
            factor: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl BackoffConfig {
    /// Cooldown after `consecutive_failures` failures in a row, measured from
    /// the most recent one. `None` while under the threshold.
    pub fn cooldown(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.failure_threshold {
            return None;
        }
        let exponent = (consecutive_failures - self.failure_threshold).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.factor.powi(exponent);
        // NaN or negative products from a bad factor fall back to the cap
        Some(Duration::try_from_secs_f64(secs.min(self.max_backoff.as_secs_f64())).unwrap_or(self.max_backoff))
    }
}

/// Settings for the 17Lands ratings client
#[derive(Debug, Clone, PartialEq)]
pub struct RatingsConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub rate_interval: Duration,
    pub backoff: BackoffConfig,
    pub bayesian: BayesianConfig,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RATINGS_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            rate_interval: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            bayesian: BayesianConfig::default(),
        }
    }
}

impl RatingsConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_interval(mut self, rate_interval: Duration) -> Self {
        self.rate_interval = rate_interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_bayesian(mut self, bayesian: BayesianConfig) -> Self {
        self.bayesian = bayesian;
        self
    }
}

/// Everything needed to open a [`crate::CompanionData`] handle
#[derive(Debug, Clone, Default)]
pub struct CompanionConfig {
    pub service: ServiceConfig,
    pub scryfall: ScryfallConfig,
    pub ratings: RatingsConfig,
    /// SQLite card table; defaults to the platform data directory
    pub card_db_path: Option<PathBuf>,
    /// Fallback ratings files; defaults to the platform cache directory
    pub ratings_cache_dir: Option<PathBuf>,
}

impl CompanionConfig {
    pub fn card_db_path(&self) -> Result<PathBuf, DataError> {
        match &self.card_db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(CARD_DB_FILENAME)),
        }
    }

    pub fn ratings_cache_dir(&self) -> Result<PathBuf, DataError> {
        match &self.ratings_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.cache_dir().join(RATINGS_CACHE_DIRNAME)),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, DataError> {
    ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| DataError::Cache("Could not determine cache directory".to_string()))
}
