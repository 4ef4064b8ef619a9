use crate::bayesian::{calculate_win_rate, is_significantly_adjusted, BayesianConfig};
use crate::error::DataError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

const COLOR_ORDER: &str = "WUBRG";
const ALL_COLORS: &str = "ALL";

/// Per-card statistics for one (expansion, format, color context).
///
/// Win rates arrive as fractions (`0.573`) and are kept that way; the
/// smoothed values are percentages recomputed on every ingest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_back: Option<String>,
    #[serde(default, rename = "mtga_id")]
    pub arena_id: Option<u32>,

    #[serde(default, rename = "ever_drawn_win_rate")]
    pub gih_wr: Option<f64>,
    #[serde(default, rename = "opening_hand_win_rate")]
    pub oh_wr: Option<f64>,
    #[serde(default, rename = "win_rate")]
    pub gp_wr: Option<f64>,
    #[serde(default, rename = "drawn_win_rate")]
    pub gd_wr: Option<f64>,
    /// Improvement when drawn
    #[serde(default, rename = "drawn_improvement_win_rate")]
    pub iwd: Option<f64>,

    #[serde(default, rename = "avg_seen")]
    pub alsa: Option<f64>,
    #[serde(default, rename = "avg_pick")]
    pub ata: Option<f64>,

    #[serde(default, rename = "# ever_drawn")]
    pub gih_count: u32,
    #[serde(default, rename = "# opening_hand")]
    pub oh_count: u32,
    #[serde(default, rename = "# games")]
    pub gp_count: u32,
    #[serde(default, rename = "# drawn")]
    pub gd_count: u32,
    #[serde(default, rename = "# games_played")]
    pub games_played: u32,
    #[serde(default, rename = "# decks")]
    pub deck_count: u32,

    /// Derived from the raw rates, never persisted
    #[serde(skip)]
    pub smoothed: SmoothedRates,
}

/// Smoothed win rates in percent. `None` where upstream had no rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedRates {
    pub gih_wr: Option<f64>,
    pub oh_wr: Option<f64>,
    pub gp_wr: Option<f64>,
    pub gd_wr: Option<f64>,
    /// GIH rate moved enough that the UI should flag it
    pub gih_adjusted: bool,
}

fn smooth(rate: Option<f64>, sample_size: u32, config: &BayesianConfig) -> Option<f64> {
    let percent = rate? * 100.0;
    if sample_size == 0 {
        return Some(percent);
    }
    Some(calculate_win_rate(percent, sample_size, config))
}

impl RatingRecord {
    /// Recompute [`RatingRecord::smoothed`] from the raw rates. Idempotent.
    pub fn apply_smoothing(&mut self, config: &BayesianConfig) {
        self.smoothed = SmoothedRates {
            gih_wr: smooth(self.gih_wr, self.gih_count, config),
            oh_wr: smooth(self.oh_wr, self.oh_count, config),
            gp_wr: smooth(self.gp_wr, self.gp_count, config),
            gd_wr: smooth(self.gd_wr, self.gd_count, config),
            gih_adjusted: self.gih_count > 0
                && self
                    .gih_wr
                    .is_some_and(|rate| is_significantly_adjusted(rate * 100.0, self.gih_count, config)),
        };
    }
}

/// Win rate of one color combination in an event type
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColorRating {
    pub color_name: String,
    #[serde(default)]
    pub is_summary: bool,
    #[serde(default)]
    pub win_rate: Option<f64>,
    #[serde(default, rename = "# games", alias = "games")]
    pub games: u32,
    #[serde(default, rename = "# wins", alias = "wins")]
    pub wins: u32,
}

impl ColorRating {
    /// Win rate in percent (two decimals), derived from the counts when
    /// upstream omits it
    pub fn win_rate_percent(&self) -> Option<f64> {
        let percent = match self.win_rate {
            Some(rate) => rate * 100.0,
            None if self.games > 0 => f64::from(self.wins) / f64::from(self.games) * 100.0,
            None => return None,
        };
        Some((percent * 100.0).round() / 100.0)
    }
}

/// Normalize a color filter to WUBRG order, or `ALL` when it names no color
pub fn color_context(colors: Option<&str>) -> String {
    let upper = colors.unwrap_or_default().to_uppercase();
    let context: String = COLOR_ORDER.chars().filter(|c| upper.contains(*c)).collect();
    if context.is_empty() {
        ALL_COLORS.to_string()
    } else {
        context
    }
}

/// Parameters for a card ratings lookup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RatingsQuery {
    pub expansion: String,
    pub format: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub colors: Option<String>,
}

impl RatingsQuery {
    pub fn new(expansion: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            expansion: expansion.into(),
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_dates(mut self, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        self.start_date = Some(start_date.into());
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_colors(mut self, colors: impl Into<String>) -> Self {
        self.colors = Some(colors.into());
        self
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.expansion.trim().is_empty() {
            return Err(DataError::InvalidParams("expansion is required".to_string()));
        }
        if self.format.trim().is_empty() {
            return Err(DataError::InvalidParams("format is required".to_string()));
        }
        Ok(())
    }

    pub fn color_context(&self) -> String {
        color_context(self.colors.as_deref())
    }

    /// Fallback-cache key: (expansion, format, color context)
    pub fn cache_key(&self) -> String {
        [
            self.expansion.to_uppercase(),
            self.format.clone(),
            self.color_context(),
        ]
        .iter()
        .join("|")
    }

    pub(crate) fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("expansion", self.expansion.to_uppercase()),
            ("format", self.format.clone()),
        ];
        if let Some(start) = &self.start_date {
            params.push(("start_date", start.clone()));
        }
        if let Some(end) = &self.end_date {
            params.push(("end_date", end.clone()));
        }
        let context = self.color_context();
        if context != ALL_COLORS {
            params.push(("colors", context));
        }
        params
    }
}

/// Parameters for a color ratings lookup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorRatingsQuery {
    pub expansion: String,
    pub event_type: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub combine_splash: bool,
}

impl ColorRatingsQuery {
    pub fn new(expansion: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            expansion: expansion.into(),
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    pub fn with_dates(mut self, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        self.start_date = Some(start_date.into());
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_combine_splash(mut self, combine_splash: bool) -> Self {
        self.combine_splash = combine_splash;
        self
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.expansion.trim().is_empty() {
            return Err(DataError::InvalidParams("expansion is required".to_string()));
        }
        if self.event_type.trim().is_empty() {
            return Err(DataError::InvalidParams("event type is required".to_string()));
        }
        Ok(())
    }

    /// Fallback-cache key: (expansion, event type)
    pub fn cache_key(&self) -> String {
        format!("colors|{}|{}", self.expansion.to_uppercase(), self.event_type)
    }

    pub(crate) fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("expansion", self.expansion.to_uppercase()),
            ("event_type", self.event_type.clone()),
        ];
        if let Some(start) = &self.start_date {
            params.push(("start_date", start.clone()));
        }
        if let Some(end) = &self.end_date {
            params.push(("end_date", end.clone()));
        }
        if self.combine_splash {
            params.push(("combine_splash", "true".to_string()));
        }
        params
    }
}

/// Where a ratings table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingsSource {
    Upstream,
    /// Served from the fallback store after an upstream failure
    Cache,
}

/// A ratings response together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct RatingsTable<T> {
    pub key: String,
    pub records: Vec<T>,
    pub source: RatingsSource,
    pub fetched_at: OffsetDateTime,
}

impl<T> RatingsTable<T> {
    pub fn is_from_cache(&self) -> bool {
        self.source == RatingsSource::Cache
    }

    pub fn age(&self) -> Duration {
        let age = OffsetDateTime::now_utc() - self.fetched_at;
        age.try_into().unwrap_or(Duration::ZERO)
    }
}

/// Persisted form of a ratings table: the raw records plus fetch time
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CachedRatings<T> {
    pub key: String,
    pub records: Vec<T>,
    pub fetched_at: OffsetDateTime,
}

/// Ratings client bookkeeping, exposed as a snapshot by `stats()`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Responses served from the fallback store
    pub cached_responses: u64,
    pub consecutive_failures: u32,
    pub last_request_at: Option<OffsetDateTime>,
    pub last_success_at: Option<OffsetDateTime>,
    pub last_failure_at: Option<OffsetDateTime>,
    /// Mean latency of successful requests
    pub average_latency: Duration,
}

impl ClientStats {
    pub(crate) fn record_latency(&mut self, latency: Duration) {
        let n = self.successful_requests.max(1) as u32;
        self.average_latency = (self.average_latency * (n - 1) + latency) / n;
    }
}
