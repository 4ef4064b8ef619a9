//! 17Lands ratings client
//!
//! Requests are spaced by the client's own [`RateGovernor`]. After
//! `failure_threshold` consecutive upstream failures the client stops calling
//! 17Lands for a growing cooldown. Whenever upstream cannot answer, the last
//! table persisted for the same key is served instead, re-smoothed under the
//! current [`BayesianConfig`](crate::bayesian::BayesianConfig).

use super::models::{
    CachedRatings, ClientStats, ColorRating, ColorRatingsQuery, RatingRecord, RatingsQuery,
    RatingsSource, RatingsTable,
};
use crate::cache::RatingsCacheStore;
use crate::config::RatingsConfig;
use crate::error::DataError;
use crate::rate_governor::RateGovernor;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CARD_RATINGS_PATH: &str = "/card_ratings/data";
const COLOR_RATINGS_PATH: &str = "/color_ratings/data";

#[derive(Debug, Default)]
struct ClientState {
    stats: ClientStats,
    /// Monotonic time of the last counted failure, cleared on success
    last_failure: Option<Instant>,
}

pub struct RatingsClient {
    client: reqwest::Client,
    config: RatingsConfig,
    governor: RateGovernor,
    store: Option<Arc<dyn RatingsCacheStore>>,
    state: Mutex<ClientState>,
}

impl RatingsClient {
    pub fn new(config: RatingsConfig, store: Option<Arc<dyn RatingsCacheStore>>) -> Result<Self, DataError> {
        let user_agent = reqwest::header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| DataError::InvalidParams(format!("Invalid user agent: {}", e)))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            governor: RateGovernor::new(config.rate_interval),
            config,
            store,
            state: Mutex::new(ClientState::default()),
        })
    }

    pub fn config(&self) -> &RatingsConfig {
        &self.config
    }

    /// Card ratings for an expansion and format, optionally filtered by
    /// deck colors. Falls back to the last stored table on upstream failure.
    pub async fn get_card_ratings(
        &self,
        query: &RatingsQuery,
        cancel: &CancellationToken,
    ) -> Result<RatingsTable<RatingRecord>, DataError> {
        query.validate()?;
        let key = query.cache_key();

        match self
            .fetch::<Vec<RatingRecord>>(CARD_RATINGS_PATH, &query.query_params(), cancel)
            .await
        {
            Ok(mut records) => {
                for record in &mut records {
                    record.apply_smoothing(&self.config.bayesian);
                }
                if let Some(store) = &self.store {
                    if !records.is_empty() {
                        if let Err(e) = store.save_card_ratings(&key, &records) {
                            warn!(key = %key, error = %e, "Failed to cache card ratings");
                        }
                    }
                }
                info!(key = %key, records = records.len(), "Fetched card ratings from 17Lands");
                Ok(RatingsTable {
                    key,
                    records,
                    source: RatingsSource::Upstream,
                    fetched_at: OffsetDateTime::now_utc(),
                })
            }
            Err(DataError::Cancelled) => Err(DataError::Cancelled),
            Err(cause) => {
                let mut table = self.fallback(&key, cause, |store, key| store.load_card_ratings(key))?;
                for record in &mut table.records {
                    record.apply_smoothing(&self.config.bayesian);
                }
                Ok(table)
            }
        }
    }

    /// Win rates per color combination for an expansion and event type
    pub async fn get_color_ratings(
        &self,
        query: &ColorRatingsQuery,
        cancel: &CancellationToken,
    ) -> Result<RatingsTable<ColorRating>, DataError> {
        query.validate()?;
        let key = query.cache_key();

        match self
            .fetch::<Vec<ColorRating>>(COLOR_RATINGS_PATH, &query.query_params(), cancel)
            .await
        {
            Ok(records) => {
                if let Some(store) = &self.store {
                    if !records.is_empty() {
                        if let Err(e) = store.save_color_ratings(&key, &records) {
                            warn!(key = %key, error = %e, "Failed to cache color ratings");
                        }
                    }
                }
                info!(key = %key, records = records.len(), "Fetched color ratings from 17Lands");
                Ok(RatingsTable {
                    key,
                    records,
                    source: RatingsSource::Upstream,
                    fetched_at: OffsetDateTime::now_utc(),
                })
            }
            Err(DataError::Cancelled) => Err(DataError::Cancelled),
            Err(cause) => self.fallback(&key, cause, |store, key| store.load_color_ratings(key)),
        }
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> ClientStats {
        self.state().stats.clone()
    }

    /// Zero all counters. This also ends any active cooldown.
    pub fn reset_stats(&self) {
        let mut state = self.state();
        *state = ClientState::default();
    }

    /// Leave the cooldown and forget consecutive failures
    pub fn reset_backoff(&self) {
        let mut state = self.state();
        state.stats.consecutive_failures = 0;
        state.last_failure = None;
        debug!("17Lands backoff reset");
    }

    /// Time left before upstream will be called again, if cooling down
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let state = self.state();
        let cooldown = self.config.backoff.cooldown(state.stats.consecutive_failures)?;
        let elapsed = state.last_failure?.elapsed();
        cooldown.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
        cancel: &CancellationToken,
    ) -> Result<T, DataError> {
        if let Some(remaining) = self.cooldown_remaining() {
            debug!(remaining_ms = remaining.as_millis() as u64, "17Lands in backoff, not calling upstream");
            return Err(DataError::BackoffActive { remaining });
        }

        self.governor.throttle_cancellable(cancel).await?;
        {
            let mut state = self.state();
            state.stats.total_requests += 1;
            state.stats.last_request_at = Some(OffsetDateTime::now_utc());
        }

        let url = self.url(path);
        let request = self.client.get(&url).query(params);
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DataError::Cancelled),
            result = Self::exchange(request, &url) => result,
        };

        match &result {
            Ok(_) => self.record_success(started.elapsed()),
            Err(e) if e.counts_as_upstream_failure() => self.record_failure(e),
            Err(_) => {}
        }
        result
    }

    async fn exchange<T: DeserializeOwned>(request: reqwest::RequestBuilder, url: &str) -> Result<T, DataError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| DataError::Parse(format!("{}: {}", url, e)))
    }

    fn record_success(&self, latency: Duration) {
        let mut state = self.state();
        state.last_failure = None;
        let stats = &mut state.stats;
        stats.successful_requests += 1;
        stats.consecutive_failures = 0;
        stats.last_success_at = Some(OffsetDateTime::now_utc());
        stats.record_latency(latency);
    }

    fn record_failure(&self, error: &DataError) {
        let mut state = self.state();
        state.last_failure = Some(Instant::now());
        let stats = &mut state.stats;
        stats.failed_requests += 1;
        stats.consecutive_failures += 1;
        stats.last_failure_at = Some(OffsetDateTime::now_utc());

        match self.config.backoff.cooldown(stats.consecutive_failures) {
            Some(cooldown) => warn!(
                consecutive_failures = stats.consecutive_failures,
                cooldown_ms = cooldown.as_millis() as u64,
                error = %error,
                "17Lands request failed, backing off"
            ),
            None => warn!(
                consecutive_failures = stats.consecutive_failures,
                error = %error,
                "17Lands request failed"
            ),
        }
    }

    fn fallback<T, F>(&self, key: &str, cause: DataError, load: F) -> Result<RatingsTable<T>, DataError>
    where
        F: FnOnce(&dyn RatingsCacheStore, &str) -> Result<Option<CachedRatings<T>>, DataError>,
    {
        let Some(store) = &self.store else {
            return Err(DataError::StatsUnavailable {
                message: "17Lands unavailable and no ratings cache configured".to_string(),
                source: Some(Box::new(cause)),
            });
        };

        info!(key = %key, cause = %cause, "17Lands unavailable, trying ratings cache");
        match load(store.as_ref(), key) {
            Ok(Some(cached)) if !cached.records.is_empty() => {
                self.state().stats.cached_responses += 1;
                let table = RatingsTable {
                    key: cached.key,
                    records: cached.records,
                    source: RatingsSource::Cache,
                    fetched_at: cached.fetched_at,
                };
                info!(
                    key = %key,
                    records = table.records.len(),
                    age_secs = table.age().as_secs(),
                    "Serving cached ratings"
                );
                Ok(table)
            }
            Ok(_) => Err(DataError::StatsUnavailable {
                message: "17Lands unavailable and no cached data available".to_string(),
                source: Some(Box::new(cause)),
            }),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read ratings cache");
                Err(DataError::StatsUnavailable {
                    message: format!("17Lands unavailable and ratings cache failed: {}", e),
                    source: Some(Box::new(cause)),
                })
            }
        }
    }
}
