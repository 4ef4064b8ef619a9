//! Card resolution service
//!
//! Lookups go memory cache, then persistent store, then the upstream
//! metadata source. Whatever a lower layer returns is written back into the
//! layers above it.

use crate::cache::{CardStore, FreshnessSummary, TtlCache};
use crate::config::ServiceConfig;
use crate::error::DataError;
use crate::models::CardRecord;
use crate::scryfall::{CardMetadataSource, CollectionIdentifier, CollectionLookup};
use futures_util::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of [`CardService::refresh_stale`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Stale cards picked for this run
    pub checked: usize,
    pub refreshed: usize,
    /// Kept their old stored copy
    pub failed: usize,
}

pub struct CardService {
    config: ServiceConfig,
    source: Arc<dyn CardMetadataSource>,
    store: Option<Arc<dyn CardStore>>,
    cache: Option<TtlCache<u32, CardRecord>>,
}

impl CardService {
    /// `store` is ignored when `config.enable_store` is false
    pub fn new(
        config: ServiceConfig,
        source: Arc<dyn CardMetadataSource>,
        store: Option<Arc<dyn CardStore>>,
    ) -> Self {
        let cache = config
            .enable_cache
            .then(|| TtlCache::new(config.cache_size, config.cache_ttl));
        let store = if config.enable_store { store } else { None };

        info!(
            cache = config.enable_cache,
            cache_size = config.cache_size,
            store = store.as_ref().map(|s| s.store_name()).unwrap_or("none"),
            fallback_to_api = config.fallback_to_api,
            "Card service initialized"
        );

        Self {
            config,
            source,
            store,
            cache,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolve one card by Arena ID
    pub async fn resolve(&self, arena_id: u32, cancel: &CancellationToken) -> Result<CardRecord, DataError> {
        if let Some(card) = self.cache.as_ref().and_then(|cache| cache.get(&arena_id)) {
            debug!(arena_id, "Memory cache HIT");
            return Ok(card);
        }

        if let Some(store) = &self.store {
            if let Some(card) = store.get(arena_id)? {
                debug!(arena_id, store = store.store_name(), "Card store HIT");
                self.remember(&card);
                return Ok(card);
            }
        }

        if !self.config.fallback_to_api {
            return Err(DataError::NotFound(format!("arena id {}", arena_id)));
        }

        debug!(arena_id, "Card cache MISS, asking upstream");
        let card = self.source.get_card_by_arena_id(arena_id, cancel).await?;
        self.write_through(&card);
        Ok(card)
    }

    /// Resolve many cards with bounded parallelism. Ids that fail to resolve
    /// are left out of the result; duplicates are resolved once.
    pub async fn resolve_many(&self, arena_ids: &[u32], cancel: &CancellationToken) -> HashMap<u32, CardRecord> {
        let unique_ids: Vec<u32> = arena_ids.iter().copied().unique().collect();
        let concurrency = self.config.batch_concurrency.max(1);

        let results: Vec<(u32, Result<CardRecord, DataError>)> = stream::iter(unique_ids.iter().copied())
            .map(|arena_id| async move { (arena_id, self.resolve(arena_id, cancel).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut cards = HashMap::with_capacity(results.len());
        let mut failed = 0usize;
        for (arena_id, result) in results {
            match result {
                Ok(card) => {
                    cards.insert(arena_id, card);
                }
                Err(e) => {
                    failed += 1;
                    if e.is_not_found() || e.is_cancelled() {
                        debug!(arena_id, error = %e, "Card not resolved");
                    } else {
                        warn!(arena_id, error = %e, "Failed to resolve card");
                    }
                }
            }
        }

        info!(
            requested = unique_ids.len(),
            resolved = cards.len(),
            failed,
            "Resolved card batch"
        );
        cards
    }

    /// Case-insensitive name search over stored cards. When nothing is
    /// stored, tries an exact-name lookup upstream.
    pub async fn search_by_name(&self, name: &str, cancel: &CancellationToken) -> Result<Vec<CardRecord>, DataError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DataError::InvalidParams("search text is empty".to_string()));
        }

        if let Some(store) = &self.store {
            let found = store.search_by_name(name)?;
            if !found.is_empty() {
                debug!(query = %name, matches = found.len(), "Name search answered from store");
                return Ok(found);
            }
        }

        if !self.config.fallback_to_api {
            return Ok(Vec::new());
        }

        match self.source.get_card_by_name(name, cancel).await {
            Ok(card) => {
                self.write_through(&card);
                Ok(vec![card])
            }
            Err(e) if e.is_not_found() => {
                debug!(query = %name, "No card with that name upstream");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Collection lookup upstream by mixed identifiers; everything found is
    /// stored. Duplicate identifiers are sent once.
    pub async fn resolve_by_identifiers(
        &self,
        identifiers: &[CollectionIdentifier],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        let unique: Vec<CollectionIdentifier> = identifiers.iter().unique().cloned().collect();
        if unique.is_empty() {
            return Ok(CollectionLookup::default());
        }

        let result = self.source.get_cards_by_identifiers(&unique, cancel).await?;
        for card in &result.cards {
            self.write_through(card);
        }
        Ok(result)
    }

    /// Look up cards by exact name upstream and store everything found
    pub async fn resolve_by_names(&self, names: &[String], cancel: &CancellationToken) -> Result<CollectionLookup, DataError> {
        let identifiers: Vec<CollectionIdentifier> = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(CollectionIdentifier::name)
            .collect();
        self.resolve_by_identifiers(&identifiers, cancel).await
    }

    /// Look up printings by (set code, collector number) upstream and store
    /// everything found
    pub async fn resolve_by_set_and_numbers(
        &self,
        printings: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        let identifiers: Vec<CollectionIdentifier> = printings
            .iter()
            .map(|(set, number)| CollectionIdentifier::set_number(set.trim(), number.trim()))
            .collect();
        self.resolve_by_identifiers(&identifiers, cancel).await
    }

    /// Re-fetch up to `limit` stored cards whose last write is older than
    /// `stale_after` and write the new copies through. This always asks
    /// upstream, whatever `fallback_to_api` says. Cards that fail keep their
    /// stored copy and stay stale.
    pub async fn refresh_stale(&self, limit: usize, cancel: &CancellationToken) -> Result<RefreshReport, DataError> {
        let Some(store) = &self.store else {
            return Ok(RefreshReport::default());
        };
        let stale = store.stale_cards(self.config.stale_after, limit)?;
        if stale.is_empty() {
            debug!("No stale card metadata");
            return Ok(RefreshReport::default());
        }

        let concurrency = self.config.batch_concurrency.max(1);
        let results: Vec<(u32, Result<CardRecord, DataError>)> = stream::iter(stale.iter().copied())
            .map(|arena_id| async move { (arena_id, self.source.get_card_by_arena_id(arena_id, cancel).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = RefreshReport {
            checked: stale.len(),
            ..RefreshReport::default()
        };
        for (arena_id, result) in results {
            match result {
                Ok(card) => {
                    self.write_through(&card);
                    report.refreshed += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    debug!(arena_id, error = %e, "Stale card not refreshed");
                }
            }
        }

        info!(
            checked = report.checked,
            refreshed = report.refreshed,
            failed = report.failed,
            "Refreshed stale card metadata"
        );
        if cancel.is_cancelled() {
            return Err(DataError::Cancelled);
        }
        Ok(report)
    }

    /// Age breakdown of the stored cards, `None` without a store
    pub fn freshness(&self) -> Result<Option<FreshnessSummary>, DataError> {
        self.store
            .as_ref()
            .map(|store| store.freshness(self.config.stale_after))
            .transpose()
    }

    /// Number of stored cards, `None` without a store
    pub fn stored_card_count(&self) -> Result<Option<usize>, DataError> {
        self.store.as_ref().map(|store| store.len()).transpose()
    }

    pub fn clear_memory_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn memory_cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }

    fn remember(&self, card: &CardRecord) {
        if let Some(cache) = &self.cache {
            cache.insert(card.arena_id, card.clone());
        }
    }

    fn write_through(&self, card: &CardRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(card) {
                warn!(arena_id = card.arena_id, error = %e, "Failed to persist card, keeping it in memory only");
            }
        }
        self.remember(card);
    }
}
