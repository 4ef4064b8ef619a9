pub mod bayesian;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_governor;
pub mod scryfall;
pub mod seventeenlands;
pub mod service;

pub use bayesian::{BayesianConfig, adjustment_indicator, calculate_win_rate, is_significantly_adjusted};
pub use cache::{
    CardStore, FreshnessSummary, JsonRatingsStore, MemoryCardStore, MemoryRatingsStore, RatingsCacheStore,
    SqliteCardStore,
};
pub use config::{BackoffConfig, CompanionConfig, RatingsConfig, ScryfallConfig, ServiceConfig};
pub use error::{DataError, Result};
pub use models::CardRecord;
pub use scryfall::{CardMetadataSource, CollectionIdentifier, CollectionLookup, ScryfallClient};
pub use seventeenlands::{
    ClientStats, ColorRating, ColorRatingsQuery, RatingRecord, RatingsClient, RatingsQuery,
    RatingsSource, RatingsTable,
};
pub use service::{CardService, RefreshReport};

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main interface for card metadata and ratings lookups
///
/// Bundles the card resolution service and the ratings client. Every
/// upstream call made through this handle is tied to one shutdown token, so
/// [`CompanionData::shutdown`] aborts whatever is still waiting on Scryfall
/// or 17Lands.
pub struct CompanionData {
    service: CardService,
    ratings: RatingsClient,
    shutdown: CancellationToken,
}

impl CompanionData {
    /// Open the default stack: Scryfall + SQLite card table, 17Lands + JSON
    /// ratings fallback.
    pub fn open(config: CompanionConfig) -> Result<Self> {
        let scryfall = Arc::new(ScryfallClient::with_config(config.scryfall.clone())?);

        let store: Option<Arc<dyn CardStore>> = if config.service.enable_store {
            Some(Arc::new(SqliteCardStore::open(&config.card_db_path()?)?))
        } else {
            None
        };
        let service = CardService::new(config.service.clone(), scryfall, store);

        let ratings_store: Arc<dyn RatingsCacheStore> =
            Arc::new(JsonRatingsStore::new(config.ratings_cache_dir()?)?);
        let ratings = RatingsClient::new(config.ratings.clone(), Some(ratings_store))?;

        info!("Companion data layer ready");
        Ok(Self::from_parts(service, ratings))
    }

    pub fn from_parts(service: CardService, ratings: RatingsClient) -> Self {
        Self {
            service,
            ratings,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn get_card(&self, arena_id: u32) -> Result<CardRecord> {
        self.service.resolve(arena_id, &self.shutdown).await
    }

    pub async fn get_cards(&self, arena_ids: &[u32]) -> HashMap<u32, CardRecord> {
        self.service.resolve_many(arena_ids, &self.shutdown).await
    }

    pub async fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>> {
        self.service.search_by_name(name, &self.shutdown).await
    }

    /// Exact-name collection lookup; found cards are stored
    pub async fn get_cards_by_names(&self, names: &[String]) -> Result<CollectionLookup> {
        self.service.resolve_by_names(names, &self.shutdown).await
    }

    /// Collection lookup by (set code, collector number); found cards are stored
    pub async fn get_cards_by_set_and_numbers(&self, printings: &[(String, String)]) -> Result<CollectionLookup> {
        self.service.resolve_by_set_and_numbers(printings, &self.shutdown).await
    }

    /// Re-fetch up to `limit` stored cards past the configured stale age
    pub async fn refresh_stale_cards(&self, limit: usize) -> Result<RefreshReport> {
        self.service.refresh_stale(limit, &self.shutdown).await
    }

    pub fn card_freshness(&self) -> Result<Option<FreshnessSummary>> {
        self.service.freshness()
    }

    pub async fn get_ratings(&self, query: &RatingsQuery) -> Result<RatingsTable<RatingRecord>> {
        self.ratings.get_card_ratings(query, &self.shutdown).await
    }

    pub async fn get_color_ratings(&self, query: &ColorRatingsQuery) -> Result<RatingsTable<ColorRating>> {
        self.ratings.get_color_ratings(query, &self.shutdown).await
    }

    pub fn service(&self) -> &CardService {
        &self.service
    }

    pub fn ratings(&self) -> &RatingsClient {
        &self.ratings
    }

    /// Cancel in-flight and future upstream requests made through this handle
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::card;
    use crate::service::tests::FakeSource;
    use std::time::Duration;

    fn companion(source: Arc<FakeSource>, ratings_store: Arc<MemoryRatingsStore>) -> CompanionData {
        let service = CardService::new(
            ServiceConfig::default(),
            source,
            Some(Arc::new(MemoryCardStore::new()) as Arc<dyn CardStore>),
        );
        let ratings = RatingsClient::new(
            RatingsConfig::default()
                .with_base_url("http://127.0.0.1:9")
                .with_rate_interval(Duration::ZERO),
            Some(ratings_store as Arc<dyn RatingsCacheStore>),
        )
        .unwrap();
        CompanionData::from_parts(service, ratings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_lookups_go_through_service() {
        let source = Arc::new(FakeSource::with_cards([card(1, "Shock"), card(2, "Opt")]));
        let companion = companion(source.clone(), Arc::new(MemoryRatingsStore::new()));

        assert_eq!(companion.get_card(1).await.unwrap().name, "Shock");
        assert_eq!(companion.get_cards(&[1, 2, 3]).await.len(), 2);
        assert_eq!(companion.search_by_name("sho").await.unwrap().len(), 1);
        assert_eq!(companion.service().memory_cache_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_lookups_and_freshness() {
        let source = Arc::new(FakeSource::with_cards([card(1, "Shock"), card(2, "Opt")]));
        let companion = companion(source.clone(), Arc::new(MemoryRatingsStore::new()));

        let by_name = companion.get_cards_by_names(&["Shock".to_string()]).await.unwrap();
        assert_eq!(by_name.cards.len(), 1);
        let by_number = companion
            .get_cards_by_set_and_numbers(&[("BLB".to_string(), "2".to_string())])
            .await
            .unwrap();
        assert_eq!(by_number.cards[0].name, "Opt");

        let freshness = companion.card_freshness().unwrap().unwrap();
        assert_eq!((freshness.total, freshness.fresh), (2, 2));
        assert_eq!(companion.refresh_stale_cards(10).await.unwrap(), RefreshReport::default());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_ratings_without_fallback() {
        let ratings_store = Arc::new(MemoryRatingsStore::new());
        let query = RatingsQuery::new("BLB", "PremierDraft");
        let records: Vec<RatingRecord> =
            serde_json::from_value(serde_json::json!([{"name": "Shock", "ever_drawn_win_rate": 0.55}])).unwrap();
        ratings_store.save_card_ratings(&query.cache_key(), &records).unwrap();
        let companion = companion(Arc::new(FakeSource::default()), ratings_store);

        companion.shutdown();
        assert!(companion.is_shut_down());
        let result = companion.get_ratings(&query).await;
        assert!(matches!(result, Err(DataError::Cancelled)));
        assert_eq!(companion.ratings().stats(), ClientStats::default());
    }
}
