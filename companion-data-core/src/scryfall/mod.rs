pub mod api;
pub mod client;
pub mod models;

pub use client::ScryfallClient;
pub use models::{CollectionIdentifier, CollectionLookup, ScryfallCard, COLLECTION_PAGE_SIZE};

use crate::error::DataError;
use crate::models::CardRecord;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Upstream source of card metadata used by the resolution service
#[async_trait]
pub trait CardMetadataSource: Send + Sync {
    async fn get_card_by_arena_id(
        &self,
        arena_id: u32,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError>;

    async fn get_card_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError>;

    async fn get_cards_by_identifiers(
        &self,
        identifiers: &[CollectionIdentifier],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError>;
}

#[async_trait]
impl CardMetadataSource for ScryfallClient {
    async fn get_card_by_arena_id(
        &self,
        arena_id: u32,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError> {
        ScryfallClient::get_card_by_arena_id(self, arena_id, cancel).await
    }

    async fn get_card_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError> {
        ScryfallClient::get_card_by_name(self, name, cancel).await
    }

    async fn get_cards_by_identifiers(
        &self,
        identifiers: &[CollectionIdentifier],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        ScryfallClient::get_cards_by_identifiers(self, identifiers, cancel).await
    }
}
