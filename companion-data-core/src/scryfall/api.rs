use super::{client::ScryfallClient, models::*};
use crate::error::DataError;
use crate::models::CardRecord;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

impl ScryfallClient {
    pub async fn get_card_by_arena_id(
        &self,
        arena_id: u32,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError> {
        let request = self.get(&format!("/cards/arena/{}", arena_id));
        let card: ScryfallCard = self.call(request, cancel).await?;
        card.into_record(Some(arena_id))
    }

    pub async fn get_card_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CardRecord, DataError> {
        let request = self.get("/cards/named").query(&[("exact", name)]);
        let card: ScryfallCard = self.call(request, cancel).await?;
        card.into_record(None)
    }

    /// Look up cards through `/cards/collection`, in pages of at most
    /// [`COLLECTION_PAGE_SIZE`] identifiers. Cards without an Arena ID are
    /// reported as not found, by name.
    pub async fn get_cards_by_identifiers(
        &self,
        identifiers: &[CollectionIdentifier],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        let mut result = CollectionLookup::default();

        for page in identifiers.chunks(COLLECTION_PAGE_SIZE) {
            let request = self
                .post("/cards/collection")
                .json(&CollectionRequest { identifiers: page });
            let response: CollectionResponse = self.call(request, cancel).await?;
            result.not_found.extend(response.not_found_identifiers());

            for card in response.data {
                let name = card.name.clone();
                match card.into_record(None) {
                    Ok(record) => result.cards.push(record),
                    Err(e) => {
                        debug!("skipping {}: {}", name, e);
                        result.not_found.push(CollectionIdentifier::name(name));
                    }
                }
            }
        }

        info!(
            "resolved {} of {} collection identifiers via scryfall",
            result.cards.len(),
            identifiers.len()
        );
        Ok(result)
    }

    /// Exact-name collection lookup
    pub async fn get_cards_by_names<S: AsRef<str>>(
        &self,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        let identifiers: Vec<CollectionIdentifier> = names
            .iter()
            .map(|name| CollectionIdentifier::name(name.as_ref()))
            .collect();
        self.get_cards_by_identifiers(&identifiers, cancel).await
    }

    /// Collection lookup by (set code, collector number) pairs
    pub async fn get_cards_by_set_and_numbers<S: AsRef<str>>(
        &self,
        printings: &[(S, S)],
        cancel: &CancellationToken,
    ) -> Result<CollectionLookup, DataError> {
        let identifiers: Vec<CollectionIdentifier> = printings
            .iter()
            .map(|(set, number)| CollectionIdentifier::set_number(set, number.as_ref()))
            .collect();
        self.get_cards_by_identifiers(&identifiers, cancel).await
    }

    /// Fetch many cards by Arena ID. Scryfall has no batch endpoint for
    /// these, so each id is its own rate-governed request, run at most
    /// `batch_concurrency` at a time. Failed ids are logged and left out.
    pub async fn get_cards_by_arena_ids(
        &self,
        arena_ids: &[u32],
        cancel: &CancellationToken,
    ) -> HashMap<u32, CardRecord> {
        let concurrency = self.config().batch_concurrency.max(1);

        let results: Vec<(u32, Result<CardRecord, DataError>)> = stream::iter(arena_ids.iter().copied())
            .map(|arena_id| async move { (arena_id, self.get_card_by_arena_id(arena_id, cancel).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut cards = HashMap::with_capacity(results.len());
        for (arena_id, result) in results {
            match result {
                Ok(card) => {
                    cards.insert(arena_id, card);
                }
                Err(e) if e.is_not_found() || e.is_cancelled() => {
                    debug!("no card for arena id {}: {}", arena_id, e);
                }
                Err(e) => warn!("failed to fetch arena id {}: {}", arena_id, e),
            }
        }
        cards
    }
}

