//! Persistent card storage seam
//!
//! The resolution service only needs keyed reads, upserts, a name search and
//! the age of each stored card, so any table-like backend can sit behind
//! [`CardStore`].

use crate::error::DataError;
use crate::models::CardRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;

/// Stored cards grouped by the age of their last write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessSummary {
    pub total: usize,
    /// Written within the stale age
    pub fresh: usize,
    /// Older than the stale age, including the very stale ones
    pub stale: usize,
    /// Older than twice the stale age
    pub very_stale: usize,
}

/// Unix timestamp `age` before now; anything written earlier is older than `age`
pub(crate) fn age_cutoff(age: Duration) -> i64 {
    let secs = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
    OffsetDateTime::now_utc().unix_timestamp().saturating_sub(secs)
}

/// Storage backend for [`CardRecord`]s keyed by Arena ID
pub trait CardStore: Send + Sync {
    /// Look up a card; `Ok(None)` when it is not stored
    fn get(&self, arena_id: u32) -> Result<Option<CardRecord>, DataError>;

    /// Insert or replace the card with the same Arena ID
    fn upsert(&self, card: &CardRecord) -> Result<(), DataError>;

    /// Case-insensitive substring match on the card name
    fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, DataError>;

    fn clear(&self) -> Result<(), DataError>;

    fn len(&self) -> Result<usize, DataError>;

    /// Arena IDs of cards last written more than `older_than` ago, oldest
    /// first, at most `limit` of them
    fn stale_cards(&self, older_than: Duration, limit: usize) -> Result<Vec<u32>, DataError>;

    fn freshness(&self, stale_age: Duration) -> Result<FreshnessSummary, DataError>;

    /// Name used in log lines
    fn store_name(&self) -> &'static str;
}

/// In-process card store, for tests and deployments without a database
///
/// The failure switches let tests simulate a broken backend.
#[derive(Debug, Default)]
pub struct MemoryCardStore {
    /// Card plus the unix timestamp of its last write
    cards: Mutex<HashMap<u32, (CardRecord, i64)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with existing cards
    pub fn preload(&self, cards: impl IntoIterator<Item = CardRecord>) {
        self.preload_at(cards, OffsetDateTime::now_utc());
    }

    /// Pre-populate with cards last written at `updated_at`
    pub fn preload_at(&self, cards: impl IntoIterator<Item = CardRecord>, updated_at: OffsetDateTime) {
        let mut stored = self.lock();
        for card in cards {
            stored.insert(card.arena_id, (card, updated_at.unix_timestamp()));
        }
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, (CardRecord, i64)>> {
        self.cards.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CardStore for MemoryCardStore {
    fn get(&self, arena_id: u32) -> Result<Option<CardRecord>, DataError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::Cache("Simulated read failure".to_string()));
        }
        Ok(self.lock().get(&arena_id).map(|(card, _)| card.clone()))
    }

    fn upsert(&self, card: &CardRecord) -> Result<(), DataError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::Cache("Simulated write failure".to_string()));
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.lock().insert(card.arena_id, (card.clone(), now));
        Ok(())
    }

    fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, DataError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::Cache("Simulated read failure".to_string()));
        }
        let needle = name.to_lowercase();
        let mut matches: Vec<CardRecord> = self
            .lock()
            .values()
            .filter(|(card, _)| card.name.to_lowercase().contains(&needle))
            .map(|(card, _)| card.clone())
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.arena_id.cmp(&b.arena_id)));
        Ok(matches)
    }

    fn clear(&self) -> Result<(), DataError> {
        self.lock().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, DataError> {
        Ok(self.lock().len())
    }

    fn stale_cards(&self, older_than: Duration, limit: usize) -> Result<Vec<u32>, DataError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::Cache("Simulated read failure".to_string()));
        }
        let cutoff = age_cutoff(older_than);
        let mut stale: Vec<(i64, u32)> = self
            .lock()
            .iter()
            .filter(|(_, (_, updated_at))| *updated_at < cutoff)
            .map(|(arena_id, (_, updated_at))| (*updated_at, *arena_id))
            .collect();
        stale.sort_unstable();
        Ok(stale.into_iter().take(limit).map(|(_, arena_id)| arena_id).collect())
    }

    fn freshness(&self, stale_age: Duration) -> Result<FreshnessSummary, DataError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::Cache("Simulated read failure".to_string()));
        }
        let stale_cutoff = age_cutoff(stale_age);
        let very_stale_cutoff = age_cutoff(stale_age.saturating_mul(2));
        let stored = self.lock();
        let stale = stored.values().filter(|(_, t)| *t < stale_cutoff).count();
        Ok(FreshnessSummary {
            total: stored.len(),
            fresh: stored.len() - stale,
            stale,
            very_stale: stored.values().filter(|(_, t)| *t < very_stale_cutoff).count(),
        })
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
