//! Fallback storage for ratings tables
//!
//! Every successful 17Lands response is written here with its raw win rates,
//! so a later upstream failure can still be answered from the last good copy.

use crate::error::DataError;
use crate::seventeenlands::models::{CachedRatings, ColorRating, RatingRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub trait RatingsCacheStore: Send + Sync {
    fn save_card_ratings(&self, key: &str, records: &[RatingRecord]) -> Result<(), DataError>;

    /// `Ok(None)` when nothing was ever stored under `key`
    fn load_card_ratings(&self, key: &str) -> Result<Option<CachedRatings<RatingRecord>>, DataError>;

    fn save_color_ratings(&self, key: &str, records: &[ColorRating]) -> Result<(), DataError>;

    fn load_color_ratings(&self, key: &str) -> Result<Option<CachedRatings<ColorRating>>, DataError>;
}

/// One JSON file per key, named after the SHA-256 of the key
pub struct JsonRatingsStore {
    cache_dir: PathBuf,
}

impl JsonRatingsStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self, DataError> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
            info!(cache_dir = %cache_dir.display(), "Created ratings cache directory");
        }
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        self.cache_dir.join(format!("{:x}.json", hash))
    }

    fn save<T: Serialize + Clone>(&self, key: &str, records: &[T]) -> Result<(), DataError> {
        let cached = CachedRatings {
            key: key.to_string(),
            records: records.to_vec(),
            fetched_at: OffsetDateTime::now_utc(),
        };
        let path = self.key_to_path(key);
        // Each save gets its own temp file, renamed over the target once
        // complete, so readers and concurrent writers never see a partial table
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &cached)?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(key = %key, records = records.len(), file = %path.display(), "Saved ratings to cache");
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedRatings<T>>, DataError> {
        let path = self.key_to_path(key);
        if !path.exists() {
            debug!(key = %key, "No cached ratings found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let cached: CachedRatings<T> = serde_json::from_str(&content)?;
        if cached.key != key {
            warn!(key = %key, stored_key = %cached.key, "Ratings cache key mismatch, ignoring file");
            return Ok(None);
        }
        Ok(Some(cached))
    }
}

impl RatingsCacheStore for JsonRatingsStore {
    fn save_card_ratings(&self, key: &str, records: &[RatingRecord]) -> Result<(), DataError> {
        self.save(key, records)
    }

    fn load_card_ratings(&self, key: &str) -> Result<Option<CachedRatings<RatingRecord>>, DataError> {
        self.load(key)
    }

    fn save_color_ratings(&self, key: &str, records: &[ColorRating]) -> Result<(), DataError> {
        self.save(key, records)
    }

    fn load_color_ratings(&self, key: &str) -> Result<Option<CachedRatings<ColorRating>>, DataError> {
        self.load(key)
    }
}

/// Ratings store kept in process memory, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryRatingsStore {
    cards: Mutex<HashMap<String, CachedRatings<RatingRecord>>>,
    colors: Mutex<HashMap<String, CachedRatings<ColorRating>>>,
}

impl MemoryRatingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a card ratings table with an explicit fetch time
    pub fn preload_card_ratings(&self, key: &str, records: Vec<RatingRecord>, fetched_at: OffsetDateTime) {
        let mut cards = self.cards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cards.insert(
            key.to_string(),
            CachedRatings {
                key: key.to_string(),
                records,
                fetched_at,
            },
        );
    }
}

impl RatingsCacheStore for MemoryRatingsStore {
    fn save_card_ratings(&self, key: &str, records: &[RatingRecord]) -> Result<(), DataError> {
        self.preload_card_ratings(key, records.to_vec(), OffsetDateTime::now_utc());
        Ok(())
    }

    fn load_card_ratings(&self, key: &str) -> Result<Option<CachedRatings<RatingRecord>>, DataError> {
        let cards = self.cards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(cards.get(key).cloned())
    }

    fn save_color_ratings(&self, key: &str, records: &[ColorRating]) -> Result<(), DataError> {
        let mut colors = self.colors.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        colors.insert(
            key.to_string(),
            CachedRatings {
                key: key.to_string(),
                records: records.to_vec(),
                fetched_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    fn load_color_ratings(&self, key: &str) -> Result<Option<CachedRatings<ColorRating>>, DataError> {
        let colors = self.colors.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(colors.get(key).cloned())
    }
}
