//! SQLite-backed card table

use super::card_store::{age_cutoff, CardStore, FreshnessSummary};
use crate::error::DataError;
use crate::models::CardRecord;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cards (
    arena_id          INTEGER PRIMARY KEY,
    scryfall_id       TEXT NOT NULL,
    oracle_id         TEXT,
    name              TEXT NOT NULL,
    type_line         TEXT NOT NULL,
    mana_cost         TEXT,
    cmc               REAL NOT NULL,
    colors            TEXT NOT NULL,
    color_identity    TEXT NOT NULL,
    rarity            TEXT NOT NULL,
    power             TEXT,
    toughness         TEXT,
    loyalty           TEXT,
    oracle_text       TEXT,
    set_code          TEXT NOT NULL,
    set_name          TEXT NOT NULL,
    collector_number  TEXT NOT NULL,
    released_at       TEXT NOT NULL,
    layout            TEXT NOT NULL,
    image_uri         TEXT,
    legalities        TEXT NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cards_name ON cards(name);
CREATE INDEX IF NOT EXISTS idx_cards_updated_at ON cards(updated_at);
";

const SELECT_COLUMNS: &str = "arena_id, scryfall_id, oracle_id, name, type_line, mana_cost, cmc, \
    colors, color_identity, rarity, power, toughness, loyalty, oracle_text, set_code, set_name, \
    collector_number, released_at, layout, image_uri, legalities";

pub struct SqliteCardStore {
    // rusqlite connections are Send but not Sync
    conn: Mutex<Connection>,
}

impl SqliteCardStore {
    pub fn open(path: &Path) -> Result<Self, DataError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(dir = %parent.display(), "Created card database directory");
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), cards = store.len()?, "Opened card database");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DataError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_card_row(row: &Row<'_>) -> rusqlite::Result<CardRecord> {
    Ok(CardRecord {
        arena_id: row.get(0)?,
        scryfall_id: row.get(1)?,
        oracle_id: row.get(2)?,
        name: row.get(3)?,
        type_line: row.get(4)?,
        mana_cost: row.get(5)?,
        cmc: row.get(6)?,
        colors: json_column(row, 7)?,
        color_identity: json_column(row, 8)?,
        rarity: row.get(9)?,
        power: row.get(10)?,
        toughness: row.get(11)?,
        loyalty: row.get(12)?,
        oracle_text: row.get(13)?,
        set_code: row.get(14)?,
        set_name: row.get(15)?,
        collector_number: row.get(16)?,
        released_at: row.get(17)?,
        layout: row.get(18)?,
        image_uri: row.get(19)?,
        legalities: json_column(row, 20)?,
    })
}

/// Escape LIKE wildcards so user input only matches literally
fn like_pattern(name: &str) -> String {
    let escaped = name
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl CardStore for SqliteCardStore {
    fn get(&self, arena_id: u32) -> Result<Option<CardRecord>, DataError> {
        let conn = self.conn();
        let query = format!("SELECT {} FROM cards WHERE arena_id = ?1", SELECT_COLUMNS);
        let card = conn
            .query_row(&query, params![arena_id], parse_card_row)
            .optional()?;
        Ok(card)
    }

    fn upsert(&self, card: &CardRecord) -> Result<(), DataError> {
        let colors = serde_json::to_string(&card.colors)?;
        let color_identity = serde_json::to_string(&card.color_identity)?;
        let legalities = serde_json::to_string(&card.legalities)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO cards (arena_id, scryfall_id, oracle_id, name, type_line, mana_cost, cmc,
                 colors, color_identity, rarity, power, toughness, loyalty, oracle_text, set_code,
                 set_name, collector_number, released_at, layout, image_uri, legalities, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22)
             ON CONFLICT(arena_id) DO UPDATE SET
                 scryfall_id = excluded.scryfall_id,
                 oracle_id = excluded.oracle_id,
                 name = excluded.name,
                 type_line = excluded.type_line,
                 mana_cost = excluded.mana_cost,
                 cmc = excluded.cmc,
                 colors = excluded.colors,
                 color_identity = excluded.color_identity,
                 rarity = excluded.rarity,
                 power = excluded.power,
                 toughness = excluded.toughness,
                 loyalty = excluded.loyalty,
                 oracle_text = excluded.oracle_text,
                 set_code = excluded.set_code,
                 set_name = excluded.set_name,
                 collector_number = excluded.collector_number,
                 released_at = excluded.released_at,
                 layout = excluded.layout,
                 image_uri = excluded.image_uri,
                 legalities = excluded.legalities,
                 updated_at = excluded.updated_at",
            params![
                card.arena_id,
                card.scryfall_id,
                card.oracle_id,
                card.name,
                card.type_line,
                card.mana_cost,
                card.cmc,
                colors,
                color_identity,
                card.rarity,
                card.power,
                card.toughness,
                card.loyalty,
                card.oracle_text,
                card.set_code,
                card.set_name,
                card.collector_number,
                card.released_at,
                card.layout,
                card.image_uri,
                legalities,
                now,
            ],
        )?;

        debug!(arena_id = card.arena_id, name = %card.name, "Stored card");
        Ok(())
    }

    fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, DataError> {
        let conn = self.conn();
        let query = format!(
            "SELECT {} FROM cards WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name, arena_id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![like_pattern(name)], parse_card_row)?;
        let cards = rows.collect::<Result<Vec<_>, _>>()?;

        debug!(query = %name, matches = cards.len(), "Searched card store");
        Ok(cards)
    }

    fn clear(&self) -> Result<(), DataError> {
        let removed = self.conn().execute("DELETE FROM cards", [])?;
        info!(removed, "Cleared card store");
        Ok(())
    }

    fn len(&self) -> Result<usize, DataError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn stale_cards(&self, older_than: Duration, limit: usize) -> Result<Vec<u32>, DataError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT arena_id FROM cards WHERE updated_at < ?1 ORDER BY updated_at, arena_id LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![age_cutoff(older_than), limit], |row| row.get(0))?;
        let arena_ids = rows.collect::<Result<Vec<u32>, _>>()?;

        debug!(stale = arena_ids.len(), "Listed stale cards");
        Ok(arena_ids)
    }

    fn freshness(&self, stale_age: Duration) -> Result<FreshnessSummary, DataError> {
        let (total, stale, very_stale): (i64, i64, i64) = self.conn().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(updated_at < ?1), 0),
                    COALESCE(SUM(updated_at < ?2), 0)
             FROM cards",
            params![age_cutoff(stale_age), age_cutoff(stale_age.saturating_mul(2))],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(FreshnessSummary {
            total: total as usize,
            fresh: (total - stale) as usize,
            stale: stale as usize,
            very_stale: very_stale as usize,
        })
    }

    fn store_name(&self) -> &'static str {
        "sqlite"
    }
}
