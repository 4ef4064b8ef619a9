use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical card metadata, keyed by the game client's Arena ID.
///
/// Records are never mutated after construction; a refresh from upstream
/// replaces the whole record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CardRecord {
    pub arena_id: u32,
    pub scryfall_id: String,
    pub oracle_id: Option<String>,
    pub name: String,
    pub type_line: String,
    pub mana_cost: Option<String>,
    pub cmc: f64,
    pub colors: Vec<String>,
    pub color_identity: Vec<String>,
    pub rarity: String,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    pub oracle_text: Option<String>,
    pub set_code: String,
    pub set_name: String,
    pub collector_number: String,
    /// YYYY-MM-DD as reported upstream
    pub released_at: String,
    pub layout: String,
    pub image_uri: Option<String>,
    /// Format name -> "legal", "not_legal", "banned" or "restricted"
    #[serde(default)]
    pub legalities: BTreeMap<String, String>,
}

impl CardRecord {
    pub fn is_legal_in(&self, format: &str) -> bool {
        self.legalities
            .get(format)
            .is_some_and(|status| status == "legal" || status == "restricted")
    }

    pub fn is_multicolored(&self) -> bool {
        self.colors.len() > 1
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn card(arena_id: u32, name: &str) -> CardRecord {
        CardRecord {
            arena_id,
            scryfall_id: format!("00000000-0000-0000-0000-{:012}", arena_id),
            oracle_id: None,
            name: name.to_string(),
            type_line: "Creature — Elf Warrior".to_string(),
            mana_cost: Some("{1}{G}".to_string()),
            cmc: 2.0,
            colors: vec!["G".to_string()],
            color_identity: vec!["G".to_string()],
            rarity: "common".to_string(),
            power: Some("2".to_string()),
            toughness: Some("2".to_string()),
            loyalty: None,
            oracle_text: None,
            set_code: "blb".to_string(),
            set_name: "Bloomburrow".to_string(),
            collector_number: arena_id.to_string(),
            released_at: "2024-08-02".to_string(),
            layout: "normal".to_string(),
            image_uri: None,
            legalities: BTreeMap::from([
                ("standard".to_string(), "legal".to_string()),
                ("vintage".to_string(), "restricted".to_string()),
                ("pauper".to_string(), "not_legal".to_string()),
            ]),
        }
    }
}
