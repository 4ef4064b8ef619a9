use crate::error::DataError;
use crate::models::CardRecord;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum identifiers per `/cards/collection` request
pub const COLLECTION_PAGE_SIZE: usize = 75;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    pub border_crop: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CardFace {
    pub name: String,
    pub mana_cost: Option<String>,
    pub type_line: Option<String>,
    pub oracle_text: Option<String>,
    pub colors: Option<Vec<String>>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    pub image_uris: Option<ImageUris>,
}

/// Card object as returned by Scryfall (only the fields we keep)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScryfallCard {
    pub id: String,
    pub oracle_id: Option<String>,
    pub arena_id: Option<u32>,
    pub name: String,
    pub type_line: Option<String>,
    pub mana_cost: Option<String>,
    #[serde(default)]
    pub cmc: f64,
    pub colors: Option<Vec<String>>,
    #[serde(default)]
    pub color_identity: Vec<String>,
    pub rarity: String,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    pub oracle_text: Option<String>,
    pub set: String,
    pub set_name: String,
    pub collector_number: String,
    pub released_at: String,
    pub layout: String,
    pub image_uris: Option<ImageUris>,
    pub card_faces: Option<Vec<CardFace>>,
    #[serde(default)]
    pub legalities: BTreeMap<String, String>,
}

impl ScryfallCard {
    fn faces(&self) -> &[CardFace] {
        self.card_faces.as_deref().unwrap_or_default()
    }

    /// First face value for fields that multi-faced cards only carry per face
    fn first_face<F>(&self, field: F) -> Option<String>
    where
        F: Fn(&CardFace) -> Option<&String>,
    {
        self.faces().iter().find_map(|face| field(face).filter(|v| !v.is_empty()).cloned())
    }

    /// Convert into a [`CardRecord`]. `requested_arena_id` fills in the id
    /// for responses that omit it; a card with neither is not on Arena.
    pub fn into_record(self, requested_arena_id: Option<u32>) -> Result<CardRecord, DataError> {
        let arena_id = self
            .arena_id
            .or(requested_arena_id)
            .ok_or_else(|| DataError::NotFound(format!("'{}' is not available on Arena", self.name)))?;

        let type_line = match &self.type_line {
            Some(type_line) => type_line.clone(),
            None => self
                .faces()
                .iter()
                .filter_map(|face| face.type_line.as_deref())
                .join(" // "),
        };

        let colors = match &self.colors {
            Some(colors) => colors.clone(),
            None => self
                .faces()
                .iter()
                .flat_map(|face| face.colors.iter().flatten())
                .unique()
                .cloned()
                .collect(),
        };

        let oracle_text = match &self.oracle_text {
            Some(text) => Some(text.clone()),
            None if !self.faces().is_empty() => Some(
                self.faces()
                    .iter()
                    .filter_map(|face| face.oracle_text.as_deref())
                    .join("\n//\n"),
            ),
            None => None,
        };

        let image_uri = self
            .image_uris
            .as_ref()
            .and_then(|uris| uris.normal.clone())
            .or_else(|| {
                self.faces()
                    .first()
                    .and_then(|face| face.image_uris.as_ref())
                    .and_then(|uris| uris.normal.clone())
            });

        let mana_cost = self.mana_cost.clone().or_else(|| self.first_face(|f| f.mana_cost.as_ref()));
        let power = self.power.clone().or_else(|| self.first_face(|f| f.power.as_ref()));
        let toughness = self.toughness.clone().or_else(|| self.first_face(|f| f.toughness.as_ref()));
        let loyalty = self.loyalty.clone().or_else(|| self.first_face(|f| f.loyalty.as_ref()));

        Ok(CardRecord {
            arena_id,
            scryfall_id: self.id,
            oracle_id: self.oracle_id,
            name: self.name,
            type_line,
            mana_cost,
            cmc: self.cmc,
            colors,
            color_identity: self.color_identity,
            rarity: self.rarity,
            power,
            toughness,
            loyalty,
            oracle_text,
            set_code: self.set,
            set_name: self.set_name,
            collector_number: self.collector_number,
            released_at: self.released_at,
            layout: self.layout,
            image_uri,
            legalities: self.legalities,
        })
    }
}

/// One entry of a `/cards/collection` request. Scryfall echoes unmatched
/// entries back in the same shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum CollectionIdentifier {
    SetNumber { set: String, collector_number: String },
    Id { id: String },
    Name { name: String },
}

impl CollectionIdentifier {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name { name: name.into() }
    }

    /// Set codes are sent lowercase, as Scryfall prints them
    pub fn set_number(set: impl AsRef<str>, collector_number: impl Into<String>) -> Self {
        Self::SetNumber {
            set: set.as_ref().to_lowercase(),
            collector_number: collector_number.into(),
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id { id: id.into() }
    }
}

impl fmt::Display for CollectionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetNumber { set, collector_number } => {
                write!(f, "{} #{}", set.to_uppercase(), collector_number)
            }
            Self::Id { id } => write!(f, "{}", id),
            Self::Name { name } => write!(f, "{}", name),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CollectionRequest<'a> {
    pub identifiers: &'a [CollectionIdentifier],
}

#[derive(Deserialize, Debug)]
pub struct CollectionResponse {
    pub data: Vec<ScryfallCard>,
    #[serde(default)]
    pub not_found: Vec<serde_json::Value>,
}

impl CollectionResponse {
    /// Identifiers Scryfall could not match. Shapes we never send are skipped.
    pub fn not_found_identifiers(&self) -> Vec<CollectionIdentifier> {
        self.not_found
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}

/// Error object returned with non-2xx responses
#[derive(Deserialize, Debug)]
pub struct ScryfallErrorBody {
    pub code: String,
    pub details: String,
}

/// Result of a collection lookup
#[derive(Debug, Default)]
pub struct CollectionLookup {
    pub cards: Vec<CardRecord>,
    pub not_found: Vec<CollectionIdentifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_faced_card() {
        let card: ScryfallCard =
            serde_json::from_str(include_str!("../../test_data/card_urza_lord_protector.json")).unwrap();
        let record = card.into_record(None).unwrap();

        assert_eq!(record.arena_id, 82710);
        assert_eq!(record.name, "Urza, Lord Protector");
        assert_eq!(record.set_code, "bro");
        assert_eq!(record.mana_cost.as_deref(), Some("{1}{W}{U}"));
        assert_eq!(record.colors, vec!["U", "W"]);
        assert_eq!(record.power.as_deref(), Some("2"));
        assert_eq!(record.released_at, "2022-11-18");
        assert!(record.image_uri.as_deref().unwrap().contains("/normal/front/"));
        assert!(record.is_legal_in("standard"));
        assert!(!record.is_legal_in("pauper"));
    }

    #[test]
    fn test_double_faced_card_uses_faces() {
        let card: ScryfallCard =
            serde_json::from_str(include_str!("../../test_data/card_fable_of_the_mirror_breaker.json"))
                .unwrap();
        let record = card.into_record(None).unwrap();

        assert_eq!(record.arena_id, 79543);
        assert_eq!(record.layout, "transform");
        assert_eq!(record.mana_cost.as_deref(), Some("{2}{R}"));
        assert_eq!(record.colors, vec!["R"]);
        assert_eq!(record.power.as_deref(), Some("2"));
        assert!(record.oracle_text.unwrap().contains("\n//\n"));
        assert_eq!(
            record.image_uri.as_deref(),
            Some("https://cards.scryfall.io/normal/front/a/9/a9a8b5e5.jpg")
        );
    }

    #[test]
    fn test_missing_arena_id() {
        let mut card: ScryfallCard =
            serde_json::from_str(include_str!("../../test_data/card_urza_lord_protector.json")).unwrap();
        card.arena_id = None;

        assert!(card.clone().into_record(None).unwrap_err().is_not_found());
        assert_eq!(card.into_record(Some(7)).unwrap().arena_id, 7);
    }

    #[test]
    fn test_collection_not_found_identifiers() {
        let response: CollectionResponse = serde_json::from_str(
            r#"{"object":"list","data":[],"not_found":[
                {"name":"Not A Card"},
                {"set":"bro","collector_number":"999"},
                {"id":"00000000-0000-0000-0000-000000000000"},
                {"multiverse_id":12345}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            response.not_found_identifiers(),
            vec![
                CollectionIdentifier::name("Not A Card"),
                CollectionIdentifier::set_number("BRO", "999"),
                CollectionIdentifier::id("00000000-0000-0000-0000-000000000000"),
            ]
        );
    }

    #[test]
    fn test_collection_request_shapes() {
        let identifiers = vec![
            CollectionIdentifier::name("Opt"),
            CollectionIdentifier::set_number("DMU", "59"),
            CollectionIdentifier::id("abc"),
        ];
        let request = serde_json::to_value(CollectionRequest {
            identifiers: &identifiers,
        })
        .unwrap();
        assert_eq!(
            request,
            serde_json::json!({"identifiers": [
                {"name": "Opt"},
                {"set": "dmu", "collector_number": "59"},
                {"id": "abc"}
            ]})
        );
        assert_eq!(identifiers[1].to_string(), "DMU #59");
    }
}
