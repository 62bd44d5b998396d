//! Core data models used throughout deckseer.
//!
//! These types represent the catalog records, users, and interactions that
//! flow through the ingestion pipeline and the recommendation router, plus
//! the collection schema installed into the remote store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized catalog record, shaped exactly like the remote collection
/// schema. Every field is always present: absent optional fields are
/// normalized to empty strings, empty lists, or zero, so the store's schema
/// validation never fails on missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub card_id: String,
    #[serde(default)]
    pub oracle_id: String,
    pub name: String,
    #[serde(default)]
    pub released_at: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub scryfall_uri: String,
    #[serde(default)]
    pub image_uri: String,
    #[serde(default)]
    pub type_line: String,
    #[serde(default)]
    pub oracle_text: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub color_identity: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub produced_mana: Vec<String>,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub power: String,
    #[serde(default)]
    pub toughness: String,
    #[serde(default)]
    pub mana_cost: String,
    #[serde(default)]
    pub loyalty: String,
    #[serde(default)]
    pub defense: String,
    #[serde(default)]
    pub life_modifier: String,
    #[serde(default)]
    pub hand_modifier: String,
    #[serde(default)]
    pub edhrec_rank: f64,
    #[serde(default)]
    pub cmc: f64,
}

/// The kind of interaction a user recorded against a card.
///
/// Kinds are not unique per item: repeated interactions accumulate rather
/// than overwrite, so retrieval returns all recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Added,
    Discarded,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Added => f.write_str("added"),
            InteractionKind::Discarded => f.write_str("discarded"),
        }
    }
}

/// A single recorded interaction event, as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub item_id: String,
    pub interaction_property_name: InteractionKind,
    pub weight: f64,
}

/// An interaction event joined with display info for the front end.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionDetail {
    pub item_id: String,
    pub name: String,
    pub interaction_property_name: InteractionKind,
    pub weight: f64,
    pub image_uri: String,
}

/// A user record as persisted by the store: an opaque caller-supplied id and
/// the serialized deck blob. Users are created on first reference and never
/// deleted by this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub decks: String,
}

impl UserRecord {
    /// A freshly provisioned user with an empty deck.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            decks: String::new(),
        }
    }
}

/// Raw training status reported by the store. `status == "error"` marks a
/// terminal failure; `detail` is an opaque payload surfaced to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainStatus {
    pub status: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Data types understood by the remote collection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    TextArray,
    Number,
    Uuid,
}

/// Schema definition for the remote collection: property types, which
/// properties feed training, user properties, and the named interaction
/// kinds.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSchema {
    pub name: String,
    pub properties: Vec<(String, DataType)>,
    pub trainable_properties: Vec<String>,
    pub user_properties: Vec<(String, DataType)>,
    pub interaction_property_names: Vec<String>,
    pub text_search_property_name: String,
}

impl CollectionSchema {
    /// The card-catalog schema: one property per [`CardRecord`] field, with
    /// everything except identifiers and URIs marked trainable.
    pub fn cards(name: impl Into<String>) -> Self {
        use DataType::*;

        let properties = vec![
            ("card_id".to_string(), Uuid),
            ("oracle_id".to_string(), Uuid),
            ("name".to_string(), Text),
            ("released_at".to_string(), Text),
            ("uri".to_string(), Text),
            ("scryfall_uri".to_string(), Text),
            ("image_uri".to_string(), Text),
            ("type_line".to_string(), Text),
            ("oracle_text".to_string(), Text),
            ("colors".to_string(), TextArray),
            ("color_identity".to_string(), TextArray),
            ("keywords".to_string(), TextArray),
            ("produced_mana".to_string(), TextArray),
            ("set_name".to_string(), Text),
            ("rarity".to_string(), Text),
            ("power".to_string(), Text),
            ("toughness".to_string(), Text),
            ("mana_cost".to_string(), Text),
            ("loyalty".to_string(), Text),
            ("defense".to_string(), Text),
            ("life_modifier".to_string(), Text),
            ("hand_modifier".to_string(), Text),
            ("edhrec_rank".to_string(), Number),
            ("cmc".to_string(), Number),
        ];

        let trainable_properties = [
            "name",
            "released_at",
            "type_line",
            "oracle_text",
            "colors",
            "keywords",
            "produced_mana",
            "set_name",
            "rarity",
            "power",
            "toughness",
            "mana_cost",
            "loyalty",
            "defense",
            "life_modifier",
            "hand_modifier",
            "edhrec_rank",
            "cmc",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            name: name.into(),
            properties,
            trainable_properties,
            user_properties: vec![("decks".to_string(), DataType::Text)],
            interaction_property_names: vec!["added".to_string(), "discarded".to_string()],
            text_search_property_name: "oracle_text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&InteractionKind::Added).unwrap(),
            "\"added\""
        );
        let kind: InteractionKind = serde_json::from_str("\"discarded\"").unwrap();
        assert_eq!(kind, InteractionKind::Discarded);
    }

    #[test]
    fn card_record_tolerates_missing_optional_fields() {
        let card: CardRecord = serde_json::from_value(serde_json::json!({
            "card_id": "abc",
            "name": "Island",
        }))
        .unwrap();
        assert_eq!(card.oracle_id, "");
        assert!(card.color_identity.is_empty());
        assert_eq!(card.cmc, 0.0);
    }

    #[test]
    fn cards_schema_covers_every_record_field() {
        let schema = CollectionSchema::cards("cards");
        let value = serde_json::to_value(CardRecord {
            card_id: "x".into(),
            oracle_id: String::new(),
            name: "x".into(),
            released_at: String::new(),
            uri: String::new(),
            scryfall_uri: String::new(),
            image_uri: String::new(),
            type_line: String::new(),
            oracle_text: String::new(),
            colors: vec![],
            color_identity: vec![],
            keywords: vec![],
            produced_mana: vec![],
            set_name: String::new(),
            rarity: String::new(),
            power: String::new(),
            toughness: String::new(),
            mana_cost: String::new(),
            loyalty: String::new(),
            defense: String::new(),
            life_modifier: String::new(),
            hand_modifier: String::new(),
            edhrec_rank: 0.0,
            cmc: 0.0,
        })
        .unwrap();
        let fields = value.as_object().unwrap();
        assert_eq!(schema.properties.len(), fields.len());
        for (name, _) in &schema.properties {
            assert!(fields.contains_key(name), "schema property {name} missing");
        }
    }
}
