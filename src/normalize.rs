//! Catalog record normalization.
//!
//! Maps a raw catalog record (arbitrary JSON, possibly missing fields) into
//! the fixed-shape [`CardRecord`] the store expects. Pure function, no state.
//! Absent optional fields become type-appropriate empty defaults; only a
//! missing identifier or name rejects the record.

use serde_json::Value;
use thiserror::Error;

use crate::models::CardRecord;

/// A record that cannot be shaped into a [`CardRecord`]. Callers skip the
/// record and continue; normalization failure is never fatal to a run.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing or empty required field `{0}`")]
    MissingField(&'static str),
}

/// Normalize one raw catalog record.
///
/// Requires a non-empty `id` and `name`; every other field defaults to an
/// empty string, empty list, or zero when absent or of the wrong type.
pub fn normalize(raw: &Value) -> Result<CardRecord, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

    let card_id = required_text(obj, "id")?;
    let name = required_text(obj, "name")?;

    // The Scryfall shape nests image URIs one level down.
    let image_uri = obj
        .get("image_uris")
        .and_then(|v| v.get("normal"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(CardRecord {
        card_id,
        oracle_id: text(obj, "oracle_id"),
        name,
        released_at: text(obj, "released_at"),
        uri: text(obj, "uri"),
        scryfall_uri: text(obj, "scryfall_uri"),
        image_uri,
        type_line: text(obj, "type_line"),
        oracle_text: text(obj, "oracle_text"),
        colors: text_list(obj, "colors"),
        color_identity: text_list(obj, "color_identity"),
        keywords: text_list(obj, "keywords"),
        produced_mana: text_list(obj, "produced_mana"),
        set_name: text(obj, "set_name"),
        rarity: text(obj, "rarity"),
        power: text(obj, "power"),
        toughness: text(obj, "toughness"),
        mana_cost: text(obj, "mana_cost"),
        loyalty: text(obj, "loyalty"),
        defense: text(obj, "defense"),
        life_modifier: text(obj, "life_modifier"),
        hand_modifier: text(obj, "hand_modifier"),
        edhrec_rank: number(obj, "edhrec_rank"),
        cmc: number(obj, "cmc"),
    })
}

fn required_text(
    obj: &serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<String, NormalizeError> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(NormalizeError::MissingField(key)),
    }
}

fn text(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn text_list(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number(obj: &serde_json::Map<String, Value>, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_record_maps_every_field() {
        let raw = json!({
            "id": "f3a5-01",
            "oracle_id": "9b2c-77",
            "name": "Lightning Bolt",
            "released_at": "1993-08-05",
            "uri": "https://api.example/cards/f3a5-01",
            "scryfall_uri": "https://cards.example/f3a5-01",
            "image_uris": {"normal": "https://img.example/f3a5-01.jpg"},
            "type_line": "Instant",
            "oracle_text": "Lightning Bolt deals 3 damage to any target.",
            "colors": ["R"],
            "color_identity": ["R"],
            "keywords": [],
            "produced_mana": [],
            "set_name": "Limited Edition Alpha",
            "rarity": "common",
            "mana_cost": "{R}",
            "edhrec_rank": 52.0,
            "cmc": 1.0,
        });

        let card = normalize(&raw).unwrap();
        assert_eq!(card.card_id, "f3a5-01");
        assert_eq!(card.name, "Lightning Bolt");
        assert_eq!(card.image_uri, "https://img.example/f3a5-01.jpg");
        assert_eq!(card.colors, vec!["R"]);
        assert_eq!(card.cmc, 1.0);
        // Fields the record omitted come back as empty defaults.
        assert_eq!(card.power, "");
        assert_eq!(card.loyalty, "");
    }

    #[test]
    fn missing_optional_fields_become_empty_defaults() {
        let raw = json!({"id": "a1", "name": "Plains"});
        let card = normalize(&raw).unwrap();
        assert_eq!(card.oracle_id, "");
        assert_eq!(card.image_uri, "");
        assert!(card.color_identity.is_empty());
        assert_eq!(card.edhrec_rank, 0.0);
        assert_eq!(card.cmc, 0.0);
    }

    #[test]
    fn missing_id_is_rejected() {
        let raw = json!({"name": "Nameless"});
        assert!(matches!(
            normalize(&raw),
            Err(NormalizeError::MissingField("id"))
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        let raw = json!({"id": "a1", "name": ""});
        assert!(matches!(
            normalize(&raw),
            Err(NormalizeError::MissingField("name"))
        ));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            normalize(&json!([1, 2, 3])),
            Err(NormalizeError::NotAnObject)
        ));
    }

    #[test]
    fn wrongly_typed_fields_fall_back_to_defaults() {
        let raw = json!({
            "id": "a1",
            "name": "Swamp",
            "colors": "not-an-array",
            "cmc": "not-a-number",
        });
        let card = normalize(&raw).unwrap();
        assert!(card.colors.is_empty());
        assert_eq!(card.cmc, 0.0);
    }
}
