//! Structured extraction payload.
//!
//! Generated text is sanitized (code fences stripped, outermost object
//! located) and decoded into a lenient wire shape, then normalized into an
//! [`ExtractionRecord`] with documented defaults. Nothing here touches the
//! store, so a payload that fails to parse can never cause a partial write.

use chronicle_core::ExtractionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// One character as reported for a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    /// Trimmed name; may be blank, blank records are skipped by the merge.
    pub name: String,
    pub location: Option<String>,
    pub realm: Option<String>,
    /// Defaults to `true` when the payload omits it
    pub alive: bool,
    pub status: Option<String>,
    /// `None` leaves the stored inventory unchanged
    pub inventory: Option<Vec<String>>,
    /// Relation to the protagonist (key characters only)
    pub relation: Option<String>,
}

/// Progress phrase reported for one quest name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub name: String,
    pub progress: String,
}

/// Normalized extraction result for one chapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub protagonist: Option<CharacterRecord>,
    /// In payload order, uncapped
    pub key_characters: Vec<CharacterRecord>,
    pub quest_progress: Vec<QuestProgress>,
}

impl ExtractionRecord {
    pub fn is_empty(&self) -> bool {
        self.protagonist.is_none() && self.key_characters.is_empty() && self.quest_progress.is_empty()
    }
}

// ============================================================================
// WIRE SHAPE
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default, alias = "protagonistState", alias = "protagonist_state", alias = "main_character")]
    protagonist: Option<RawCharacter>,
    #[serde(default, alias = "keyCharacters", alias = "characters", alias = "key_character_states")]
    key_characters: Option<Vec<RawCharacter>>,
    #[serde(default, alias = "questProgress", alias = "quests", alias = "quest_updates")]
    quest_progress: Option<RawQuests>,
}

#[derive(Debug, Deserialize)]
struct RawCharacter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "place")]
    location: Option<String>,
    #[serde(default, alias = "power_level", alias = "powerLevel", alias = "cultivation", alias = "level")]
    realm: Option<String>,
    #[serde(default, alias = "is_alive", alias = "isAlive")]
    alive: Option<Value>,
    #[serde(default, alias = "state", alias = "condition")]
    status: Option<String>,
    #[serde(default, alias = "items")]
    inventory: Option<Value>,
    #[serde(default, alias = "relationship", alias = "relation_to_protagonist", alias = "relationToProtagonist")]
    relation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuests {
    Map(BTreeMap<String, Value>),
    List(Vec<RawQuestEntry>),
}

#[derive(Debug, Deserialize)]
struct RawQuestEntry {
    #[serde(default, alias = "title", alias = "id", alias = "quest")]
    name: Option<String>,
    #[serde(default, alias = "status", alias = "update")]
    progress: Option<Value>,
}

// ============================================================================
// SANITIZATION
// ============================================================================

/// Strip markdown code fences and return the outermost `{ ... }` span.
pub fn sanitize(text: &str) -> Result<&str, ExtractionError> {
    let mut body = text.trim();

    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        let content = match after.find('\n') {
            // Language tag line such as ```json
            Some(newline) if !after[..newline].contains('{') => &after[newline + 1..],
            _ => after,
        };
        body = match content.find("```") {
            Some(end) => &content[..end],
            None => content,
        };
    }

    let start = body.find('{').ok_or(ExtractionError::NoStructuredContent)?;
    let end = body.rfind('}').ok_or(ExtractionError::NoStructuredContent)?;
    if end < start {
        return Err(ExtractionError::NoStructuredContent);
    }
    Ok(&body[start..=end])
}

// ============================================================================
// PARSING
// ============================================================================

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn value_to_phrase(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Interpret a loosely-typed alive flag. Unrecognized values mean alive.
fn parse_alive(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Some(Value::String(s)) => {
            let s = s.trim().to_lowercase();
            !matches!(
                s.as_str(),
                "false" | "no" | "dead" | "deceased" | "died" | "0" | "死亡" | "已死" | "否"
            )
        }
        _ => true,
    }
}

fn parse_inventory(value: Option<Value>) -> Result<Option<Vec<String>>, ExtractionError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) => {
            return Ok(Some(
                s.split([',', '，', '、'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ))
        }
        Some(other) => {
            return Err(ExtractionError::MalformedPayload {
                reason: format!("inventory must be a list, got {}", other),
            })
        }
    };

    Ok(Some(
        items
            .iter()
            .map(value_to_phrase)
            .filter(|s| !s.is_empty())
            .collect(),
    ))
}

fn normalize_character(raw: RawCharacter) -> Result<CharacterRecord, ExtractionError> {
    Ok(CharacterRecord {
        name: raw.name.map(|n| n.trim().to_string()).unwrap_or_default(),
        location: non_blank(raw.location),
        realm: non_blank(raw.realm),
        alive: parse_alive(raw.alive.as_ref()),
        status: non_blank(raw.status),
        inventory: parse_inventory(raw.inventory)?,
        relation: non_blank(raw.relation),
    })
}

fn normalize_quests(raw: Option<RawQuests>) -> Vec<QuestProgress> {
    let pairs: Vec<(String, String)> = match raw {
        None => Vec::new(),
        Some(RawQuests::Map(map)) => map
            .into_iter()
            .map(|(name, progress)| (name, value_to_phrase(&progress)))
            .collect(),
        Some(RawQuests::List(entries)) => entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.name?;
                let progress = entry.progress.as_ref().map(value_to_phrase).unwrap_or_default();
                Some((name, progress))
            })
            .collect(),
    };

    pairs
        .into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, progress)| QuestProgress {
            name: name.trim().to_string(),
            progress,
        })
        .collect()
}

/// Parse generated text into an [`ExtractionRecord`].
///
/// # Errors
/// * `NoStructuredContent` - no `{ ... }` span in the text
/// * `MalformedPayload` - the span is not a JSON object of the expected shape
/// * `MissingField` - the object carries none of the expected sections
pub fn parse_extraction(text: &str) -> Result<ExtractionRecord, ExtractionError> {
    let body = sanitize(text)?;
    let raw: RawExtraction =
        serde_json::from_str(body).map_err(|e| ExtractionError::MalformedPayload {
            reason: e.to_string(),
        })?;

    let protagonist = raw.protagonist.map(normalize_character).transpose()?;
    let key_characters = raw
        .key_characters
        .unwrap_or_default()
        .into_iter()
        .map(normalize_character)
        .collect::<Result<Vec<_>, _>>()?;
    let quest_progress = normalize_quests(raw.quest_progress);

    let record = ExtractionRecord {
        protagonist,
        key_characters,
        quest_progress,
    };
    if record.is_empty() {
        return Err(ExtractionError::MissingField {
            field: "protagonist, key_characters or quest_progress".to_string(),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "protagonist": {"name": "Lin Feng", "location": "Azure Peak", "realm": "Foundation",
                        "alive": true, "inventory": ["Jade Sword", " ", "Pill"]},
        "key_characters": [
            {"name": "Su Yan", "relation": "ally", "status": "wounded"},
            {"name": "  ", "relation": "enemy"}
        ],
        "quest_progress": {"Q-Find The Sword": "making progress", "Rescue Elder": "stalled"}
    }"#;

    #[test]
    fn test_sanitize_plain_object() {
        assert_eq!(sanitize(r#"{"a":1}"#).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_sanitize_json_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(sanitize(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_sanitize_bare_fence_and_prose() {
        let text = "```\nnote {\"a\": {\"b\": 2}} trailing\n```";
        assert_eq!(sanitize(text).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_sanitize_no_object() {
        assert_eq!(sanitize("no json here"), Err(ExtractionError::NoStructuredContent));
        assert_eq!(sanitize("} backwards {"), Err(ExtractionError::NoStructuredContent));
    }

    #[test]
    fn test_parse_full_payload() {
        let record = parse_extraction(FULL).unwrap();
        let protagonist = record.protagonist.unwrap();
        assert_eq!(protagonist.name, "Lin Feng");
        assert_eq!(
            protagonist.inventory,
            Some(vec!["Jade Sword".to_string(), "Pill".to_string()])
        );
        assert_eq!(record.key_characters.len(), 2);
        assert_eq!(record.key_characters[0].relation.as_deref(), Some("ally"));
        assert!(record.key_characters[0].inventory.is_none());
        assert!(record.key_characters[0].alive);
        assert_eq!(record.key_characters[1].name, "");
        assert_eq!(record.quest_progress.len(), 2);
    }

    #[test]
    fn test_parse_aliases_and_quest_list() {
        let text = r#"{
            "protagonistState": {"name": "A", "isAlive": "dead", "powerLevel": "Core"},
            "keyCharacters": [{"name": "B", "relationship": "rival"}],
            "quests": [{"title": "Seal the Gate", "status": "done"}, {"progress": "orphan"}]
        }"#;
        let record = parse_extraction(text).unwrap();
        let protagonist = record.protagonist.unwrap();
        assert!(!protagonist.alive);
        assert_eq!(protagonist.realm.as_deref(), Some("Core"));
        assert_eq!(record.key_characters[0].relation.as_deref(), Some("rival"));
        assert_eq!(
            record.quest_progress,
            vec![QuestProgress {
                name: "Seal the Gate".to_string(),
                progress: "done".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_string_inventory() {
        let text = r#"{"protagonist": {"name": "A", "inventory": "sword, 玉佩、shield"}}"#;
        let record = parse_extraction(text).unwrap();
        assert_eq!(
            record.protagonist.unwrap().inventory,
            Some(vec!["sword".to_string(), "玉佩".to_string(), "shield".to_string()])
        );
    }

    #[test]
    fn test_parse_broken_json_is_malformed() {
        let err = parse_extraction(r#"{"protagonist": {"name": "A",}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedPayload { .. }));
    }

    #[test]
    fn test_parse_wrong_shape_is_malformed() {
        let err = parse_extraction(r#"{"key_characters": "Su Yan"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedPayload { .. }));
        let err = parse_extraction(r#"{"protagonist": {"name": "A", "inventory": 7}}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedPayload { .. }));
    }

    #[test]
    fn test_parse_empty_object_is_missing_field() {
        let err = parse_extraction(r#"{"summary": "nothing"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField { .. }));
    }

    #[test]
    fn test_alive_interpretation() {
        assert!(parse_alive(None));
        assert!(parse_alive(Some(&Value::Null)));
        assert!(!parse_alive(Some(&Value::Bool(false))));
        assert!(!parse_alive(Some(&Value::String("Deceased".into()))));
        assert!(parse_alive(Some(&Value::String("barely".into()))));
        assert!(!parse_alive(Some(&serde_json::json!(0))));
    }
}
