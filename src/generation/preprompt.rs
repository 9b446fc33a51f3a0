use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::GenerationError;

/// Number of suggestions one generation must yield.
pub const PREPROMPT_COUNT: usize = 4;

/// One turn of the conversation handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrepromptKind {
    Roleplay,
    Conversation,
}

impl PrepromptKind {
    /// Case-insensitive parse of the `type` field. Surrounding whitespace is not tolerated.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "roleplay" => Some(PrepromptKind::Roleplay),
            "conversation" => Some(PrepromptKind::Conversation),
            _ => None,
        }
    }
}

/// A validated follow-up suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprompt {
    #[serde(rename = "type")]
    pub kind: PrepromptKind,
    pub prompt: String,
    pub simplified_text: String,
}

impl Preprompt {
    fn from_value(item: &Value) -> Result<Self, String> {
        let object = item.as_object().ok_or("item is not an object")?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .and_then(PrepromptKind::parse)
            .ok_or("type is not 'roleplay' or 'conversation'")?;
        let prompt = object
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or("prompt is not a string")?;
        let simplified_text = object
            .get("simplified_text")
            .and_then(Value::as_str)
            .ok_or("simplified_text is not a string")?;
        Ok(Self {
            kind,
            prompt: prompt.to_owned(),
            simplified_text: simplified_text.to_owned(),
        })
    }
}

/// Validate a parsed payload into exactly [`PREPROMPT_COUNT`] items.
///
/// Malformed items are dropped; only the surviving count is checked, not the
/// position of each kind.
pub fn validate_preprompts(payload: &Value) -> Result<(Vec<Preprompt>, usize), GenerationError> {
    let items = payload
        .get("preprompts")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::Validation("'preprompts' is missing or not a list".into()))?;

    let mut dropped = 0;
    let valid: Vec<Preprompt> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match Preprompt::from_value(item) {
            Ok(preprompt) => Some(preprompt),
            Err(reason) => {
                debug!(index, reason, "dropping malformed preprompt");
                dropped += 1;
                None
            }
        })
        .collect();

    if valid.len() != PREPROMPT_COUNT {
        return Err(GenerationError::Validation(format!(
            "expected {} preprompts, got {} valid of {}",
            PREPROMPT_COUNT,
            valid.len(),
            items.len()
        )));
    }
    Ok((valid, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(kind: &str, n: usize) -> Value {
        json!({"type": kind, "prompt": format!("prompt {n}"), "simplified_text": format!("short {n}")})
    }

    #[test]
    fn accepts_four_items_and_normalizes_type() {
        let payload = json!({"preprompts": [
            item("RolePlay", 1), item("roleplay", 2), item("Conversation", 3), item("CONVERSATION", 4)
        ]});
        let (items, dropped) = validate_preprompts(&payload).unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].kind, PrepromptKind::Roleplay);
        assert_eq!(items[3].kind, PrepromptKind::Conversation);
        assert_eq!(items[2].prompt, "prompt 3");
        assert_eq!(items[2].simplified_text, "short 3");
    }

    #[test]
    fn drops_malformed_items_then_enforces_count() {
        let payload = json!({"preprompts": [
            item("roleplay", 1), item("roleplay", 2), item("conversation", 3),
            {"type": "conversation", "prompt": 42, "simplified_text": "x"}
        ]});
        assert!(matches!(validate_preprompts(&payload), Err(GenerationError::Validation(_))));
    }

    #[test]
    fn filtering_down_to_four_is_accepted() {
        let payload = json!({"preprompts": [
            item("roleplay", 1), item("narration", 9), item("roleplay", 2),
            item("conversation", 3), item("conversation", 4)
        ]});
        let (items, dropped) = validate_preprompts(&payload).unwrap();
        assert_eq!((items.len(), dropped), (4, 1));
    }

    #[test]
    fn padded_type_is_dropped() {
        assert_eq!(PrepromptKind::parse(" roleplay "), None);
        assert_eq!(PrepromptKind::parse("conversation\n"), None);

        let payload = json!({"preprompts": [
            item(" roleplay ", 1), item("roleplay", 2), item("conversation", 3), item("conversation", 4)
        ]});
        assert!(matches!(validate_preprompts(&payload), Err(GenerationError::Validation(_))));
    }

    #[test]
    fn position_of_kinds_is_not_enforced() {
        let payload = json!({"preprompts": [
            item("conversation", 1), item("roleplay", 2), item("conversation", 3), item("roleplay", 4)
        ]});
        assert!(validate_preprompts(&payload).is_ok());
    }

    #[test]
    fn missing_list_is_rejected() {
        assert!(validate_preprompts(&json!({"suggestions": []})).is_err());
        assert!(validate_preprompts(&json!({"preprompts": "none"})).is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let p = Preprompt {
            kind: PrepromptKind::Roleplay,
            prompt: "p".into(),
            simplified_text: "s".into(),
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"type": "roleplay", "prompt": "p", "simplified_text": "s"})
        );
    }
}
