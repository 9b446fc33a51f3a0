//! Known shapes of the text-generation reply and where the generated text
//! lives in each of them.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::GenerationError;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\s*```\s*$").expect("static regex")
});

/// Generated content: plain text to parse, or an already structured object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Object(Map<String, Value>),
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub content: Content,
}

#[derive(Debug, Deserialize)]
pub struct TextChoice {
    pub text: String,
}

/// Reply envelopes, tried in declaration order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// `{"preprompts": [...]}` returned as-is
    Structured { preprompts: Value },
    /// `{"choices": [{"message": {"content": ...}}]}`
    ChatChoices { choices: Vec<ChatChoice> },
    /// `{"choices": [{"text": "..."}]}`
    TextChoices { choices: Vec<TextChoice> },
    /// `{"output": ...}`
    Output { output: Content },
    /// `{"text": "..."}`, also accepted as `response` or `completion`
    Text {
        #[serde(alias = "response", alias = "completion")]
        text: String,
    },
}

impl Envelope {
    /// Decode a reply body. Unknown shapes are an error, never a guess.
    pub fn from_slice(body: &[u8]) -> Result<Self, GenerationError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The structured payload carried by this envelope.
    pub fn into_payload(self) -> Result<Value, GenerationError> {
        let content = match self {
            Envelope::Structured { preprompts } => {
                let mut object = Map::new();
                object.insert("preprompts".to_owned(), preprompts);
                return Ok(Value::Object(object));
            }
            Envelope::ChatChoices { choices } => choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or(GenerationError::EmptyEnvelope)?,
            Envelope::TextChoices { choices } => choices
                .into_iter()
                .next()
                .map(|choice| Content::Text(choice.text))
                .ok_or(GenerationError::EmptyEnvelope)?,
            Envelope::Output { output } => output,
            Envelope::Text { text } => Content::Text(text),
        };

        match content {
            Content::Object(object) => Ok(Value::Object(object)),
            Content::Text(text) => {
                let stripped = strip_code_fence(&text);
                if stripped.is_empty() {
                    return Err(GenerationError::EmptyEnvelope);
                }
                Ok(serde_json::from_str(stripped)?)
            }
        }
    }
}

/// Remove a surrounding fenced block such as ```` ```json ... ``` ````.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}
