//! Choice generation adapter
//!
//! The narrator must answer with `{"choices": [a, b, c]}`. The raw text goes
//! through two explicit steps before it is trusted:
//!
//! 1. `normalize_json_text` strips a surrounding Markdown code fence, which
//!    models add even when asked for bare JSON.
//! 2. `parse_choices` decodes against the exact shape. A wrong field name, a
//!    non-array, a non-string element or a count other than three is a
//!    `MalformedResponse`, never an empty or defaulted list.

use super::gemini::{self, Content, GenerateContentRequest, GenerationConfig};
use super::{ChoiceGeneration, ServiceResult};
use crate::error::StoryError;
use crate::history::Snapshot;
use crate::prompts::CHOICE_REQUEST_PROMPT;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub const CHOICE_COUNT: usize = 3;

/// The three options offered to the player
pub type Choices = [String; CHOICE_COUNT];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChoiceEnvelope {
    choices: Vec<String>,
}

/// Strip a Markdown code fence (with optional language tag) around JSON text.
///
/// Anything after the closing fence is dropped. Unfenced text is returned
/// trimmed and otherwise untouched.
pub fn normalize_json_text(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.split_once('\n') {
        Some((_info, body)) => body,
        // Single-line fence: drop an inline language tag such as `json`
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.split_once("```").map_or(body, |(inner, _trailer)| inner).trim()
}

/// Decode and validate the narrator's answer.
pub fn parse_choices(raw: &str) -> Result<Choices, StoryError> {
    let text = normalize_json_text(raw);
    let envelope: ChoiceEnvelope = serde_json::from_str(text)
        .map_err(|e| StoryError::malformed(format!("Choice response did not match schema: {e}")))?;

    let choices: Vec<String> = envelope
        .choices
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    if let Some(position) = choices.iter().position(String::is_empty) {
        return Err(StoryError::malformed(format!("Choice {} is blank", position + 1)));
    }

    choices.try_into().map_err(|choices: Vec<String>| {
        StoryError::malformed(format!(
            "Expected {CHOICE_COUNT} choices, got {}",
            choices.len()
        ))
    })
}

/// Schema sent with every request, mirroring `ChoiceEnvelope`
fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "choices": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "minItems": CHOICE_COUNT,
                "maxItems": CHOICE_COUNT
            }
        },
        "required": ["choices"]
    })
}

pub struct GeminiChoiceGenerator<T> {
    transport: T,
    endpoint: String,
}

impl<T: Transport> GeminiChoiceGenerator<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    async fn generate_inner(
        &self,
        history: Snapshot,
        system_instruction: String,
    ) -> Result<Choices, StoryError> {
        let mut contents = gemini::to_contents(&history);
        contents.push(Content::user_text(CHOICE_REQUEST_PROMPT));

        let payload = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::system(system_instruction)),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(response_schema()),
                temperature: Some(0.9),
                ..GenerationConfig::default()
            }),
        };

        let response = self
            .transport
            .send(&self.endpoint, &payload.to_value()?)
            .await?;
        let parsed = gemini::parse_response(&response.body)?;

        let text = parsed.text();
        if text.trim().is_empty() {
            if let Some(categories) = parsed.block_categories() {
                return Err(StoryError::ContentBlocked { categories });
            }
            return Err(StoryError::empty("Choice service returned no text"));
        }

        parse_choices(&text)
    }
}

#[async_trait]
impl<T: Transport> ChoiceGeneration for GeminiChoiceGenerator<T> {
    async fn generate(
        &self,
        history: Snapshot,
        system_instruction: String,
    ) -> Result<ServiceResult<Choices>, StoryError> {
        ServiceResult::timed(self.generate_inner(history, system_instruction)).await
    }
}
