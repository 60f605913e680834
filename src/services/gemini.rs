//! Gemini `generateContent` wire types shared by all three adapters

use crate::error::StoryError;
use crate::history::{HistoryEntry, Part};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Finish reasons that mean the candidate was withheld on policy grounds
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Encode for the transport
    pub fn to_value(&self) -> Result<Value, StoryError> {
        serde_json::to_value(self)
            .map_err(|e| StoryError::TaskFailed(format!("Failed to encode request: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![WirePart::text(text)],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![WirePart::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Reasoning summaries some models interleave with the answer
    #[serde(default, skip_serializing)]
    pub thought: bool,
}

impl WirePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(data: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: BASE64.encode(data),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InlineData {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SafetyRating {
    pub category: String,
    #[serde(default)]
    pub blocked: bool,
}

/// Decoded inline image from a response
pub(super) struct InlineImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Translate history entries to wire contents, skipping entries with no parts
pub(super) fn to_contents(history: &[HistoryEntry]) -> Vec<Content> {
    history
        .iter()
        .filter(|entry| !entry.parts.is_empty())
        .map(|entry| Content {
            role: Some(entry.role.as_str().to_string()),
            parts: entry
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => WirePart::text(text.clone()),
                    Part::Image { data, mime_type } => WirePart::image(data, mime_type.clone()),
                })
                .collect(),
        })
        .collect()
}

/// Parse a response body; anything that is not the expected JSON is malformed
pub(super) fn parse_response(body: &str) -> Result<GenerateContentResponse, StoryError> {
    serde_json::from_str(body)
        .map_err(|e| StoryError::malformed(format!("Failed to parse response: {e}")))
}

impl GenerateContentResponse {
    fn answer_parts(&self) -> impl Iterator<Item = &WirePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|p| !p.thought)
    }

    /// Concatenated non-thought text of the first candidate
    pub fn text(&self) -> String {
        self.answer_parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    /// First inline image of the first candidate
    pub fn first_image(&self) -> Result<Option<InlineImage>, StoryError> {
        let Some(inline) = self.answer_parts().find_map(|p| p.inline_data.as_ref()) else {
            return Ok(None);
        };
        if inline.data.is_empty() {
            return Ok(None);
        }
        let data = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|e| StoryError::malformed(format!("Image base64 decode failed: {e}")))?;
        Ok(Some(InlineImage {
            data,
            mime_type: inline.mime_type.clone(),
        }))
    }

    /// Blocked categories, if the service signalled a safety block
    ///
    /// Returns `None` when no block indicator is present. When one is present
    /// but no rating is flagged, the block or finish reason stands in.
    pub fn block_categories(&self) -> Option<Vec<String>> {
        let feedback_reason = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone());
        let finish_reason = self
            .candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|r| BLOCKING_FINISH_REASONS.contains(r))
            .map(str::to_string);

        let mut categories: Vec<String> = Vec::new();
        let ratings = self
            .prompt_feedback
            .iter()
            .flat_map(|f| f.safety_ratings.iter())
            .chain(self.candidates.iter().flat_map(|c| c.safety_ratings.iter()));
        for rating in ratings.filter(|r| r.blocked) {
            if !categories.contains(&rating.category) {
                categories.push(rating.category.clone());
            }
        }

        if categories.is_empty() {
            let reason = feedback_reason.or(finish_reason)?;
            categories.push(reason);
        }
        Some(categories)
    }
}
