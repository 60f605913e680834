//! API request and response types

use crate::orchestrator::{RefinementOutcome, TurnOutcome, TurnTimings};
use crate::services::{Choices, GeneratedImage};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request to advance the story
#[derive(Debug, Deserialize)]
pub struct TurnRequestBody {
    pub action: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

/// Request to edit the current scene
#[derive(Debug, Deserialize)]
pub struct RefineRequestBody {
    pub instruction: String,
}

/// Image inlined as base64
#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl From<&GeneratedImage> for ImagePayload {
    fn from(image: &GeneratedImage) -> Self {
        Self {
            mime_type: image.mime_type.clone(),
            data: BASE64.encode(&image.data),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnTimingsMs {
    pub image: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding: Option<u64>,
    pub choices: u64,
    pub total: u64,
}

impl From<&TurnTimings> for TurnTimingsMs {
    fn from(timings: &TurnTimings) -> Self {
        Self {
            image: millis(timings.image),
            grounding: timings.grounding.map(millis),
            choices: millis(timings.choices),
            total: millis(timings.total),
        }
    }
}

/// Response for a committed turn
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub turn: u32,
    pub image: ImagePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byproduct_text: Option<String>,
    pub choices: Choices,
    pub timings_ms: TurnTimingsMs,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            turn: outcome.turn,
            image: ImagePayload::from(&outcome.image),
            timings_ms: TurnTimingsMs::from(&outcome.timings),
            byproduct_text: outcome.image.byproduct_text,
            choices: outcome.choices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefineTimingsMs {
    pub image: u64,
}

/// Response for a committed refinement
#[derive(Debug, Serialize)]
pub struct RefineResponse {
    pub image: ImagePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byproduct_text: Option<String>,
    pub timings_ms: RefineTimingsMs,
}

impl From<RefinementOutcome> for RefineResponse {
    fn from(outcome: RefinementOutcome) -> Self {
        Self {
            image: ImagePayload::from(&outcome.image),
            timings_ms: RefineTimingsMs {
                image: millis(outcome.elapsed),
            },
            byproduct_text: outcome.image.byproduct_text,
        }
    }
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Themes and styles the player can pick from
#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub themes: Vec<&'static str>,
    pub styles: Vec<&'static str>,
    pub default_theme: &'static str,
    pub default_style: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
