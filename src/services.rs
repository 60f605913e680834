//! Generation service adapters
//!
//! Each adapter turns a history snapshot plus parameters into one request,
//! sends it through the transport and validates the result. Adapters never
//! touch shared state; they only read the snapshots handed to them.

mod choices;
mod gemini;
mod grounding;
mod image;

pub use choices::{Choices, GeminiChoiceGenerator};
pub use grounding::{GeminiVisionGrounder, DEFAULT_MAX_DIMENSION};
pub use image::GeminiImageGenerator;

use crate::error::StoryError;
use crate::history::Snapshot;
use crate::prompts::{InstructionMode, Style, Theme};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Uniform envelope returned by every adapter
#[derive(Debug, Clone)]
pub struct ServiceResult<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> ServiceResult<T> {
    /// Run `fut` and record how long it took
    pub async fn timed<F>(fut: F) -> Result<Self, StoryError>
    where
        F: Future<Output = Result<T, StoryError>>,
    {
        let start = Instant::now();
        let value = fut.await?;
        Ok(Self {
            value,
            elapsed: start.elapsed(),
        })
    }
}

/// Parameters for one image generation call
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Image thread as of the start of the call
    pub history: Snapshot,
    /// Player action or refinement instruction
    pub text: String,
    pub theme: &'static Theme,
    pub style: &'static Style,
    pub mode: InstructionMode,
}

/// A generated scene
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Arc<[u8]>,
    pub mime_type: String,
    /// Text the model returned alongside the image, if any
    pub byproduct_text: Option<String>,
    /// The synthesized instruction that was sent
    pub instruction: String,
}

#[async_trait]
pub trait ImageGeneration: Send + Sync {
    async fn generate(&self, request: ImageRequest)
        -> Result<ServiceResult<GeneratedImage>, StoryError>;
}

#[async_trait]
pub trait ChoiceGeneration: Send + Sync {
    async fn generate(
        &self,
        history: Snapshot,
        system_instruction: String,
    ) -> Result<ServiceResult<Choices>, StoryError>;
}

#[async_trait]
pub trait VisionGrounding: Send + Sync {
    /// Describe one image in a single paragraph
    async fn describe(
        &self,
        image: Arc<[u8]>,
        mime_type: String,
    ) -> Result<ServiceResult<String>, StoryError>;
}
