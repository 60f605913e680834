//! Image generation adapter

use super::gemini::{self, Content, GenerateContentRequest, GenerationConfig};
use super::{GeneratedImage, ImageGeneration, ImageRequest, ServiceResult};
use crate::error::StoryError;
use crate::prompts::{self, InstructionMode};
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;

pub struct GeminiImageGenerator<T> {
    transport: T,
    endpoint: String,
}

impl<T: Transport> GeminiImageGenerator<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    async fn generate_inner(&self, request: ImageRequest) -> Result<GeneratedImage, StoryError> {
        let first_scene = request.history.is_empty() && request.mode == InstructionMode::Advance;
        let instruction = prompts::image_instruction(
            &request.text,
            request.theme,
            request.style,
            request.mode,
            first_scene,
        );

        // The snapshot is ours; the live thread never sees this instruction
        // unless the orchestrator commits it.
        let mut contents = gemini::to_contents(&request.history);
        contents.push(Content::user_text(instruction.clone()));

        let payload = GenerateContentRequest {
            contents,
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                ..GenerationConfig::default()
            }),
        };

        let response = self
            .transport
            .send(&self.endpoint, &payload.to_value()?)
            .await?;
        let parsed = gemini::parse_response(&response.body)?;

        let Some(image) = parsed.first_image()? else {
            if let Some(categories) = parsed.block_categories() {
                return Err(StoryError::ContentBlocked { categories });
            }
            return Err(StoryError::empty("Image service returned no image"));
        };

        let text = parsed.text();
        let byproduct_text = Some(text.trim().to_string()).filter(|t| !t.is_empty());

        Ok(GeneratedImage {
            data: Arc::from(image.data),
            mime_type: image.mime_type,
            byproduct_text,
            instruction,
        })
    }
}

#[async_trait]
impl<T: Transport> ImageGeneration for GeminiImageGenerator<T> {
    async fn generate(
        &self,
        request: ImageRequest,
    ) -> Result<ServiceResult<GeneratedImage>, StoryError> {
        ServiceResult::timed(self.generate_inner(request)).await
    }
}
