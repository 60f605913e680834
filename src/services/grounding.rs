//! Vision grounding adapter
//!
//! Describes the opening scene once so later narration can reason about it
//! without re-sending images every turn.

use super::gemini::{self, Content, GenerateContentRequest, WirePart};
use super::{ServiceResult, VisionGrounding};
use crate::error::StoryError;
use crate::prompts::GROUNDING_PROMPT;
use crate::transport::Transport;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;

/// Longest edge sent for grounding
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

const JPEG_QUALITY: u8 = 90;

/// Image bytes ready for upload
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Shrink an image so its longest edge is at most `max_dimension`.
///
/// Aspect ratio is preserved. Images already within bounds are passed through
/// untouched; resized images are flattened and re-encoded as JPEG.
pub fn downsample(
    data: &[u8],
    mime_type: &str,
    max_dimension: u32,
) -> Result<PreparedImage, StoryError> {
    let max_dimension = max_dimension.max(1);
    let decoded = image::load_from_memory(data)
        .map_err(|e| StoryError::malformed(format!("Generated image could not be decoded: {e}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    if width <= max_dimension && height <= max_dimension {
        return Ok(PreparedImage {
            data: data.to_vec(),
            mime_type: mime_type.to_string(),
            width,
            height,
        });
    }

    let resized = decoded
        .resize(max_dimension, max_dimension, FilterType::Triangle)
        .to_rgb8();
    let (new_width, new_height) = resized.dimensions();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(resized))
        .map_err(|e| StoryError::malformed(format!("Failed to re-encode image: {e}")))?;

    tracing::debug!(
        from = %format!("{width}x{height}"),
        to = %format!("{new_width}x{new_height}"),
        bytes = bytes.len(),
        "Downsampled image for grounding"
    );

    Ok(PreparedImage {
        data: bytes,
        mime_type: "image/jpeg".to_string(),
        width: new_width,
        height: new_height,
    })
}

pub struct GeminiVisionGrounder<T> {
    transport: T,
    endpoint: String,
    max_dimension: u32,
}

impl<T: Transport> GeminiVisionGrounder<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, max_dimension: u32) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            max_dimension,
        }
    }

    async fn describe_inner(&self, image: Arc<[u8]>, mime_type: String) -> Result<String, StoryError> {
        let max_dimension = self.max_dimension;
        // Decoding and resizing are CPU-bound; keep them off the async workers
        let prepared = tokio::task::spawn_blocking(move || downsample(&image, &mime_type, max_dimension))
            .await
            .map_err(|e| StoryError::TaskFailed(format!("Image preparation task failed: {e}")))??;

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    WirePart::image(&prepared.data, prepared.mime_type),
                    WirePart::text(GROUNDING_PROMPT),
                ],
            }],
            system_instruction: None,
            generation_config: None,
        };

        let response = self
            .transport
            .send(&self.endpoint, &payload.to_value()?)
            .await?;
        let parsed = gemini::parse_response(&response.body)?;

        let description = parsed.text().trim().to_string();
        if description.is_empty() {
            if let Some(categories) = parsed.block_categories() {
                return Err(StoryError::ContentBlocked { categories });
            }
            return Err(StoryError::empty("Vision service returned no description"));
        }
        Ok(description)
    }
}

#[async_trait]
impl<T: Transport> VisionGrounding for GeminiVisionGrounder<T> {
    async fn describe(
        &self,
        image: Arc<[u8]>,
        mime_type: String,
    ) -> Result<ServiceResult<String>, StoryError> {
        ServiceResult::timed(self.describe_inner(image, mime_type)).await
    }
}
