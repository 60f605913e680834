//! HTTP API for the story session

mod handlers;
mod types;

pub use handlers::create_router;

use crate::config::AppConfig;
use crate::orchestrator::TurnOrchestrator;
use crate::services::{GeminiChoiceGenerator, GeminiImageGenerator, GeminiVisionGrounder};
use crate::transport::Transport;
use std::sync::Arc;

/// One transport shared by every adapter
pub type SharedTransport = Arc<dyn Transport>;

pub type StoryOrchestrator = TurnOrchestrator<
    GeminiImageGenerator<SharedTransport>,
    GeminiChoiceGenerator<SharedTransport>,
    GeminiVisionGrounder<SharedTransport>,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StoryOrchestrator>,
}

impl AppState {
    pub fn new(config: &AppConfig, transport: SharedTransport) -> Self {
        let orchestrator = TurnOrchestrator::new(
            GeminiImageGenerator::new(Arc::clone(&transport), config.image_endpoint()),
            GeminiChoiceGenerator::new(Arc::clone(&transport), config.text_endpoint()),
            GeminiVisionGrounder::new(
                transport,
                config.vision_endpoint(),
                config.grounding_max_dimension,
            ),
            config.scene_dir.clone(),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
