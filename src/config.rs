//! Runtime configuration from the environment

use crate::services::DEFAULT_MAX_DIMENSION;
use crate::transport::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    /// Base URL without trailing slash, e.g. `https://host/v1beta`
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub vision_model: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    /// Longest edge of images sent for grounding
    pub grounding_max_dimension: u32,
    pub port: u16,
    /// Where the scene image file lives
    pub scene_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            max_retries: retry.max_retries,
            retry_base_delay: retry.base_delay,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            grounding_max_dimension: DEFAULT_MAX_DIMENSION,
            port: DEFAULT_PORT,
            scene_dir: std::env::temp_dir().join("taleweaver"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset and
    /// unparseable numbers fall back to defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok());
        let defaults = Self::default();

        Self {
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            api_base: get("GEMINI_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            image_model: get("TALEWEAVER_IMAGE_MODEL").unwrap_or(defaults.image_model),
            text_model: get("TALEWEAVER_TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: get("TALEWEAVER_VISION_MODEL").unwrap_or(defaults.vision_model),
            max_retries: number("TALEWEAVER_MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: number("TALEWEAVER_RETRY_BASE_MS")
                .map_or(defaults.retry_base_delay, Duration::from_millis),
            request_timeout: number("TALEWEAVER_REQUEST_TIMEOUT_SECS")
                .filter(|&s| s > 0)
                .map_or(defaults.request_timeout, Duration::from_secs),
            grounding_max_dimension: number("TALEWEAVER_GROUNDING_MAX_DIM")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.grounding_max_dimension),
            port: number("TALEWEAVER_PORT")
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(defaults.port),
            scene_dir: get("TALEWEAVER_SCENE_DIR").map_or(defaults.scene_dir, PathBuf::from),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay)
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.api_base)
    }

    pub fn image_endpoint(&self) -> String {
        self.endpoint(&self.image_model)
    }

    pub fn text_endpoint(&self) -> String {
        self.endpoint(&self.text_model)
    }

    pub fn vision_endpoint(&self) -> String {
        self.endpoint(&self.vision_model)
    }
}
