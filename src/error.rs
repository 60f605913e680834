//! Error taxonomy for the orchestrator and its service adapters

use crate::transport::TransportError;
use thiserror::Error;

/// Classified failure of a turn, a refinement, or a single adapter call
#[derive(Debug, Error)]
pub enum StoryError {
    /// Transport gave up after exhausting its retries
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service refused to generate on safety grounds
    #[error("Content blocked ({})", .categories.join(", "))]
    ContentBlocked { categories: Vec<String> },

    /// The response did not match the required structure
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The call succeeded but carried nothing usable
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// A turn or refinement is already in flight
    #[error("A turn or refinement is already in progress")]
    Busy,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An adapter could not finish its own work: the task panicked or was
    /// aborted, or the request could not be encoded
    #[error("Adapter task failed: {0}")]
    TaskFailed(String),
}

impl StoryError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::EmptyResult(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::ContentBlocked { .. } => ErrorKind::ContentBlocked,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::EmptyResult(_) => ErrorKind::EmptyResult,
            Self::Busy => ErrorKind::Busy,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::TaskFailed(_) => ErrorKind::TaskFailed,
        }
    }

    /// Categories reported by the service when generation was blocked
    pub fn blocked_categories(&self) -> Option<&[String]> {
        match self {
            Self::ContentBlocked { categories } => Some(categories),
            _ => None,
        }
    }
}

/// Flat classification, used for logging and the HTTP error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    ContentBlocked,
    MalformedResponse,
    EmptyResult,
    Busy,
    InvalidInput,
    TaskFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::ContentBlocked => "content_blocked",
            Self::MalformedResponse => "malformed_response",
            Self::EmptyResult => "empty_result",
            Self::Busy => "busy",
            Self::InvalidInput => "invalid_input",
            Self::TaskFailed => "task_failed",
        }
    }
}
