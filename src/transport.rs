//! Request/response transport used by every service adapter
//!
//! The transport moves JSON payloads and hands back raw bodies. It never looks
//! inside a response; classification of payload problems belongs to the
//! adapters.

mod http;
mod retry;

pub use http::HttpTransport;
pub use retry::{RetryPolicy, RetryingTransport};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Successful (2xx) response, body left unparsed
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure
#[derive(Debug, Clone, Error)]
#[error("Transport failed after {attempts} attempt(s): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message, 1)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message, 1)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status(code), message, 1)
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// What went wrong on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, DNS, body read failure
    Network,
    /// Request exceeded the client timeout
    Timeout,
    /// Non-2xx HTTP status
    Status(u16),
}

/// Send one JSON payload to one endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<RawResponse, TransportError> {
        (**self).send(endpoint, payload).await
    }
}
