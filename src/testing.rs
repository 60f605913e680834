//! Test doubles for the transport layer
//!
//! `ScriptedTransport` answers from per-endpoint queues and records every
//! request, so the real adapters and orchestrator can be exercised without
//! network I/O.

use crate::transport::{RawResponse, Transport, TransportError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Barrier, Notify};

pub const IMAGE_ENDPOINT: &str = "https://gemini.test/models/image:generateContent";
pub const CHOICE_ENDPOINT: &str = "https://gemini.test/models/text:generateContent";
pub const VISION_ENDPOINT: &str = "https://gemini.test/models/vision:generateContent";

type Scripted = Result<RawResponse, TransportError>;

/// Transport that replays queued responses per endpoint
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<(String, Value)>>,
    delays: Mutex<HashMap<String, Duration>>,
    rendezvous: Mutex<Option<Arc<Barrier>>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    /// Signalled (one permit) whenever a request starts
    pub request_started: Arc<Notify>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, endpoint: &str, response: RawResponse) {
        self.push(endpoint, Ok(response));
    }

    pub fn queue_status(&self, endpoint: &str, code: u16) {
        self.push(endpoint, Err(TransportError::status(code, format!("HTTP {code}"))));
    }

    fn push(&self, endpoint: &str, scripted: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Hold every request to `endpoint` for `delay` before answering
    pub fn set_delay(&self, endpoint: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), delay);
    }

    /// Make requests wait until `parties` of them are outstanding at once
    pub fn set_rendezvous(&self, parties: usize) {
        *self.rendezvous.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn requests_to(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Endpoints in the order requests arrived
    pub fn endpoints(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }

    pub fn request_count(&self, endpoint: &str) -> usize {
        self.requests_to(endpoint).len()
    }

    /// Highest number of requests observed in flight at the same time
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.clone()));
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
        self.request_started.notify_one();

        let barrier = self.rendezvous.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let delay = self.delays.lock().unwrap().get(endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .routes
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(TransportError::network(format!(
                    "No scripted response for {endpoint}"
                )))
            });
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        scripted
    }
}

fn ok(body: &Value) -> RawResponse {
    RawResponse {
        status: 200,
        body: body.to_string(),
    }
}

/// Candidate carrying one inline image and optional text
pub fn image_response(png: &[u8], text: Option<&str>) -> RawResponse {
    let mut parts = Vec::new();
    if let Some(text) = text {
        parts.push(json!({ "text": text }));
    }
    parts.push(json!({
        "inlineData": { "mimeType": "image/png", "data": BASE64.encode(png) }
    }));
    ok(&json!({
        "candidates": [{
            "content": { "role": "model", "parts": parts },
            "finishReason": "STOP"
        }]
    }))
}

pub fn text_response(text: &str) -> RawResponse {
    ok(&json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
}

pub fn choices_response(choices: &[&str]) -> RawResponse {
    text_response(&json!({ "choices": choices }).to_string())
}

/// Prompt-level safety block, no candidates
pub fn blocked_response(categories: &[&str]) -> RawResponse {
    let ratings: Vec<Value> = categories
        .iter()
        .map(|c| json!({ "category": c, "probability": "HIGH", "blocked": true }))
        .collect();
    ok(&json!({
        "promptFeedback": { "blockReason": "SAFETY", "safetyRatings": ratings }
    }))
}

/// Encoded PNG with a simple gradient
pub fn png_of_size(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            u8::try_from(x % 256).unwrap_or(0),
            u8::try_from(y % 256).unwrap_or(0),
            128,
        ])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn tiny_png() -> Vec<u8> {
    png_of_size(4, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport.queue(CHOICE_ENDPOINT, text_response("first"));
        transport.queue_status(CHOICE_ENDPOINT, 500);

        assert!(transport.send(CHOICE_ENDPOINT, &json!({"n": 1})).await.is_ok());
        assert!(transport.send(CHOICE_ENDPOINT, &json!({"n": 2})).await.is_err());
        // Exhausted queue fails like a dead network
        assert!(transport.send(CHOICE_ENDPOINT, &json!({"n": 3})).await.is_err());

        assert_eq!(transport.request_count(CHOICE_ENDPOINT), 3);
        assert_eq!(transport.requests_to(CHOICE_ENDPOINT)[1]["n"], 2);
        assert_eq!(transport.max_outstanding(), 1);
    }

    #[test]
    fn test_gradient_wraps_past_256_pixels() {
        let png = png_of_size(300, 2);
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(299, 1).0, [43, 1, 128]);
    }
}
