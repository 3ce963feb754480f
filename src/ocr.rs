//! Recognition backend client.
//!
//! The pipeline only ever sees `Vec<RecognizedFragment>`; whatever shape the
//! configured OCR endpoint answers with is normalized here, at the edge.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, SnapError};
use crate::types::{RecognizedFragment, DEFAULT_FRAGMENT_CONFIDENCE};

/// 1x1 transparent PNG used by the connection probe.
const PROBE_IMAGE: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Recognition endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:1224/api/ocr".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Opaque image-to-text capability. Failure surfaces to the caller; the
/// pipeline never retries recognition.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<RecognizedFragment>>;
}

/// HTTP client for a Umi-OCR-style recognition endpoint.
pub struct HttpOcrClient {
    config: OcrConfig,
    client: reqwest::Client,
}

impl HttpOcrClient {
    pub fn new(config: OcrConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SnapError::Recognition(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn post_image(&self, encoded: &str) -> Result<String> {
        let payload = json!({
            "base64": encoded,
            "options": { "data.format": "text" },
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SnapError::Recognition(format!("recognition request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SnapError::Recognition(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(SnapError::Recognition(format!(
                "recognition endpoint returned HTTP {status}: {body}"
            )));
        }
        Ok(body)
    }

    /// Probes the endpoint with a tiny embedded image.
    pub async fn check_connection(&self) -> bool {
        match self.post_image(PROBE_IMAGE).await {
            Ok(_) => true,
            Err(e) => {
                warn!("recognition probe failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl Recognizer for HttpOcrClient {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<RecognizedFragment>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = self.post_image(&encoded).await?;

        let fragments = match serde_json::from_str::<Value>(&body) {
            Ok(payload) => parse_recognition_payload(&payload),
            // Some deployments answer with raw text.
            Err(_) if !body.trim().is_empty() => vec![RecognizedFragment::new(body.trim(), 1.0)],
            Err(_) => Vec::new(),
        };

        debug!(count = fragments.len(), "recognition returned fragments");
        Ok(fragments)
    }
}

/// Normalizes any known backend payload shape into fragments. Unknown shapes
/// log a warning and yield nothing; they are not an error.
pub fn parse_recognition_payload(payload: &Value) -> Vec<RecognizedFragment> {
    // Umi-OCR style: {"code": 100, "data": "text", "score": 0.73, ...}
    if payload.get("code").and_then(Value::as_i64) == Some(100) {
        if let Some(text) = payload.get("data").and_then(Value::as_str) {
            if !text.is_empty() {
                let confidence = payload
                    .get("score")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_FRAGMENT_CONFIDENCE);
                return vec![RecognizedFragment::new(text, confidence)];
            }
        }
    }

    // {"results": [{...}, ...]}
    if let Some(results) = payload.get("results").and_then(Value::as_array) {
        return results.iter().filter_map(parse_fragment_entry).collect();
    }

    // Bare array of result objects.
    if let Some(entries) = payload.as_array() {
        return entries.iter().filter_map(parse_fragment_entry).collect();
    }

    // Bare string.
    if let Some(text) = payload.as_str() {
        if text.is_empty() {
            return Vec::new();
        }
        return vec![RecognizedFragment::new(text, 1.0)];
    }

    // {"text": "...", "confidence": ...}
    if let Some(text) = payload.get("text").and_then(Value::as_str) {
        let confidence = payload
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        return vec![RecognizedFragment::new(text, confidence)];
    }

    warn!("unrecognized recognition payload shape: {payload}");
    Vec::new()
}

fn parse_fragment_entry(entry: &Value) -> Option<RecognizedFragment> {
    let text = entry
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| entry.get("content").and_then(Value::as_str))
        .unwrap_or("");
    if text.is_empty() {
        return None;
    }

    let confidence = entry
        .get("confidence")
        .and_then(Value::as_f64)
        .or_else(|| entry.get("score").and_then(Value::as_f64))
        .unwrap_or(0.0);

    let region = entry
        .get("bbox")
        .or_else(|| entry.get("box"))
        .filter(|v| !v.is_null())
        .cloned();

    let mut fragment = RecognizedFragment::new(text, confidence);
    fragment.region = region;
    Some(fragment)
}
