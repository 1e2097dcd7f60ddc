//! Gemini `generateContent` transport.
//!
//! The HTTP call sits behind the [`GenerativeModel`] trait so the retry logic
//! in [`crate::Classifier`] can be exercised against scripted fakes.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const EMOTION_PROMPT: &str = "provide a concise emotional summary as a comma-separated list \
     of 5-10 keywords (e.g., hopeful, melancholic, serene, chaotic, joyful)";

#[derive(Debug, Error)]
pub enum ModelError {
    /// Transient overload signal (HTTP 429/503 or an "overloaded" message);
    /// the caller may retry.
    #[error("model overloaded: {0}")]
    Overloaded(String),
    /// Anything else; not worth retrying.
    #[error("{0}")]
    Other(String),
}

/// A text/vision understanding service that turns a `generateContent`-shaped
/// request into the model's raw text reply.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &Value) -> Result<String, ModelError>;
}

/// Request body for text content.
pub fn text_request(text: &str) -> Value {
    serde_json::json!({
        "contents": [{
            "parts": [{
                "text": format!(
                    "Analyze the following text and {}: \"{}\"",
                    EMOTION_PROMPT, text
                )
            }]
        }]
    })
}

/// Request body for image content. `image_bytes` is base64-encoded inline.
pub fn image_request(mime_type: &str, image_bytes: &[u8]) -> Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                { "text": format!("Analyze the following image and {}.", EMOTION_PROMPT) },
                { "inline_data": { "mime_type": mime_type, "data": B64.encode(image_bytes) } }
            ]
        }]
    })
}

/// Best-effort MIME guess from a stored media path. The original service
/// hardcoded image/jpeg; keep that as the fallback.
pub fn guess_image_mime(path: &str) -> &'static str {
    match path.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Live Gemini client. The API key travels as a query parameter, matching the
/// `generativelanguage.googleapis.com` convention.
pub struct GeminiModel {
    client: reqwest::Client,
    url: String,
}

impl GeminiModel {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}?key={}", endpoint, api_key),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, request: &Value) -> Result<String, ModelError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ModelError::Other(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Gemini reports overload as 429 or a 503 "model is overloaded".
            if status.as_u16() == 429
                || status.as_u16() == 503
                || body.to_ascii_lowercase().contains("overloaded")
            {
                return Err(ModelError::Overloaded(format!("{}: {}", status, body)));
            }
            return Err(ModelError::Other(format!("Gemini API error {}: {}", status, body)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Other(e.to_string()))?;
        extract_text(&json)
            .ok_or_else(|| ModelError::Other("Gemini response missing candidate text".into()))
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn extract_text(json: &Value) -> Option<String> {
    json.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_candidate_text() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hopeful, joyful" }] }
            }]
        });
        assert_eq!(extract_text(&json).as_deref(), Some("hopeful, joyful"));
        assert!(extract_text(&serde_json::json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn test_text_request_embeds_content() {
        let req = text_request("I feel hopeful today");
        let prompt = req["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("I feel hopeful today"));
        assert!(prompt.contains("comma-separated"));
    }

    #[test]
    fn test_image_request_inlines_base64() {
        let req = image_request("image/png", b"pngbytes");
        let part = &req["contents"][0]["parts"][1]["inline_data"];
        assert_eq!(part["mime_type"], "image/png");
        assert_eq!(part["data"], B64.encode(b"pngbytes"));
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(guess_image_mime("uploads/a.PNG"), "image/png");
        assert_eq!(guess_image_mime("uploads/a.webp"), "image/webp");
        assert_eq!(guess_image_mime("uploads/mystery"), "image/jpeg");
        assert_eq!(guess_image_mime("uploads/photo.jpg"), "image/jpeg");
    }
}
