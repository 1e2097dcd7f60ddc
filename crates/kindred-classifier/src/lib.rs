//! Emotion-tag classification for submissions.
//!
//! The classifier never fails outward: every path yields a usable tag
//! sequence so matching can proceed or be deferred without crashing the
//! request. Degenerate outcomes are sentinel tags — `["overloaded"]` when
//! retries exhaust against an overloaded model, `["error", <message>]` for
//! anything else, `["neutral"]` for audio (no audio model wired up yet).

pub mod gemini;

use std::time::Duration;

use tracing::{debug, warn};

use kindred_types::models::ContentType;

pub use gemini::{DEFAULT_GEMINI_URL, GeminiModel, GenerativeModel, ModelError};

pub const OVERLOADED_TAG: &str = "overloaded";
pub const ERROR_TAG: &str = "error";
pub const NEUTRAL_TAG: &str = "neutral";

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub struct Classifier {
    model: Box<dyn GenerativeModel>,
    base_delay: Duration,
    max_attempts: u32,
}

impl Classifier {
    pub fn new(model: Box<dyn GenerativeModel>) -> Self {
        Self {
            model,
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the retry parameters (tests shrink the delay to zero).
    pub fn with_retry(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.base_delay = base_delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Turn submission content into lowercase emotion keywords.
    ///
    /// For image content the argument is the stored media path; the bytes are
    /// read and inlined into the vision request.
    pub async fn classify(&self, content_type: ContentType, content: &str) -> Vec<String> {
        let request = match content_type {
            ContentType::Text => gemini::text_request(content),
            ContentType::Image => match tokio::fs::read(content).await {
                Ok(bytes) => gemini::image_request(gemini::guess_image_mime(content), &bytes),
                Err(e) => {
                    warn!("Failed to read image {}: {}", content, e);
                    return vec![ERROR_TAG.to_string(), e.to_string()];
                }
            },
            ContentType::Audio => {
                // Audio analysis is not implemented upstream.
                debug!("Audio classification unimplemented, returning neutral");
                return vec![NEUTRAL_TAG.to_string()];
            }
        };

        self.generate_with_retry(&request).await
    }

    /// Bounded retry with exponential backoff: only overload signals retry,
    /// and the delay grows threefold between attempts.
    async fn generate_with_retry(&self, request: &serde_json::Value) -> Vec<String> {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            match self.model.generate(request).await {
                Ok(text) => return parse_tags(&text),
                Err(ModelError::Overloaded(msg)) => {
                    if attempt == self.max_attempts {
                        warn!("Model still overloaded after {} attempts: {}", attempt, msg);
                        return vec![OVERLOADED_TAG.to_string()];
                    }
                    debug!(
                        "Model overloaded (attempt {}/{}), retrying in {:?}",
                        attempt, self.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 3;
                }
                Err(ModelError::Other(msg)) => {
                    warn!("Classification failed: {}", msg);
                    return vec![ERROR_TAG.to_string(), msg];
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        unreachable!("retry loop exited without an outcome")
    }
}

/// Comma-separated keywords, trimmed and lowercased, empties dropped.
fn parse_tags(text: &str) -> Vec<String> {
    let tags: Vec<String> = text
        .split(',')
        .map(|kw| kw.trim().to_lowercase())
        .filter(|kw| !kw.is_empty())
        .collect();

    if tags.is_empty() {
        // Keep the "processed submissions never have empty tags" invariant
        // even against a model that returns nothing usable.
        return vec![ERROR_TAG.to_string(), "empty classification response".to_string()];
    }
    tags
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;

    /// Plays back a fixed script of outcomes and counts calls.
    struct ScriptedModel {
        script: Mutex<Vec<Result<String, ModelError>>>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedModel {
        fn new(mut script: Vec<Result<String, ModelError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, _request: &Value) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("model called more times than scripted")
        }
    }

    fn classifier(script: Vec<Result<String, ModelError>>) -> Classifier {
        Classifier::new(Box::new(ScriptedModel::new(script)))
            .with_retry(Duration::ZERO, 3)
    }

    fn overloaded() -> Result<String, ModelError> {
        Err(ModelError::Overloaded("503: the model is overloaded".into()))
    }

    #[tokio::test]
    async fn test_success_parses_trimmed_lowercase_tags() {
        let c = classifier(vec![Ok(" Hopeful, JOYFUL , serene\n".into())]);
        let tags = c.classify(ContentType::Text, "I feel hopeful today").await;
        assert_eq!(tags, vec!["hopeful", "joyful", "serene"]);
    }

    #[tokio::test]
    async fn test_three_overloads_yield_sentinel_and_no_fourth_attempt() {
        let model = ScriptedModel::new(vec![overloaded(), overloaded(), overloaded()]);
        let calls = model.calls.clone();

        let c = Classifier::new(Box::new(model)).with_retry(Duration::ZERO, 3);
        let tags = c.classify(ContentType::Text, "hello").await;
        assert_eq!(tags, vec![OVERLOADED_TAG]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overload_then_success_returns_tags() {
        let c = classifier(vec![overloaded(), Ok("melancholic, calm".into())]);
        let tags = c.classify(ContentType::Text, "hello").await;
        assert_eq!(tags, vec!["melancholic", "calm"]);
    }

    #[tokio::test]
    async fn test_non_overload_error_is_sentinel_pair_without_retry() {
        let c = classifier(vec![Err(ModelError::Other("api key invalid".into()))]);
        let tags = c.classify(ContentType::Text, "hello").await;
        assert_eq!(tags, vec![ERROR_TAG.to_string(), "api key invalid".to_string()]);
    }

    #[tokio::test]
    async fn test_audio_short_circuits_without_model_call() {
        // An empty script panics on any call, so reaching the model would fail.
        let c = classifier(vec![]);
        let tags = c.classify(ContentType::Audio, "uploads/clip.ogg").await;
        assert_eq!(tags, vec![NEUTRAL_TAG]);
    }

    #[tokio::test]
    async fn test_unreadable_image_is_error_sentinel() {
        let c = classifier(vec![]);
        let tags = c.classify(ContentType::Image, "/nonexistent/image.png").await;
        assert_eq!(tags[0], ERROR_TAG);
        assert_eq!(tags.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_response_keeps_tags_non_empty() {
        let c = classifier(vec![Ok("  , ,".into())]);
        let tags = c.classify(ContentType::Text, "hello").await;
        assert_eq!(tags[0], ERROR_TAG);
    }
}
