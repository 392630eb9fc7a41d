//! Generation backends used by the planner and verifier.
//!
//! [`LlmClient`] wraps a [`GenerationBackend`] and never fails: transport or
//! quota problems are folded into fallback text plus a [`BackendFailure`]
//! record so downstream stages keep their "no error crosses a stage" contract.

pub mod gemini;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const EMPTY_USER_CONTENT_PLACEHOLDER: &str = "Please process the previous instructions.";
pub const STRUCTURED_FALLBACK: &str = "{}";
pub const TEXT_FAILURE_FALLBACK: &str = "Error: API call failed.";
pub const TEXT_EMPTY_FALLBACK: &str = "I couldn't generate a response.";

/// Token counts reported by a backend for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_content: String,
    /// Ask the model for a JSON object instead of free text.
    pub structured: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::Network(err.without_url().to_string())
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<BackendOutput, LlmError>;
}

/// Recorded when the backend call failed and a fallback was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendFailure {
    pub rate_limited: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub failure: Option<BackendFailure>,
}

#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn GenerationBackend>,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub async fn generate(
        &self,
        system_prompt: &str,
        user_content: &str,
        structured: bool,
    ) -> Generation {
        let user_content = if user_content.trim().is_empty() {
            EMPTY_USER_CONTENT_PLACEHOLDER.to_string()
        } else {
            user_content.to_string()
        };

        let request = GenerationRequest {
            system_prompt: system_prompt.to_string(),
            user_content,
            structured,
        };

        match self.backend.generate(request).await {
            Ok(output) => {
                let text = if output.text.trim().is_empty() {
                    tracing::warn!(backend = self.backend.name(), "backend returned empty text");
                    empty_fallback(structured).to_string()
                } else {
                    output.text
                };
                Generation {
                    text,
                    usage: output.usage,
                    failure: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    model = self.backend.model(),
                    rate_limited = err.is_rate_limited(),
                    error = %err,
                    "generation call failed; using fallback"
                );
                Generation {
                    text: failure_fallback(structured).to_string(),
                    usage: None,
                    failure: Some(BackendFailure {
                        rate_limited: err.is_rate_limited(),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }
}

fn failure_fallback(structured: bool) -> &'static str {
    if structured {
        STRUCTURED_FALLBACK
    } else {
        TEXT_FAILURE_FALLBACK
    }
}

fn empty_fallback(structured: bool) -> &'static str {
    if structured {
        STRUCTURED_FALLBACK
    } else {
        TEXT_EMPTY_FALLBACK
    }
}

/// Pulls a human readable message out of a provider error body.
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingBackend {
        reply: Result<BackendOutput, fn() -> LlmError>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<BackendOutput, LlmError> {
            self.seen.lock().expect("lock").push(request);
            match &self.reply {
                Ok(output) => Ok(output.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn client(
        reply: Result<BackendOutput, fn() -> LlmError>,
    ) -> (LlmClient, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (LlmClient::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn empty_user_content_is_replaced_with_placeholder() {
        let (client, backend) = client(Ok(BackendOutput {
            text: "ok".to_string(),
            usage: None,
        }));
        client.generate("sys", "   ", false).await;

        let seen = backend.seen.lock().expect("lock");
        assert_eq!(seen[0].user_content, EMPTY_USER_CONTENT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn failures_fall_back_by_mode() {
        let (client, _) = client(Err(|| LlmError::Network("connection refused".to_string())));
        let structured = client.generate("sys", "hi", true).await;
        assert_eq!(structured.text, "{}");
        assert!(structured.failure.is_some());

        let text = client.generate("sys", "hi", false).await;
        assert_eq!(text.text, "Error: API call failed.");
        assert_eq!(text.failure.map(|f| f.rate_limited), Some(false));
    }

    #[tokio::test]
    async fn rate_limits_are_flagged() {
        let (client, _) = client(Err(|| LlmError::RateLimited("quota".to_string())));
        let generation = client.generate("sys", "hi", true).await;
        assert_eq!(generation.failure.map(|f| f.rate_limited), Some(true));
    }

    #[tokio::test]
    async fn empty_text_falls_back_without_failure() {
        let (client, _) = client(Ok(BackendOutput {
            text: String::new(),
            usage: Some(TokenUsage {
                prompt_tokens: 4,
                completion_tokens: 0,
            }),
        }));
        let text = client.generate("sys", "hi", false).await;
        assert_eq!(text.text, "I couldn't generate a response.");
        assert!(text.failure.is_none());
        assert_eq!(text.usage.map(|u| u.prompt_tokens), Some(4));
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#;
        assert_eq!(error_message_from_body(body), "Resource has been exhausted");
        assert_eq!(error_message_from_body("plain failure"), "plain failure");
    }
}
