use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use thiserror::Error;

use saldo_core::config::ExtractionConfig;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Transformer returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transformer reply contains no JSON array")]
    NoJsonArray,
    #[error("Transformer reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transformer unavailable: {0}")]
    Unavailable(String),
}

/// Opaque text-to-records transformer. Implementations return raw JSON
/// candidates; nothing they return is trusted.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<Value>, BackendError>;
}

#[async_trait]
impl<T: ExtractionBackend + ?Sized> ExtractionBackend for Box<T> {
    async fn extract(&self, text: &str) -> Result<Vec<Value>, BackendError> {
        (**self).extract(text).await
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns preset candidates and remembers the last text it was given.
pub struct MockBackend {
    candidates: Result<Vec<Value>, String>,
    last_input: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new(candidates: Vec<Value>) -> Self {
        Self {
            candidates: Ok(candidates),
            last_input: Mutex::new(None),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            candidates: Err(message.into()),
            last_input: Mutex::new(None),
        }
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    async fn extract(&self, text: &str) -> Result<Vec<Value>, BackendError> {
        if let Ok(mut slot) = self.last_input.lock() {
            *slot = Some(text.to_string());
        }
        self.candidates
            .clone()
            .map_err(BackendError::Unavailable)
    }
}

// ── HTTP chat-completions backend ─────────────────────────────────────────────

const PROMPT: &str = "Extract every transaction from this bank statement.
For each transaction return an object with:
- date (YYYY-MM-DD)
- description (transaction description)
- amount (positive number)
- direction (\"inflow\" or \"outflow\")

Return ONLY a valid JSON array, with no other text.

Statement:
";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

fn re_json_array() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("invalid regex"))
}

/// Pulls the outermost JSON array out of a free-text model reply.
pub fn first_json_array(reply: &str) -> Result<Vec<Value>, BackendError> {
    let found = re_json_array()
        .find(reply)
        .ok_or(BackendError::NoJsonArray)?;
    Ok(serde_json::from_str(found.as_str())?)
}

pub struct HttpBackend {
    client: Client,
    config: ExtractionConfig,
}

impl HttpBackend {
    /// Every request, body included, must finish within `timeout`.
    pub fn new(config: ExtractionConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn extract(&self, text: &str) -> Result<Vec<Value>, BackendError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: format!("{PROMPT}{text}"),
            }],
            temperature: 0.1,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(reply_len = content.len(), "extraction reply received");
        first_json_array(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_returns_preset_candidates() {
        let backend = MockBackend::new(vec![json!({"date": "2024-01-15"})]);
        let out = backend.extract("statement text").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(backend.last_input().as_deref(), Some("statement text"));
    }

    #[tokio::test]
    async fn failing_mock_reports_unavailable() {
        let backend = MockBackend::failing("offline");
        assert!(matches!(
            backend.extract("x").await,
            Err(BackendError::Unavailable(m)) if m == "offline"
        ));
    }

    #[test]
    fn http_backend_builds_with_timeout() {
        let config = ExtractionConfig {
            endpoint: "https://llm.example.test/v1/chat/completions".into(),
            api_key: "key".into(),
            model: "test-model".into(),
        };
        assert!(HttpBackend::new(config, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn json_array_is_found_inside_prose() {
        let reply = "Here you go:\n```json\n[{\"valor\": 10}, {\"valor\": 20}]\n```\nDone.";
        let values = first_json_array(reply).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn reply_without_array_is_an_error() {
        assert!(matches!(
            first_json_array("no transactions found"),
            Err(BackendError::NoJsonArray)
        ));
        assert!(matches!(first_json_array("[not json]"), Err(BackendError::Json(_))));
    }
}
