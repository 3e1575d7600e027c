use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::OracleError;
use crate::oracle::{OracleRequest, VisionOracle};

const SYSTEM_PROMPT: &str = "You inspect web page screenshots and HTML to locate UI elements. \
Reply with a single JSON object and nothing else.";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// OpenAI-compatible `/chat/completions` vision client.
///
/// Keys are tried in turn starting from the last one that worked; an HTTP 429
/// moves on to the next key.
pub struct HttpVisionOracle {
    client: Client,
    config: OracleConfig,
    preferred_key: AtomicUsize,
}

impl HttpVisionOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        if config.api_keys.is_empty() {
            return Err(OracleError::NotConfigured(
                "no API key configured for the vision oracle".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| OracleError::NotConfigured(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            config,
            preferred_key: AtomicUsize::new(0),
        })
    }

    fn body(&self, request: &OracleRequest) -> ChatCompletionRequest {
        let mut parts = vec![json!({ "type": "text", "text": request.prompt })];
        if !request.screenshot.is_empty() {
            let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&request.screenshot));
            parts.push(json!({ "type": "image_url", "image_url": { "url": data_uri } }));
        }
        ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Value::String(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Value::Array(parts),
                },
            ],
        }
    }
}

#[async_trait]
impl VisionOracle for HttpVisionOracle {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn analyze(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = self.body(request);
        let keys = self.config.api_keys.len();
        let first = self.preferred_key.load(Ordering::Relaxed) % keys;

        let mut last_error: Option<OracleError> = None;
        let mut rate_limited = 0usize;
        for attempt in 0..keys {
            let index = (first + attempt) % keys;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_keys[index])
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(err) => {
                    last_error = Some(OracleError::Transport(err.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response unavailable>".to_string());
                if status.as_u16() == 429 {
                    rate_limited += 1;
                    warn!(
                        attempt = attempt + 1,
                        remaining = keys - attempt - 1,
                        "vision oracle rate limited; switching API key"
                    );
                    continue;
                }
                return Err(OracleError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|err| OracleError::Transport(format!("invalid oracle response: {err}")))?;
            let content = parsed
                .choices
                .first()
                .and_then(|choice| choice.message.content.as_ref())
                .and_then(ChatCompletionContent::as_text)
                .ok_or(OracleError::EmptyResponse)?;
            self.preferred_key.store(index, Ordering::Relaxed);
            debug!(model = %self.config.model, chars = content.len(), "vision oracle answered");
            return Ok(content);
        }

        if rate_limited == keys {
            return Err(OracleError::RateLimited { keys });
        }
        Err(last_error.unwrap_or(OracleError::RateLimited { keys }))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ChatCompletionContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        let text = match self {
            ChatCompletionContent::Text(value) => value.clone(),
            ChatCompletionContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_ref())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}
