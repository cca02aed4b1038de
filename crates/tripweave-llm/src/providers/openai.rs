use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tripweave_core::config::ModelConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::ReasoningClient;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const SERVICE: &str = "reasoning";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, config }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Accept either a full `/chat/completions` URL or an API base such as
/// `https://host/v1`.
fn completions_url(base_url: Option<&str>) -> String {
    match base_url.map(|u| u.trim_end_matches('/')) {
        None | Some("") => OPENAI_API_URL.to_string(),
        Some(url) if url.ends_with("/chat/completions") => url.to_string(),
        Some(url) => format!("{}/chat/completions", url),
    }
}

fn build_request(config: &ModelConfig, prompt: String, context: String) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if !context.trim().is_empty() {
        messages.push(OaiMessage {
            role: "system",
            content: context,
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: prompt,
    });

    ChatRequest {
        model: config.model_id.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: if config.temperature > 0.0 {
            Some(config.temperature)
        } else {
            None
        },
        stream: false,
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| TripError::malformed_body(SERVICE, e))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| TripError::Http {
            service: SERVICE.into(),
            message: "response contained no message content".into(),
        })
}

fn status_error(status: StatusCode, model: &str, body: String) -> TripError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TripError::RateLimited {
            service: SERVICE.into(),
        },
        StatusCode::NOT_FOUND => TripError::NotFound {
            service: SERVICE.into(),
            what: format!("model '{}'", model),
        },
        _ => TripError::Http {
            service: SERVICE.into(),
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

impl ReasoningClient for OpenAiClient {
    fn call(&self, prompt: String, context: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = completions_url(self.config.base_url.as_deref());
            let body = build_request(&self.config, prompt, context);

            let mut req = self.http.post(&url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    TripError::UpstreamTimeout {
                        service: SERVICE.into(),
                        secs: self.config.timeout_secs,
                    }
                } else {
                    TripError::upstream(SERVICE, e.to_string())
                }
            })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TripError::upstream(SERVICE, e.to_string()))?;

            if !status.is_success() {
                return Err(status_error(status, &self.config.model_id, text));
            }

            let answer = parse_response(&text)?;
            debug!(model = %self.config.model_id, chars = answer.len(), "Reasoning call complete");
            Ok(answer)
        })
    }
}
