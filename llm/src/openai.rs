use crate::LanguageModel;
use crate::error::{LlmError, Result};
use crate::options::{CompletionOptions, ResponseFormat};
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; usually taken from `OPENAI_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP-level timeout in seconds, independent of the pipeline's per-call timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Chat-completions client.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if options.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let started = Instant::now();

        let mut request = self.http.post(url).json(&self.request_body(prompt, options));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(
            "chat completion [{}] model={} prompt_chars={} status={} latency_ms={}",
            options.call_site,
            self.config.model,
            prompt.len(),
            status.as_u16(),
            started.elapsed().as_millis()
        );

        if status.is_success() {
            parse_chat_completion(&body)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(LlmError::Unauthorized(body))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(LlmError::RateLimited(body))
        } else {
            Err(LlmError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Text of `choices[0].message`, or the refusal the model gave instead.
pub fn parse_chat_completion(body: &str) -> Result<String> {
    let completion: ChatCompletion = serde_json::from_str(body)?;
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(LlmError::Refused(refusal));
    }
    message.content.ok_or_else(|| {
        LlmError::InvalidResponse("missing choices[0].message.content".to_string())
    })
}
