//! Client for an NVIDIA NIM (OpenAI-compatible) chat-completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::openai::{ChatCompletionRequest, ChatCompletionResponse};
use super::{CompletionRequest, GenerationError, TextGenerator};

pub const DEFAULT_BASE_URL: &str = "https://api.nim.nvidia.com";
pub const DEFAULT_MODEL: &str = "meta/llama-3.1-8b-instruct";

#[derive(Debug, Clone)]
pub struct NimSettings {
    /// Bearer token. `None` makes every call fail with
    /// [`GenerationError::NotConfigured`].
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for NimSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NimClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl NimClient {
    pub fn new(settings: NimSettings) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .user_agent(concat!("arena-core/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()?;
        let api_key = settings.api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("NIM API key is not set; summaries will fail until it is configured");
        }
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/v1/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for NimClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::NotConfigured);
        };

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: request.messages.into_iter().map(Into::into).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        debug!(endpoint = %self.endpoint, model = %self.model, "requesting chat completion");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatCompletionResponse = resp.json().await?;
        parsed
            .first_text()
            .map(str::to_owned)
            .ok_or(GenerationError::Empty)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
