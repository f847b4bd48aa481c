//! Text generation behind an object-safe trait.
//!
//! [`TextGenerator`] is the seam between the summary worker and whatever
//! produces the text. [`nim::NimClient`] talks to an OpenAI-compatible
//! `/v1/chat/completions` endpoint; tests plug in scripted generators.

pub mod nim;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use nim::{NimClient, NimSettings};

/// One prompt message (`"system"` or `"user"`).
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// No API key was configured.
    #[error("text generation is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered 2xx but without usable text.
    #[error("no summary produced")]
    Empty,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier recorded next to generated text.
    fn model(&self) -> &str;

    /// Generate a completion and return its trimmed, non-empty text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}
