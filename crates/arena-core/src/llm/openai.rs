//! OpenAI-compatible chat-completion wire types.
//!
//! Only the fields this crate sends or reads are modelled. Unknown response
//! fields are ignored, and every response field is optional so that a
//! malformed body degrades to "no text" rather than a decode error.

use serde::{Deserialize, Serialize};

use super::PromptMessage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl From<PromptMessage> for ChatMessage {
    fn from(m: PromptMessage) -> Self {
        Self { role: m.role, content: m.content }
    }
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Response body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// Trimmed content of the first choice, if it has any text.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()?
            .message
            .as_ref()?
            .content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_text_is_trimmed() {
        let body = r#"{"id":"x","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":"  summary \n"},"finish_reason":"stop"}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).expect("decode");
        assert_eq!(resp.first_text(), Some("summary"));
        assert_eq!(resp.model.as_deref(), Some("m"));
    }

    #[test]
    fn missing_or_blank_content_is_none() {
        for body in [
            r#"{}"#,
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":null}]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":"   "}}]}"#,
        ] {
            let resp: ChatCompletionResponse = serde_json::from_str(body).expect("decode");
            assert_eq!(resp.first_text(), None, "body: {body}");
        }
    }

    #[test]
    fn request_serializes_sampling_parameters() {
        let req = ChatCompletionRequest {
            model: "meta/llama-3.1-8b-instruct".into(),
            messages: vec![PromptMessage::user("hi").into()],
            temperature: 0.3,
            max_tokens: 500,
        };
        let json = serde_json::to_value(&req).expect("encode");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!((json["temperature"].as_f64().unwrap_or_default() - 0.3).abs() < 1e-6);
    }
}
