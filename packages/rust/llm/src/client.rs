//! OpenAI-compatible chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use magicpage_shared::{LlmSection, MagicPageError, Result};

use crate::ChatModel;
use crate::types::{ChatRequest, ChatResponseRaw};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client with a bearer API key.
#[derive(Clone)]
pub struct OpenAiChat {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    /// Create a client for `model` with the given API key and request timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MagicPageError::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    /// Build from the `[llm]` config section and a resolved key.
    pub fn from_config(section: &LlmSection, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(api_key, &section.model, Duration::from_secs(section.timeout_secs))?
            .with_base_url(&section.base_url))
    }

    /// Set a custom base URL (for proxies or compatible servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let start = Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "chat request failed");
                MagicPageError::Llm(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "chat API error");
            return Err(MagicPageError::Llm(format!(
                "API returned {}: {error_text}",
                status.as_u16()
            )));
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| MagicPageError::parse(format!("malformed response: {e}")))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MagicPageError::parse("response contained no choices"))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "chat completion"
        );

        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::Message;

    fn client_for(server: &MockServer) -> OpenAiChat {
        OpenAiChat::new("sk-test", "gpt-4o-mini", Duration::from_secs(5))
            .unwrap()
            .with_base_url(format!("{}/v1/", server.uri()))
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4o-mini")
            .message(Message::system("You list facts."))
            .message(Message::user("Acme sells rockets."))
            .temperature(0.3)
            .max_tokens(500)
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 500,
                "messages": [
                    {"role": "system", "content": "You list facts."},
                    {"role": "user", "content": "Acme sells rockets."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": "1. Acme sells rockets"}},
                    {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server).complete(request()).await.unwrap();
        assert_eq!(text, "1. Acme sells rockets");
    }

    #[tokio::test]
    async fn error_status_is_llm_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, MagicPageError::Llm(_)));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, MagicPageError::Parse { .. }));
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn malformed_body_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, MagicPageError::Parse { .. }));
        assert!(err.to_string().starts_with("parse error: malformed response"));
    }

    #[test]
    fn from_config_uses_section_values() {
        let section = LlmSection {
            model: "gpt-4o".into(),
            base_url: "http://localhost:8080/v1/".into(),
            ..LlmSection::default()
        };
        let client = OpenAiChat::from_config(&section, "sk-test").unwrap();
        assert_eq!(client.model(), "gpt-4o");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }
}
