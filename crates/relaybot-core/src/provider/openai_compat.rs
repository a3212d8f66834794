use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{CompletionResponse, Message, TokenUsage};
use crate::util::http;

use super::LlmProvider;

const ARK_BOTS_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3/bots";

/// OpenAI-compatible provider.
/// Works with Volcengine Ark, DeepSeek, Moonshot, OpenAI and any OpenAI-compatible API.
pub struct OpenAiCompatProvider {
    api_key: String,
    api_base: String,
    default_model: String,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: String,
        api_base: Option<String>,
        default_model: String,
        timeout: Duration,
    ) -> Self {
        let base = api_base.unwrap_or_else(|| {
            let model = default_model.to_lowercase();
            if model.starts_with("bot-") {
                ARK_BOTS_BASE.to_string()
            } else if model.starts_with("ep-") || model.contains("doubao") {
                "https://ark.cn-beijing.volces.com/api/v3".to_string()
            } else if model.contains("deepseek") {
                "https://api.deepseek.com/v1".to_string()
            } else if model.contains("moonshot") || model.contains("kimi") {
                "https://api.moonshot.cn/v1".to_string()
            } else {
                "https://api.openai.com/v1".to_string()
            }
        });

        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            default_model,
            timeout,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);

        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": false,
        });

        debug!("OpenAI-compat request to {} with model {}", url, model);

        let response = http::client()
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_openai_response(&data)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Parse an OpenAI-format response into our CompletionResponse.
pub fn parse_openai_response(data: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
    let choice = data
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| ProviderError::Parse("No message in choice".to_string()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    let usage = if let Some(u) = data.get("usage") {
        TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        }
    } else {
        TokenUsage::default()
    };

    Ok(CompletionResponse { content, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base: Option<&str>, model: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "sk-test".to_string(),
            base.map(|s| s.to_string()),
            model.to_string(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_base_guessed_from_model() {
        assert_eq!(provider(None, "bot-20250907084333-cbvff").api_base(), ARK_BOTS_BASE);
        assert_eq!(provider(None, "deepseek-chat").api_base(), "https://api.deepseek.com/v1");
        assert_eq!(provider(None, "gpt-4o").api_base(), "https://api.openai.com/v1");
        assert_eq!(provider(Some("http://localhost:9000/v1/"), "x").api_base(), "http://localhost:9000/v1");
    }

    #[test]
    fn test_parse_response_content_and_usage() {
        let data = json!({
            "choices": [{"message": {"role": "assistant", "content": "  hello  "}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let resp = parse_openai_response(&data).unwrap();
        assert_eq!(resp.content.as_deref(), Some("hello"));
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_openai_response(&json!({"error": "boom"})).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_chat_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"Sunny today."}}]}"#)
            .create_async()
            .await;

        let p = provider(Some(&server.url()), "deepseek-chat");
        let resp = p
            .chat(&[Message::user("weather?")], "deepseek-chat", 256, 0.2)
            .await
            .unwrap();
        assert_eq!(resp.content.as_deref(), Some("Sunny today."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_api_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let p = provider(Some(&server.url()), "deepseek-chat");
        let err = p
            .chat(&[Message::user("hi")], "deepseek-chat", 256, 0.2)
            .await
            .unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
