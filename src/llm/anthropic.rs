//! Anthropic Claude 客户端（claude-sdk）

use async_trait::async_trait;
use claude_sdk::{ClaudeClient, ContentBlock, Message, MessagesRequest};

use crate::llm::{Completion, LlmClient, LlmError, TokenCounts};

pub const DEFAULT_MAX_TOKENS: u32 = 512;

pub struct AnthropicClient {
    client: ClaudeClient,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(model: &str, api_key: &str, max_tokens: Option<u32>) -> Self {
        Self {
            client: ClaudeClient::anthropic(api_key.to_string()),
            model: model.to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    fn build_request(&self, prompt: &str) -> MessagesRequest {
        MessagesRequest::new(
            self.model.clone(),
            self.max_tokens,
            vec![Message::user(prompt.to_string())],
        )
    }
}

/// 取第一个 text 块
fn first_text(content: &[ContentBlock]) -> Option<String> {
    content.iter().find_map(|block| match block {
        ContentBlock::Text { text, .. } => Some(text.clone()),
        _ => None,
    })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let response = self
            .client
            .send_message(self.build_request(prompt))
            .await
            .map_err(|e| LlmError::Transport(format!("Anthropic API error: {}", e)))?;

        let usage = Some(TokenCounts {
            prompt: response.usage.input_tokens as u64,
            completion: response.usage.output_tokens as u64,
        });
        let content = first_text(&response.content).ok_or(LlmError::EmptyResponse)?;

        Ok(Completion { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_on_empty_content() {
        assert_eq!(first_text(&[]), None);
    }

    #[test]
    fn test_default_max_tokens() {
        let client = AnthropicClient::new("claude-3-haiku-20240307", "key", None);
        assert_eq!(client.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(client.name(), "anthropic");
    }

    #[test]
    fn test_configured_max_tokens() {
        let client = AnthropicClient::new("claude-3-haiku-20240307", "key", Some(2048));
        assert_eq!(client.max_tokens, 2048);
        assert_eq!(client.model, "claude-3-haiku-20240307");
    }
}
