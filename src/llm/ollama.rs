//! Ollama 本地模型客户端（ollama-rs）

use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    Ollama,
};
use reqwest::Url;

use crate::llm::{Completion, LlmClient, LlmError, TokenCounts};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    model: String,
}

/// base_url 拆成 (scheme://host, port)；未写端口时用 Ollama 默认端口
fn split_base_url(base_url: &str) -> Result<(String, u16), LlmError> {
    let url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| LlmError::Config(format!("Invalid Ollama base_url '{}': {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| LlmError::Config(format!("Ollama base_url '{}' has no host", base_url)))?;
    let port = url.port().unwrap_or(OLLAMA_DEFAULT_PORT);
    Ok((format!("{}://{}", url.scheme(), host), port))
}

impl OllamaClient {
    pub fn new(base_url: Option<&str>, model: &str) -> Result<Self, LlmError> {
        let (host, port) = split_base_url(base_url.unwrap_or(OLLAMA_BASE_URL))?;
        Ok(Self {
            client: Ollama::new(host, port),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let request =
            ChatMessageRequest::new(self.model.clone(), vec![ChatMessage::user(prompt.to_string())]);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| LlmError::Transport(format!("Ollama error: {}", e)))?;

        let usage = response.final_data.as_ref().map(|d| TokenCounts {
            prompt: u64::from(d.prompt_eval_count),
            completion: u64::from(d.eval_count),
        });

        Ok(Completion {
            content: response.message.content,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_base_url_default() {
        let (host, port) = split_base_url(OLLAMA_BASE_URL).unwrap();
        assert_eq!(host, "http://localhost");
        assert_eq!(port, 11434);
    }

    #[test]
    fn test_split_base_url_custom_port_and_trailing_slash() {
        let (host, port) = split_base_url("http://192.168.1.100:8080/").unwrap();
        assert_eq!(host, "http://192.168.1.100");
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_split_base_url_without_port() {
        let (host, port) = split_base_url("https://gpu-box").unwrap();
        assert_eq!(host, "https://gpu-box");
        assert_eq!(port, OLLAMA_DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = OllamaClient::new(Some("localhost"), "llama3").err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }
}
