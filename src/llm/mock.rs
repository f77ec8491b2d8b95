//! Mock 客户端（用于测试与离线演示，无需 API）
//!
//! - MockLlmClient：回显 prompt 的首个非空行，输出可预测
//! - ScriptedLlmClient：按调用顺序记录 prompt，可指定第 N 次调用失败

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, LlmClient, LlmError};

/// Mock 客户端：回显 prompt 首行
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let first_line = prompt
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("(empty prompt)");
        Ok(Completion::text(format!("Mock response to: {}", first_line)))
    }
}

/// 脚本化客户端：第 `fail_on` 次（从 1 开始）调用返回错误，其余返回 `reply-<n>`
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    fail_on: Option<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的全部 prompt（含失败的那次）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let call = {
            let mut prompts = self
                .prompts
                .lock()
                .map_err(|e| LlmError::Transport(e.to_string()))?;
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if self.fail_on == Some(call) {
            return Err(LlmError::Transport(format!("scripted failure on call {}", call)));
        }
        Ok(Completion::text(format!("reply-{}", call)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_first_line() {
        let out = MockLlmClient.complete("\n  You are a helper.\nMore").await.unwrap();
        assert_eq!(out.content, "Mock response to: You are a helper.");
    }

    #[tokio::test]
    async fn test_scripted_fails_on_given_call() {
        let client = ScriptedLlmClient::failing_on(2);
        assert_eq!(client.complete("a").await.unwrap().content, "reply-1");
        assert!(client.complete("b").await.is_err());
        assert_eq!(client.complete("c").await.unwrap().content, "reply-3");
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }
}
