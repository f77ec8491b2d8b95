//! 模型调用抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / Anthropic / Mock）实现 LlmClient：complete(prompt) -> Completion。
//! Completion 是唯一的归一化结果类型，消费方不再需要判断返回值形状。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// token 统计（单次调用，或一次运行内各步之和）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenCounts {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }

    pub fn add(&mut self, other: TokenCounts) {
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// 归一化的模型输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenCounts>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// 模型调用错误；核心层只透传消息文本，不区分重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Config(String),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// 模型调用 trait：给定格式化后的指令，返回生成文本或失败
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 后端名（日志用）
    fn name(&self) -> &str;

    /// 非流式完成
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError>;
}

/// 超时包装：把超过时限的调用转成 LlmError::Timeout
pub struct TimeoutLlmClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TimeoutLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl LlmClient for TimeoutLlmClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        }
    }
}
