//! 编排错误类型
//!
//! 模型调用失败与记忆写入失败对当前运行是致命的；检索失败与持久化失败只记录日志。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::MemoryError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// 严格模式下，步骤所需输入缺失
    #[error("Missing input `{field}` for step {step}")]
    MissingInput {
        step: &'static str,
        field: &'static str,
    },

    #[error("Output field `{0}` already written")]
    OutputAlreadyWritten(&'static str),

    #[error("Step budget of {0} transitions exceeded")]
    StepBudgetExceeded(usize),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}
