//! LLM 层：模型调用抽象、各后端实现、后端注册表与嵌入

pub mod anthropic;
pub mod embedding;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use embedding::{create_embedder_from_config, EmbeddingProvider, HashEmbedder, OpenAiEmbedder};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use registry::{create_llm_from_config, create_llm_with_env, Provider};
pub use traits::{Completion, LlmClient, LlmError, TimeoutLlmClient, TokenCounts};
