//! 嵌入：供病例记忆与文档检索使用
//!
//! - OpenAiEmbedder：调用 OpenAI 兼容的 /embeddings 端点
//! - HashEmbedder：离线、确定性的哈希词袋向量（无 API Key 时的默认）

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::MemorySection;
use crate::memory::tokenizer;

/// 嵌入提供方：将文本编码为定长向量；失败时返回错误字符串
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;

    /// 向量维度（未知时返回 None，由第一次写入决定）
    fn dimensions(&self) -> Option<usize> {
        None
    }
}

/// 已知 OpenAI 嵌入模型的输出维度
fn known_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .ok_or_else(|| "embedding response contained no vectors".to_string())
    }

    fn dimensions(&self) -> Option<usize> {
        known_dimensions(&self.model)
    }
}

/// 哈希词袋嵌入：每个词经 SHA-256 映射到一个维度并计数，最后做 L2 归一化。
/// 映射与 Rust 版本无关，快照里的向量在升级后仍然有效。
/// 空文本得到全零向量（仍可入索引）。
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// 词 -> 维度下标：SHA-256 摘要前 8 字节按小端取 u64 后取模
    fn slot(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dimensions as u64) as usize
    }

    pub fn embed_now(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenizer::tokenize(text) {
            v[self.slot(&token)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.embed_now(text))
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }
}

/// 从应用配置创建嵌入提供方；openai 缺少 Key 时回退到 hash
pub fn create_embedder_from_config(
    memory: &MemorySection,
    base_url: Option<&str>,
) -> Arc<dyn EmbeddingProvider> {
    match memory.embedding.to_lowercase().as_str() {
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                tracing::info!("Using OpenAI embeddings ({})", memory.embedding_model);
                Arc::new(OpenAiEmbedder::new(base_url, &memory.embedding_model, &key))
            }
            _ => {
                tracing::warn!("OPENAI_API_KEY not set, falling back to hash embeddings");
                Arc::new(HashEmbedder::new(memory.dimensions))
            }
        },
        "hash" => Arc::new(HashEmbedder::new(memory.dimensions)),
        other => {
            tracing::warn!("Unknown embedding backend '{}', using hash embeddings", other);
            Arc::new(HashEmbedder::new(memory.dimensions))
        }
    }
}
