//! 上下文检索：给定查询返回排序后的相关段落
//!
//! 检索器是可选的：未配置时编排器以空上下文继续运行。

pub mod chunker;
pub mod document_store;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RetrieverSection;
use crate::llm::EmbeddingProvider;
use crate::memory::MemoryError;

pub use chunker::{Chunk, Chunker, ChunkingConfig};
pub use document_store::DocumentStore;

/// 检索到的段落
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }
}

/// 上下文检索 trait
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>, String>;
}

/// 段落按换行拼接
pub fn join_passages(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 从配置创建检索器；未启用或未配置文档目录时返回 None
pub async fn create_retriever_from_config(
    section: &RetrieverSection,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Option<Arc<dyn ContextRetriever>>, MemoryError> {
    if !section.enabled {
        return Ok(None);
    }
    let Some(dir) = section.documents_dir.as_deref() else {
        tracing::warn!("retriever enabled but no documents_dir configured; running without retriever");
        return Ok(None);
    };
    let store = DocumentStore::new(
        embedder,
        ChunkingConfig::sized(section.chunk_size, section.chunk_overlap),
    );
    load_documents(&store, dir).await?;
    Ok(Some(Arc::new(store)))
}

async fn load_documents(store: &DocumentStore, dir: &Path) -> Result<(), MemoryError> {
    if !dir.exists() {
        tracing::warn!("documents_dir {} does not exist; retriever starts empty", dir.display());
        return Ok(());
    }
    store.load_dir(dir).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;

    #[test]
    fn test_join_passages() {
        let passages = vec![Passage::new("first"), Passage::new("second")];
        assert_eq!(join_passages(&passages), "first\nsecond");
        assert_eq!(join_passages(&[]), "");
    }

    #[tokio::test]
    async fn test_disabled_retriever_is_none() {
        let section = RetrieverSection::default();
        let retriever = create_retriever_from_config(&section, Arc::new(HashEmbedder::default()))
            .await
            .unwrap();
        assert!(retriever.is_none());
    }

    #[tokio::test]
    async fn test_enabled_retriever_loads_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("copd.txt"), "COPD is managed with bronchodilators.").unwrap();
        let section = RetrieverSection {
            enabled: true,
            documents_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let retriever = create_retriever_from_config(&section, Arc::new(HashEmbedder::default()))
            .await
            .unwrap()
            .unwrap();
        let passages = retriever.similarity_search("COPD bronchodilators", 3).await.unwrap();
        assert_eq!(passages.len(), 1);
    }
}
