//! 本地文档库：分块、向量化存储、混合检索
//!
//! 目录下的 .txt / .md 文件逐个分块并嵌入；检索时结合向量余弦相似度与关键词 Jaccard，
//! 用 RRF（Reciprocal Rank Fusion）融合两路排名。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::llm::EmbeddingProvider;
use crate::memory::{tokenizer, MemoryError};
use crate::retrieval::{Chunk, Chunker, ChunkingConfig, ContextRetriever, Passage};

/// RRF 常数
const RRF_K: f32 = 60.0;

struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

pub struct DocumentStore {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl DocumentStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunking: ChunkingConfig) -> Self {
        Self {
            chunker: Chunker::new(chunking),
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// 索引一篇文档；同 id 的旧版本先被移除。返回新增块数
    pub async fn index_document(&self, doc_id: &str, text: &str) -> Result<usize, MemoryError> {
        let mut embedded = Vec::new();
        for chunk in self.chunker.chunk(doc_id, text) {
            let embedding = self
                .embedder
                .embed(&chunk.text)
                .await
                .map_err(MemoryError::Embedding)?;
            embedded.push(StoredChunk { chunk, embedding });
        }

        let added = embedded.len();
        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.chunk.source != doc_id);
        chunks.extend(embedded);
        Ok(added)
    }

    /// 递归加载目录下的 .txt / .md 文档，返回 (文档数, 块数)
    pub async fn load_dir(&self, dir: &Path) -> Result<(usize, usize), MemoryError> {
        let mut docs = 0;
        let mut total_chunks = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| MemoryError::Io(e.into()))?;
            let path = entry.path();
            let is_doc = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
            if !entry.file_type().is_file() || !is_doc {
                continue;
            }
            let text = tokio::fs::read_to_string(path).await?;
            let doc_id = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            total_chunks += self.index_document(&doc_id, &text).await?;
            docs += 1;
        }
        tracing::info!(docs, chunks = total_chunks, "document store loaded from {}", dir.display());
        Ok((docs, total_chunks))
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    /// 混合检索：向量与关键词各取 2k 名，RRF 融合后取前 k
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>, MemoryError> {
        let chunks = self.chunks.read().await;
        if chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(MemoryError::Embedding)?;

        let mut vector_ranked: Vec<(usize, f32)> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(&query_embedding, &c.embedding)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        vector_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let query_tokens = tokenizer::tokenize_to_set(query);
        let mut keyword_ranked: Vec<(usize, f32)> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let tokens = tokenizer::tokenize_to_set(&c.chunk.text);
                (i, tokenizer::jaccard_similarity(&query_tokens, &tokens))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        keyword_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut fused: HashMap<usize, f32> = HashMap::new();
        for ranked in [&vector_ranked, &keyword_ranked] {
            for (rank, (i, _)) in ranked.iter().take(k * 2).enumerate() {
                *fused.entry(*i).or_insert(0.0) += 1.0 / (RRF_K + rank as f32);
            }
        }

        let mut results: Vec<(usize, f32)> = fused.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(k);

        Ok(results
            .into_iter()
            .map(|(i, score)| (chunks[i].chunk.clone(), score))
            .collect())
    }
}

#[async_trait]
impl ContextRetriever for DocumentStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Passage>, String> {
        let hits = self.search(query, k).await.map_err(|e| e.to_string())?;
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| {
                let mut metadata = HashMap::new();
                metadata.insert("source".to_string(), chunk.source.clone());
                metadata.insert("chunk".to_string(), chunk.ordinal.to_string());
                metadata.insert("score".to_string(), format!("{:.4}", score));
                Passage {
                    text: chunk.text,
                    metadata,
                }
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(HashEmbedder::new(128)), ChunkingConfig::default())
    }

    #[tokio::test]
    async fn test_search_prefers_matching_document() {
        let store = store();
        store
            .index_document("pneumonia.md", "Community acquired pneumonia is treated with amoxicillin.")
            .await
            .unwrap();
        store
            .index_document("migraine.md", "Migraine attacks respond to triptans and rest.")
            .await
            .unwrap();

        let passages = store
            .similarity_search("how is pneumonia treated", 1)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].metadata.get("source").map(String::as_str), Some("pneumonia.md"));
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_version() {
        let store = store();
        store.index_document("doc", "old text about asthma").await.unwrap();
        store.index_document("doc", "new text about asthma").await.unwrap();
        assert_eq!(store.len().await, 1);
        let hits = store.search("asthma", 5).await.unwrap();
        assert_eq!(hits[0].0.text, "new text about asthma");
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = store();
        assert!(store.similarity_search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_dir_reads_text_and_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Sepsis requires early antibiotics.").unwrap();
        std::fs::write(dir.path().join("b.md"), "# Gout\nColchicine for flares.").unwrap();
        std::fs::write(dir.path().join("c.json"), "{}").unwrap();

        let store = store();
        let (docs, chunks) = store.load_dir(dir.path()).await.unwrap();
        assert_eq!(docs, 2);
        assert_eq!(chunks, 2);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
