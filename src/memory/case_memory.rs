//! 病例记忆：步骤产物的追加日志 + 平行向量索引
//!
//! 进程内共享（多个运行共用一个 `Arc<CaseMemory>`）。append / query 都在同一把异步锁内完成，
//! 嵌入先于写入执行，因此条目日志与索引的长度和顺序始终一致。
//!
//! 快照格式：`memory.json`（条目日志）与 `index.json`（向量索引）是两个独立文件。
//! `restore` 只恢复条目日志；索引需要显式调用 `restore_index` 或 `rebuild_index`。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::llm::EmbeddingProvider;
use crate::memory::{FlatIndex, MemoryError};

pub const SNAPSHOT_LOG_FILE: &str = "memory.json";
pub const SNAPSHOT_INDEX_FILE: &str = "index.json";

/// 单条记忆：文本 + 来源步骤标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub source_tag: String,
}

/// 检索命中
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub ordinal: usize,
    pub entry: MemoryEntry,
    /// 平方 L2 距离，越小越相关
    pub distance: f32,
}

#[derive(Default)]
struct Inner {
    entries: Vec<MemoryEntry>,
    index: FlatIndex,
}

pub struct CaseMemory {
    inner: Mutex<Inner>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl CaseMemory {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            embedder,
        }
    }

    /// 追加一条记忆，返回其序号。嵌入失败时日志与索引都不变，错误原样返回。
    pub async fn append(&self, text: &str, source_tag: &str) -> Result<usize, MemoryError> {
        let mut inner = self.inner.lock().await;
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::Embedding)?;
        let ordinal = inner.index.add(vector)?;
        inner.entries.push(MemoryEntry {
            text: text.to_string(),
            source_tag: source_tag.to_string(),
        });
        tracing::debug!(ordinal, source_tag, "case memory append");
        Ok(ordinal)
    }

    /// 检索与 text 最近的至多 k 条，按距离升序；记忆为空时返回空列表
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<MemoryHit>, MemoryError> {
        let inner = self.inner.lock().await;
        if inner.entries.is_empty() || inner.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::Embedding)?;

        // 仅恢复了日志时，索引序号可能越界，跳过即可
        Ok(inner
            .index
            .search(&vector, k)
            .into_iter()
            .filter_map(|(ordinal, distance)| {
                inner.entries.get(ordinal).map(|entry| MemoryHit {
                    ordinal,
                    entry: entry.clone(),
                    distance,
                })
            })
            .collect())
    }

    /// 写出快照：条目日志与向量索引分别写入 dir 下的两个文件
    pub async fn snapshot(&self, dir: &Path) -> Result<(), MemoryError> {
        let inner = self.inner.lock().await;
        tokio::fs::create_dir_all(dir).await?;
        let log = serde_json::to_string_pretty(&inner.entries)?;
        tokio::fs::write(log_path(dir), log).await?;
        inner.index.save(&index_path(dir)).await?;
        tracing::info!(entries = inner.entries.len(), "case memory snapshot written to {}", dir.display());
        Ok(())
    }

    /// 从快照恢复条目日志（不恢复索引），返回条目数
    pub async fn restore(&self, dir: &Path) -> Result<usize, MemoryError> {
        let data = tokio::fs::read_to_string(log_path(dir)).await?;
        let entries: Vec<MemoryEntry> = serde_json::from_str(&data)?;
        let mut inner = self.inner.lock().await;
        inner.entries = entries;
        if inner.entries.len() != inner.index.len() {
            tracing::warn!(
                entries = inner.entries.len(),
                indexed = inner.index.len(),
                "case memory restored without its vector index; call restore_index or rebuild_index"
            );
        }
        Ok(inner.entries.len())
    }

    /// 从快照恢复向量索引，返回索引大小。
    /// 快照维度与当前嵌入后端不一致时丢弃快照索引，改用条目日志重建。
    pub async fn restore_index(&self, dir: &Path) -> Result<usize, MemoryError> {
        let index = FlatIndex::load(&index_path(dir)).await?;
        let mut inner = self.inner.lock().await;
        match (index.dimensions(), self.embedder.dimensions()) {
            (Some(stored), Some(current)) if stored != current => {
                tracing::warn!(
                    stored,
                    current,
                    "snapshot index dimension does not match the embedder; rebuilding from the entry log"
                );
                let rebuilt = self.embed_all(&inner.entries).await?;
                inner.index = rebuilt;
            }
            _ => inner.index = index,
        }
        Ok(inner.index.len())
    }

    /// 用当前嵌入后端重新编码全部条目并替换索引；任一失败则保留旧索引
    pub async fn rebuild_index(&self) -> Result<usize, MemoryError> {
        let mut inner = self.inner.lock().await;
        let rebuilt = self.embed_all(&inner.entries).await?;
        inner.index = rebuilt;
        Ok(inner.index.len())
    }

    async fn embed_all(&self, entries: &[MemoryEntry]) -> Result<FlatIndex, MemoryError> {
        let mut index = FlatIndex::new();
        for entry in entries {
            let vector = self
                .embedder
                .embed(&entry.text)
                .await
                .map_err(MemoryError::Embedding)?;
            index.add(vector)?;
        }
        Ok(index)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// 条目日志与索引大小是否一致
    pub async fn is_consistent(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.entries.len() == inner.index.len()
    }

    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.inner.lock().await.entries.clone()
    }
}

fn log_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_LOG_FILE)
}

fn index_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_INDEX_FILE)
}
