use thiserror::Error;

/// 病例记忆错误：嵌入失败、索引不一致、快照读写
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),
}
