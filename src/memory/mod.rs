//! 记忆层：病例记忆（追加日志 + 向量索引）、分词

pub mod case_memory;
pub mod error;
pub mod index;
pub mod tokenizer;

pub use case_memory::{CaseMemory, MemoryEntry, MemoryHit, SNAPSHOT_INDEX_FILE, SNAPSHOT_LOG_FILE};
pub use error::MemoryError;
pub use index::FlatIndex;
