//! 运行记录存储：每次运行保存一行（请求 + 最终病例记录）
//!
//! 编排器只调用 `save`；其余查询供 CLI 的历史子命令使用。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::state::{CaseRecord, CaseRequest};

pub use memory::InMemoryRunStore;
pub use sqlite::SqliteRunStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// 持久化的一次运行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    /// UTC, RFC 3339
    pub timestamp: String,
    pub symptoms: Option<String>,
    pub ehr_text: Option<String>,
    /// 调用方原样提供的用药（字符串或列表）
    pub medications: serde_json::Value,
    pub question: Option<String>,
    pub patient_profile: serde_json::Value,
    /// 最终病例记录的全部字段
    pub final_state: serde_json::Value,
}

impl RunRecord {
    pub(crate) fn from_run(
        id: i64,
        request: &CaseRequest,
        record: &CaseRecord,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            symptoms: request.symptoms.clone(),
            ehr_text: request.ehr_text.clone(),
            medications: serde_json::to_value(&request.medications)?,
            question: request.question.clone(),
            patient_profile: serde_json::to_value(&request.patient_profile)?,
            final_state: serde_json::to_value(record)?,
        })
    }

    /// 关键词（已小写）是否命中 symptoms / question / final_state
    pub(crate) fn matches(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        self.symptoms.as_deref().is_some_and(hit)
            || self.question.as_deref().is_some_and(hit)
            || hit(&self.final_state.to_string())
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// 插入一行，返回新 id（同一请求重复保存会得到多行）
    async fn save(&self, request: &CaseRequest, record: &CaseRecord) -> Result<i64, StoreError>;

    /// 最近的运行，新的在前
    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<RunRecord>, StoreError>;

    /// 删除成功返回 true；id 不存在返回 false
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// 大小写不敏感的关键词搜索，新的在前
    async fn search(&self, keyword: &str) -> Result<Vec<RunRecord>, StoreError>;
}
