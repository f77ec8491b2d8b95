//! SQLite 运行记录存储（rusqlite）
//!
//! 表 `runs` 的 JSON 列以 TEXT 保存；阻塞调用放到 spawn_blocking 中执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{RunRecord, RunStore, StoreError};
use crate::core::state::{CaseRecord, CaseRequest};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    symptoms TEXT,
    ehr_text TEXT,
    medications TEXT,
    question TEXT,
    patient_profile TEXT,
    final_state TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON runs(timestamp);
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, symptoms, ehr_text, medications, question, patient_profile, final_state FROM runs";

pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// 打开（或创建）数据库文件，父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("run store opened at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// 原始行：JSON 列尚未解析
struct RawRow {
    id: i64,
    timestamp: String,
    symptoms: Option<String>,
    ehr_text: Option<String>,
    medications: Option<String>,
    question: Option<String>,
    patient_profile: Option<String>,
    final_state: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            symptoms: row.get(2)?,
            ehr_text: row.get(3)?,
            medications: row.get(4)?,
            question: row.get(5)?,
            patient_profile: row.get(6)?,
            final_state: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<RunRecord, StoreError> {
        Ok(RunRecord {
            id: self.id,
            timestamp: self.timestamp,
            symptoms: self.symptoms,
            ehr_text: self.ehr_text,
            medications: parse_json(self.medications.as_deref())?,
            question: self.question,
            patient_profile: parse_json(self.patient_profile.as_deref())?,
            final_state: serde_json::from_str(&self.final_state)?,
        })
    }
}

fn parse_json(raw: Option<&str>) -> Result<serde_json::Value, StoreError> {
    match raw {
        Some(s) => Ok(serde_json::from_str(s)?),
        None => Ok(serde_json::Value::Null),
    }
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<RunRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, RawRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawRow::into_record).collect()
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, request: &CaseRequest, record: &CaseRecord) -> Result<i64, StoreError> {
        let row = RunRecord::from_run(0, request, record)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO runs (timestamp, symptoms, ehr_text, medications, question, patient_profile, final_state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.timestamp,
                    row.symptoms,
                    row.ehr_text,
                    row.medications.to_string(),
                    row.question,
                    row.patient_profile.to_string(),
                    row.final_state.to_string(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            collect_rows(
                conn,
                &format!("{} ORDER BY id DESC LIMIT ?1", SELECT_COLUMNS),
                params![limit],
            )
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<RunRecord>, StoreError> {
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    params![id],
                    RawRow::from_row,
                )
                .optional()?;
            raw.map(RawRow::into_record).transpose()
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let affected = conn.execute("DELETE FROM runs WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
        .await
    }

    /// SQLite 的 LOWER() 只折叠 ASCII，这里取出全部行后在 Rust 中做 Unicode 小写匹配，
    /// 与内存存储的结果一致
    async fn search(&self, keyword: &str) -> Result<Vec<RunRecord>, StoreError> {
        let needle = keyword.to_lowercase();
        self.with_conn(move |conn| {
            let rows = collect_rows(
                conn,
                &format!("{} ORDER BY id DESC", SELECT_COLUMNS),
                params![],
            )?;
            Ok(rows.into_iter().filter(|r| r.matches(&needle)).collect())
        })
        .await
    }
}
