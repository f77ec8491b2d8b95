//! 内存运行记录存储（测试、或 `store.enabled = false` 时使用）

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RunRecord, RunStore, StoreError};
use crate::core::state::{CaseRecord, CaseRequest};

#[derive(Default)]
pub struct InMemoryRunStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<RunRecord>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, request: &CaseRequest, record: &CaseRecord) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(RunRecord::from_run(id, request, record)?);
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.iter().rev().take(limit).cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<RunRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|r| r.id != id);
        Ok(inner.rows.len() < before)
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RunRecord>, StoreError> {
        let needle = keyword.to_lowercase();
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .rev()
            .filter(|r| r.matches(&needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(symptoms: &str) -> CaseRequest {
        CaseRequest {
            symptoms: Some(symptoms.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_ids() {
        let store = InMemoryRunStore::new();
        let req = request("fever");
        let record = CaseRecord::from(&req);
        let a = store.save(&req, &record).await.unwrap();
        let b = store.save(&req, &record).await.unwrap();
        assert!(b > a);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_list_search_delete() {
        let store = InMemoryRunStore::new();
        for s in ["Chest pain", "headache", "chest tightness"] {
            let req = request(s);
            store.save(&req, &CaseRecord::from(&req)).await.unwrap();
        }
        let recent = store.list_recent(2).await.unwrap();
        assert_eq!(recent[0].symptoms.as_deref(), Some("chest tightness"));
        assert_eq!(recent.len(), 2);

        let hits = store.search("CHEST").await.unwrap();
        assert_eq!(hits.len(), 2);

        assert!(store.delete(hits[0].id).await.unwrap());
        assert!(!store.delete(hits[0].id).await.unwrap());
        assert!(store.find_by_id(hits[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let store = InMemoryRunStore::new();
        let req = request("Écho cardiaque anormal");
        store.save(&req, &CaseRecord::from(&req)).await.unwrap();
        assert_eq!(store.search("écho").await.unwrap().len(), 1);
        assert_eq!(store.search("ÉCHO").await.unwrap().len(), 1);
    }
}
