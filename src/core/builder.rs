//! 编排器构建：从配置装配模型后端、病例记忆、检索器、提示模板与运行记录存储
//!
//! 配置错误（未知后端、缺少 API Key、数据库无法打开）在这里立即返回，不会等到运行时。

use std::sync::Arc;

use crate::config::{AppConfig, MemorySection};
use crate::core::orchestrator::{CaseOrchestrator, OrchestratorOptions};
use crate::core::AgentError;
use crate::llm::{create_embedder_from_config, create_llm_from_config, EmbeddingProvider, LlmClient};
use crate::memory::{CaseMemory, MemoryError, SNAPSHOT_LOG_FILE};
use crate::prompts::PromptTemplates;
use crate::retrieval::create_retriever_from_config;
use crate::store::{InMemoryRunStore, RunStore, SqliteRunStore};

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    memory: Option<Arc<CaseMemory>>,
    store: Option<Arc<dyn RunStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            embedder: None,
            memory: None,
            store: None,
        }
    }

    /// 使用给定的模型客户端，而不是按配置创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// 共享已有的病例记忆（多个编排器共用一份）
    pub fn with_memory(mut self, memory: Arc<CaseMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Result<CaseOrchestrator, AgentError> {
        let cfg = &self.config;
        let options = OrchestratorOptions::try_from(cfg)?;

        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_from_config(cfg).map_err(|e| AgentError::Config(e.to_string()))?,
        };

        let embedder = self.embedder.unwrap_or_else(|| {
            let base_url = cfg
                .llm
                .base_url
                .as_deref()
                .filter(|_| cfg.llm.provider.eq_ignore_ascii_case("openai"));
            create_embedder_from_config(&cfg.memory, base_url)
        });

        let memory = match self.memory {
            Some(memory) => memory,
            None => {
                let memory = Arc::new(CaseMemory::new(embedder.clone()));
                restore_memory(&memory, &cfg.memory).await?;
                memory
            }
        };

        let retriever = create_retriever_from_config(&cfg.retriever, embedder).await?;
        let templates = PromptTemplates::load(cfg.prompts.dir.as_deref());

        let store: Arc<dyn RunStore> = match self.store {
            Some(store) => store,
            None if cfg.store.enabled => {
                let path = cfg.db_path();
                let store = SqliteRunStore::open(&path).map_err(|e| {
                    AgentError::Config(format!("cannot open run store {}: {}", path.display(), e))
                })?;
                Arc::new(store)
            }
            None => {
                tracing::info!("run store disabled; runs are kept in memory only");
                Arc::new(InMemoryRunStore::new())
            }
        };

        tracing::info!(
            llm = llm.name(),
            retriever = retriever.is_some(),
            strict_inputs = cfg.orchestrator.strict_inputs,
            "orchestrator ready"
        );

        Ok(CaseOrchestrator::new(llm, memory)
            .with_retriever(retriever)
            .with_templates(templates)
            .with_options(options)
            .with_store(Some(store)))
    }
}

/// 若配置了快照目录且存在快照，则恢复条目日志；`restore_index` 为 true 时同时恢复索引
/// （维度与当前嵌入后端不符时改为重建）。
/// 恢复后日志与索引不一致只告警，由调用方决定是否 `rebuild_index`。
pub async fn restore_memory(memory: &CaseMemory, section: &MemorySection) -> Result<(), MemoryError> {
    let Some(dir) = section.snapshot_dir.as_deref() else {
        return Ok(());
    };
    if !dir.join(SNAPSHOT_LOG_FILE).exists() {
        tracing::info!("no case memory snapshot in {}", dir.display());
        return Ok(());
    }
    let entries = memory.restore(dir).await?;
    if section.restore_index {
        memory.restore_index(dir).await?;
    }
    if memory.is_consistent().await {
        tracing::info!(entries, "case memory restored from {}", dir.display());
    } else {
        tracing::warn!(
            entries,
            "case memory log and index differ after restore; run `medflow memory rebuild` to re-embed"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashEmbedder, ScriptedLlmClient};

    #[tokio::test]
    async fn test_build_with_defaults_uses_mock_and_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.store.db_path = Some(dir.path().join("db").join("runs.db"));
        let orchestrator = OrchestratorBuilder::new(cfg).build().await.unwrap();
        assert!(orchestrator.store().is_some());
        assert!(dir.path().join("db").join("runs.db").exists());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_eagerly() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "nonexistent".into();
        cfg.store.enabled = false;
        let err = OrchestratorBuilder::new(cfg).build().await.err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn test_restore_memory_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(32));
        let original = CaseMemory::new(embedder.clone());
        original.append("Influenza A", "diagnosis").await.unwrap();
        original.snapshot(dir.path()).await.unwrap();

        let section = MemorySection {
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let log_only = CaseMemory::new(embedder.clone());
        restore_memory(&log_only, &section).await.unwrap();
        assert_eq!(log_only.len().await, 1);
        assert!(!log_only.is_consistent().await);

        let full = CaseMemory::new(embedder);
        let section = MemorySection {
            restore_index: true,
            ..section
        };
        restore_memory(&full, &section).await.unwrap();
        assert!(full.is_consistent().await);
    }

    #[tokio::test]
    async fn test_snapshot_from_other_dimension_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let original = CaseMemory::new(Arc::new(HashEmbedder::new(256)));
        original.append("Influenza A", "diagnosis").await.unwrap();
        original.snapshot(dir.path()).await.unwrap();

        let mut cfg = AppConfig::default();
        cfg.store.enabled = false;
        cfg.memory.dimensions = 128;
        cfg.memory.restore_index = true;
        cfg.memory.snapshot_dir = Some(dir.path().to_path_buf());
        let orchestrator = OrchestratorBuilder::new(cfg).build().await.unwrap();
        assert!(orchestrator.memory().is_consistent().await);

        let report = orchestrator
            .run(&crate::core::CaseRequest {
                symptoms: Some("fever".into()),
                ..Default::default()
            })
            .await;
        assert!(report.is_completed(), "{:?}", report.outcome);
        assert!(report.record.diagnosis().is_some());
        assert_eq!(orchestrator.memory().len().await, 4);
    }

    #[tokio::test]
    async fn test_step_budget_below_longest_path_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.store.enabled = false;
        cfg.orchestrator.max_transitions = 4;
        let err = OrchestratorBuilder::new(cfg).build().await.err().unwrap();
        assert!(matches!(err, AgentError::Config(ref m) if m.contains("max_transitions")));
    }

    #[tokio::test]
    async fn test_injected_components_are_used() {
        let mut cfg = AppConfig::default();
        cfg.store.enabled = false;
        let llm = Arc::new(ScriptedLlmClient::new());
        let orchestrator = OrchestratorBuilder::new(cfg)
            .with_llm(llm.clone())
            .build()
            .await
            .unwrap();
        let report = orchestrator
            .run(&crate::core::CaseRequest {
                symptoms: Some("rash".into()),
                ..Default::default()
            })
            .await;
        assert!(report.is_completed());
        assert_eq!(llm.calls(), 3);
    }
}
