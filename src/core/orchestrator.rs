//! 病例编排器：显式状态机主循环
//!
//! 从入口状态开始，执行当前步骤 → 用 `next_state` 求下一状态，直到 Terminal。
//! 步骤严格顺序执行；模型调用或记忆写入失败时立即停止，已写入的字段保留在报告中。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::machine::{next_state, State, ENTRY, LONGEST_PATH_STEPS};
use crate::core::state::{normalize_list, CaseRecord, CaseRequest, OutputField};
use crate::core::AgentError;
use crate::llm::{LlmClient, TokenCounts};
use crate::memory::CaseMemory;
use crate::prompts::{PromptInput, PromptTemplates};
use crate::retrieval::{join_passages, ContextRetriever};
use crate::store::RunStore;

/// 编排行为参数
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// 缺少必需输入时直接失败
    pub strict_inputs: bool,
    pub max_transitions: usize,
    /// 文献问答回退到病例记忆时的 k
    pub memory_k: usize,
    /// 检索器返回的段落数
    pub retriever_k: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            strict_inputs: false,
            max_transitions: 16,
            memory_k: 3,
            retriever_k: 3,
        }
    }
}

/// max_transitions 小于最长路径时，合法的病例也会在写完治疗方案后被判失败，因此在装配时拒绝
impl TryFrom<&AppConfig> for OrchestratorOptions {
    type Error = AgentError;

    fn try_from(cfg: &AppConfig) -> Result<Self, Self::Error> {
        if cfg.orchestrator.max_transitions < LONGEST_PATH_STEPS {
            return Err(AgentError::Config(format!(
                "orchestrator.max_transitions must be at least {} (got {})",
                LONGEST_PATH_STEPS, cfg.orchestrator.max_transitions
            )));
        }
        Ok(Self {
            strict_inputs: cfg.orchestrator.strict_inputs,
            max_transitions: cfg.orchestrator.max_transitions,
            memory_k: cfg.memory.default_k,
            retriever_k: cfg.retriever.k,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { step: State, message: String },
}

/// 一次运行的结果：经过的状态、最终（或失败时的部分）病例记录
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub path: Vec<State>,
    pub record: CaseRecord,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 本次运行各步上报的 token 之和（后端不上报时为 0）
    pub token_usage: TokenCounts,
    /// 运行记录存储中的 id（已保存时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<i64>,
    /// 保存失败的原因；不影响 outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

pub struct CaseOrchestrator {
    llm: Arc<dyn LlmClient>,
    memory: Arc<CaseMemory>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    templates: PromptTemplates,
    options: OrchestratorOptions,
    store: Option<Arc<dyn RunStore>>,
}

impl CaseOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<CaseMemory>) -> Self {
        Self {
            llm,
            memory,
            retriever: None,
            templates: PromptTemplates::default(),
            options: OrchestratorOptions::default(),
            store: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Option<Arc<dyn ContextRetriever>>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_store(mut self, store: Option<Arc<dyn RunStore>>) -> Self {
        self.store = store;
        self
    }

    pub fn memory(&self) -> &Arc<CaseMemory> {
        &self.memory
    }

    pub fn store(&self) -> Option<&Arc<dyn RunStore>> {
        self.store.as_ref()
    }

    /// 执行一次运行；失败不会 panic，结果写在报告的 outcome 中
    pub async fn run(&self, request: &CaseRequest) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut record = CaseRecord::from(request);
        if !record.has_entry_input() {
            tracing::warn!(%run_id, "case has neither symptoms nor question; falling through to symptom checker");
        }
        tracing::info!(%run_id, llm = self.llm.name(), "run started");

        let mut path = Vec::new();
        let mut state = ENTRY;
        let mut transitions = 0usize;
        let mut token_usage = TokenCounts::default();
        let outcome = loop {
            path.push(state);
            if state.is_terminal() {
                break RunOutcome::Completed;
            }

            let step_started = Instant::now();
            if let Err(e) = self.execute(state, &mut record, &mut token_usage).await {
                tracing::error!(%run_id, step = %state, error = %e, "step failed, run halted");
                break RunOutcome::Failed {
                    step: state,
                    message: e.to_string(),
                };
            }
            tracing::info!(
                %run_id,
                step = %state,
                elapsed_ms = step_started.elapsed().as_millis() as u64,
                "step completed"
            );

            transitions += 1;
            if transitions > self.options.max_transitions {
                break RunOutcome::Failed {
                    step: state,
                    message: AgentError::StepBudgetExceeded(self.options.max_transitions).to_string(),
                };
            }
            state = next_state(state, &record);
        };

        let finished_at = Utc::now();
        tracing::info!(
            %run_id,
            completed = matches!(outcome, RunOutcome::Completed),
            steps = path.len(),
            prompt_tokens = token_usage.prompt,
            completion_tokens = token_usage.completion,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "run finished"
        );
        RunReport {
            run_id,
            path,
            record,
            outcome,
            started_at,
            finished_at,
            token_usage,
            store_id: None,
            persist_error: None,
        }
    }

    /// 执行并保存到运行记录存储；只保存完成的运行，保存失败记在 persist_error 上
    pub async fn run_and_persist(&self, request: &CaseRequest) -> RunReport {
        let mut report = self.run(request).await;
        let Some(store) = &self.store else {
            return report;
        };
        if !report.is_completed() {
            tracing::debug!(run_id = %report.run_id, "failed run not persisted");
            return report;
        }
        match store.save(request, &report.record).await {
            Ok(id) => {
                tracing::info!(run_id = %report.run_id, store_id = id, "run persisted");
                report.store_id = Some(id);
            }
            Err(e) => {
                tracing::warn!(run_id = %report.run_id, error = %e, "failed to persist run");
                report.persist_error = Some(e.to_string());
            }
        }
        report
    }

    async fn execute(
        &self,
        state: State,
        record: &mut CaseRecord,
        usage: &mut TokenCounts,
    ) -> Result<(), AgentError> {
        match state {
            State::ContextInjection => {
                self.inject_context(record).await;
                Ok(())
            }
            State::SymptomChecker => {
                let symptoms = self.required(state, "symptoms", record.symptoms.as_deref())?;
                let prompt = self.templates.format(&PromptInput::Symptoms { symptoms });
                self.invoke_and_record(state, record, prompt, usage).await
            }
            State::EhrSummarizer => {
                let ehr_text = self.required(state, "ehr_text", record.ehr_text.as_deref())?;
                let prompt = self.templates.format(&PromptInput::EhrSummary { ehr_text });
                self.invoke_and_record(state, record, prompt, usage).await
            }
            State::LiteratureQA => {
                let question = self
                    .required(state, "question", record.question.as_deref())?
                    .to_string();
                let context = self.literature_context(&question, record).await?;
                let prompt = self.templates.format(&PromptInput::LiteratureQa {
                    question: &question,
                    context: &context,
                });
                self.invoke_and_record(state, record, prompt, usage).await
            }
            State::DrugChecker => {
                let medications = normalize_list(record.medications.iter().map(String::as_str));
                if medications.is_empty() && self.options.strict_inputs {
                    return Err(AgentError::MissingInput {
                        step: state.as_str(),
                        field: "medications",
                    });
                }
                let prompt = self.templates.format(&PromptInput::DrugInteractions {
                    medications: &medications,
                    patient_data: record.diagnosis().unwrap_or(""),
                });
                self.invoke_and_record(state, record, prompt, usage).await
            }
            State::TreatmentPlanner => {
                if record.patient_profile.is_none() && self.options.strict_inputs {
                    return Err(AgentError::MissingInput {
                        step: state.as_str(),
                        field: "patient_profile",
                    });
                }
                let prompt = self.templates.format(&PromptInput::Treatment {
                    profile: record.patient_profile.as_ref(),
                });
                self.invoke_and_record(state, record, prompt, usage).await
            }
            State::Terminal => Ok(()),
        }
    }

    /// 严格模式下缺失即失败；否则以空字符串占位
    fn required<'a>(
        &self,
        state: State,
        field: &'static str,
        value: Option<&'a str>,
    ) -> Result<&'a str, AgentError> {
        match value {
            Some(v) => Ok(v),
            None if self.options.strict_inputs => Err(AgentError::MissingInput {
                step: state.as_str(),
                field,
            }),
            None => {
                tracing::debug!(step = %state, field, "input absent, using empty placeholder");
                Ok("")
            }
        }
    }

    /// 检索失败只告警，context 保持缺失
    async fn inject_context(&self, record: &mut CaseRecord) {
        let Some(retriever) = &self.retriever else {
            return;
        };
        let query = match record.question.as_deref().or(record.symptoms.as_deref()) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => return,
        };
        match retriever
            .similarity_search(&query, self.options.retriever_k)
            .await
        {
            Ok(passages) if passages.is_empty() => {
                tracing::debug!("retriever returned no passages");
            }
            Ok(passages) => {
                tracing::debug!(passages = passages.len(), "context injected");
                if let Err(e) = record.write_output(OutputField::Context, join_passages(&passages)) {
                    tracing::warn!(error = %e, "context not injected");
                }
            }
            Err(e) => tracing::warn!(error = %e, "context retrieval failed; continuing without context"),
        }
    }

    /// 文献问答的上下文：检索器（优先复用已注入的 context），否则病例记忆
    async fn literature_context(
        &self,
        question: &str,
        record: &CaseRecord,
    ) -> Result<String, AgentError> {
        if let Some(retriever) = &self.retriever {
            if let Some(context) = record.context() {
                return Ok(context.to_string());
            }
            match retriever
                .similarity_search(question, self.options.retriever_k)
                .await
            {
                Ok(passages) => return Ok(join_passages(&passages)),
                Err(e) => {
                    tracing::warn!(error = %e, "retriever failed, falling back to case memory")
                }
            }
        }
        let hits = self.memory.query(question, self.options.memory_k).await?;
        Ok(hits
            .iter()
            .map(|h| h.entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// 调用模型 → 追加到病例记忆 → 写入步骤字段
    async fn invoke_and_record(
        &self,
        state: State,
        record: &mut CaseRecord,
        prompt: String,
        usage: &mut TokenCounts,
    ) -> Result<(), AgentError> {
        let Some(field) = state.output_field() else {
            return Ok(());
        };
        tracing::debug!(step = %state, prompt_chars = prompt.len(), "invoking model");
        let completion = self.llm.complete(&prompt).await?;
        if let Some(counts) = completion.usage {
            tracing::debug!(
                step = %state,
                prompt_tokens = counts.prompt,
                completion_tokens = counts.completion,
                "token usage"
            );
            usage.add(counts);
        }
        if let Some(tag) = state.memory_tag() {
            self.memory.append(&completion.content, tag).await?;
        }
        record.write_output(field, completion.content)
    }
}
