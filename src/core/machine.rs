//! 病例状态机：状态枚举、纯转移函数、步骤表
//!
//! 转移只看记录中请求字段是否存在（Some），不看派生输出，
//! 因此同一请求总是走同一条路径。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::state::{CaseRecord, OutputField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    ContextInjection,
    SymptomChecker,
    EhrSummarizer,
    LiteratureQA,
    DrugChecker,
    TreatmentPlanner,
    Terminal,
}

/// 入口状态
pub const ENTRY: State = State::ContextInjection;

/// 最长路径执行的步骤数（上下文注入、症状分诊、病历摘要、药物检查、治疗方案）
pub const LONGEST_PATH_STEPS: usize = 5;

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::ContextInjection => "context_injection",
            State::SymptomChecker => "symptom_checker",
            State::EhrSummarizer => "ehr_summarizer",
            State::LiteratureQA => "literature_qa",
            State::DrugChecker => "drug_checker",
            State::TreatmentPlanner => "treatment_planner",
            State::Terminal => "terminal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Terminal)
    }

    /// 该步骤写入的字段；Terminal 不写
    pub fn output_field(&self) -> Option<OutputField> {
        match self {
            State::ContextInjection => Some(OutputField::Context),
            State::SymptomChecker => Some(OutputField::Diagnosis),
            State::EhrSummarizer => Some(OutputField::Summary),
            State::LiteratureQA => Some(OutputField::LiteratureAnswer),
            State::DrugChecker => Some(OutputField::InteractionReport),
            State::TreatmentPlanner => Some(OutputField::TreatmentPlan),
            State::Terminal => None,
        }
    }

    /// 输出追加到病例记忆时使用的来源标签；上下文注入不写记忆
    pub fn memory_tag(&self) -> Option<&'static str> {
        match self {
            State::SymptomChecker => Some("diagnosis"),
            State::EhrSummarizer => Some("ehr_summary"),
            State::LiteratureQA => Some("literature_qa"),
            State::DrugChecker => Some("drug_checker"),
            State::TreatmentPlanner => Some("treatment_plan"),
            State::ContextInjection | State::Terminal => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 纯转移函数
pub fn next_state(state: State, record: &CaseRecord) -> State {
    match state {
        State::ContextInjection if record.question.is_some() => State::LiteratureQA,
        State::ContextInjection => State::SymptomChecker,
        State::SymptomChecker if record.ehr_text.is_some() => State::EhrSummarizer,
        State::SymptomChecker => State::DrugChecker,
        State::EhrSummarizer | State::LiteratureQA => State::DrugChecker,
        State::DrugChecker => State::TreatmentPlanner,
        State::TreatmentPlanner | State::Terminal => State::Terminal,
    }
}

/// 不执行步骤，仅按转移函数推演整条路径（含入口与 Terminal）
pub fn plan_path(record: &CaseRecord) -> Vec<State> {
    let mut path = vec![ENTRY];
    let mut state = ENTRY;
    while !state.is_terminal() {
        state = next_state(state, record);
        path.push(state);
    }
    path
}
