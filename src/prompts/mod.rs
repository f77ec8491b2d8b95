//! 提示格式化：每类任务一个模板，输入记录 → 指令文本
//!
//! 格式化是纯函数：同一输入总是得到同一字符串。缺失的输入以空字符串占位，
//! 是否拒绝缺失输入由编排器决定。

pub mod templates;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::state::PatientProfile;

/// 任务类型；`as_str` 同时是覆盖模板的文件名（`<dir>/<task>.txt`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SymptomChecker,
    EhrSummarizer,
    LiteratureQa,
    DrugInteractions,
    TreatmentPlan,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::SymptomChecker,
        TaskKind::EhrSummarizer,
        TaskKind::LiteratureQa,
        TaskKind::DrugInteractions,
        TaskKind::TreatmentPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SymptomChecker => "symptom_checker",
            TaskKind::EhrSummarizer => "ehr_summarizer",
            TaskKind::LiteratureQa => "literature_qa",
            TaskKind::DrugInteractions => "drug_interactions",
            TaskKind::TreatmentPlan => "treatment_plan",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            TaskKind::SymptomChecker => templates::SYMPTOM_CHECKER,
            TaskKind::EhrSummarizer => templates::EHR_SUMMARIZER,
            TaskKind::LiteratureQa => templates::LITERATURE_QA,
            TaskKind::DrugInteractions => templates::DRUG_INTERACTIONS,
            TaskKind::TreatmentPlan => templates::TREATMENT_PLAN,
        }
    }

    fn placeholders(&self) -> &'static [&'static str] {
        match self {
            TaskKind::SymptomChecker => &["symptoms"],
            TaskKind::EhrSummarizer => &["ehr_text"],
            TaskKind::LiteratureQa => &["context", "question"],
            TaskKind::DrugInteractions => &["drugs", "interactions"],
            TaskKind::TreatmentPlan => &["diagnosis", "age", "sex", "comorbidities"],
        }
    }
}

/// 各任务的类型化输入
#[derive(Debug, Clone, Copy)]
pub enum PromptInput<'a> {
    Symptoms {
        symptoms: &'a str,
    },
    EhrSummary {
        ehr_text: &'a str,
    },
    LiteratureQa {
        question: &'a str,
        context: &'a str,
    },
    DrugInteractions {
        medications: &'a [String],
        patient_data: &'a str,
    },
    Treatment {
        profile: Option<&'a PatientProfile>,
    },
}

impl PromptInput<'_> {
    pub fn kind(&self) -> TaskKind {
        match self {
            PromptInput::Symptoms { .. } => TaskKind::SymptomChecker,
            PromptInput::EhrSummary { .. } => TaskKind::EhrSummarizer,
            PromptInput::LiteratureQa { .. } => TaskKind::LiteratureQa,
            PromptInput::DrugInteractions { .. } => TaskKind::DrugInteractions,
            PromptInput::Treatment { .. } => TaskKind::TreatmentPlan,
        }
    }

    fn vars(&self) -> Vec<(&'static str, String)> {
        match *self {
            PromptInput::Symptoms { symptoms } => vec![("symptoms", symptoms.to_string())],
            PromptInput::EhrSummary { ehr_text } => vec![("ehr_text", ehr_text.to_string())],
            PromptInput::LiteratureQa { question, context } => vec![
                ("context", context.to_string()),
                ("question", question.to_string()),
            ],
            PromptInput::DrugInteractions {
                medications,
                patient_data,
            } => vec![
                ("drugs", medications.join(", ")),
                ("interactions", patient_data.to_string()),
            ],
            PromptInput::Treatment { profile } => match profile {
                Some(p) => vec![
                    ("diagnosis", p.diagnosis.clone()),
                    ("age", p.age.to_string()),
                    ("sex", p.sex.to_string()),
                    ("comorbidities", p.comorbidities.join(", ")),
                ],
                None => vec![
                    ("diagnosis", String::new()),
                    ("age", String::new()),
                    ("sex", String::new()),
                    ("comorbidities", String::new()),
                ],
            },
        }
    }
}

/// 模板集合：内置模板，可被目录中的同名文件覆盖
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<TaskKind, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            templates: TaskKind::ALL
                .iter()
                .map(|k| (*k, k.builtin().to_string()))
                .collect(),
        }
    }
}

impl PromptTemplates {
    /// 按顺序查找 `<dir>/<task>.txt`、config/prompts/<task>.txt、../config/prompts/<task>.txt，
    /// 都不存在时使用内置模板
    pub fn load(dir: Option<&Path>) -> Self {
        let mut templates = Self::default();
        for kind in TaskKind::ALL {
            let file = format!("{}.txt", kind.as_str());
            let mut candidates: Vec<PathBuf> = Vec::new();
            if let Some(dir) = dir {
                candidates.push(dir.join(&file));
            }
            candidates.push(Path::new("config/prompts").join(&file));
            candidates.push(Path::new("../config/prompts").join(&file));

            if let Some((path, text)) = candidates
                .into_iter()
                .find_map(|p| std::fs::read_to_string(&p).ok().map(|t| (p, t)))
            {
                tracing::info!(task = kind.as_str(), "prompt template overridden by {}", path.display());
                templates.set(kind, text);
            }
        }
        templates
    }

    /// 替换模板；缺少占位符时只告警（该输入将不会出现在提示中）
    pub fn set(&mut self, kind: TaskKind, template: impl Into<String>) {
        let template = template.into();
        for name in kind.placeholders() {
            if !template.contains(&format!("{{{}}}", name)) {
                tracing::warn!(task = kind.as_str(), "template has no {{{}}} placeholder", name);
            }
        }
        self.templates.insert(kind, template);
    }

    pub fn get(&self, kind: TaskKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.builtin())
    }

    pub fn format(&self, input: &PromptInput<'_>) -> String {
        let vars = input.vars();
        render(self.get(input.kind()), &vars)
    }
}

pub fn symptom_prompt(symptoms: &str) -> String {
    PromptTemplates::default().format(&PromptInput::Symptoms { symptoms })
}

pub fn ehr_summary_prompt(ehr_text: &str) -> String {
    PromptTemplates::default().format(&PromptInput::EhrSummary { ehr_text })
}

pub fn literature_qa_prompt(question: &str, context: &str) -> String {
    PromptTemplates::default().format(&PromptInput::LiteratureQa { question, context })
}

pub fn drug_interaction_prompt(medications: &[String], patient_data: &str) -> String {
    PromptTemplates::default().format(&PromptInput::DrugInteractions {
        medications,
        patient_data,
    })
}

pub fn treatment_prompt(profile: Option<&PatientProfile>) -> String {
    PromptTemplates::default().format(&PromptInput::Treatment { profile })
}

/// 单遍替换 `{name}`；值中出现的花括号不会被再次展开，未知占位符原样保留
fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match vars.iter().find(|(k, _)| *k == name) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Sex;

    #[test]
    fn test_formatting_is_idempotent() {
        let meds = vec!["warfarin".to_string(), "aspirin".to_string()];
        let inputs = [
            PromptInput::Symptoms { symptoms: "fever" },
            PromptInput::EhrSummary { ehr_text: "note" },
            PromptInput::LiteratureQa {
                question: "q",
                context: "c",
            },
            PromptInput::DrugInteractions {
                medications: &meds,
                patient_data: "bleeding risk",
            },
            PromptInput::Treatment { profile: None },
        ];
        let templates = PromptTemplates::default();
        for input in &inputs {
            assert_eq!(templates.format(input), templates.format(input));
        }
    }

    #[test]
    fn test_symptom_prompt_embeds_input() {
        let prompt = symptom_prompt("fever, sore throat");
        assert!(prompt.contains("Given the following symptoms: fever, sore throat"));
        assert!(!prompt.contains("{symptoms}"));
    }

    #[test]
    fn test_drug_prompt_joins_medications() {
        let meds = vec!["paracetamol".to_string(), "azithromycin".to_string()];
        let prompt = drug_interaction_prompt(&meds, "pharyngitis");
        assert!(prompt.contains("Given the following medications: paracetamol, azithromycin"));
        assert!(prompt.contains("Known interactions found:\npharyngitis"));
    }

    #[test]
    fn test_treatment_prompt_renders_profile() {
        let profile = PatientProfile {
            age: 45,
            sex: Sex::Female,
            diagnosis: "Type 2 diabetes".to_string(),
            comorbidities: vec!["hypertension".to_string(), "CKD".to_string()],
        };
        let prompt = treatment_prompt(Some(&profile));
        assert!(prompt.contains("- Diagnosis: Type 2 diabetes"));
        assert!(prompt.contains("- Age: 45"));
        assert!(prompt.contains("- Sex: Female"));
        assert!(prompt.contains("- Comorbidities: hypertension, CKD"));
    }

    #[test]
    fn test_absent_profile_renders_empty_placeholders() {
        let prompt = treatment_prompt(None);
        assert!(prompt.contains("- Diagnosis: \n"));
        assert!(prompt.contains("- Comorbidities: \n"));
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let prompt = literature_qa_prompt("what is {context}?", "ctx");
        assert!(prompt.contains("\"what is {context}?\""));
        assert!(prompt.contains("---\nctx\n---"));
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed_braces() {
        let vars = vec![("a", "1".to_string())];
        assert_eq!(render("{a} {b} {", &vars), "1 {b} {");
    }

    #[test]
    fn test_override_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("symptom_checker.txt"), "Triage: {symptoms}").unwrap();
        let templates = PromptTemplates::load(Some(dir.path()));
        assert_eq!(
            templates.format(&PromptInput::Symptoms { symptoms: "cough" }),
            "Triage: cough"
        );
        assert_eq!(templates.get(TaskKind::EhrSummarizer), templates::EHR_SUMMARIZER);
    }
}
