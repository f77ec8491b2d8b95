//! 病例数据模型：请求（CaseRequest）与在状态机中流转的病例记录（CaseRecord）
//!
//! 请求字段由外部边界（CLI / API）填写；派生输出字段只能由步骤写入一次。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 性别；反序列化大小写不敏感，无法识别的值归为 Other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Other,
}

impl From<String> for Sex {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Sex::Male,
            "female" | "f" => Sex::Female,
            _ => Sex::Other,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Other => "Other",
        };
        f.write_str(s)
    }
}

/// 患者概况（治疗方案步骤的输入）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub comorbidities: Vec<String>,
}

/// 调用方提供的用药：逗号分隔字符串或字符串列表；其它 JSON 形状一律视为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Medications {
    Text(String),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl Medications {
    /// 归一化为去空白、非空、保持顺序的列表
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Medications::Text(s) => normalize_list(s.split(',')),
            Medications::List(items) => normalize_list(items.iter().map(String::as_str)),
            Medications::Other(_) => Vec::new(),
        }
    }
}

impl From<&str> for Medications {
    fn from(s: &str) -> Self {
        Medications::Text(s.to_string())
    }
}

impl From<Vec<&str>> for Medications {
    fn from(items: Vec<&str>) -> Self {
        Medications::List(items.into_iter().map(String::from).collect())
    }
}

pub fn normalize_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items
        .into_iter()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

/// 未提供时返回空列表
pub fn normalize_medications(meds: Option<&Medications>) -> Vec<String> {
    meds.map(Medications::normalize).unwrap_or_default()
}

/// 外部请求：病例进入状态机前的原始形状（也是写入运行记录的 request）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseRequest {
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub ehr_text: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub medications: Option<Medications>,
    #[serde(default)]
    pub patient_profile: Option<PatientProfile>,
}

/// 步骤写入的派生输出字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputField {
    Context,
    Diagnosis,
    Summary,
    LiteratureAnswer,
    InteractionReport,
    TreatmentPlan,
}

impl OutputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::Context => "context",
            OutputField::Diagnosis => "diagnosis",
            OutputField::Summary => "summary",
            OutputField::LiteratureAnswer => "literature_answer",
            OutputField::InteractionReport => "interaction_report",
            OutputField::TreatmentPlan => "treatment_plan",
        }
    }
}

/// 在状态机中流转的病例记录
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseRecord {
    pub symptoms: Option<String>,
    pub question: Option<String>,
    pub ehr_text: Option<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    pub patient_profile: Option<PatientProfile>,

    pub(crate) diagnosis: Option<String>,
    pub(crate) summary: Option<String>,
    pub(crate) literature_answer: Option<String>,
    pub(crate) interaction_report: Option<String>,
    pub(crate) treatment_plan: Option<String>,
    pub(crate) context: Option<String>,
}

impl From<&CaseRequest> for CaseRecord {
    fn from(req: &CaseRequest) -> Self {
        Self {
            symptoms: req.symptoms.clone(),
            question: req.question.clone(),
            ehr_text: req.ehr_text.clone(),
            medications: normalize_medications(req.medications.as_ref()),
            patient_profile: req.patient_profile.clone(),
            ..Default::default()
        }
    }
}

impl CaseRecord {
    /// 是否有可用于进入状态机的主诉（symptoms 或 question）
    pub fn has_entry_input(&self) -> bool {
        self.symptoms.is_some() || self.question.is_some()
    }

    pub fn output(&self, field: OutputField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// 写入派生字段；同一字段写第二次返回 OutputAlreadyWritten
    pub fn write_output(&mut self, field: OutputField, value: String) -> Result<(), AgentError> {
        let slot = self.slot_mut(field);
        if slot.is_some() {
            return Err(AgentError::OutputAlreadyWritten(field.as_str()));
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn diagnosis(&self) -> Option<&str> {
        self.diagnosis.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn literature_answer(&self) -> Option<&str> {
        self.literature_answer.as_deref()
    }

    pub fn interaction_report(&self) -> Option<&str> {
        self.interaction_report.as_deref()
    }

    pub fn treatment_plan(&self) -> Option<&str> {
        self.treatment_plan.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    fn slot(&self, field: OutputField) -> &Option<String> {
        match field {
            OutputField::Context => &self.context,
            OutputField::Diagnosis => &self.diagnosis,
            OutputField::Summary => &self.summary,
            OutputField::LiteratureAnswer => &self.literature_answer,
            OutputField::InteractionReport => &self.interaction_report,
            OutputField::TreatmentPlan => &self.treatment_plan,
        }
    }

    fn slot_mut(&mut self, field: OutputField) -> &mut Option<String> {
        match field {
            OutputField::Context => &mut self.context,
            OutputField::Diagnosis => &mut self.diagnosis,
            OutputField::Summary => &mut self.summary,
            OutputField::LiteratureAnswer => &mut self.literature_answer,
            OutputField::InteractionReport => &mut self.interaction_report,
            OutputField::TreatmentPlan => &mut self.treatment_plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medications_string_and_list_normalize_identically() {
        let from_text = Medications::from("paracetamol, azithromycin").normalize();
        let from_list = Medications::from(vec!["paracetamol", "azithromycin"]).normalize();
        assert_eq!(from_text, vec!["paracetamol", "azithromycin"]);
        assert_eq!(from_text, from_list);
    }

    #[test]
    fn test_medications_drop_blanks_and_trim() {
        let meds = Medications::from(" ibuprofen ,, ,warfarin ").normalize();
        assert_eq!(meds, vec!["ibuprofen", "warfarin"]);
        let meds = Medications::from(vec!["  metformin", "", "   "]).normalize();
        assert_eq!(meds, vec!["metformin"]);
    }

    #[test]
    fn test_medications_none_or_unsupported_is_empty() {
        assert!(normalize_medications(None).is_empty());
        let odd: Medications = serde_json::from_str("42").unwrap();
        assert!(odd.normalize().is_empty());
        let mixed: Medications = serde_json::from_str(r#"["aspirin", 3]"#).unwrap();
        assert!(mixed.normalize().is_empty());
    }

    #[test]
    fn test_request_deserializes_both_medication_shapes() {
        let a: CaseRequest =
            serde_json::from_str(r#"{"symptoms":"fever","medications":"a, b"}"#).unwrap();
        let b: CaseRequest =
            serde_json::from_str(r#"{"symptoms":"fever","medications":["a","b"]}"#).unwrap();
        let c: CaseRequest = serde_json::from_str(r#"{"medications":null}"#).unwrap();
        assert_eq!(CaseRecord::from(&a).medications, CaseRecord::from(&b).medications);
        assert!(CaseRecord::from(&c).medications.is_empty());
    }

    #[test]
    fn test_sex_is_case_insensitive() {
        let p: PatientProfile =
            serde_json::from_str(r#"{"age":45,"sex":"FEMALE","diagnosis":"flu"}"#).unwrap();
        assert_eq!(p.sex, Sex::Female);
        assert!(p.comorbidities.is_empty());
        let p: PatientProfile = serde_json::from_str(r#"{"sex":"unknown"}"#).unwrap();
        assert_eq!(p.sex, Sex::Other);
    }

    #[test]
    fn test_outputs_are_write_once() {
        let mut record = CaseRecord::default();
        record
            .write_output(OutputField::Diagnosis, "flu".to_string())
            .unwrap();
        let err = record
            .write_output(OutputField::Diagnosis, "cold".to_string())
            .unwrap_err();
        assert!(matches!(err, AgentError::OutputAlreadyWritten("diagnosis")));
        assert_eq!(record.diagnosis(), Some("flu"));
    }

    #[test]
    fn test_entry_input_guard() {
        let mut record = CaseRecord::default();
        assert!(!record.has_entry_input());
        record.question = Some(String::new());
        assert!(record.has_entry_input());
    }

    #[test]
    fn test_record_serializes_all_fields() {
        let mut record = CaseRecord::from(&CaseRequest {
            symptoms: Some("cough".into()),
            ..Default::default()
        });
        record
            .write_output(OutputField::Diagnosis, "bronchitis".into())
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["diagnosis"], "bronchitis");
        assert!(json["summary"].is_null());
        assert!(json.get("treatment_plan").is_some());
    }
}
