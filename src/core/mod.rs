//! 核心编排层：病例记录、状态机、编排器、错误

pub mod builder;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod state;

pub use builder::{restore_memory, OrchestratorBuilder};
pub use error::AgentError;
pub use machine::{next_state, plan_path, State, ENTRY};
pub use orchestrator::{CaseOrchestrator, OrchestratorOptions, RunOutcome, RunReport};
pub use state::{
    normalize_medications, CaseRecord, CaseRequest, Medications, OutputField, PatientProfile, Sex,
};
