//! medflow - 医疗病例编排引擎
//!
//! 一个病例（症状 / 问题 / 病历 / 用药 / 患者概况）经显式状态机依次路由到各个由大模型驱动的步骤
//! （症状分诊、病历摘要、文献问答、药物相互作用、治疗方案），步骤产物累积到病例记录并写入运行记录。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + `.env` + 环境变量）
//! - **core**: 病例记录、状态机、编排器、错误
//! - **llm**: 模型调用抽象、各后端实现、后端注册表、嵌入
//! - **memory**: 病例记忆（追加日志 + 向量索引）与快照
//! - **observability**: 日志初始化
//! - **prompts**: 各任务的提示模板与格式化
//! - **retrieval**: 上下文检索（本地文档库）
//! - **store**: 运行记录存储（SQLite / 内存）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod retrieval;
pub mod store;

pub use crate::core::{CaseOrchestrator, CaseRecord, CaseRequest, OrchestratorBuilder, RunReport};
