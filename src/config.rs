//! 应用配置：从 config/default.toml、.env 与环境变量加载
//!
//! 加载顺序：先读 `.env`（仅注入进程环境，供 API Key 使用），再读 TOML 文件，
//! 最后用环境变量 `MEDFLOW__*` 覆盖（双下划线表示嵌套，如 `MEDFLOW__LLM__PROVIDER=ollama`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub retriever: RetrieverSection,
    pub orchestrator: OrchestratorSection,
    pub store: StoreSection,
    pub prompts: PromptsSection,
}

/// [app] 段：应用名与数据根目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 数据根目录（SQLite、记忆快照），未设置时用 ./data
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "medflow".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// [llm] 段：后端选择、模型映射与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / groq / together / deepseek / huggingface / ollama / anthropic / mock
    pub provider: String,
    /// 逻辑模型名；在 `models.<provider>.<model>` 下查找真实的 model_identifier
    pub model: String,
    /// 覆盖后端默认 base_url（如自建 OpenAI 兼容代理、远程 Ollama）
    pub base_url: Option<String>,
    /// 显式 API Key；未设置时读取各后端对应的环境变量
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    /// provider -> (逻辑模型名 -> 模型条目)
    pub models: HashMap<String, HashMap<String, ModelEntry>>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "mock".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
            models: HashMap::new(),
        }
    }
}

/// 单个模型条目（models.yaml 风格）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelEntry {
    pub model_identifier: Option<String>,
    /// 覆盖该模型的最大输出 token（目前仅 anthropic 使用）
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [memory] 段：病例记忆的嵌入后端、默认 k 与快照目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 嵌入后端：hash（离线）/ openai
    pub embedding: String,
    pub embedding_model: String,
    /// hash 嵌入的维度
    pub dimensions: usize,
    /// 文献问答回退到病例记忆时取的条数
    pub default_k: usize,
    /// 快照目录；设置后启动时恢复、每次运行结束后写回
    pub snapshot_dir: Option<PathBuf>,
    /// 启动恢复时是否同时读取向量索引文件
    pub restore_index: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            embedding: "hash".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimensions: 256,
            default_k: 3,
            snapshot_dir: None,
            restore_index: false,
        }
    }
}

/// [retriever] 段：本地文档库检索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverSection {
    pub enabled: bool,
    /// 文档目录（.txt / .md），启动时分块并建索引
    pub documents_dir: Option<PathBuf>,
    pub k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrieverSection {
    fn default() -> Self {
        Self {
            enabled: false,
            documents_dir: None,
            k: 3,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// [orchestrator] 段：状态机行为开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 为 true 时，步骤缺少必需输入直接失败，而不是以空占位符调用模型
    pub strict_inputs: bool,
    /// 单次运行最多状态转移次数
    pub max_transitions: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            strict_inputs: false,
            max_transitions: 16,
        }
    }
}

/// [store] 段：运行记录持久化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub enabled: bool,
    /// SQLite 文件路径；未设置时用 `<data_dir>/db/medflow_runs.db`
    pub db_path: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
        }
    }
}

/// [prompts] 段：模板覆盖目录（`<dir>/<task>.txt`）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptsSection {
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// SQLite 文件的最终路径
    pub fn db_path(&self) -> PathBuf {
        self.store
            .db_path
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("db").join("medflow_runs.db"))
    }

    /// 当前后端下逻辑模型名对应的模型条目
    pub fn model_entry(&self) -> Option<&ModelEntry> {
        self.llm
            .models
            .get(&self.llm.provider.to_lowercase())
            .and_then(|m| m.get(&self.llm.model))
    }
}

/// 从 config 目录加载配置，环境变量 MEDFLOW__* 可覆盖
///
/// 1. 读取 `.env`（不存在时忽略）
/// 2. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 3. 若传入 config_path 且文件存在，则追加该文件
/// 4. 最后叠加环境变量 MEDFLOW__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MEDFLOW")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.memory.default_k, 3);
        assert!(!cfg.orchestrator.strict_inputs);
        assert_eq!(cfg.db_path(), PathBuf::from("data/db/medflow_runs.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medflow.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
model = "llama3"

[llm.models.ollama.llama3]
model_identifier = "llama3:8b"

[memory]
default_k = 5

[store]
db_path = "/tmp/runs.db"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(
            cfg.model_entry().and_then(|m| m.model_identifier.as_deref()),
            Some("llama3:8b")
        );
        assert_eq!(cfg.memory.default_k, 5);
        assert_eq!(cfg.memory.embedding, "hash");
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/runs.db"));
    }
}
