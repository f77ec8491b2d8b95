//! 后端注册表：在配置阶段把 provider 名解析为具体的 LlmClient
//!
//! 未知后端、缺少 API Key、缺少 model identifier 都在这里立即报错，运行开始前就失败。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{
    AnthropicClient, LlmClient, LlmError, MockLlmClient, OllamaClient, OpenAiClient,
    TimeoutLlmClient,
};

/// 支持的模型后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Groq,
    Together,
    DeepSeek,
    HuggingFace,
    Ollama,
    Anthropic,
    Mock,
}

impl Provider {
    pub const ALL: [Provider; 8] = [
        Provider::OpenAi,
        Provider::Groq,
        Provider::Together,
        Provider::DeepSeek,
        Provider::HuggingFace,
        Provider::Ollama,
        Provider::Anthropic,
        Provider::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Together => "together",
            Provider::DeepSeek => "deepseek",
            Provider::HuggingFace => "huggingface",
            Provider::Ollama => "ollama",
            Provider::Anthropic => "anthropic",
            Provider::Mock => "mock",
        }
    }

    pub fn parse(name: &str) -> Result<Self, LlmError> {
        let name = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|p| p.as_str()).collect();
                LlmError::Config(format!(
                    "Unsupported provider: {}. Supported providers: {}",
                    name,
                    supported.join(", ")
                ))
            })
    }

    /// 读取 API Key 的环境变量；本地后端返回 None
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Together => Some("TOGETHER_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::HuggingFace => Some("HUGGINGFACE_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Ollama | Provider::Mock => None,
        }
    }

    /// OpenAI 兼容后端的默认 base_url
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Together => Some("https://api.together.xyz/v1"),
            Provider::DeepSeek => Some("https://api.deepseek.com"),
            Provider::HuggingFace => Some("https://router.huggingface.co/v1"),
            _ => None,
        }
    }
}

/// 解析 API Key：显式配置优先，其次环境变量；空字符串视为缺失
pub fn resolve_api_key(
    provider: Provider,
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>, LlmError> {
    let Some(var) = provider.api_key_env() else {
        return Ok(None);
    };
    explicit
        .map(String::from)
        .or_else(|| env(var))
        .filter(|k| !k.trim().is_empty())
        .map(Some)
        .ok_or_else(|| {
            LlmError::Config(format!(
                "{} is required for the {} provider",
                var,
                provider.as_str()
            ))
        })
}

/// 解析真实模型 id：models.<provider>.<model>.model_identifier，未映射时直接用 model 名
pub fn resolve_model_identifier(cfg: &AppConfig) -> Result<String, LlmError> {
    let id = match cfg.model_entry() {
        Some(entry) => entry.model_identifier.clone().unwrap_or_default(),
        None => cfg.llm.model.clone(),
    };
    if id.trim().is_empty() {
        return Err(LlmError::Config(format!(
            "No model identifier for model '{}' under provider '{}'",
            cfg.llm.model, cfg.llm.provider
        )));
    }
    Ok(id)
}

/// 根据配置创建模型客户端（带请求超时）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    create_llm_with_env(cfg, |var| std::env::var(var).ok())
}

pub fn create_llm_with_env(
    cfg: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = Provider::parse(&cfg.llm.provider)?;
    if provider == Provider::Mock {
        tracing::warn!("Using Mock LLM, responses are not generated by a model");
        return Ok(Arc::new(MockLlmClient));
    }

    let model_id = resolve_model_identifier(cfg)?;
    let api_key = resolve_api_key(provider, cfg.llm.api_key.as_deref(), env)?;
    let base_url = cfg.llm.base_url.as_deref().or(provider.default_base_url());

    let client: Arc<dyn LlmClient> = match (provider, api_key) {
        (Provider::Ollama, _) => Arc::new(OllamaClient::new(base_url, &model_id)?),
        (Provider::Anthropic, Some(key)) => {
            if base_url.is_some() {
                tracing::warn!("llm.base_url is ignored for the anthropic provider");
            }
            Arc::new(AnthropicClient::new(
                &model_id,
                &key,
                cfg.model_entry().and_then(|m| m.max_tokens),
            ))
        }
        (p, Some(key)) => Arc::new(OpenAiClient::new(p.as_str(), base_url, &model_id, &key)),
        (p, None) => {
            return Err(LlmError::Config(format!(
                "Missing credentials for the {} provider",
                p.as_str()
            )))
        }
    };

    tracing::info!(
        "Using {} LLM ({}), timeout {}s",
        provider.as_str(),
        model_id,
        cfg.llm.timeouts.request
    );
    Ok(Arc::new(TimeoutLlmClient::new(client, cfg.llm.timeouts.request)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::ModelEntry;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn cfg_for(provider: &str, model: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = provider.to_string();
        cfg.llm.model = model.to_string();
        cfg
    }

    #[test]
    fn test_parse_provider_case_insensitive() {
        assert_eq!(Provider::parse("OpenAI").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::parse(" groq ").unwrap(), Provider::Groq);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = Provider::parse("bard").unwrap_err();
        match err {
            LlmError::Config(msg) => {
                assert!(msg.contains("bard"));
                assert!(msg.contains("ollama"));
            }
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_fails_eagerly() {
        let cfg = cfg_for("anthropic", "claude-3-haiku");
        let err = create_llm_with_env(&cfg, no_env).err().unwrap();
        assert!(matches!(err, LlmError::Config(ref m) if m.contains("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn test_empty_api_key_counts_as_missing() {
        let err = resolve_api_key(Provider::Groq, Some("  "), no_env).unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_api_key_from_env() {
        let key = resolve_api_key(Provider::Groq, None, |v| {
            (v == "GROQ_API_KEY").then(|| "gsk-1".to_string())
        })
        .unwrap();
        assert_eq!(key.as_deref(), Some("gsk-1"));
    }

    #[test]
    fn test_model_identifier_mapping() {
        let mut cfg = cfg_for("groq", "llama3");
        let mut models = HashMap::new();
        models.insert(
            "llama3".to_string(),
            ModelEntry {
                model_identifier: Some("llama3-8b-8192".to_string()),
                max_tokens: None,
            },
        );
        cfg.llm.models.insert("groq".to_string(), models);
        assert_eq!(resolve_model_identifier(&cfg).unwrap(), "llama3-8b-8192");
    }

    #[test]
    fn test_mapped_model_without_identifier_fails() {
        let mut cfg = cfg_for("groq", "llama3");
        let mut models = HashMap::new();
        models.insert("llama3".to_string(), ModelEntry::default());
        cfg.llm.models.insert("groq".to_string(), models);
        assert!(matches!(
            resolve_model_identifier(&cfg),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let cfg = cfg_for("ollama", "llama3");
        let client = create_llm_with_env(&cfg, no_env).unwrap();
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn test_ollama_rejects_malformed_base_url() {
        let mut cfg = cfg_for("ollama", "llama3");
        cfg.llm.base_url = Some("not a url".to_string());
        let err = create_llm_with_env(&cfg, no_env).err().unwrap();
        assert!(matches!(err, LlmError::Config(ref m) if m.contains("base_url")));
    }

    #[test]
    fn test_mock_provider() {
        let cfg = cfg_for("mock", "");
        let client = create_llm_with_env(&cfg, no_env).unwrap();
        assert_eq!(client.name(), "mock");
    }
}
