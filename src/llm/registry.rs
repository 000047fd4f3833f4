//! Provider 注册表：按 `name` 字段把不透明的 provider 配置解析为具体后端
//!
//! name 不区分大小写：openai / deepseek / mock。写出结果前通过 `redacted` 去掉凭据字段。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ProviderError;
use crate::llm::deepseek::{create_deepseek_provider, DeepSeekSettings};
use crate::llm::openai::{OpenAiProvider, OpenAiSettings};
use crate::llm::request::RequestOptions;
use crate::llm::{MockProvider, Provider};

/// 一个 provider 的原始配置（至少包含 name）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfig(pub Map<String, Value>);

impl ProviderConfig {
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ProviderError::standard(format!(
                "provider settings must be an object, found {other}"
            ))),
        }
    }

    pub fn name(&self) -> Result<&str, ProviderError> {
        match self.0.get("name") {
            None => Err(ProviderError::standard(
                "parameter name was not found in llm settings, name distinguishes \
                 what family of LLM's you are using, i.e: openai, deepseek",
            )),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(ProviderError::standard(
                "parameter name in llm settings must be of type string",
            )),
        }
    }

    /// 去掉凭据字段后的副本
    pub fn redacted(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !is_credential_key(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// 字段名是否可能承载凭据
pub fn is_credential_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["key", "secret", "token", "password"]
        .iter()
        .any(|marker| key.contains(marker))
        // max_tokens 是采样参数而不是凭据
        && key != "max_tokens"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Mock,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "mock" => Ok(Self::Mock),
            _ => Err(ProviderError::standard(format!(
                "{name} is not a supported llm"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Mock => "mock",
        };
        write!(f, "{s}")
    }
}

fn settings_from<T: serde::de::DeserializeOwned>(
    kind: ProviderKind,
    config: &ProviderConfig,
) -> Result<T, ProviderError> {
    serde_json::from_value(Value::Object(config.0.clone()))
        .map_err(|e| ProviderError::standard(format!("invalid {kind} settings: {e}")))
}

/// 解析单个 provider 配置；options 来自命令本身，对每个后端相同
pub fn build_provider(
    config: &ProviderConfig,
    options: &RequestOptions,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let kind = ProviderKind::parse(config.name()?)?;

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::OpenAi => {
            let settings: OpenAiSettings = settings_from(kind, config)?;
            settings.validate()?;
            Arc::new(OpenAiProvider::new("openai", settings, options.clone()))
        }
        ProviderKind::DeepSeek => {
            let settings: DeepSeekSettings = settings_from(kind, config)?;
            Arc::new(create_deepseek_provider(settings, options.clone())?)
        }
        ProviderKind::Mock => Arc::new(MockProvider::new(options.clone())),
    };

    Ok(provider)
}

/// 按配置顺序解析全部 provider；任何一个无效都视为命令错误
pub fn build_providers(
    configs: &[ProviderConfig],
    options: &RequestOptions,
) -> Result<Vec<Arc<dyn Provider>>, ProviderError> {
    if configs.is_empty() {
        return Err(ProviderError::standard("no llm providers configured"));
    }
    configs
        .iter()
        .map(|c| build_provider(c, options))
        .collect()
}
