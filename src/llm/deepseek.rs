//! DeepSeek provider（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use serde::Deserialize;

use crate::core::ProviderError;
use crate::llm::openai::{OpenAiProvider, OpenAiSettings};
use crate::llm::request::RequestOptions;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// deepseek 配置：api_key 与 model 均可省略
#[derive(Debug, Clone, Deserialize)]
pub struct DeepSeekSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

/// 创建 DeepSeek provider
///
/// - api_key 缺省时使用环境变量 `DEEPSEEK_API_KEY`
/// - model 缺省时使用 `DEEPSEEK_MODEL` 环境变量，再退回 `deepseek-chat`
/// - deepseek-reasoner 不支持 tools
pub fn create_deepseek_provider(
    settings: DeepSeekSettings,
    options: RequestOptions,
) -> Result<OpenAiProvider, ProviderError> {
    let api_key = settings
        .api_key
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .ok_or_else(|| ProviderError::standard("deepseek provider requires api_key"))?;

    let model = settings
        .model
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    let openai = OpenAiSettings {
        api_key,
        base_url: Some(
            settings
                .base_url
                .unwrap_or_else(|| DEEPSEEK_BASE_URL.to_string()),
        ),
        temperature: settings.temperature,
        top_p: settings.top_p,
        frequency_penalty: None,
        presence_penalty: None,
        multimodal: false,
        function_calling: model != DEEPSEEK_REASONER,
        model,
    };
    openai.validate()?;

    Ok(OpenAiProvider::new("deepseek", openai, options))
}
