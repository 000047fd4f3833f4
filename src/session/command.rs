//! 命令描述文件
//!
//! ```json
//! {"type": "browser", "name": "open_web_page", "params": {"url": "https://..."}, "settings": {...}}
//! {"type": "browser", "command_list": [{"command_name": "save_html", "params": {...}}], "settings": {...}}
//! {"type": "llm", "params": {"messages": [...], "tools": [...], "tool_choice": "auto"}, "settings": {"providers": [...]}}
//! {"type": "exit"}
//! ```
//!
//! 带 `command_list` 的浏览器命令只执行最后一项。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EngineError;
use crate::llm::{ChatMessage, ProviderConfig, RequestOptions, Tool};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandDescriptor {
    Browser(BrowserDescriptor),
    Llm(LlmDescriptor),
    Exit(ExitDescriptor),
}

impl CommandDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandDescriptor::Browser(_) => "browser",
            CommandDescriptor::Llm(_) => "llm",
            CommandDescriptor::Exit(_) => "exit",
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// 命令级设置；未给出的字段回落到应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeout_seconds: Option<u16>,
    pub headless: bool,
    pub max_tokens: Option<i32>,
    pub try_limit: Option<i16>,
    pub providers: Vec<ProviderConfig>,
}

impl Settings {
    /// 去掉 provider 凭据后的副本，用于写入结果
    pub fn redacted(&self) -> Self {
        Self {
            providers: self.providers.iter().map(|p| p.redacted()).collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserStep {
    pub command_name: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub command_list: Vec<BrowserStep>,
    #[serde(default)]
    pub settings: Settings,
}

impl BrowserDescriptor {
    /// 要执行的命令名与参数
    pub fn step(&self) -> Result<(&str, &Value), EngineError> {
        if let Some(last) = self.command_list.last() {
            return Ok((last.command_name.as_str(), &last.params));
        }
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Ok((name, &self.params)),
            _ => Err(EngineError::InvalidCommand(
                "browser command requires a name or a non-empty command_list".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmParams {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
    /// "auto" / "none" 或指定函数的对象，校验由 provider 完成
    #[serde(default)]
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: LlmParams,
    #[serde(default)]
    pub settings: Settings,
}

impl LlmDescriptor {
    /// 下发给每个 provider 的请求选项
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            max_tokens: self.settings.max_tokens,
            tools: self.params.tools.clone(),
            tool_choice: self.params.tool_choice.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExitDescriptor {
    #[serde(default)]
    pub name: Option<String>,
}
