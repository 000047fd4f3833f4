//! 每次请求的附加选项：max_tokens、tools 与 tool_choice
//!
//! 这些字段来自命令本身而不是 provider 配置，故由注册表统一下发给各后端。

use serde_json::Value;

use crate::core::ProviderError;
use crate::llm::types::Tool;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub max_tokens: Option<i32>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<Value>,
}

impl RequestOptions {
    pub fn with_max_tokens(max_tokens: Option<i32>) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }

    /// `function_calling` 为 false 的后端不接受任何 tools
    pub fn validate(&self, function_calling: bool) -> Result<(), ProviderError> {
        if let Some(tools) = &self.tools {
            validate_tools(tools, function_calling)?;
        }
        if let Some(choice) = &self.tool_choice {
            validate_tool_choice(choice)?;
        }
        Ok(())
    }

    /// tool_choice 指定的函数名（`{"type": "function", "function": {"name": ...}}`）
    pub fn forced_function(&self) -> Option<&str> {
        self.tool_choice
            .as_ref()?
            .get("function")?
            .get("name")?
            .as_str()
    }
}

pub fn validate_tools(tools: &[Tool], function_calling: bool) -> Result<(), ProviderError> {
    for tool in tools {
        if tool.kind != "function" {
            return Err(ProviderError::standard(format!(
                "tool can be only type function, found {}",
                tool.kind
            )));
        }
        if !function_calling {
            return Err(ProviderError::standard("engine is not function call capable"));
        }
    }
    Ok(())
}

/// tool_choice 可以是 "auto" / "none"，或 `{"type": "function", "function": {"name": ...}}`
pub fn validate_tool_choice(choice: &Value) -> Result<(), ProviderError> {
    let map = match choice {
        Value::String(s) if s == "auto" || s == "none" => return Ok(()),
        Value::String(s) => {
            return Err(ProviderError::standard(format!(
                "tool choice must be auto or none found {s}"
            )))
        }
        Value::Object(map) => map,
        _ => {
            return Err(ProviderError::standard(
                "tool choice must be either a string or map",
            ))
        }
    };

    let kind = map
        .get("type")
        .ok_or_else(|| ProviderError::standard("tool choice map missing type key"))?
        .as_str()
        .ok_or_else(|| ProviderError::standard("type must be a string"))?;
    if kind != "function" {
        return Err(ProviderError::standard(format!(
            "tool choice type must be function found {kind}"
        )));
    }

    let definition = map
        .get(kind)
        .ok_or_else(|| ProviderError::standard("tool choice is missing function definition object"))?
        .as_object()
        .ok_or_else(|| ProviderError::standard("definition must be of type object"))?;
    if !definition.get("name").is_some_and(Value::is_string) {
        return Err(ProviderError::standard("missing function name"));
    }
    Ok(())
}
