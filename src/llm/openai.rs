//! OpenAI 兼容 API 适配器
//!
//! 直接通过 reqwest POST `{base_url}/chat/completions`，以便按 HTTP 状态码区分限流：
//! 429 → RateLimit，其余非 200 → Standard（携带 API 返回的错误信息）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ProviderError;
use crate::llm::request::RequestOptions;
use crate::llm::traits::validate_messages;
use crate::llm::types::Tool;
use crate::llm::{ChatCompletion, ChatMessage, Provider, Role};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// provider 配置中 openai 族的字段
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// 模型是否接受图片等多模态内容
    #[serde(default)]
    pub multimodal: bool,
    /// 模型是否支持 tools / tool 消息
    #[serde(default = "default_function_calling")]
    pub function_calling: bool,
}

fn default_function_calling() -> bool {
    true
}

impl OpenAiSettings {
    /// 采样参数范围校验
    pub fn validate(&self) -> Result<(), ProviderError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top p", self.top_p, 0.0, 1.0)?;
        check_range("frequency penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence penalty", self.presence_penalty, -2.0, 2.0)?;
        if self.model.trim().is_empty() {
            return Err(ProviderError::standard("model cannot be empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::standard("api_key cannot be empty"));
        }
        Ok(())
    }
}

fn check_range(field: &str, value: Option<f32>, low: f32, high: f32) -> Result<(), ProviderError> {
    match value {
        Some(v) if !(low..=high).contains(&v) => Err(ProviderError::standard(format!(
            "{field} must be between {low:.1} and {high:.1} got {v}"
        ))),
        _ => Ok(()),
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a Value>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// OpenAI 兼容客户端：持有 reqwest Client、端点与采样参数
pub struct OpenAiProvider {
    label: String,
    client: reqwest::Client,
    endpoint: String,
    settings: OpenAiSettings,
    options: RequestOptions,
}

impl OpenAiProvider {
    pub fn new(label: &str, settings: OpenAiSettings, options: RequestOptions) -> Self {
        let base = settings
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        let endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));
        Self {
            label: label.to_string(),
            client: reqwest::Client::new(),
            endpoint,
            settings,
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<'a>(&'a self, messages: &'a [ChatMessage]) -> RequestBody<'a> {
        RequestBody {
            model: &self.settings.model,
            messages,
            max_tokens: self.options.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            frequency_penalty: self.settings.frequency_penalty,
            presence_penalty: self.settings.presence_penalty,
            tools: self.options.tools.as_deref(),
            tool_choice: self.options.tool_choice.as_ref(),
        }
    }
}

/// 将非 200 响应映射为 ProviderError
fn classify_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());
    let message = if message.is_empty() {
        format!("request failed with status {status}")
    } else {
        message
    };

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimit(message)
    } else {
        ProviderError::Standard(message)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn validate(&self, messages: &[ChatMessage]) -> Result<(), ProviderError> {
        self.settings.validate()?;
        self.options.validate(self.settings.function_calling)?;
        if !self.settings.function_calling && messages.iter().any(|m| m.role == Role::Tool) {
            return Err(ProviderError::standard(
                "tool messages require a function call capable model",
            ));
        }
        validate_messages(messages, self.settings.multimodal)
    }

    async fn request(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError> {
        self.validate(messages)?;

        let body = self.body(messages);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::standard(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::standard(e.to_string()))?;

        if status == reqwest::StatusCode::OK {
            serde_json::from_str(&text).map_err(|e| ProviderError::standard(e.to_string()))
        } else {
            Err(classify_error(status, &text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OpenAiSettings {
        serde_json::from_value(serde_json::json!({
            "api_key": "sk-test",
            "model": "gpt-4o",
            "temperature": 1.0
        }))
        .unwrap()
    }

    #[test]
    fn test_settings_require_key_and_model() {
        let missing_key = serde_json::from_value::<OpenAiSettings>(serde_json::json!({
            "model": "gpt-4o"
        }));
        assert!(missing_key.is_err());

        let missing_model = serde_json::from_value::<OpenAiSettings>(serde_json::json!({
            "api_key": "sk-test"
        }));
        assert!(missing_model.is_err());

        assert!(settings().validate().is_ok());
    }

    #[test]
    fn test_sampling_ranges() {
        let mut s = settings();
        s.temperature = Some(2.5);
        assert!(s.validate().is_err());

        let mut s = settings();
        s.top_p = Some(1.5);
        assert!(s.validate().is_err());

        let mut s = settings();
        s.presence_penalty = Some(-2.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_classify_error_by_status() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        assert_eq!(
            classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body),
            ProviderError::rate_limit("Rate limit reached")
        );
        assert_eq!(
            classify_error(reqwest::StatusCode::BAD_REQUEST, body),
            ProviderError::standard("Rate limit reached")
        );
        assert!(matches!(
            classify_error(reqwest::StatusCode::BAD_GATEWAY, ""),
            ProviderError::Standard(ref m) if m.contains("502")
        ));
    }

    #[test]
    fn test_endpoint_respects_base_url() {
        let mut s = settings();
        s.base_url = Some("http://localhost:8080/v1/".into());
        let provider = OpenAiProvider::new("openai", s, RequestOptions::with_max_tokens(Some(256)));
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(provider.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_request_rejects_non_user_last_message() {
        let provider = OpenAiProvider::new("openai", settings(), RequestOptions::default());
        let err = provider
            .request(&[ChatMessage::assistant("hi")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::standard("last message is not a user message")
        );
    }

    fn tools_options() -> RequestOptions {
        RequestOptions {
            max_tokens: Some(32),
            tools: Some(vec![serde_json::from_value(serde_json::json!({
                "type": "function",
                "function": {
                    "name": "lookup",
                    "description": "find a record",
                    "parameters": {"type": "object", "properties": {}}
                }
            }))
            .unwrap()]),
            tool_choice: Some(serde_json::json!({"type": "function", "function": {"name": "lookup"}})),
        }
    }

    #[test]
    fn test_body_carries_tools_and_choice() {
        let provider = OpenAiProvider::new("openai", settings(), tools_options());
        let messages = [ChatMessage::user("find it")];
        let body = serde_json::to_value(provider.body(&messages)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 32);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["tools"][0]["function"]["description"], "find a record");
        assert_eq!(body["tool_choice"]["function"]["name"], "lookup");
    }

    #[test]
    fn test_body_omits_unset_fields() {
        let provider = OpenAiProvider::new("openai", settings(), RequestOptions::default());
        let messages = [ChatMessage::user("hi")];
        let body = serde_json::to_value(provider.body(&messages)).unwrap();
        let object = body.as_object().unwrap();
        for key in ["tools", "tool_choice", "max_tokens", "top_p"] {
            assert!(!object.contains_key(key), "{key} should be omitted");
        }
    }

    #[test]
    fn test_tools_need_function_calling_model() {
        let mut s = settings();
        s.function_calling = false;
        let provider = OpenAiProvider::new("openai", s, tools_options());
        let err = provider.validate(&[ChatMessage::user("hi")]).unwrap_err();
        assert_eq!(err, ProviderError::standard("engine is not function call capable"));

        let mut tool = ChatMessage::user("42");
        tool.role = Role::Tool;
        tool.tool_call_id = Some("call_1".into());
        let mut s = settings();
        s.function_calling = false;
        let plain = OpenAiProvider::new("openai", s, RequestOptions::default());
        assert!(plain.validate(&[tool, ChatMessage::user("next")]).is_err());
    }
}
