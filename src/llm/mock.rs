//! Mock provider（用于测试与离线运行，无需 API）
//!
//! 取最后一条 user 消息，回显为 assistant 内容；tool_choice 指定了函数时改为返回该函数的调用，
//! 参数为 `{"input": <最后一条 user 消息>}`。

use async_trait::async_trait;

use crate::core::ProviderError;
use crate::llm::traits::validate_messages;
use crate::llm::request::RequestOptions;
use crate::llm::types::{Choice, CompletionMessage, FunctionCall, ToolCall, Usage};
use crate::llm::{ChatCompletion, ChatMessage, Provider, Role};

pub const MOCK_MODEL: &str = "mock-echo";

#[derive(Debug, Default)]
pub struct MockProvider {
    options: RequestOptions,
}

impl MockProvider {
    pub fn new(options: RequestOptions) -> Self {
        Self { options }
    }

    fn message_for(&self, last_user: &str) -> (CompletionMessage, &'static str) {
        match self.options.forced_function() {
            Some(name) => {
                let call = ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: serde_json::json!({ "input": last_user }).to_string(),
                    },
                };
                let message = CompletionMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![call]),
                };
                (message, "tool_calls")
            }
            None => {
                let message = CompletionMessage {
                    role: "assistant".to_string(),
                    content: Some(format!("Echo from Mock: {last_user}")),
                    tool_calls: None,
                };
                (message, "stop")
            }
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate(&self, messages: &[ChatMessage]) -> Result<(), ProviderError> {
        self.options.validate(true)?;
        validate_messages(messages, true)
    }

    async fn request(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError> {
        self.validate(messages)?;

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_else(|| "(no input)".to_string());

        let prompt_tokens = messages
            .iter()
            .map(|m| m.text().split_whitespace().count() as u32)
            .sum();
        let (message, finish_reason) = self.message_for(&last_user);
        let completion_tokens = message
            .content
            .as_deref()
            .map(|c| c.split_whitespace().count() as u32)
            .unwrap_or(1);

        Ok(ChatCompletion {
            id: format!("mock-{}", uuid::Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: MOCK_MODEL.to_string(),
            choices: vec![Choice {
                index: 0,
                finish_reason: Some(finish_reason.to_string()),
                message,
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
