//! LLM Provider 抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 Provider：validate 校验消息序列，
//! request 发起一次非流式请求。错误只有两类：RateLimit（可重试）与 Standard（立即失败）。

use async_trait::async_trait;

use crate::core::ProviderError;
use crate::llm::{ChatCompletion, ChatMessage, Role};

#[async_trait]
pub trait Provider: Send + Sync {
    /// 用于日志的后端名称
    fn name(&self) -> &str;

    /// 校验消息序列是否可被该后端接受
    fn validate(&self, messages: &[ChatMessage]) -> Result<(), ProviderError>;

    /// 发起一次请求；超时由调用方（退避调度器）控制
    async fn request(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError>;
}

/// 通用消息校验：角色与内容形态匹配，最后一条必须是 user
pub fn validate_messages(messages: &[ChatMessage], multimodal: bool) -> Result<(), ProviderError> {
    let last = messages
        .last()
        .ok_or_else(|| ProviderError::standard("message history is empty"))?;
    if last.role != Role::User {
        return Err(ProviderError::standard("last message is not a user message"));
    }

    for (i, message) in messages.iter().enumerate() {
        let is_parts = message
            .content
            .as_ref()
            .map(|c| c.is_multimodal())
            .unwrap_or(false);

        match message.role {
            Role::System | Role::User => {
                if message.content.is_none() {
                    return Err(ProviderError::standard(format!(
                        "message {i} ({}) has no content",
                        message.role.as_str()
                    )));
                }
                if is_parts && message.role != Role::User {
                    return Err(ProviderError::standard(format!(
                        "message {i}: only user messages may be multimodal"
                    )));
                }
                if is_parts && !multimodal {
                    return Err(ProviderError::standard(format!(
                        "message {i}: model does not accept multimodal content"
                    )));
                }
            }
            Role::Assistant => {
                if message.content.is_none() && message.tool_calls.is_none() {
                    return Err(ProviderError::standard(format!(
                        "message {i}: assistant message needs content or tool_calls"
                    )));
                }
            }
            Role::Tool => {
                if message.tool_call_id.is_none() {
                    return Err(ProviderError::standard(format!(
                        "message {i}: tool message is missing tool_call_id"
                    )));
                }
            }
        }
    }

    Ok(())
}
