//! LLM 层：消息类型、Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、注册表、指数退避调度

pub mod action;
pub mod backoff;
pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod request;
pub mod traits;
pub mod types;

pub use action::ChatAction;
pub use backoff::execute;
pub use deepseek::{create_deepseek_provider, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::MockProvider;
pub use openai::{OpenAiProvider, OpenAiSettings};
pub use registry::{build_provider, build_providers, ProviderConfig, ProviderKind};
pub use request::RequestOptions;
pub use traits::Provider;
pub use types::{
    ChatCompletion, ChatMessage, Choice, MessageContent, Role, Tool, ToolCall, ToolFunction, Usage,
};
