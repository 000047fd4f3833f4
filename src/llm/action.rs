//! ChatAction：把一次带退避的 LLM 请求包装成 Action
//!
//! 成功后 completion 暂存在 action 内，由会话循环取出并写入 completion.json。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Action, EngineError};
use crate::llm::{backoff, ChatCompletion, ChatMessage, Provider};

pub struct ChatAction {
    providers: Vec<Arc<dyn Provider>>,
    messages: Vec<ChatMessage>,
    try_limit: i16,
    per_attempt_timeout: Option<Duration>,
    completion: Mutex<Option<ChatCompletion>>,
}

impl ChatAction {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        messages: Vec<ChatMessage>,
        try_limit: i16,
        per_attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            providers,
            messages,
            try_limit,
            per_attempt_timeout,
            completion: Mutex::new(None),
        }
    }

    /// 取出成功的 completion；未运行或失败时为 None
    pub fn take_completion(&self) -> Option<ChatCompletion> {
        self.completion.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl Action for ChatAction {
    fn name(&self) -> &str {
        "llm_request"
    }

    async fn run(&self) -> Result<(), EngineError> {
        let completion = backoff::execute(
            &self.providers,
            &self.messages,
            self.try_limit,
            self.per_attempt_timeout,
        )
        .await?;

        let mut slot = self
            .completion
            .lock()
            .map_err(|_| EngineError::Standard("completion slot poisoned".to_string()))?;
        *slot = Some(completion);
        Ok(())
    }
}
