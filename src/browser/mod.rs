//! 浏览器命令：解析、执行器抽象与无 Chrome 时的降级实现
//!
//! 会话循环只依赖 `BrowserExecutor`：给定命令名与参数，返回一个可交给
//! `perform_action` 的 Action。真实实现见 `chrome`（feature "browser"）。

pub mod commands;
#[cfg(feature = "browser")]
pub mod chrome;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::{Action, EngineError, FnAction, Job};

#[cfg(feature = "browser")]
pub use chrome::ChromeExecutor;
pub use commands::{parse_command, BrowserCommand, QueryType, SUPPORTED_COMMANDS};

/// 把浏览器命令转换为 Action；解析或校验失败时返回 InvalidCommand
pub trait BrowserExecutor: Send + Sync {
    fn add_operation(
        &self,
        params: &Value,
        command_name: &str,
        session_path: &Path,
        job: &Job,
    ) -> Result<Arc<dyn Action>, EngineError>;
}

/// 未编译 Chrome 支持时的执行器：只执行 sleep，其余命令报错
#[derive(Debug, Default)]
pub struct DisabledBrowser;

impl BrowserExecutor for DisabledBrowser {
    fn add_operation(
        &self,
        params: &Value,
        command_name: &str,
        session_path: &Path,
        _job: &Job,
    ) -> Result<Arc<dyn Action>, EngineError> {
        match parse_command(params, command_name, session_path)? {
            BrowserCommand::Sleep { ms } => Ok(sleep_action(ms)),
            _ => Err(EngineError::InvalidCommand(format!(
                "{command_name} requires browser support, rebuild with --features browser"
            ))),
        }
    }
}

pub(crate) fn sleep_action(ms: u64) -> Arc<dyn Action> {
    Arc::new(FnAction::new("sleep", move || async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }))
}

/// 按编译特性选择默认执行器
pub fn default_executor(headless: bool) -> Arc<dyn BrowserExecutor> {
    #[cfg(feature = "browser")]
    {
        Arc::new(ChromeExecutor::new(headless))
    }
    #[cfg(not(feature = "browser"))]
    {
        tracing::debug!(headless, "browser feature disabled, using sleep-only executor");
        Arc::new(DisabledBrowser)
    }
}
