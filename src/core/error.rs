//! 引擎错误分类
//!
//! 会话循环、运行器与退避调度器统一使用 EngineError；Provider 适配器只返回 ProviderError
//! （RateLimit / Standard），由调度器决定重试还是立即失败。

use thiserror::Error;

/// 执行引擎中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    /// 收件箱不可读、结果写入失败等
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// 命令描述文件无法解析
    #[error("parse error: {0}")]
    Parse(String),

    /// Action 或单次 LLM 请求超过截止时间
    #[error("{0}")]
    Timeout(String),

    #[error("rate limit: {0}")]
    RateLimit(String),

    #[error("{0}")]
    Standard(String),

    /// 所有 provider 与尝试均失败
    #[error("all backoff attempts failed")]
    BackoffExhausted,

    /// 浏览器 / LLM 命令参数校验失败或命令名不受支持
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl EngineError {
    pub fn filesystem(context: &str, err: std::io::Error) -> Self {
        Self::Filesystem(format!("{context}: {err}"))
    }

    pub fn command_timeout() -> Self {
        Self::Timeout("command context deadline exceeded".to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimit(msg) => EngineError::RateLimit(msg),
            ProviderError::Standard(msg) => EngineError::Standard(msg),
        }
    }
}

/// Provider 适配器返回的错误：限流可重试，其余为标准错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate-limit: {0}")]
    RateLimit(String),

    #[error("standard: {0}")]
    Standard(String),
}

impl ProviderError {
    pub fn standard(msg: impl Into<String>) -> Self {
        Self::Standard(msg.into())
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit(msg.into())
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(_))
    }
}
