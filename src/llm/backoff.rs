//! 指数退避 + 多 Provider 故障转移
//!
//! 外层遍历 provider，内层为尝试次数（首次请求 + `try_limit` 次重试）。
//! - 单次尝试超时：放弃本次，继续同一 provider 的下一次尝试
//! - RateLimit：若不是最后一次，睡眠 2^exp 秒（exp 从 2 开始，每次 +1）后重试
//! - Standard：立即返回，不再尝试任何 provider
//! - 成功：立即返回
//!
//! 全部组合失败时返回 BackoffExhausted。任意时刻只有一个尝试在进行。
//!
//! 注意：`try_limit` 是重试预算而不是尝试次数。每个 provider 最多尝试 `try_limit + 1` 次，
//! 因此 `try_limit = 2` 且持续限流时依次睡眠 2^2、2^3 秒；最后一次尝试之后不再睡眠。
//! 负值按 0 处理（只尝试一次）。

use std::sync::Arc;
use std::time::Duration;

use crate::core::{EngineError, ProviderError};
use crate::llm::{ChatCompletion, ChatMessage, Provider};

/// 每个 provider 的初始指数（首次睡眠 2^2 = 4 秒）
pub const INITIAL_EXPONENT: f64 = 2.0;

/// 第 n 次限流后的睡眠时长
pub fn backoff_delay(exponent: f64) -> Duration {
    Duration::from_secs_f64(2f64.powf(exponent))
}

/// 依次在各 provider 上执行请求，带限流退避与单次超时
pub async fn execute(
    providers: &[Arc<dyn Provider>],
    request: &[ChatMessage],
    try_limit: i16,
    per_attempt_timeout: Option<Duration>,
) -> Result<ChatCompletion, EngineError> {
    let attempts = u32::from(try_limit.max(0).unsigned_abs()) + 1;

    for provider in providers {
        let mut exponent = INITIAL_EXPONENT;

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;

            let outcome = match per_attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, provider.request(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(
                            provider = provider.name(),
                            attempt,
                            timeout_ms = limit.as_millis() as u64,
                            "failed to complete request in allocated duration"
                        );
                        continue;
                    }
                },
                None => provider.request(request).await,
            };

            match outcome {
                Ok(completion) => {
                    tracing::info!(provider = provider.name(), attempt, "llm request succeeded");
                    return Ok(completion);
                }
                Err(ProviderError::RateLimit(msg)) => {
                    if is_last {
                        tracing::warn!(provider = provider.name(), %msg, "rate limit hit on last attempt");
                    } else {
                        let delay = backoff_delay(exponent);
                        tracing::warn!(
                            provider = provider.name(),
                            attempt,
                            delay_secs = delay.as_secs(),
                            %msg,
                            "rate limit hit, sleeping"
                        );
                        tokio::time::sleep(delay).await;
                        exponent += 1.0;
                    }
                }
                Err(ProviderError::Standard(msg)) => {
                    tracing::info!(provider = provider.name(), %msg, "llm request failed");
                    return Err(EngineError::Standard(msg));
                }
            }
        }

        tracing::warn!(provider = provider.name(), "provider exhausted, trying next");
    }

    Err(EngineError::BackoffExhausted)
}
