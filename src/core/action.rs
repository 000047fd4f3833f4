//! Action：可在截止时间内执行、返回类型化错误的单元
//!
//! 浏览器步骤与 LLM 请求都实现该 trait；闭包可通过 `FnAction` 包装。

use std::future::Future;

use async_trait::async_trait;

use crate::core::EngineError;

#[async_trait]
pub trait Action: Send + Sync {
    /// 用于日志的名称
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), EngineError>;
}

/// 由闭包构造的 Action，每次 run 调用闭包生成新的 future
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F> {
    pub fn new<Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), EngineError>> + Send,
    {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), EngineError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), EngineError> {
        (self.f)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_action_runs_closure() {
        let action = FnAction::new("noop", || async { Ok(()) });
        assert_eq!(action.name(), "noop");
        assert!(action.run().await.is_ok());

        let failing = FnAction::new("fail", || async {
            Err(EngineError::Standard("boom".into()))
        });
        assert_eq!(failing.run().await.unwrap_err().to_string(), "boom");
    }
}
