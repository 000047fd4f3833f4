//! 带截止时间的 Action 运行器
//!
//! Action 在独立任务中执行，与计时器竞速（仅在设置了 deadline 时）；
//! Action 先完成且成功时，再等待其 Job 的完成屏障。计时器先到则返回 Timeout，
//! 并中止 Action 所在任务，迟到的结果被丢弃。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{Action, EngineError, Job};

/// 执行单个 Action；`deadline_ms` 为 None 时不设超时
pub async fn perform_action(
    action: Arc<dyn Action>,
    job: &Job,
    deadline_ms: Option<u64>,
) -> Result<(), EngineError> {
    let start = Instant::now();
    let name = action.name().to_string();
    let mut handle = tokio::spawn(async move { action.run().await });

    let joined = match deadline_ms {
        Some(ms) => {
            tokio::select! {
                joined = &mut handle => joined,
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                    handle.abort();
                    tracing::warn!(
                        action = %name,
                        deadline_ms = ms,
                        abandoned_writes = job.pending(),
                        "action deadline exceeded"
                    );
                    return Err(EngineError::command_timeout());
                }
            }
        }
        None => (&mut handle).await,
    };

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::info!(action = %name, error = %e, "action failed");
            return Err(e);
        }
        Err(join_err) => {
            return Err(EngineError::Standard(format!(
                "action {name} did not complete: {join_err}"
            )));
        }
    }

    job.wait().await?;
    tracing::debug!(
        action = %name,
        duration_ms = start.elapsed().as_millis() as u64,
        "action complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FnAction;

    #[tokio::test]
    async fn test_fast_failure_is_not_a_timeout() {
        let action = Arc::new(FnAction::new("fail", || async {
            Err(EngineError::Standard("action failed".into()))
        }));
        let err = perform_action(action, &Job::new(), Some(100)).await.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "action failed");
    }

    #[tokio::test]
    async fn test_never_completing_action_times_out() {
        let action = Arc::new(FnAction::new("hang", || async {
            futures_util::future::pending::<()>().await;
            Ok(())
        }));
        let start = Instant::now();
        let err = perform_action(action, &Job::new(), Some(50)).await.unwrap_err();
        let elapsed = start.elapsed();
        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_success_waits_for_background_writes() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::new();
        let target = dir.path().join("out.txt");

        let writer_job = job.clone();
        let writer_target = target.clone();
        let action = Arc::new(FnAction::new("write", move || {
            let job = writer_job.clone();
            let target = writer_target.clone();
            async move {
                job.write_bytes(b"payload".to_vec(), target);
                Ok(())
            }
        }));

        perform_action(action, &job, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_background_write_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let job = Job::new();
        let writer_job = job.clone();
        let bad = blocker.join("out.txt");
        let action = Arc::new(FnAction::new("write", move || {
            let job = writer_job.clone();
            let bad = bad.clone();
            async move {
                job.write_bytes(b"payload".to_vec(), bad);
                Ok(())
            }
        }));

        let err = perform_action(action, &job, Some(1_000)).await.unwrap_err();
        assert!(matches!(err, EngineError::Filesystem(_)));
    }
}
