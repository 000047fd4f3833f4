//! Job：Action 的后台写入与完成屏障
//!
//! Action 运行期间通过 `write_bytes` 把结果文件交给后台任务写盘；调用方在 Action 成功后
//! `wait()`，等待本批所有写入结束。第一个错误胜出，其余错误被读出丢弃，生产者永不阻塞。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::core::EngineError;

/// 后台写入任务集合：计数由 TaskTracker 维护，错误经无界通道汇入
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

struct JobInner {
    tracker: TaskTracker,
    err_tx: mpsc::UnboundedSender<EngineError>,
    err_rx: Mutex<mpsc::UnboundedReceiver<EngineError>>,
}

impl Job {
    pub fn new() -> Self {
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(JobInner {
                tracker: TaskTracker::new(),
                err_tx,
                err_rx: Mutex::new(err_rx),
            }),
        }
    }

    /// 后台写文件；父目录不存在时一并创建
    pub fn write_bytes(&self, bytes: Vec<u8>, path: impl Into<PathBuf>) {
        let path = path.into();
        let err_tx = self.inner.err_tx.clone();
        self.inner.tracker.spawn(async move {
            let result = async {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, bytes).await
            }
            .await;

            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "background write failed");
                let _ = err_tx.send(EngineError::filesystem(
                    &format!("write {}", path.display()),
                    e,
                ));
            }
        });
    }

    /// 当前尚未完成的后台任务数
    pub fn pending(&self) -> usize {
        self.inner.tracker.len()
    }

    /// 完成屏障：等待所有已调度写入结束，返回第一个错误
    pub async fn wait(&self) -> Result<(), EngineError> {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        // 允许屏障之后继续调度（同一 Job 可能被多个 Action 复用）
        self.inner.tracker.reopen();

        let mut rx = self
            .inner
            .err_rx
            .lock()
            .map_err(|_| EngineError::Standard("job error sink poisoned".to_string()))?;

        let mut first = None;
        while let Ok(err) = rx.try_recv() {
            if first.is_none() {
                first = Some(err);
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
