//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 触发取消令牌，会话循环在下一次检查点转入 Terminating，
//! exit.txt 仍然只写一次。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::SIGNAL_REASON;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    /// 第一个关闭原因
    reason: Arc<Mutex<Option<String>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// 获取关闭 token（用于取消正在进行的会话）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭；只保留第一个原因
    pub fn shutdown(&self, reason: impl Into<String>) {
        if let Ok(mut guard) = self.reason.lock() {
            if guard.is_none() {
                *guard = Some(reason.into());
            }
        }
        self.shutdown_token.cancel();
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|g| g.clone())
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, terminating session...");
                manager.shutdown(SIGNAL_REASON);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, terminating session...");
                    manager.shutdown(SIGNAL_REASON);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
