//! 会话主循环：扫描收件箱、逐条分发命令、写结果、终止时写 exit.txt
//!
//! 状态：Starting → Running → Terminating → Terminated。
//! 命令严格串行处理；命令级失败写 err.txt，扫描 / 解析 / 结果写入失败结束会话。

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::browser::BrowserExecutor;
use crate::config::AppConfig;
use crate::core::{
    perform_action, EngineError, Job, SessionPhase, SessionState, ShutdownManager,
    MANUAL_EXIT_REASON, SIGNAL_REASON,
};
use crate::inbox::{scan, ProcessedSet};
use crate::llm::{build_providers, ChatAction, ChatCompletion, ChatMessage};
use crate::observability::audit_command;
use crate::session::command::{BrowserDescriptor, CommandDescriptor, LlmDescriptor, Settings};
use crate::session::layout::{
    command_stem, end_session, write_outcome, Outcome, SessionPaths,
};

/// provider 超时字段的宽度限制
pub const MAX_LLM_TIMEOUT_SECONDS: u16 = i16::MAX as u16;

pub const BROWSER_SUCCESS: &str = "success";

/// completion.json 的内容
#[derive(Debug, Serialize)]
pub struct CompletionRecord {
    pub settings: Settings,
    pub completion: ChatCompletion,
    pub messages: Vec<ChatMessage>,
}

enum Stop {
    Deadline,
    Signal,
    Loop,
}

pub struct LiveSession {
    paths: SessionPaths,
    config: AppConfig,
    executor: Arc<dyn BrowserExecutor>,
    shutdown: ShutdownManager,
    processed: ProcessedSet,
    state: SessionState,
}

impl LiveSession {
    pub fn new(
        paths: SessionPaths,
        config: AppConfig,
        executor: Arc<dyn BrowserExecutor>,
        shutdown: ShutdownManager,
    ) -> Self {
        Self {
            paths,
            config,
            executor,
            shutdown,
            processed: ProcessedSet::new(),
            state: SessionState::new(),
        }
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn phase(&self) -> &SessionPhase {
        self.state.phase()
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// 运行到会话终止，返回写入 exit.txt 的原因
    pub async fn run(&mut self) -> Result<String, EngineError> {
        self.paths.create_live_folders().await?;
        self.state.start();

        let lifetime = Duration::from_secs(self.config.session.timeout_secs);
        tracing::info!(
            session = %self.paths.root().display(),
            timeout_secs = lifetime.as_secs(),
            "session started"
        );

        let stop = {
            let token = self.shutdown.token();
            tokio::select! {
                _ = tokio::time::sleep(lifetime) => Stop::Deadline,
                _ = token.cancelled() => Stop::Signal,
                _ = self.run_loop() => Stop::Loop,
            }
        };

        match stop {
            Stop::Deadline => tracing::info!("session deadline reached"),
            Stop::Signal => {
                let reason = self
                    .shutdown
                    .reason()
                    .unwrap_or_else(|| SIGNAL_REASON.to_string());
                self.state.terminate(reason);
            }
            Stop::Loop => {}
        }

        self.finish().await
    }

    async fn finish(&mut self) -> Result<String, EngineError> {
        let Some(reason) = self.state.finish() else {
            return Err(EngineError::Standard("session already terminated".to_string()));
        };
        end_session(&self.paths, &reason).await?;
        tracing::info!(reason = %reason, processed = self.processed.len(), "session terminated");
        Ok(reason)
    }

    async fn run_loop(&mut self) {
        let poll = Duration::from_millis(self.config.session.poll_interval_ms);
        while self.state.is_running() {
            if let Err(e) = self.scan_cycle().await {
                tracing::error!(error = %e, "session failed");
                self.state.terminate(e.to_string());
                break;
            }
            if !self.state.is_running() {
                break;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// 一轮扫描：按 mtime 顺序处理所有新命令
    async fn scan_cycle(&mut self) -> Result<(), EngineError> {
        let pending = scan(&self.paths.commands(), &self.processed).await?;
        for path in pending {
            let result = self.process(&path).await;
            self.processed.insert(path);
            result?;
            if !self.state.is_running() {
                break;
            }
        }
        Ok(())
    }

    async fn process(&mut self, path: &Path) -> Result<(), EngineError> {
        // 结果目录先于读取与解析创建
        let response_dir = self.paths.create_response_dir(path).await?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::filesystem(&format!("read {}", path.display()), e))?;
        let descriptor = CommandDescriptor::parse(&bytes)
            .map_err(|e| EngineError::Parse(format!("{}: {e}", path.display())))?;

        let name = command_stem(path);
        let kind = descriptor.kind();
        let start = Instant::now();
        tracing::info!(command = %name, kind, "dispatching command");

        let result = match descriptor {
            CommandDescriptor::Exit(_) => {
                self.state.terminate(MANUAL_EXIT_REASON);
                audit_command(&name, kind, true, "exit", 0);
                return Ok(());
            }
            CommandDescriptor::Browser(browser) => self.run_browser(&browser).await.map(|()| None),
            CommandDescriptor::Llm(llm) => self.run_llm(llm).await.map(Some),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => audit_command(&name, kind, true, "ok", duration_ms),
            Err(e) => {
                let label = if e.is_timeout() { "timeout" } else { "error" };
                tracing::warn!(command = %name, error = %e, "command failed");
                audit_command(&name, kind, false, label, duration_ms);
            }
        }

        let outcome = match &result {
            Ok(None) => Outcome::Success(BROWSER_SUCCESS),
            Ok(Some(record)) => Outcome::Completion(record),
            Err(e) => Outcome::Failed(e),
        };
        write_outcome(&response_dir, outcome).await
    }

    async fn run_browser(&self, browser: &BrowserDescriptor) -> Result<(), EngineError> {
        let (command_name, params) = browser.step()?;
        let job = Job::new();
        let action =
            self.executor
                .add_operation(params, command_name, self.paths.root(), &job)?;

        let deadline_ms = browser
            .settings
            .timeout_seconds
            .map(|s| u64::from(s) * 1000)
            .or(self.config.session.command_timeout_ms);
        perform_action(action, &job, deadline_ms).await
    }

    async fn run_llm(&self, llm: LlmDescriptor) -> Result<CompletionRecord, EngineError> {
        let options = llm.request_options();
        let LlmDescriptor {
            params, settings, ..
        } = llm;

        if let Some(t) = settings.timeout_seconds {
            if t > MAX_LLM_TIMEOUT_SECONDS {
                return Err(EngineError::InvalidCommand(format!(
                    "timeout_seconds must not exceed {MAX_LLM_TIMEOUT_SECONDS}, got {t}"
                )));
            }
        }

        let providers = build_providers(&settings.providers, &options)?;
        let try_limit = settings.try_limit.unwrap_or(self.config.llm.try_limit);
        let per_attempt = Duration::from_secs(
            settings
                .timeout_seconds
                .map(u64::from)
                .unwrap_or(self.config.llm.request_timeout_secs),
        );

        let mut messages = params.messages;
        let action = Arc::new(ChatAction::new(
            providers,
            messages.clone(),
            try_limit,
            Some(per_attempt),
        ));
        perform_action(action.clone(), &Job::new(), None).await?;

        let completion = action
            .take_completion()
            .ok_or_else(|| EngineError::Standard("llm request produced no completion".to_string()))?;
        let reply = completion
            .to_assistant_message()
            .ok_or_else(|| EngineError::Standard("completion has no choices".to_string()))?;
        messages.push(reply);

        Ok(CompletionRecord {
            settings: settings.redacted(),
            completion,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::DisabledBrowser;
    use crate::session::layout::{ERR_FILE, SUCCESS_FILE};
    use serde_json::json;

    fn session(dir: &Path, timeout_secs: u64) -> LiveSession {
        let mut config = AppConfig::default();
        config.session.timeout_secs = timeout_secs;
        config.session.poll_interval_ms = 10;
        LiveSession::new(
            SessionPaths::new(dir),
            config,
            Arc::new(DisabledBrowser),
            ShutdownManager::new(),
        )
    }

    async fn drop_command(dir: &Path, name: &str, value: serde_json::Value) {
        let commands = dir.join("commands");
        tokio::fs::create_dir_all(&commands).await.unwrap();
        tokio::fs::write(commands.join(format!("{name}.json")), value.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exit_command_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        drop_command(dir.path(), "1", json!({"type": "exit"})).await;

        let mut live = session(dir.path(), 30);
        let reason = live.run().await.unwrap();
        assert_eq!(reason, MANUAL_EXIT_REASON);
        assert_eq!(*live.phase(), SessionPhase::Terminated);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("exit.txt")).unwrap(),
            MANUAL_EXIT_REASON
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_hits_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = session(dir.path(), 2);
        let reason = live.run().await.unwrap();
        assert_eq!(reason, crate::core::DEADLINE_EXCEEDED_REASON);
        assert!(dir.path().join("commands").is_dir());
        assert!(dir.path().join("responses").is_dir());
    }

    #[tokio::test]
    async fn test_parse_error_is_fatal_without_err_file() {
        let dir = tempfile::tempdir().unwrap();
        let commands = dir.path().join("commands");
        tokio::fs::create_dir_all(&commands).await.unwrap();
        tokio::fs::write(commands.join("bad.json"), "{oops").await.unwrap();

        let mut live = session(dir.path(), 30);
        let reason = live.run().await.unwrap();
        assert!(reason.starts_with("parse error"), "{reason}");
        assert!(dir.path().join("responses/bad").is_dir());
        assert!(!dir.path().join("responses/bad").join(ERR_FILE).exists());
        assert_eq!(live.processed().len(), 1);
    }

    #[tokio::test]
    async fn test_browser_and_invalid_commands() {
        let dir = tempfile::tempdir().unwrap();
        drop_command(
            dir.path(),
            "a",
            json!({"type": "browser", "name": "sleep", "params": {"ms": 1}}),
        )
        .await;
        drop_command(
            dir.path(),
            "b",
            json!({"type": "browser", "name": "teleport", "params": {}}),
        )
        .await;

        let mut live = session(dir.path(), 30);
        live.paths.create_live_folders().await.unwrap();
        live.state.start();
        live.scan_cycle().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("responses/a").join(SUCCESS_FILE)).unwrap(),
            BROWSER_SUCCESS
        );
        let err = std::fs::read_to_string(dir.path().join("responses/b").join(ERR_FILE)).unwrap();
        assert!(err.contains("teleport is not a supported browser command"));
        assert_eq!(live.processed().len(), 2);
    }

    #[tokio::test]
    async fn test_llm_timeout_width_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        drop_command(
            dir.path(),
            "big",
            json!({
                "type": "llm",
                "params": {"messages": [{"role": "user", "content": "hi"}]},
                "settings": {"timeout_seconds": 40000, "providers": [{"name": "mock"}]}
            }),
        )
        .await;

        let mut live = session(dir.path(), 30);
        live.paths.create_live_folders().await.unwrap();
        live.state.start();
        live.scan_cycle().await.unwrap();

        let err = std::fs::read_to_string(dir.path().join("responses/big").join(ERR_FILE)).unwrap();
        assert!(err.contains("32767"));
    }

    #[tokio::test]
    async fn test_signal_reason_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = session(dir.path(), 30);
        live.shutdown.shutdown(SIGNAL_REASON);
        let reason = live.run().await.unwrap();
        assert_eq!(reason, SIGNAL_REASON);
    }
}
