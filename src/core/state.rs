//! 会话生命周期状态机：Starting → Running → Terminating → Terminated
//!
//! 终止原因只记录一次；进入 Terminated 后不再接受任何迁移。

use std::fmt;

pub const MANUAL_EXIT_REASON: &str = "session has manually exited";
pub const DEADLINE_EXCEEDED_REASON: &str = "session deadline exceeded";
pub const SIGNAL_REASON: &str = "session interrupted by signal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Running,
    /// 携带终止原因
    Terminating(String),
    Terminated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Running => write!(f, "running"),
            SessionPhase::Terminating(_) => write!(f, "terminating"),
            SessionPhase::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    phase: SessionPhase,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Starting,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn start(&mut self) {
        if self.phase == SessionPhase::Starting {
            self.phase = SessionPhase::Running;
        }
    }

    /// 请求终止；已处于 Terminating / Terminated 时保留第一个原因，返回 false
    pub fn terminate(&mut self, reason: impl Into<String>) -> bool {
        match self.phase {
            SessionPhase::Starting | SessionPhase::Running => {
                self.phase = SessionPhase::Terminating(reason.into());
                true
            }
            _ => false,
        }
    }

    /// 完成终止，返回应写入 exit.txt 的原因；只有第一次调用返回 Some
    ///
    /// 未记录任何致命原因时（会话只是耗尽了时间），原因为 deadline exceeded。
    pub fn finish(&mut self) -> Option<String> {
        let reason = match std::mem::replace(&mut self.phase, SessionPhase::Terminated) {
            SessionPhase::Terminating(reason) => reason,
            SessionPhase::Starting | SessionPhase::Running => DEADLINE_EXCEEDED_REASON.to_string(),
            SessionPhase::Terminated => return None,
        };
        Some(reason)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
