//! 核心执行层：错误分类、Action 抽象、Job 完成屏障、带截止时间的运行器、会话状态机

pub mod action;
pub mod error;
pub mod job;
pub mod runner;
pub mod shutdown;
pub mod state;

pub use action::{Action, FnAction};
pub use error::{EngineError, ProviderError};
pub use job::Job;
pub use runner::perform_action;
pub use shutdown::ShutdownManager;
pub use state::{
    SessionPhase, SessionState, DEADLINE_EXCEEDED_REASON, MANUAL_EXIT_REASON, SIGNAL_REASON,
};
