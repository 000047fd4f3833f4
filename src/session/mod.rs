//! 会话：目录布局、命令描述文件与主循环

pub mod command;
pub mod layout;
pub mod live;

pub use command::{CommandDescriptor, Settings};
pub use layout::{create_session_directory, SessionPaths};
pub use live::{CompletionRecord, LiveSession};
