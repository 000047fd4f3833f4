//! Courier - 文件收件箱驱动的本地执行代理
//!
//! 控制方把 JSON 命令文件放进会话的 `commands/` 目录，代理按到达顺序执行，
//! 把结果写入 `responses/<name>/`，会话结束时写 `exit.txt`。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、Action、Job 完成屏障、带截止时间的运行器、会话状态、优雅关闭
//! - **inbox**: 收件箱扫描
//! - **llm**: 消息类型、Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、指数退避调度
//! - **browser**: 浏览器命令解析与执行器（Headless Chrome 需 feature "browser"）
//! - **session**: 会话目录、命令描述文件与主循环
//! - **observability**: 日志初始化与命令审计

pub mod browser;
pub mod config;
pub mod core;
pub mod inbox;
pub mod llm;
pub mod observability;
pub mod session;
