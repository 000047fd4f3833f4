//! 可观测性：tracing 订阅器与命令审计日志

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志；RUST_LOG 可覆盖，默认 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 每个已分发命令输出一行 JSON 审计日志
pub fn audit_command(command: &str, kind: &str, ok: bool, outcome: &str, duration_ms: u64) {
    let audit = serde_json::json!({
        "event": "command_audit",
        "command": command,
        "kind": kind,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
    });
    tracing::info!(audit = %audit.to_string(), "command");
}
