//! Courier 入口：加载配置、初始化日志、创建会话目录并运行会话主循环。
//!
//! 用法：`courier [config.toml]`

use std::path::PathBuf;

use anyhow::Context;
use courier::browser::default_executor;
use courier::config::load_config;
use courier::core::ShutdownManager;
use courier::observability;
use courier::session::{create_session_directory, layout::write_config, LiveSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut cfg = load_config(config_path).context("Failed to load config")?;
    let session_id = cfg.resolve_session_id();

    let paths = create_session_directory(&cfg.session.base_dir, &session_id)
        .await
        .context("Failed to create session directory")?;
    write_config(&paths, &cfg)
        .await
        .context("Failed to write config.json")?;

    tracing::info!(
        session_id = %session_id,
        path = %paths.root().display(),
        "session directory ready"
    );

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let executor = default_executor(cfg.session.headless);
    let mut session = LiveSession::new(paths, cfg, executor, shutdown);
    let reason = session.run().await.context("Session failed")?;

    tracing::info!(reason = %reason, "courier exiting");
    Ok(())
}
