//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COURIER__*` 覆盖（双下划线表示嵌套，如
//! `COURIER__SESSION__TIMEOUT_SECS=600`）。`COURIER_SAVEDIR` 单独覆盖会话根目录。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 会话根目录的独立覆盖变量
pub const SAVEDIR_ENV: &str = "COURIER_SAVEDIR";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionSection,
    pub llm: LlmSection,
}

/// [session] 段：会话标识、目录、生命周期与轮询间隔
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 未设置时生成 UUID v4
    pub id: Option<String>,
    pub base_dir: PathBuf,
    /// 整个会话的存活时间（秒）
    pub timeout_secs: u64,
    /// 浏览器命令的默认截止时间；None 表示不限
    pub command_timeout_ms: Option<u64>,
    pub poll_interval_ms: u64,
    pub headless: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            id: None,
            base_dir: PathBuf::from("./sessions"),
            timeout_secs: 3600,
            command_timeout_ms: None,
            poll_interval_ms: 250,
            headless: true,
        }
    }
}

/// [llm] 段：默认重试预算与单次请求超时
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub try_limit: i16,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            try_limit: 3,
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// 确保会话 id 已确定（未配置时生成），返回该 id
    pub fn resolve_session_id(&mut self) -> String {
        self.session
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }
}

/// 从 config 目录加载配置，环境变量 COURIER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 COURIER__*（双下划线表示嵌套键）
/// 4. 最后应用 COURIER_SAVEDIR
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COURIER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let mut app: AppConfig = c.try_deserialize()?;

    if let Ok(dir) = std::env::var(SAVEDIR_ENV) {
        if !dir.is_empty() {
            app.session.base_dir = PathBuf::from(dir);
        }
    }

    Ok(app)
}
