//! 会话目录布局与结果文件
//!
//! ```text
//! <base>/<id>/commands/<name>.json      控制方投递的命令
//! <base>/<id>/responses/<name>/         每条命令的结果目录
//!     err.txt | success.txt | completion.json
//! <base>/<id>/snapshots/<snapshot>/     浏览器产物
//! <base>/<id>/exit.txt                  会话终止原因（仅写一次）
//! <base>/<id>/config.json               启动时的有效配置
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::EngineError;

pub const COMMANDS_DIR: &str = "commands";
pub const RESPONSES_DIR: &str = "responses";
pub const ERR_FILE: &str = "err.txt";
pub const SUCCESS_FILE: &str = "success.txt";
pub const COMPLETION_FILE: &str = "completion.json";
pub const EXIT_FILE: &str = "exit.txt";
pub const CONFIG_FILE: &str = "config.json";

/// 会话目录下各路径
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commands(&self) -> PathBuf {
        self.root.join(COMMANDS_DIR)
    }

    pub fn responses(&self) -> PathBuf {
        self.root.join(RESPONSES_DIR)
    }

    /// 命令文件对应的结果目录：`responses/<文件名去掉扩展名>`
    pub fn response_dir(&self, command_file: &Path) -> PathBuf {
        self.responses().join(command_stem(command_file))
    }

    /// 为命令创建独占的结果目录；目录已存在视为错误，避免两条命令的结果混在一起
    pub async fn create_response_dir(&self, command_file: &Path) -> Result<PathBuf, EngineError> {
        let dir = self.response_dir(command_file);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(EngineError::Filesystem(
                format!("response directory {} already exists", dir.display()),
            )),
            Err(e) => Err(EngineError::filesystem(&format!("create {}", dir.display()), e)),
        }
    }

    pub fn exit_file(&self) -> PathBuf {
        self.root.join(EXIT_FILE)
    }

    /// Starting 阶段：创建 commands/ 与 responses/（已存在不报错）
    pub async fn create_live_folders(&self) -> Result<(), EngineError> {
        for dir in [self.commands(), self.responses()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| EngineError::filesystem(&format!("create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// 命令名：去掉最后一个扩展名后的文件名（`x.v2.json` → `x.v2`）
pub fn command_stem(command_file: &Path) -> String {
    command_file
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 在 base 下创建 `<id>` 会话目录
pub async fn create_session_directory(base: &Path, id: &str) -> Result<SessionPaths, EngineError> {
    let root = base.join(id);
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| EngineError::filesystem(&format!("create session {}", root.display()), e))?;
    Ok(SessionPaths::new(root))
}

async fn write_file(path: PathBuf, bytes: impl AsRef<[u8]>) -> Result<(), EngineError> {
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| EngineError::filesystem(&format!("write {}", path.display()), e))
}

pub async fn write_err(response_dir: &Path, err: &EngineError) -> Result<(), EngineError> {
    write_file(response_dir.join(ERR_FILE), err.to_string()).await
}

pub async fn write_success(response_dir: &Path, message: &str) -> Result<(), EngineError> {
    write_file(response_dir.join(SUCCESS_FILE), message).await
}

pub async fn write_json<T: Serialize>(path: PathBuf, value: &T) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::Standard(format!("serialize {}: {e}", path.display())))?;
    write_file(path, bytes).await
}

pub async fn write_completion<T: Serialize>(
    response_dir: &Path,
    value: &T,
) -> Result<(), EngineError> {
    write_json(response_dir.join(COMPLETION_FILE), value).await
}

pub async fn write_config<T: Serialize>(paths: &SessionPaths, config: &T) -> Result<(), EngineError> {
    write_json(paths.root().join(CONFIG_FILE), config).await
}

/// 单条命令的结果
#[derive(Debug)]
pub enum Outcome<'a, T: Serialize> {
    Success(&'a str),
    Completion(&'a T),
    Failed(&'a EngineError),
}

/// 写入命令结果文件；失败由调用方升级为会话级错误
pub async fn write_outcome<T: Serialize>(
    response_dir: &Path,
    outcome: Outcome<'_, T>,
) -> Result<(), EngineError> {
    match outcome {
        Outcome::Success(message) => write_success(response_dir, message).await,
        Outcome::Completion(value) => write_completion(response_dir, value).await,
        Outcome::Failed(err) => write_err(response_dir, err).await,
    }
}

/// 写入 exit.txt
pub async fn end_session(paths: &SessionPaths, reason: &str) -> Result<(), EngineError> {
    write_file(paths.exit_file(), reason).await
}
