//! 收件箱扫描：列出 commands 目录，过滤已处理与非 .json 条目，按修改时间升序排列
//!
//! 空列表是稳态结果而非错误；修改时间相同的条目顺序不作保证。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use crate::core::EngineError;

/// 命令描述文件后缀
pub const DESCRIPTOR_EXTENSION: &str = "json";

/// 本会话内已分发的命令文件路径；只增不减，不落盘
#[derive(Debug, Default, Clone)]
pub struct ProcessedSet {
    paths: HashSet<PathBuf>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// 扫描收件箱，返回按修改时间升序排列的新命令路径
pub async fn scan(inbox: &Path, processed: &ProcessedSet) -> Result<Vec<PathBuf>, EngineError> {
    let mut rd = fs::read_dir(inbox)
        .await
        .map_err(|e| EngineError::filesystem(&format!("read inbox {}", inbox.display()), e))?;

    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();

    while let Some(entry) = rd
        .next_entry()
        .await
        .map_err(|e| EngineError::filesystem(&format!("read inbox {}", inbox.display()), e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
            continue;
        }
        if processed.contains(&path) {
            continue;
        }

        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            // 控制端可能在列目录与取元数据之间删除文件
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(EngineError::filesystem(
                    &format!("stat {}", path.display()),
                    e,
                ))
            }
        };
        if meta.is_dir() {
            continue;
        }

        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((modified, path));
    }

    entries.sort_by_key(|(modified, _)| *modified);

    Ok(entries.into_iter().map(|(_, path)| path).collect())
}
