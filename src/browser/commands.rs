//! 浏览器命令解析与校验
//!
//! 每个命令名对应一组参数；解析时把 snapshot 名解析为会话目录下的落盘路径：
//! `<session>/snapshots/<snapshot_name>/{images/, html.txt, nodes.json, location.txt}`。
//! 解析不产生任何文件系统副作用，目录在 Job 写入时创建。

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::EngineError;

/// 元素定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// CSS 选择器或 XPath（以 `/` 开头时按 XPath 处理）
    Search,
    Css,
    XPath,
}

impl QueryType {
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "search" => Ok(Self::Search),
            "css" => Ok(Self::Css),
            "xpath" => Ok(Self::XPath),
            other => Err(EngineError::InvalidCommand(format!(
                "query type {other} not supported"
            ))),
        }
    }

    /// 选择器是否按 XPath 解释
    pub fn is_xpath(&self, selector: &str) -> bool {
        match self {
            Self::XPath => true,
            Self::Css => false,
            Self::Search => selector.starts_with('/'),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserCommand {
    Navigate {
        url: String,
    },
    FullPageScreenshot {
        quality: u8,
        path: PathBuf,
    },
    ElementScreenshot {
        scale: f64,
        selector: String,
        path: PathBuf,
    },
    CollectNodes {
        selector: String,
        get_styles: bool,
        prepopulate: bool,
        recurse: bool,
        path: PathBuf,
    },
    Click {
        selector: String,
        query: QueryType,
    },
    Sleep {
        ms: u64,
    },
    SaveHtml {
        selector: String,
        path: PathBuf,
    },
    /// 反复抓取 HTML，直到页面不再变化或达到次数上限
    IterateHtml {
        selector: String,
        max_iterations: u32,
        interval_ms: u64,
        dir: PathBuf,
    },
    Location {
        path: PathBuf,
    },
}

pub const SUPPORTED_COMMANDS: &[&str] = &[
    "open_web_page",
    "full_page_screenshot",
    "element_screenshot",
    "collect_nodes",
    "click",
    "sleep",
    "save_html",
    "iterate_html",
    "location",
];

#[derive(Deserialize)]
struct NavigateParams {
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct FullPageParams {
    #[serde(default)]
    quality: u8,
    #[serde(default)]
    name: String,
    #[serde(default)]
    snapshot_name: String,
}

#[derive(Deserialize)]
struct ElementShotParams {
    #[serde(default)]
    scale: f64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    selector: String,
    #[serde(default)]
    snapshot_name: String,
}

#[derive(Deserialize)]
struct CollectNodesParams {
    #[serde(default)]
    selector: String,
    #[serde(default)]
    get_styles: bool,
    #[serde(default)]
    prepopulate: bool,
    #[serde(default)]
    recurse: bool,
    #[serde(default)]
    snapshot_name: String,
}

#[derive(Deserialize)]
struct ClickParams {
    #[serde(default)]
    selector: String,
    #[serde(default = "default_query_type")]
    query_type: String,
}

fn default_query_type() -> String {
    "search".to_string()
}

#[derive(Deserialize)]
struct SleepParams {
    #[serde(default)]
    ms: u64,
}

#[derive(Deserialize)]
struct SaveHtmlParams {
    #[serde(default)]
    snapshot_name: String,
    #[serde(default)]
    selector: Option<String>,
}

#[derive(Deserialize)]
struct IterateHtmlParams {
    #[serde(default)]
    snapshot_name: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default = "default_max_iterations")]
    max_iterations: u32,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    500
}

#[derive(Deserialize)]
struct LocationParams {
    #[serde(default)]
    snapshot_name: String,
}

fn params<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, EngineError> {
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| EngineError::InvalidCommand(format!("failed to parse {name} command: {e}")))
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidCommand(msg.into())
}

/// snapshot 目录：必须是非空的单级目录名
fn snapshot_dir(session_path: &Path, snapshot: &str) -> Result<PathBuf, EngineError> {
    if snapshot.is_empty() {
        return Err(invalid(r#"data must be saved in a snapshot folder not name """#));
    }
    if snapshot.contains('.') || snapshot.contains('/') || snapshot.contains('\\') {
        return Err(invalid("snapshot_name must be folder not a file"));
    }
    Ok(session_path.join("snapshots").join(snapshot))
}

fn image_path(session_path: &Path, snapshot: &str, name: &str) -> Result<PathBuf, EngineError> {
    if !name.ends_with(".jpg") {
        return Err(invalid("name must end with .jpg"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name must be a file name"));
    }
    Ok(snapshot_dir(session_path, snapshot)?.join("images").join(name))
}

fn selector_or_html(selector: Option<String>) -> Result<String, EngineError> {
    let selector = selector.unwrap_or_else(|| "html".to_string());
    if selector.is_empty() {
        return Err(invalid("selector cannot be blank"));
    }
    Ok(selector)
}

/// 解析并校验一个浏览器命令
pub fn parse_command(
    params_value: &Value,
    command_name: &str,
    session_path: &Path,
) -> Result<BrowserCommand, EngineError> {
    let command = match command_name {
        "open_web_page" => {
            let p: NavigateParams = params(command_name, params_value)?;
            if !(p.url.starts_with("http://") || p.url.starts_with("https://")) {
                return Err(invalid("url must begin with http:// or https://"));
            }
            BrowserCommand::Navigate { url: p.url }
        }
        "full_page_screenshot" => {
            let p: FullPageParams = params(command_name, params_value)?;
            if p.quality == 0 {
                return Err(invalid("quality must be greater than zero"));
            }
            BrowserCommand::FullPageScreenshot {
                quality: p.quality.min(100),
                path: image_path(session_path, &p.snapshot_name, &p.name)?,
            }
        }
        "element_screenshot" => {
            let p: ElementShotParams = params(command_name, params_value)?;
            if p.scale <= 0.0 {
                return Err(invalid("scale must be greater than zero"));
            }
            if p.selector.is_empty() {
                return Err(invalid("selector cannot be empty"));
            }
            BrowserCommand::ElementScreenshot {
                scale: p.scale,
                path: image_path(session_path, &p.snapshot_name, &p.name)?,
                selector: p.selector,
            }
        }
        "collect_nodes" => {
            let p: CollectNodesParams = params(command_name, params_value)?;
            if p.selector.is_empty() {
                return Err(invalid("selector is empty"));
            }
            BrowserCommand::CollectNodes {
                path: snapshot_dir(session_path, &p.snapshot_name)?.join("nodes.json"),
                selector: p.selector,
                get_styles: p.get_styles,
                prepopulate: p.prepopulate,
                recurse: p.recurse,
            }
        }
        "click" => {
            let p: ClickParams = params(command_name, params_value)?;
            if p.selector.is_empty() {
                return Err(invalid("click selector cannot be blank"));
            }
            BrowserCommand::Click {
                query: QueryType::parse(&p.query_type)?,
                selector: p.selector,
            }
        }
        "sleep" => {
            let p: SleepParams = params(command_name, params_value)?;
            BrowserCommand::Sleep { ms: p.ms }
        }
        "save_html" => {
            let p: SaveHtmlParams = params(command_name, params_value)?;
            BrowserCommand::SaveHtml {
                path: snapshot_dir(session_path, &p.snapshot_name)?.join("html.txt"),
                selector: selector_or_html(p.selector)?,
            }
        }
        "iterate_html" => {
            let p: IterateHtmlParams = params(command_name, params_value)?;
            if p.max_iterations == 0 {
                return Err(invalid("max_iterations must be greater than zero"));
            }
            BrowserCommand::IterateHtml {
                dir: snapshot_dir(session_path, &p.snapshot_name)?,
                selector: selector_or_html(p.selector)?,
                max_iterations: p.max_iterations,
                interval_ms: p.interval_ms,
            }
        }
        "location" => {
            let p: LocationParams = params(command_name, params_value)?;
            BrowserCommand::Location {
                path: snapshot_dir(session_path, &p.snapshot_name)?.join("location.txt"),
            }
        }
        other => {
            return Err(invalid(format!("{other} is not a supported browser command")));
        }
    };

    Ok(command)
}
