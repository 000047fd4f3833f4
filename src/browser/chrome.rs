//! Headless Chrome 执行器（需启用 feature "browser" 且系统已安装 Chrome/Chromium）
//!
//! 浏览器在第一个页面命令时惰性启动，整个会话复用同一个 Tab。
//! headless_chrome 是同步 API，所有页面操作都在 `spawn_blocking` 中执行；
//! 产生的文件以 (路径, 字节) 形式返回，再交给 Job 后台写盘。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde::Serialize;
use serde_json::Value;

use crate::browser::commands::{parse_command, BrowserCommand, QueryType};
use crate::browser::{sleep_action, BrowserExecutor};
use crate::core::{Action, EngineError, Job};

struct ChromeSession {
    // Browser 被 drop 时 Chrome 进程退出，需与 Tab 同生命周期
    _browser: Browser,
    tab: Arc<Tab>,
}

pub struct ChromeExecutor {
    headless: bool,
    session: Arc<Mutex<Option<ChromeSession>>>,
}

impl ChromeExecutor {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            session: Arc::new(Mutex::new(None)),
        }
    }
}

impl BrowserExecutor for ChromeExecutor {
    fn add_operation(
        &self,
        params: &Value,
        command_name: &str,
        session_path: &Path,
        job: &Job,
    ) -> Result<Arc<dyn Action>, EngineError> {
        let command = parse_command(params, command_name, session_path)?;
        if let BrowserCommand::Sleep { ms } = command {
            return Ok(sleep_action(ms));
        }

        Ok(Arc::new(ChromeAction {
            name: command_name.to_string(),
            headless: self.headless,
            session: Arc::clone(&self.session),
            command,
            job: job.clone(),
        }))
    }
}

struct ChromeAction {
    name: String,
    headless: bool,
    session: Arc<Mutex<Option<ChromeSession>>>,
    command: BrowserCommand,
    job: Job,
}

type Artifacts = Vec<(PathBuf, Vec<u8>)>;

#[async_trait]
impl Action for ChromeAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), EngineError> {
        let session = Arc::clone(&self.session);
        let command = self.command.clone();
        let headless = self.headless;

        tracing::info!(command = %self.name, "browser command");

        let artifacts = tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| "browser session poisoned".to_string())?;
            if guard.is_none() {
                *guard = Some(launch(headless)?);
            }
            let tab = match guard.as_ref() {
                Some(s) => Arc::clone(&s.tab),
                None => return Err("browser not started".to_string()),
            };
            drop(guard);
            execute(&tab, &command)
        })
        .await
        .map_err(|e| EngineError::Standard(format!("browser task join: {e}")))?
        .map_err(EngineError::Standard)?;

        for (path, bytes) in artifacts {
            self.job.write_bytes(bytes, path);
        }
        Ok(())
    }
}

fn launch(headless: bool) -> Result<ChromeSession, String> {
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .build()
        .map_err(|e| format!("invalid launch options: {e}"))?;
    let browser =
        Browser::new(options).map_err(|e| format!("Chrome launch failed: {e}. Install Chrome/Chromium."))?;
    let tab = browser
        .new_tab()
        .map_err(|e| format!("Browser tab failed: {e}"))?;
    tracing::info!(headless, "chrome started");
    Ok(ChromeSession {
        _browser: browser,
        tab,
    })
}

fn find<'a>(tab: &'a Tab, selector: &str, query: QueryType) -> Result<Element<'a>, String> {
    let found = if query.is_xpath(selector) {
        tab.wait_for_xpath(selector)
    } else {
        tab.wait_for_element(selector)
    };
    found.map_err(|e| format!("Element {selector} not found: {e}"))
}

fn html_of(tab: &Tab, selector: &str) -> Result<String, String> {
    if selector == "html" {
        return tab
            .get_content()
            .map_err(|e| format!("Get content failed: {e}"));
    }
    find(tab, selector, QueryType::Search)?
        .get_content()
        .map_err(|e| format!("Get content failed: {e}"))
}

#[derive(Serialize)]
struct NodeRecord {
    node_id: u32,
    tag_name: String,
    attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    styles: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    descendants: Vec<NodeRecord>,
}

fn describe(element: &Element<'_>, get_styles: bool) -> Result<NodeRecord, String> {
    let node = element
        .get_description()
        .map_err(|e| format!("Describe node failed: {e}"))?;

    // 属性以 [name, value, name, value, ...] 扁平返回
    let attributes = node
        .attributes
        .unwrap_or_default()
        .chunks(2)
        .filter_map(|pair| match pair {
            [k, v] => Some((k.clone(), v.clone())),
            _ => None,
        })
        .collect();

    let styles = if get_styles {
        let computed = element
            .get_computed_styles()
            .map_err(|e| format!("Computed styles failed: {e}"))?;
        Some(computed.into_iter().map(|p| (p.name, p.value)).collect())
    } else {
        None
    };

    Ok(NodeRecord {
        node_id: node.node_id,
        tag_name: node.node_name.to_lowercase(),
        attributes,
        styles,
        descendants: Vec::new(),
    })
}

fn execute(tab: &Tab, command: &BrowserCommand) -> Result<Artifacts, String> {
    let mut artifacts = Artifacts::new();

    match command {
        BrowserCommand::Navigate { url } => {
            tab.navigate_to(url)
                .map_err(|e| format!("Navigate failed: {e}"))?
                .wait_until_navigated()
                .map_err(|e| format!("Page load failed: {e}"))?;
        }
        BrowserCommand::FullPageScreenshot { quality, path } => {
            let clip = tab
                .wait_for_element("html")
                .and_then(|el| el.get_box_model())
                .map(|model| model.margin_viewport())
                .map_err(|e| format!("Page size failed: {e}"))?;
            let bytes = tab
                .capture_screenshot(
                    CaptureScreenshotFormatOption::Jpeg,
                    Some(u32::from(*quality)),
                    Some(clip),
                    true,
                )
                .map_err(|e| format!("Screenshot failed: {e}"))?;
            artifacts.push((path.clone(), bytes));
        }
        BrowserCommand::ElementScreenshot {
            scale,
            selector,
            path,
        } => {
            let element = find(tab, selector, QueryType::Search)?;
            let mut clip = element
                .get_box_model()
                .map_err(|e| format!("Box model failed: {e}"))?
                .margin_viewport();
            clip.scale = *scale;
            let bytes = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Jpeg, Some(100), Some(clip), true)
                .map_err(|e| format!("Screenshot failed: {e}"))?;
            artifacts.push((path.clone(), bytes));
        }
        BrowserCommand::CollectNodes {
            selector,
            get_styles,
            prepopulate,
            recurse,
            path,
        } => {
            if *prepopulate {
                find(tab, selector, QueryType::Search)?;
            }
            let elements = tab
                .find_elements(selector)
                .map_err(|e| format!("Find {selector} failed: {e}"))?;

            let mut nodes = Vec::with_capacity(elements.len());
            for element in &elements {
                let mut record = describe(element, *get_styles)?;
                if *recurse {
                    // 没有后代时 find_elements 返回错误，视为空
                    for child in element.find_elements("*").unwrap_or_default() {
                        record.descendants.push(describe(&child, *get_styles)?);
                    }
                }
                nodes.push(record);
            }

            let bytes = serde_json::to_vec_pretty(&nodes)
                .map_err(|e| format!("Serialize nodes failed: {e}"))?;
            artifacts.push((path.clone(), bytes));
        }
        BrowserCommand::Click { selector, query } => {
            find(tab, selector, *query)?
                .click()
                .map_err(|e| format!("Click failed: {e}"))?;
        }
        BrowserCommand::Sleep { ms } => {
            std::thread::sleep(Duration::from_millis(*ms));
        }
        BrowserCommand::SaveHtml { selector, path } => {
            let html = html_of(tab, selector)?;
            artifacts.push((path.clone(), html.into_bytes()));
        }
        BrowserCommand::IterateHtml {
            selector,
            max_iterations,
            interval_ms,
            dir,
        } => {
            let mut previous: Option<String> = None;
            for i in 0..*max_iterations {
                let html = html_of(tab, selector)?;
                if previous.as_deref() == Some(html.as_str()) {
                    tracing::debug!(iteration = i, "page stopped changing");
                    break;
                }
                artifacts.push((dir.join(format!("html_{i}.txt")), html.clone().into_bytes()));
                previous = Some(html);
                std::thread::sleep(Duration::from_millis(*interval_ms));
            }
        }
        BrowserCommand::Location { path } => {
            artifacts.push((path.clone(), tab.get_url().into_bytes()));
        }
    }

    Ok(artifacts)
}
