//! 针对本地脚本化的 OpenAI 兼容端点驱动 llm 命令

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::browser::DisabledBrowser;
use courier::config::AppConfig;
use courier::core::{ShutdownManager, MANUAL_EXIT_REASON};
use courier::session::{create_session_directory, LiveSession, SessionPaths};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct Scripted {
    status: u16,
    body: Value,
    /// 返回响应前删除的目录
    remove: Option<PathBuf>,
}

struct ScriptedEndpoint {
    base_url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    handle: JoinHandle<()>,
}

impl ScriptedEndpoint {
    async fn start(scripts: Vec<Scripted>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                let mut index = 0;
                while let Ok((mut socket, _)) = listener.accept().await {
                    let Ok(request) = read_request(&mut socket).await else {
                        continue;
                    };
                    requests.lock().unwrap().push(request);

                    let script = scripts.get(index).cloned().unwrap_or(Scripted {
                        status: 500,
                        body: json!({"error": {"message": "unexpected request"}}),
                        remove: None,
                    });
                    index += 1;

                    if let Some(dir) = &script.remove {
                        let _ = tokio::fs::remove_dir_all(dir).await;
                    }
                    let _ = write_response(&mut socket, script.status, &script.body).await;
                }
            }
        });

        Self {
            base_url,
            requests,
            handle,
        }
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for ScriptedEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 读取请求行与 JSON 请求体
async fn read_request(socket: &mut TcpStream) -> std::io::Result<(String, Value)> {
    let mut data = Vec::new();
    let mut buffer = [0_u8; 4096];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buffer[..n]);

        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..end]).into_owned();
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);

        let body_start = end + 4;
        if data.len() >= body_start + length {
            let request_line = head.lines().next().unwrap_or_default().to_string();
            let body = serde_json::from_slice(&data[body_start..body_start + length])
                .unwrap_or(Value::Null);
            return Ok((request_line, body));
        }
    }
}

async fn write_response(socket: &mut TcpStream, status: u16, body: &Value) -> std::io::Result<()> {
    let body = body.to_string();
    let reason = match status {
        200 => "OK",
        429 => "Too Many Requests",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.shutdown().await
}

fn tool_call_completion() -> Value {
    json!({
        "id": "chatcmpl-local",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

fn llm_command(base_url: &str, try_limit: i16, extra_providers: Vec<Value>) -> Value {
    let mut providers = vec![json!({
        "name": "openai",
        "api_key": "sk-local-secret",
        "model": "gpt-4o",
        "base_url": base_url
    })];
    providers.extend(extra_providers);
    json!({
        "type": "llm",
        "params": {
            "messages": [{"role": "user", "content": "weather in Paris?"}],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "current weather",
                    "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                }
            }],
            "tool_choice": "auto"
        },
        "settings": {"try_limit": try_limit, "max_tokens": 64, "providers": providers}
    })
}

fn drop_command(paths: &SessionPaths, name: &str, value: Value) {
    std::fs::create_dir_all(paths.commands()).unwrap();
    std::fs::write(paths.commands().join(format!("{name}.json")), value.to_string()).unwrap();
}

fn start_session(paths: &SessionPaths) -> JoinHandle<Result<String, courier::core::EngineError>> {
    let mut config = AppConfig::default();
    config.session.timeout_secs = 30;
    config.session.poll_interval_ms = 10;
    config.llm.request_timeout_secs = 10;
    let mut session = LiveSession::new(
        paths.clone(),
        config,
        Arc::new(DisabledBrowser),
        ShutdownManager::new(),
    );
    tokio::spawn(async move { session.run().await })
}

async fn wait_for(path: &Path) {
    for _ in 0..500 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared", path.display());
}

fn read_json(path: PathBuf) -> Value {
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_tools_are_sent_and_tool_calls_recorded() {
    let endpoint = ScriptedEndpoint::start(vec![Scripted {
        status: 200,
        body: tool_call_completion(),
        remove: None,
    }])
    .await;
    let base = tempfile::tempdir().unwrap();
    let paths = create_session_directory(base.path(), "http").await.unwrap();

    drop_command(&paths, "chat", llm_command(&endpoint.base_url, 0, vec![]));
    let handle = start_session(&paths);
    wait_for(&paths.responses().join("chat/completion.json")).await;
    drop_command(&paths, "zz-exit", json!({"type": "exit"}));
    assert_eq!(handle.await.unwrap().unwrap(), MANUAL_EXIT_REASON);

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    let (request_line, body) = &requests[0];
    assert!(request_line.starts_with("POST /v1/chat/completions"), "{request_line}");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["tool_choice"], "auto");
    assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
    assert_eq!(body["tools"][0]["function"]["description"], "current weather");

    let record = read_json(paths.responses().join("chat/completion.json"));
    let messages = record["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["tool_calls"][0]["id"], "call_1");
    assert_eq!(
        messages[1]["tool_calls"][0]["function"]["arguments"],
        "{\"city\":\"Paris\"}"
    );
    assert!(!record.to_string().contains("sk-local-secret"));
}

#[tokio::test]
async fn test_completion_write_failure_ends_session() {
    let base = tempfile::tempdir().unwrap();
    let paths = create_session_directory(base.path(), "nowrite").await.unwrap();
    let endpoint = ScriptedEndpoint::start(vec![Scripted {
        status: 200,
        body: tool_call_completion(),
        remove: Some(paths.responses().join("chat")),
    }])
    .await;

    drop_command(&paths, "chat", llm_command(&endpoint.base_url, 0, vec![]));
    let reason = start_session(&paths).await.unwrap().unwrap();

    assert!(reason.starts_with("filesystem error"), "{reason}");
    assert!(reason.contains("completion.json"), "{reason}");
    assert_eq!(std::fs::read_to_string(paths.exit_file()).unwrap(), reason);
    assert_eq!(endpoint.requests().len(), 1);
}

#[tokio::test]
async fn test_rate_limited_endpoint_fails_over_to_next_provider() {
    let endpoint = ScriptedEndpoint::start(vec![Scripted {
        status: 429,
        body: json!({"error": {"message": "Rate limit reached", "type": "requests"}}),
        remove: None,
    }])
    .await;
    let base = tempfile::tempdir().unwrap();
    let paths = create_session_directory(base.path(), "failover").await.unwrap();

    let mut command = llm_command(&endpoint.base_url, 0, vec![json!({"name": "mock"})]);
    command["params"]["tool_choice"] = json!("none");
    drop_command(&paths, "chat", command);
    let handle = start_session(&paths);
    wait_for(&paths.responses().join("chat/completion.json")).await;
    drop_command(&paths, "zz-exit", json!({"type": "exit"}));
    assert_eq!(handle.await.unwrap().unwrap(), MANUAL_EXIT_REASON);

    assert_eq!(endpoint.requests().len(), 1);
    let record = read_json(paths.responses().join("chat/completion.json"));
    assert_eq!(record["completion"]["model"], "mock-echo");
    assert_eq!(record["messages"][1]["content"], "Echo from Mock: weather in Paris?");
}
