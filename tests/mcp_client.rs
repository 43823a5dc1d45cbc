//! MCP client tests against a minimal in-process HTTP server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use agent_audit::mcp::{CollectOptions, McpClient};
use agent_audit::{Limits, McpError};

/// What the mock returns for one request.
enum Reply {
    /// JSON-RPC result object, wrapped in an envelope echoing the id.
    Result(Value),
    /// JSON-RPC error object.
    Error(i64, &'static str),
    /// SSE framing around a result.
    Sse(Value),
    /// Bare HTTP status with an empty body.
    Status(u16),
}

struct Seen {
    method: String,
    params: Option<Value>,
}

/// Spawn a one-thread HTTP server that answers each JSON-RPC POST via the
/// handler. Records every request for assertions.
async fn spawn_mock<F>(handler: F) -> (SocketAddr, Arc<Mutex<Vec<Seen>>>)
where
    F: Fn(&str, Option<&Value>, usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Arc<Mutex<Vec<Seen>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_writer = Arc::clone(&seen);
    let counter = AtomicUsize::new(0);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };

            let body = read_request_body(&mut stream).await;
            let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let method = request["method"].as_str().unwrap_or("").to_string();
            let params = request.get("params").cloned();
            let id = request["id"].clone();

            seen_writer.lock().unwrap().push(Seen {
                method: method.clone(),
                params: params.clone(),
            });

            let index = counter.fetch_add(1, Ordering::SeqCst);
            let reply = handler(&method, params.as_ref(), index);
            let response = match reply {
                Reply::Result(result) => http_response(
                    200,
                    "application/json",
                    &json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
                ),
                Reply::Error(code, message) => http_response(
                    200,
                    "application/json",
                    &json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
                        .to_string(),
                ),
                Reply::Sse(result) => {
                    let envelope =
                        json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
                    http_response(
                        200,
                        "text/event-stream",
                        &format!("event: message\ndata: {envelope}\n\n"),
                    )
                }
                Reply::Status(status) => http_response(status, "text/plain", ""),
            };

            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr, seen)
}

async fn read_request_body(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = find_header_end(&buf) {
            let headers = String::from_utf8_lossy(&buf[..header_end]);
            let content_length = headers
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return String::from_utf8_lossy(
                    &buf[header_end + 4..header_end + 4 + content_length],
                )
                .into_owned();
            }
        }
    }
    String::new()
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn http_response(status: u16, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} X\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn fast_limits() -> Limits {
    Limits {
        mcp_retry_delay_ms: 10,
        mcp_timeout_ms: 5000,
        ..Default::default()
    }
}

#[tokio::test]
async fn tools_pagination_follows_cursor() {
    let (addr, seen) = spawn_mock(|method, params, _| match method {
        "tools/list" => {
            let cursor = params
                .and_then(|p| p.get("cursor"))
                .and_then(Value::as_str);
            match cursor {
                None => Reply::Result(json!({"tools": [{"name": "a"}], "nextCursor": "c1"})),
                Some("c1") => Reply::Result(json!({"tools": [{"name": "b"}]})),
                Some(other) => panic!("unexpected cursor {other}"),
            }
        }
        _ => Reply::Error(-32601, "method not found"),
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let tools = client.list_all("tools", "tools").await.unwrap();

    let names: Vec<_> = tools
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    let requests = seen.lock().unwrap();
    let list_calls: Vec<_> = requests
        .iter()
        .filter(|s| s.method == "tools/list")
        .collect();
    assert_eq!(list_calls.len(), 2);
    assert!(list_calls[0].params.is_none());
    assert_eq!(
        list_calls[1].params.as_ref().unwrap()["cursor"]
            .as_str()
            .unwrap(),
        "c1"
    );
}

#[tokio::test]
async fn sse_framed_response_parsed() {
    let (addr, _) = spawn_mock(|method, _, _| match method {
        "tools/list" => Reply::Sse(json!({"tools": [{"name": "sse-tool"}]})),
        _ => Reply::Error(-32601, "method not found"),
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let tools = client.list_all("tools", "tools").await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "sse-tool");
}

#[tokio::test]
async fn method_not_found_means_empty_list() {
    let (addr, _) = spawn_mock(|_, _, _| Reply::Error(-32601, "method not found")).await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let prompts = client.list_all("prompts", "prompts").await.unwrap();
    assert!(prompts.is_empty());
}

#[tokio::test]
async fn transient_5xx_is_retried() {
    let (addr, seen) = spawn_mock(|_, _, index| {
        if index == 0 {
            Reply::Status(503)
        } else {
            Reply::Result(json!({"tools": []}))
        }
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let tools = client.list_all("tools", "tools").await.unwrap();
    assert!(tools.is_empty());
    assert_eq!(seen.lock().unwrap().len(), 2, "one retry expected");
}

#[tokio::test]
async fn client_error_4xx_not_retried() {
    let (addr, seen) = spawn_mock(|_, _, _| Reply::Status(404)).await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let error = client.list_all("tools", "tools").await.unwrap_err();
    assert!(matches!(error, McpError::HttpStatus { status: 404, .. }));
    assert_eq!(seen.lock().unwrap().len(), 1, "no retry on 4xx");
}

#[tokio::test]
async fn rpc_error_surfaces_code_and_message() {
    let (addr, _) = spawn_mock(|_, _, _| Reply::Error(-32000, "server exploded")).await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let error = client.call("tools/list", None).await.unwrap_err();
    match error {
        McpError::Rpc { code, message } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "server exploded");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn initialize_harvests_handshake() {
    let (addr, _) = spawn_mock(|method, _, _| match method {
        "initialize" => Reply::Result(json!({
            "protocolVersion": "2024-11-05",
            "instructions": "Be careful with this server.",
            "serverInfo": {"name": "mock-server", "version": "9.9.9"},
        })),
        _ => Reply::Error(-32601, "method not found"),
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let handshake = client.initialize().await;
    assert_eq!(
        handshake.instructions.as_deref(),
        Some("Be careful with this server.")
    );
    assert_eq!(handshake.server_name.as_deref(), Some("mock-server"));
    assert_eq!(handshake.protocol_version.as_deref(), Some("2024-11-05"));
}

#[tokio::test]
async fn initialize_failure_is_non_fatal() {
    let (addr, _) = spawn_mock(|_, _, _| Reply::Status(400)).await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let handshake = client.initialize().await;
    assert!(handshake.instructions.is_none());
    assert!(handshake.server_name.is_none());
}

#[tokio::test]
async fn resource_read_concatenates_and_truncates() {
    let (addr, _) = spawn_mock(|method, _, _| match method {
        "resources/read" => Reply::Result(json!({
            "contents": [
                {"uri": "doc://a", "text": "hello "},
                {"uri": "doc://a", "text": "world, this part is long"},
            ],
        })),
        _ => Reply::Error(-32601, "method not found"),
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let full = client.read_resource("doc://a", 1024).await.unwrap();
    assert_eq!(full, "hello world, this part is long");

    let capped = client.read_resource("doc://a", 11).await.unwrap();
    assert_eq!(capped, "hello world");
}

#[tokio::test]
async fn collect_respects_mime_filter() {
    let (addr, _) = spawn_mock(|method, params, _| match method {
        "initialize" => Reply::Result(json!({})),
        "resources/list" => Reply::Result(json!({"resources": [
            {"uri": "doc://md", "mimeType": "text/markdown"},
            {"uri": "doc://bin", "mimeType": "application/octet-stream"},
        ]})),
        "resources/read" => {
            let uri = params
                .and_then(|p| p.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or("");
            assert_eq!(uri, "doc://md", "binary resource must not be read");
            Reply::Result(json!({"contents": [{"uri": uri, "text": "# md"}]}))
        }
        _ => Reply::Error(-32601, "method not found"),
    })
    .await;

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    let options = CollectOptions {
        tools: false,
        prompts: false,
        resources: true,
        instructions: false,
        read_resources: true,
        mime_types: vec!["text/markdown".to_string()],
        max_resource_bytes: 1024,
    };
    let inventory = client.collect(&options).await.unwrap();

    assert_eq!(inventory.resources.len(), 2);
    assert_eq!(inventory.resource_contents.len(), 1);
    assert_eq!(inventory.resource_contents[0].0, "doc://md");
}

#[tokio::test]
async fn request_ids_increase_monotonically() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let ids_clone = Arc::clone(&ids);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let body = read_request_body(&mut stream).await;
            let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            ids_clone
                .lock()
                .unwrap()
                .push(request["id"].as_u64().unwrap_or(0));
            let response = http_response(
                200,
                "application/json",
                &json!({"jsonrpc": "2.0", "id": request["id"], "result": {}}).to_string(),
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    let client = McpClient::new(&format!("http://{addr}"), &fast_limits()).unwrap();
    for _ in 0..3 {
        client.call("ping", None).await.unwrap();
    }

    let recorded = ids.lock().unwrap();
    assert_eq!(recorded.len(), 3);
    assert!(recorded.windows(2).all(|w| w[1] > w[0]));
}
