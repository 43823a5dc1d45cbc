//! JSON-RPC 2.0 client for MCP servers.
//!
//! Speaks HTTP POST with JSON bodies and tolerates SSE-framed responses by
//! reading the first `data:` line. Transient failures (network errors,
//! 5xx) retry with exponential backoff plus jitter; JSON-RPC errors and
//! 4xx do not. `-32601` from a list method means the feature is absent and
//! surfaces as an empty list, not an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::McpError;
use crate::limits::Limits;

/// Protocol revision sent in `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";
/// Aggregated pagination cap; a hostile server cannot make us collect more.
const MAX_LISTED_ITEMS: usize = 20_000;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// What `initialize` reported, all optional.
#[derive(Debug, Clone, Default)]
pub struct ServerHandshake {
    pub instructions: Option<String>,
    pub protocol_version: Option<String>,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
}

/// Which object classes to pull from the server.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub tools: bool,
    pub prompts: bool,
    pub resources: bool,
    pub instructions: bool,
    pub read_resources: bool,
    /// MIME allowlist for resource reads; empty means all.
    pub mime_types: Vec<String>,
    pub max_resource_bytes: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            tools: true,
            prompts: true,
            resources: true,
            instructions: true,
            read_resources: false,
            mime_types: Vec::new(),
            max_resource_bytes: 1024 * 1024,
        }
    }
}

/// Everything collected from one server.
#[derive(Debug, Clone, Default)]
pub struct McpInventory {
    pub handshake: ServerHandshake,
    pub tools: Vec<Value>,
    pub prompts: Vec<Value>,
    pub resources: Vec<Value>,
    /// Resource URI → text content, for resources that were read.
    pub resource_contents: Vec<(String, String, Option<String>)>,
}

pub struct McpClient {
    http: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
    headers: Vec<(String, String)>,
    next_id: AtomicU64,
    max_retries: u32,
    retry_delay: Duration,
}

impl McpClient {
    pub fn new(url: &str, limits: &Limits) -> Result<Self, McpError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(McpError::InvalidUrl(url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(limits.mcp_timeout())
            .build()
            .map_err(|e| McpError::Network {
                url: url.to_string(),
                source: e,
            })?;

        Ok(Self {
            http,
            url: url.to_string(),
            bearer_token: None,
            headers: Vec::new(),
            next_id: AtomicU64::new(1),
            max_retries: limits.mcp_max_retries,
            retry_delay: limits.mcp_retry_delay(),
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One JSON-RPC call with the retry policy applied.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_delay, attempt);
                    debug!(method, attempt, ?delay, "retrying MCP call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(&request);

        if let Some(token) = &self.bearer_token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| McpError::Network {
            url: self.url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| McpError::Network {
            url: self.url.clone(),
            source: e,
        })?;

        let payload = extract_json_payload(&body)?;
        let parsed: JsonRpcResponse = serde_json::from_str(payload)
            .map_err(|e| McpError::MalformedResponse(e.to_string()))?;

        if let Some(error) = parsed.error {
            if error.code == -32601 {
                return Err(McpError::MethodNotFound);
            }
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| McpError::MalformedResponse("response has neither result nor error".into()))
    }

    /// Best-effort handshake; failures are harmless.
    pub async fn initialize(&self) -> ServerHandshake {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        match self.call("initialize", Some(params)).await {
            Ok(result) => ServerHandshake {
                instructions: result
                    .get("instructions")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                protocol_version: result
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                server_name: result
                    .pointer("/serverInfo/name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                server_version: result
                    .pointer("/serverInfo/version")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Err(e) => {
                debug!(error = %e, "initialize failed (non-fatal)");
                ServerHandshake::default()
            }
        }
    }

    /// Paginated `<what>/list`, following `nextCursor` until absent.
    pub async fn list_all(&self, what: &str, key: &str) -> Result<Vec<Value>, McpError> {
        let method = format!("{what}/list");
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = match self.call(&method, params).await {
                Ok(r) => r,
                Err(McpError::MethodNotFound) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

            if let Some(page) = result.get(key).and_then(Value::as_array) {
                for item in page {
                    if items.len() >= MAX_LISTED_ITEMS {
                        warn!(method = %method, "pagination cap reached, truncating listing");
                        return Ok(items);
                    }
                    items.push(item.clone());
                }
            }

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(items);
            }
        }
    }

    /// Read one resource's text content, concatenating `contents[].text` and
    /// truncating to the byte cap.
    pub async fn read_resource(&self, uri: &str, max_bytes: usize) -> Result<String, McpError> {
        let result = self
            .call("resources/read", Some(json!({ "uri": uri })))
            .await?;

        let mut text = String::new();
        if let Some(contents) = result.get("contents").and_then(Value::as_array) {
            for part in contents {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
        }

        if text.len() > max_bytes {
            let mut end = max_bytes;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Ok(text)
    }

    /// Pull the requested object classes from the server.
    pub async fn collect(&self, options: &CollectOptions) -> Result<McpInventory, McpError> {
        let mut inventory = McpInventory {
            handshake: self.initialize().await,
            ..Default::default()
        };

        if options.tools {
            inventory.tools = self.list_all("tools", "tools").await?;
        }
        if options.prompts {
            inventory.prompts = self.list_all("prompts", "prompts").await?;
        }
        if options.resources {
            inventory.resources = self.list_all("resources", "resources").await?;

            if options.read_resources {
                for resource in inventory.resources.clone() {
                    let Some(uri) = resource.get("uri").and_then(Value::as_str) else {
                        continue;
                    };
                    let mime = resource
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .map(str::to_string);

                    if !options.mime_types.is_empty() {
                        match &mime {
                            Some(m) if options.mime_types.iter().any(|allow| allow == m) => {}
                            _ => continue,
                        }
                    }

                    match self.read_resource(uri, options.max_resource_bytes).await {
                        Ok(text) if !text.is_empty() => {
                            inventory
                                .resource_contents
                                .push((uri.to_string(), text, mime));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(uri, error = %e, "resource read failed"),
                    }
                }
            }
        }
        if !options.instructions {
            inventory.handshake.instructions = None;
        }

        Ok(inventory)
    }
}

/// Pull the JSON payload out of a body that is either plain JSON or SSE
/// framing (`event: ...` / `data: {...}`); only the first `data:` line is
/// read.
fn extract_json_payload(body: &str) -> Result<&str, McpError> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with("event:") && !trimmed.starts_with("data:") {
        return Ok(body);
    }

    for line in trimmed.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            return Ok(data.trim_start());
        }
    }
    Err(McpError::MalformedResponse(
        "SSE framing without a data line".to_string(),
    ))
}

/// `base * 2^attempt` plus 0–30 % jitter derived from the clock.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let scaled = base.saturating_mul(2u32.saturating_pow(attempt));
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let jitter_permille = nanos % 300;
    scaled + Duration::from_millis(scaled.as_millis() as u64 * jitter_permille / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert_eq!(extract_json_payload(body).unwrap(), body);
    }

    #[test]
    fn test_extract_sse_data_line() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        let payload = extract_json_payload(body).unwrap();
        assert!(payload.starts_with("{\"jsonrpc\""));
    }

    #[test]
    fn test_extract_sse_first_data_line_only() {
        let body = "event: message\ndata: {\"a\":1}\ndata: {\"b\":2}\n";
        assert_eq!(extract_json_payload(body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_sse_without_data_is_error() {
        assert!(extract_json_payload("event: message\n\n").is_err());
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let base = Duration::from_millis(100);
        let first = backoff_delay(base, 0);
        let third = backoff_delay(base, 2);
        // Jitter adds at most 30%, so attempt 2 always exceeds attempt 0.
        assert!(third >= Duration::from_millis(400));
        assert!(first < Duration::from_millis(131));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let limits = Limits::default();
        assert!(matches!(
            McpClient::new("ftp://host", &limits),
            Err(McpError::InvalidUrl(_))
        ));
        assert!(McpClient::new("http://localhost:9000/rpc", &limits).is_ok());
    }
}
