//! Projection of remote MCP state into a virtual file tree.
//!
//! Every tool, prompt, resource, and the server instructions become
//! synthetic files under `mcp://<host>/`, so the scanning engine treats
//! remote state exactly like a local bundle. Findings carry the virtual
//! path in their `file` field.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::mcp::client::McpInventory;

/// Longest allowed path segment after sanitization.
const MAX_SEGMENT_LEN: usize = 120;

/// A synthetic file fed to the scanning engine.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    /// `mcp://<host>/...`
    pub path: String,
    pub content: String,
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_` and bound the length.
pub fn safe_segment(raw: &str) -> String {
    let mut segment: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    segment.truncate(MAX_SEGMENT_LEN);
    if segment.is_empty() {
        segment.push('_');
    }
    segment
}

/// Derive the host segment of the virtual namespace from the server URL,
/// falling back to a sanitized label.
pub fn host_segment(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    safe_segment(host)
}

/// File extension for a read resource, from its MIME type.
fn content_extension(mime: Option<&str>) -> &'static str {
    match mime {
        Some("text/markdown") => "md",
        Some("application/json") => "json",
        Some("text/html") => "html",
        Some("application/javascript") | Some("text/javascript") => "js",
        Some("application/x-yaml") | Some("text/yaml") => "yaml",
        _ => "txt",
    }
}

/// Synthesize the virtual tree for one server's inventory.
pub fn virtualize(host: &str, inventory: &McpInventory) -> Vec<VirtualFile> {
    let prefix = format!("mcp://{host}");
    let mut files = Vec::new();

    if let Some(instructions) = &inventory.handshake.instructions {
        files.push(VirtualFile {
            path: format!("{prefix}/instructions.md"),
            content: instructions.clone(),
        });
    }

    for tool in &inventory.tools {
        let name = object_name(tool);
        let dir = format!("{prefix}/tools/{}", safe_segment(&name));

        if let Some(description) = tool.get("description").and_then(Value::as_str) {
            files.push(VirtualFile {
                path: format!("{dir}/description.md"),
                content: description.to_string(),
            });
        }
        if let Some(schema) = tool.get("inputSchema") {
            files.push(VirtualFile {
                path: format!("{dir}/schema.json"),
                content: pretty(schema),
            });
        }
        files.push(VirtualFile {
            path: format!("{dir}/tool.json"),
            content: pretty(tool),
        });
    }

    for prompt in &inventory.prompts {
        let name = object_name(prompt);
        let dir = format!("{prefix}/prompts/{}", safe_segment(&name));

        if let Some(description) = prompt.get("description").and_then(Value::as_str) {
            files.push(VirtualFile {
                path: format!("{dir}/description.md"),
                content: description.to_string(),
            });
        }
        files.push(VirtualFile {
            path: format!("{dir}/prompt.json"),
            content: pretty(prompt),
        });
    }

    for resource in &inventory.resources {
        let Some(uri) = resource.get("uri").and_then(Value::as_str) else {
            continue;
        };
        let key = URL_SAFE_NO_PAD.encode(uri.as_bytes());
        let dir = format!("{prefix}/resources/{key}");

        files.push(VirtualFile {
            path: format!("{dir}/metadata.json"),
            content: pretty(resource),
        });

        if let Some((_, content, mime)) = inventory
            .resource_contents
            .iter()
            .find(|(u, _, _)| u == uri)
        {
            files.push(VirtualFile {
                path: format!("{dir}/content.{}", content_extension(mime.as_deref())),
                content: content.clone(),
            });
        }
    }

    files
}

fn object_name(value: &Value) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
