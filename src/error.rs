//! Error types for agent-audit.
//!
//! Every failure the pipeline can encounter is a variant here or in a
//! subsystem error that nests into [`AuditError`]. Per-file failures are
//! recoverable and never cross the file boundary; only usage errors and
//! "no targets" conditions halt a run.

use std::path::PathBuf;
use thiserror::Error;

use crate::security::content::ContentError;
use crate::security::paths::PathSecurityError;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read file: {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsafe path skipped: {0}")]
    PathUnsafe(#[from] PathSecurityError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Regex timed out for rule {rule_id}")]
    RegexTimeout { rule_id: String },

    #[error("Failed to load rule catalog: {0}")]
    RuleLoad(#[from] RuleLoadError),

    #[error("Cache I/O error: {0}")]
    CacheIo(#[source] std::io::Error),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("No scan targets found under {0}")]
    NoTargets(PathBuf),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors raised while loading the YAML rule catalog.
///
/// Individual malformed entries are skipped with a warning rather than
/// surfaced here; this type covers failures that make the whole catalog
/// unusable.
#[derive(Error, Debug)]
pub enum RuleLoadError {
    #[error("Failed to read rule file: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Rule catalog is empty after validation")]
    EmptyCatalog,
}

/// Errors from the MCP JSON-RPC client.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Network error talking to {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Method not supported by server")]
    MethodNotFound,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid MCP URL: {0}")]
    InvalidUrl(String),
}

impl McpError {
    /// Whether the retry policy should try this call again.
    ///
    /// Network failures and 5xx responses are transient; 4xx, JSON-RPC
    /// errors, and `-32601` (method not found) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            McpError::Network { .. } => true,
            McpError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
