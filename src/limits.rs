//! Runtime limits and tunables.
//!
//! Every cap the scanner enforces lives here with its compiled default and
//! the `SCANNER_*` environment variable that overrides it. CLI flags are
//! layered on top by the binary; the library only sees the merged struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum bytes of a file the scanner will read.
pub const DEFAULT_MAX_SCAN_BYTES: u64 = 5 * 1024 * 1024;
/// Reserved threshold for a future streaming read path.
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 10 * 1024 * 1024;
/// Per-call regex deadline in milliseconds.
pub const DEFAULT_REGEX_TIMEOUT_MS: u64 = 1000;
/// Findings one rule may emit for one file.
pub const MAX_FINDINGS_PER_RULE_PER_FILE: usize = 20;
/// Heuristic findings per file (entropy detector).
pub const MAX_HEURISTIC_FINDINGS: usize = 10;
/// Findings one file may contribute after truncation.
pub const DEFAULT_MAX_FINDINGS_PER_FILE: usize = 100;
/// Global finding budget per run.
pub const DEFAULT_MAX_TOTAL_FINDINGS: usize = 10_000;
/// File count at which a target is scanned with chunked parallelism.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_scan_bytes: u64,
    pub streaming_threshold: u64,
    pub streaming_enabled: bool,
    pub regex_timeout_ms: u64,
    pub max_findings_per_file: usize,
    pub max_total_findings: usize,
    pub parallel_enabled: bool,
    pub parallel_workers: Option<usize>,
    pub parallel_threshold: usize,
    pub cache_enabled: bool,
    pub cache_max_age_secs: u64,
    pub cache_max_entries: usize,
    pub cache_max_size_bytes: u64,
    pub cache_dir: Option<std::path::PathBuf>,
    pub mcp_max_retries: u32,
    pub mcp_retry_delay_ms: u64,
    pub mcp_timeout_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_scan_bytes: DEFAULT_MAX_SCAN_BYTES,
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            streaming_enabled: false,
            regex_timeout_ms: DEFAULT_REGEX_TIMEOUT_MS,
            max_findings_per_file: DEFAULT_MAX_FINDINGS_PER_FILE,
            max_total_findings: DEFAULT_MAX_TOTAL_FINDINGS,
            parallel_enabled: true,
            parallel_workers: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            cache_enabled: true,
            cache_max_age_secs: 7 * 24 * 3600,
            cache_max_entries: 10_000,
            cache_max_size_bytes: 50 * 1024 * 1024,
            cache_dir: None,
            mcp_max_retries: 3,
            mcp_retry_delay_ms: 500,
            mcp_timeout_ms: 30_000,
        }
    }
}

impl Limits {
    /// Build limits from defaults plus any `SCANNER_*` environment overrides.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(v) = env_parse::<u64>("SCANNER_MAX_FILE_SIZE") {
            limits.max_scan_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_STREAMING_THRESHOLD") {
            limits.streaming_threshold = v;
        }
        if let Some(v) = env_bool("SCANNER_STREAMING_ENABLED") {
            limits.streaming_enabled = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_REGEX_TIMEOUT_MS") {
            limits.regex_timeout_ms = v;
        }
        if let Some(v) = env_parse::<usize>("SCANNER_MAX_FINDINGS_PER_FILE") {
            limits.max_findings_per_file = v;
        }
        if let Some(v) = env_parse::<usize>("SCANNER_MAX_TOTAL_FINDINGS") {
            limits.max_total_findings = v;
        }
        if let Some(v) = env_bool("SCANNER_PARALLEL_ENABLED") {
            limits.parallel_enabled = v;
        }
        if let Some(v) = env_parse::<usize>("SCANNER_PARALLEL_WORKERS") {
            limits.parallel_workers = Some(v);
        }
        if let Some(v) = env_parse::<usize>("SCANNER_PARALLEL_THRESHOLD") {
            limits.parallel_threshold = v;
        }
        if let Some(v) = env_bool("SCANNER_CACHE_ENABLED") {
            limits.cache_enabled = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_CACHE_MAX_AGE") {
            limits.cache_max_age_secs = v;
        }
        if let Some(v) = env_parse::<usize>("SCANNER_CACHE_MAX_ENTRIES") {
            limits.cache_max_entries = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_CACHE_MAX_SIZE_MB") {
            limits.cache_max_size_bytes = v * 1024 * 1024;
        }
        if let Ok(v) = std::env::var("SCANNER_CACHE_DIR") {
            if !v.is_empty() {
                limits.cache_dir = Some(std::path::PathBuf::from(v));
            }
        }
        if let Some(v) = env_parse::<u32>("SCANNER_MCP_MAX_RETRIES") {
            limits.mcp_max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_MCP_RETRY_DELAY_MS") {
            limits.mcp_retry_delay_ms = v;
        }
        if let Some(v) = env_parse::<u64>("SCANNER_MCP_TIMEOUT_MS") {
            limits.mcp_timeout_ms = v;
        }

        limits
    }

    pub fn regex_timeout(&self) -> Duration {
        Duration::from_millis(self.regex_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_millis(self.mcp_timeout_ms)
    }

    pub fn mcp_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mcp_retry_delay_ms)
    }

    /// Worker count for the bounded (sub-threshold) scan path.
    pub fn bounded_workers(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.parallel_workers
            .unwrap_or_else(|| (cpus / 2).clamp(4, 32))
    }

    /// Chunk count for the chunked parallel scan path.
    pub fn chunk_workers(&self, files: usize) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.parallel_workers
            .unwrap_or(cpus)
            .min(files)
            .min(8)
            .max(1)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let v = v.to_lowercase();
        v == "1" || v == "true" || v == "yes" || v == "on"
    })
}
