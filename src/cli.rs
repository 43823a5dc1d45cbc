use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::rules::types::Severity;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Sarif,
}

#[derive(Parser, Debug)]
#[command(
    name = "agent-audit",
    version,
    about = "Security scanner for skills, browser extensions, IDE extensions, and MCP servers",
    long_about = "agent-audit inspects AI-agent attack surface (skill bundles, unpacked browser \
                  extensions, IDE extensions, and remote MCP servers) for risky or malicious patterns."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a path (skills, extensions, or arbitrary directories)
    Scan(ScanArgs),
    /// Scan a path recursively at full depth
    ScanAll(ScanArgs),
    /// Scan MCP servers
    #[command(subcommand)]
    Mcp(McpCommand),
}

#[derive(Subcommand, Debug)]
pub enum McpCommand {
    /// Scan a remote MCP server over JSON-RPC
    Remote(McpRemoteArgs),
    /// Scan every remote server listed in an MCP config file
    Config(McpConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long)]
    pub json: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Exit with code 2 when any finding meets this severity
    #[arg(long, value_enum)]
    pub fail_on: Option<Severity>,

    /// Exit with code 2 when there is any finding at all
    #[arg(long)]
    pub fail_on_findings: bool,

    /// Show the confidence column in table output
    #[arg(long)]
    pub show_confidence: bool,

    /// Drop findings below this confidence (0.0-1.0)
    #[arg(long, value_name = "SCORE")]
    pub min_confidence: Option<f64>,

    /// Collapse duplicate findings before reporting
    #[arg(long)]
    pub enable_meta: bool,

    /// Verbose finding details in table output
    #[arg(short, long)]
    pub verbose: bool,
}

impl OutputArgs {
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Paths to scan
    #[arg(required_unless_present_any = ["skills_dir", "extensions_dir", "ide_extensions_dir"])]
    pub paths: Vec<PathBuf>,

    /// Roots to search for skill bundles (repeatable)
    #[arg(long, value_name = "DIR")]
    pub skills_dir: Vec<PathBuf>,

    /// Roots to search for unpacked browser extensions (repeatable)
    #[arg(long, value_name = "DIR")]
    pub extensions_dir: Vec<PathBuf>,

    /// Roots to search for IDE extensions (repeatable)
    #[arg(long, value_name = "DIR")]
    pub ide_extensions_dir: Vec<PathBuf>,

    /// Remove the traversal depth bound
    #[arg(long)]
    pub full_depth: bool,

    /// Run behavioral heuristics (entropy secrets, manifest and code analysis)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    pub use_behavioral: bool,

    /// Comment out offending lines after reporting
    #[arg(long)]
    pub fix: bool,

    /// Custom rule catalog (YAML) replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct McpRemoteArgs {
    /// Server URL (http or https)
    pub url: String,

    /// Bearer token for Authorization
    #[arg(long, env = "SCANNER_MCP_BEARER_TOKEN")]
    pub bearer_token: Option<String>,

    /// Extra header "Key: Value" (repeatable)
    #[arg(long = "header", value_name = "K: V")]
    pub headers: Vec<String>,

    /// Which object classes to scan
    #[arg(long, value_delimiter = ',', default_values = ["tools", "prompts", "resources", "instructions"])]
    pub scan: Vec<String>,

    /// Also fetch resource contents
    #[arg(long)]
    pub read_resources: bool,

    /// MIME allowlist for resource reads (csv)
    #[arg(long, value_delimiter = ',')]
    pub mime_types: Vec<String>,

    /// Byte cap for a single resource's content
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_resource_bytes: usize,

    /// Custom rule catalog (YAML)
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct McpConfigArgs {
    /// Path to an MCP config JSON file (mcpServers map)
    pub path: PathBuf,

    /// Bearer token for Authorization
    #[arg(long, env = "SCANNER_MCP_BEARER_TOKEN")]
    pub bearer_token: Option<String>,

    /// Extra header "Key: Value" (repeatable)
    #[arg(long = "header", value_name = "K: V")]
    pub headers: Vec<String>,

    /// Custom rule catalog (YAML)
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Parse repeatable `-H "Key: Value"` style headers.
pub fn parse_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|h| {
            h.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_parses_paths_and_flags() {
        let cli = Cli::parse_from([
            "agent-audit",
            "scan",
            "/tmp/skills",
            "--fail-on",
            "high",
            "--enable-meta",
            "--min-confidence",
            "0.5",
        ]);
        match cli.command {
            Command::Scan(args) => {
                assert_eq!(args.paths.len(), 1);
                assert_eq!(args.output.fail_on, Some(Severity::High));
                assert!(args.output.enable_meta);
                assert_eq!(args.output.min_confidence, Some(0.5));
                assert!(args.use_behavioral);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_behavioral_can_be_disabled() {
        let cli = Cli::parse_from(["agent-audit", "scan", "/x", "--use-behavioral", "false"]);
        match cli.command {
            Command::Scan(args) => assert!(!args.use_behavioral),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_json_shorthand() {
        let cli = Cli::parse_from(["agent-audit", "scan", "/x", "--json"]);
        match cli.command {
            Command::Scan(args) => {
                assert_eq!(args.output.effective_format(), OutputFormat::Json)
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_mcp_remote_defaults() {
        let cli = Cli::parse_from(["agent-audit", "mcp", "remote", "http://localhost:3000"]);
        match cli.command {
            Command::Mcp(McpCommand::Remote(args)) => {
                assert_eq!(args.scan.len(), 4);
                assert!(!args.read_resources);
                assert_eq!(args.max_resource_bytes, 1024 * 1024);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_scan_with_only_skills_dir() {
        let cli = Cli::parse_from(["agent-audit", "scan", "--skills-dir", "/opt/skills"]);
        match cli.command {
            Command::Scan(args) => {
                assert!(args.paths.is_empty());
                assert_eq!(args.skills_dir.len(), 1);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_headers() {
        let parsed = parse_headers(&[
            "X-Api-Key: abc123".to_string(),
            "Accept-Language:en".to_string(),
            "malformed-no-colon".to_string(),
        ]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("X-Api-Key".to_string(), "abc123".to_string()));
        assert_eq!(parsed[1], ("Accept-Language".to_string(), "en".to_string()));
    }
}
