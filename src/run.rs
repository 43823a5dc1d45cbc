//! Command execution: resolve targets, run the pipeline, render, decide the
//! exit code.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::cli::{
    parse_headers, McpConfigArgs, McpRemoteArgs, OutputArgs, OutputFormat, ScanArgs,
};
use crate::limits::Limits;
use crate::mcp::{host_segment, virtualize, CollectOptions, McpClient, VirtualFile};
use crate::pipeline::{ScanOptions, ScanResult, Scanner};
use crate::reporter::{JsonReporter, Reporter, SarifReporter, TerminalReporter};
use crate::rules::loader::RuleCatalog;
use crate::targets::{
    discover_extensions, discover_ide_extensions, discover_skills, Target, TargetKind, TargetMeta,
};

/// Default traversal depth for plain `scan`; `scan-all` removes it.
const DEFAULT_SCAN_DEPTH: usize = 12;

pub fn run_scan(args: ScanArgs, full_depth: bool) -> ExitCode {
    let catalog = match load_catalog(args.rules.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut targets: Vec<Target> = Vec::new();
    for path in &args.paths {
        if !path.exists() {
            eprintln!("Error: path does not exist: {}", path.display());
            return ExitCode::from(1);
        }
        if path.join("SKILL.md").exists() {
            let mut skill = Target::path_target(path);
            skill.kind = TargetKind::Skill;
            targets.push(skill);
        } else {
            targets.push(Target::path_target(path));
        }
    }
    for root in &args.skills_dir {
        targets.extend(discover_skills(root));
    }
    for root in &args.extensions_dir {
        targets.extend(discover_extensions(root, None));
    }
    for root in &args.ide_extensions_dir {
        targets.extend(discover_ide_extensions(root));
    }

    if targets.is_empty() {
        eprintln!("Error: no scan targets found");
        return ExitCode::from(1);
    }

    let options = scan_options(
        &args.output,
        args.use_behavioral,
        args.fix,
        if full_depth || args.full_depth {
            None
        } else {
            Some(DEFAULT_SCAN_DEPTH)
        },
    );

    let scanner = Scanner::new(catalog, Limits::from_env(), options);
    let result = scanner.scan_targets(targets, &HashMap::new());
    scanner.flush_cache();

    render_and_exit(&result, &args.output)
}

pub fn run_mcp_remote(args: McpRemoteArgs) -> ExitCode {
    let catalog = match load_catalog(args.rules.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let limits = Limits::from_env();

    let collect = collect_options(
        &args.scan,
        args.read_resources,
        args.mime_types.clone(),
        args.max_resource_bytes,
    );

    let collected = collect_server(
        &args.url,
        args.bearer_token.clone(),
        parse_headers(&args.headers),
        &collect,
        &limits,
    );

    let (target, files) = match collected {
        Ok(pair) => pair,
        Err(message) => {
            eprintln!("Error: {message}");
            return ExitCode::from(1);
        }
    };

    let options = scan_options(&args.output, true, false, None);
    let scanner = Scanner::new(catalog, limits, options);

    let mut virtual_files = HashMap::new();
    virtual_files.insert(target.path.clone(), files);
    let result = scanner.scan_targets(vec![target], &virtual_files);
    scanner.flush_cache();

    render_and_exit(&result, &args.output)
}

/// Shape of an MCP client config file; only remote (url) servers are
/// scannable over JSON-RPC.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpConfigFile {
    #[serde(default)]
    mcp_servers: HashMap<String, McpServerEntry>,
}

#[derive(Debug, Deserialize)]
struct McpServerEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

pub fn run_mcp_config(args: McpConfigArgs) -> ExitCode {
    let catalog = match load_catalog(args.rules.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let limits = Limits::from_env();

    let text = match std::fs::read_to_string(&args.path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: cannot read {}: {e}", args.path.display());
            return ExitCode::from(1);
        }
    };
    let config: McpConfigFile = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot parse {}: {e}", args.path.display());
            return ExitCode::from(1);
        }
    };

    let headers = parse_headers(&args.headers);
    let collect = CollectOptions::default();
    let mut targets = Vec::new();
    let mut virtual_files: HashMap<String, Vec<VirtualFile>> = HashMap::new();

    let mut names: Vec<_> = config.mcp_servers.keys().cloned().collect();
    names.sort();

    for name in names {
        let entry = &config.mcp_servers[&name];
        let Some(url) = &entry.url else {
            if entry.command.is_some() {
                warn!(server = %name, "stdio server skipped; only remote servers are scanned");
            }
            continue;
        };

        match collect_server(url, args.bearer_token.clone(), headers.clone(), &collect, &limits) {
            Ok((target, files)) => {
                virtual_files.insert(target.path.clone(), files);
                targets.push(target);
            }
            Err(message) => {
                // Per-target failure: record on the target and continue.
                let mut target = mcp_target(&name, url, BTreeMap::new());
                target.meta.set_error(message);
                targets.push(target);
            }
        }
    }

    if targets.is_empty() {
        eprintln!("Error: no remote MCP servers in {}", args.path.display());
        return ExitCode::from(1);
    }

    let options = scan_options(&args.output, true, false, None);
    let scanner = Scanner::new(catalog, limits, options);
    let result = scanner.scan_targets(targets, &virtual_files);
    scanner.flush_cache();

    render_and_exit(&result, &args.output)
}

/// Connect, collect, and virtualize one server. The error string is
/// user-facing.
fn collect_server(
    url: &str,
    bearer_token: Option<String>,
    headers: Vec<(String, String)>,
    collect: &CollectOptions,
    limits: &Limits,
) -> Result<(Target, Vec<VirtualFile>), String> {
    let client = McpClient::new(url, limits)
        .map_err(|e| e.to_string())?
        .with_bearer_token(bearer_token)
        .with_headers(headers);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;
    let inventory = runtime
        .block_on(client.collect(collect))
        .map_err(|e| format!("{url}: {e}"))?;

    let host = host_segment(url);
    let files = virtualize(&host, &inventory);

    let mut extras = BTreeMap::new();
    extras.insert("tools".to_string(), Value::from(inventory.tools.len() as u64));
    extras.insert(
        "prompts".to_string(),
        Value::from(inventory.prompts.len() as u64),
    );
    extras.insert(
        "resources".to_string(),
        Value::from(inventory.resources.len() as u64),
    );
    extras.insert(
        "instructions".to_string(),
        Value::from(u64::from(inventory.handshake.instructions.is_some())),
    );
    if let Some(name) = &inventory.handshake.server_name {
        extras.insert("serverName".to_string(), Value::String(name.clone()));
    }

    Ok((mcp_target(&host, url, extras), files))
}

fn mcp_target(name: &str, url: &str, extras: BTreeMap<String, Value>) -> Target {
    Target {
        kind: TargetKind::Mcp,
        name: name.to_string(),
        path: url.to_string(),
        meta: TargetMeta::Mcp {
            url: url.to_string(),
            error: None,
            extras,
        },
    }
}

fn load_catalog(rules: Option<&Path>) -> Result<RuleCatalog, ExitCode> {
    let loaded = match rules {
        Some(path) => RuleCatalog::from_file(path),
        None => RuleCatalog::builtin(),
    };
    loaded.map_err(|e| {
        eprintln!("Error: {e}");
        ExitCode::from(1)
    })
}

fn scan_options(
    output: &OutputArgs,
    behavioral: bool,
    fix: bool,
    max_depth: Option<usize>,
) -> ScanOptions {
    let quiet = output.effective_format() != OutputFormat::Table;
    ScanOptions {
        behavioral,
        enable_meta: output.enable_meta,
        with_confidence: output.show_confidence || output.min_confidence.is_some(),
        min_confidence: output.min_confidence,
        apply_fixes: fix,
        quiet_warnings: quiet,
        max_depth,
    }
}

fn collect_options(
    scan: &[String],
    read_resources: bool,
    mime_types: Vec<String>,
    max_resource_bytes: usize,
) -> CollectOptions {
    let wants = |key: &str| scan.iter().any(|s| s.eq_ignore_ascii_case(key));
    CollectOptions {
        tools: wants("tools"),
        prompts: wants("prompts"),
        resources: wants("resources"),
        instructions: wants("instructions"),
        read_resources,
        mime_types,
        max_resource_bytes,
    }
}

fn render_and_exit(result: &ScanResult, output: &OutputArgs) -> ExitCode {
    let rendered = match output.effective_format() {
        OutputFormat::Table => {
            TerminalReporter::new(output.show_confidence, output.verbose).report(result)
        }
        OutputFormat::Json => JsonReporter::new().report(result),
        OutputFormat::Sarif => SarifReporter::new().report(result),
    };

    if let Some(path) = &output.output {
        if let Err(e) = write_report(path, &rendered) {
            eprintln!("Error: cannot write {}: {e}", path.display());
            return ExitCode::from(1);
        }
    } else {
        println!("{rendered}");
    }

    ExitCode::from(exit_status(result, output))
}

fn write_report(path: &PathBuf, rendered: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, rendered)
}

/// 0 on success, 2 when the fail threshold is met.
fn exit_status(result: &ScanResult, output: &OutputArgs) -> u8 {
    if output.fail_on_findings && !result.findings.is_empty() {
        return 2;
    }
    if let Some(threshold) = output.fail_on {
        if result.findings.iter().any(|f| f.severity >= threshold) {
            return 2;
        }
    }
    0
}
