use std::process::ExitCode;

use agent_audit::cli::{Cli, Command, McpCommand};
use agent_audit::run::{run_mcp_config, run_mcp_remote, run_scan};
use clap::Parser;

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(args, false),
        Command::ScanAll(args) => run_scan(args, true),
        Command::Mcp(McpCommand::Remote(args)) => run_mcp_remote(args),
        Command::Mcp(McpCommand::Config(args)) => run_mcp_config(args),
    }
}

/// Verbose diagnostics when DEBUG is set, quiet otherwise.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let default = if std::env::var_os("DEBUG").is_some() {
        "agent_audit=debug"
    } else {
        "agent_audit=error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
