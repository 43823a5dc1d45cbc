//! Behavioral heuristics: detectors that a single catalog regex cannot
//! express. All run only when the pipeline enables behavioral mode.

pub mod entropy;
pub mod ext_manifest;
pub mod js;
pub mod package_json;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::engine::LineIndex;
use crate::rules::types::{FileType, Finding, Severity};

static PY_SUBPROCESS_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"subprocess\.(run|call|Popen|check_output)\s*\([^)]*shell\s*=\s*True")
        .expect("subprocess pattern")
});

static PY_PICKLE_LOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pickle\.loads?\s*\(").expect("pickle pattern"));

static SH_REMOTE_PIPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(curl|wget)[^|\n]*\|\s*(sudo\s+)?(ba)?sh\b").expect("remote pipe pattern")
});

/// Run every heuristic applicable to the file type.
pub fn run_all(
    content: &str,
    file: &str,
    file_type: &FileType,
    index: &LineIndex,
    findings: &mut Vec<Finding>,
) {
    entropy::scan(content, file, index, findings);

    let basename = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if basename == "package.json" {
        package_json::scan(content, file, findings);
    }
    if basename == "manifest.json" {
        ext_manifest::scan(content, file, findings);
    }

    match file_type {
        FileType::Javascript | FileType::Typescript => {
            js::scan(content, file, findings);
        }
        FileType::Python => scan_python(content, file, index, findings),
        FileType::Bash => scan_shell(content, file, index, findings),
        _ => {}
    }
}

fn scan_python(content: &str, file: &str, index: &LineIndex, findings: &mut Vec<Finding>) {
    for m in PY_SUBPROCESS_SHELL.find_iter(content) {
        findings.push(Finding::heuristic(
            "CODE_PY_SUBPROCESS_SHELL",
            Severity::High,
            "command_injection",
            "subprocess invoked with shell=True".to_string(),
            file,
            Some(index.line_of(m.start())),
        ));
    }
    for m in PY_PICKLE_LOAD.find_iter(content) {
        findings.push(Finding::heuristic(
            "CODE_PY_PICKLE_LOAD",
            Severity::High,
            "unsafe_deserialization",
            "pickle deserialization of untrusted data".to_string(),
            file,
            Some(index.line_of(m.start())),
        ));
    }
}

fn scan_shell(content: &str, file: &str, index: &LineIndex, findings: &mut Vec<Finding>) {
    for m in SH_REMOTE_PIPE.find_iter(content) {
        findings.push(Finding::heuristic(
            "CODE_SH_REMOTE_PIPE",
            Severity::Critical,
            "remote_execution",
            format!("remote content piped into a shell: {}", m.as_str().trim()),
            file,
            Some(index.line_of(m.start())),
        ));
    }
}
