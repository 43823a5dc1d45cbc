//! Auto-fix: comment out offending lines.
//!
//! Fixes are grouped per file and applied in one read-modify-write. A line
//! already commented in the file's style is left alone, which makes the
//! whole pass idempotent. Heuristic findings and findings without a line
//! number are never fixed. JSON has no comment syntax, so JSON findings are
//! skipped with a reason.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::rules::types::{Finding, FindingSource};

/// How a line gets commented in a given file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `# line`
    Hash,
    /// `// line`
    Slashes,
    /// `<!-- line -->`
    HtmlWrap,
}

impl CommentStyle {
    /// Pick a style from the file extension; `None` means the file type
    /// cannot be commented (JSON) and the fix is skipped.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "py" | "pyw" | "sh" | "bash" | "zsh" | "fish" | "yml" | "yaml" | "toml" | "rb"
            | "cfg" | "conf" | "ini" | "env" => Some(CommentStyle::Hash),
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "c" | "cc" | "cpp"
            | "h" | "hpp" | "java" | "go" | "rs" | "php" => Some(CommentStyle::Slashes),
            "md" | "mdx" | "markdown" | "html" | "htm" | "xml" => Some(CommentStyle::HtmlWrap),
            _ => None,
        }
    }

    /// Whether the line is already commented in this style.
    pub fn is_commented(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            CommentStyle::Hash => trimmed.starts_with('#'),
            CommentStyle::Slashes => trimmed.starts_with("//"),
            CommentStyle::HtmlWrap => {
                trimmed.starts_with("<!--") && trimmed.trim_end().ends_with("-->")
            }
        }
    }

    /// Comment the line, preserving its leading indentation.
    pub fn comment(&self, line: &str) -> String {
        let indent_len = line.len() - line.trim_start().len();
        let (indent, body) = line.split_at(indent_len);
        match self {
            CommentStyle::Hash => format!("{indent}# {body}"),
            CommentStyle::Slashes => format!("{indent}// {body}"),
            CommentStyle::HtmlWrap => format!("{indent}<!-- {} -->", body.trim_end()),
        }
    }
}

/// One applied line edit.
#[derive(Debug, Clone)]
pub struct AppliedFix {
    pub file: String,
    pub line: usize,
    pub rule_id: String,
}

/// The outcome of a fix pass.
#[derive(Debug, Default)]
pub struct FixOutcome {
    pub applied: Vec<AppliedFix>,
    /// `(file, line, reason)` for findings the applier refused.
    pub skipped: Vec<(String, Option<usize>, String)>,
    pub errors: Vec<(String, String)>,
}

pub struct FixApplier {
    dry_run: bool,
}

impl FixApplier {
    pub fn new() -> Self {
        Self { dry_run: false }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply fixes for all eligible findings, grouped by file.
    pub fn apply(&self, findings: &[Finding]) -> FixOutcome {
        let mut outcome = FixOutcome::default();
        let mut by_file: HashMap<&str, Vec<&Finding>> = HashMap::new();

        for finding in findings {
            if finding.source == FindingSource::Heuristic {
                outcome.skipped.push((
                    finding.file.clone(),
                    finding.line,
                    "heuristic findings are not auto-fixed".to_string(),
                ));
                continue;
            }
            let Some(_) = finding.line else {
                outcome.skipped.push((
                    finding.file.clone(),
                    None,
                    "no line number".to_string(),
                ));
                continue;
            };
            if finding.file.starts_with("mcp://") {
                outcome.skipped.push((
                    finding.file.clone(),
                    finding.line,
                    "virtual file".to_string(),
                ));
                continue;
            }
            by_file.entry(finding.file.as_str()).or_default().push(finding);
        }

        for (file, file_findings) in by_file {
            self.apply_to_file(file, &file_findings, &mut outcome);
        }

        outcome
    }

    fn apply_to_file(&self, file: &str, findings: &[&Finding], outcome: &mut FixOutcome) {
        let path = Path::new(file);
        let Some(style) = CommentStyle::for_path(path) else {
            for f in findings {
                outcome.skipped.push((
                    file.to_string(),
                    f.line,
                    "no comment syntax for this file type".to_string(),
                ));
            }
            return;
        };

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                outcome.errors.push((file.to_string(), e.to_string()));
                return;
            }
        };

        let line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let had_trailing_newline = content.ends_with('\n');
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let mut changed = false;

        for finding in findings {
            let Some(line_no) = finding.line else {
                continue;
            };
            if line_no == 0 || line_no > lines.len() {
                outcome.skipped.push((
                    file.to_string(),
                    Some(line_no),
                    "line out of range".to_string(),
                ));
                continue;
            }

            let idx = line_no - 1;
            if style.is_commented(&lines[idx]) {
                outcome.skipped.push((
                    file.to_string(),
                    Some(line_no),
                    "already commented".to_string(),
                ));
                continue;
            }

            lines[idx] = style.comment(&lines[idx]);
            changed = true;
            outcome.applied.push(AppliedFix {
                file: file.to_string(),
                line: line_no,
                rule_id: finding.rule_id.clone(),
            });
        }

        if changed && !self.dry_run {
            let mut rebuilt = lines.join(line_ending);
            if had_trailing_newline {
                rebuilt.push_str(line_ending);
            }
            if let Err(e) = std::fs::write(path, rebuilt) {
                outcome.errors.push((file.to_string(), e.to_string()));
            } else {
                debug!(file, "fixes written");
            }
        }
    }
}

impl Default for FixApplier {
    fn default() -> Self {
        Self::new()
    }
}
