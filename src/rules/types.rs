use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// File type tag used to index rules.
///
/// Several languages fold onto the nearest regex-compatible bucket:
/// C/C++/Rust/Java/Go/Ruby/PHP are scanned with the `python`-class rules.
/// Changing that mapping silently changes finding coverage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Markdown,
    Json,
    Manifest,
    Python,
    Typescript,
    Javascript,
    Bash,
    Binary,
    Text,
    #[serde(untagged)]
    Other(String),
}

impl FileType {
    pub fn as_str(&self) -> &str {
        match self {
            FileType::Markdown => "markdown",
            FileType::Json => "json",
            FileType::Manifest => "manifest",
            FileType::Python => "python",
            FileType::Typescript => "typescript",
            FileType::Javascript => "javascript",
            FileType::Bash => "bash",
            FileType::Binary => "binary",
            FileType::Text => "text",
            FileType::Other(tag) => tag,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => FileType::Markdown,
            "json" => FileType::Json,
            "manifest" => FileType::Manifest,
            "python" | "py" => FileType::Python,
            "typescript" | "ts" => FileType::Typescript,
            "javascript" | "js" => FileType::Javascript,
            "bash" | "sh" | "shell" => FileType::Bash,
            "binary" => FileType::Binary,
            "text" | "txt" => FileType::Text,
            other => FileType::Other(other.to_string()),
        }
    }

    /// Detect a file's type from its basename and extension.
    pub fn from_path(path: &Path) -> Self {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            match name {
                "SKILL.md" => return FileType::Markdown,
                "manifest.json" => return FileType::Manifest,
                "package.json" => return FileType::Json,
                _ => {}
            }
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "md" | "mdx" | "markdown" => FileType::Markdown,
            "json" => FileType::Json,
            "py" | "pyw" => FileType::Python,
            "ts" | "tsx" | "mts" | "cts" => FileType::Typescript,
            "js" | "jsx" | "mjs" | "cjs" => FileType::Javascript,
            "sh" | "bash" | "zsh" | "fish" => FileType::Bash,
            // Regex-compatible fold onto the python rule bucket.
            "c" | "cc" | "cpp" | "h" | "hpp" | "rs" | "java" | "go" | "rb" | "php" => {
                FileType::Python
            }
            "exe" | "dll" | "so" | "dylib" | "bin" | "wasm" | "node" => FileType::Binary,
            _ => FileType::Text,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rule's file-type declaration: a concrete tag or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTypeSelector {
    Any,
    Only(FileType),
}

impl FileTypeSelector {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("any") {
            FileTypeSelector::Any
        } else {
            FileTypeSelector::Only(FileType::parse(s))
        }
    }
}

/// A compiled catalog rule. Immutable after load.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub category: String,
    pub severity: Severity,
    pub patterns: Vec<Regex>,
    pub exclude_patterns: Vec<Regex>,
    pub file_types: Vec<FileTypeSelector>,
    pub description: Option<String>,
    pub remediation: Option<String>,
}

impl Rule {
    pub fn applies_to_any(&self) -> bool {
        self.file_types.iter().any(|s| *s == FileTypeSelector::Any)
    }

    pub fn applies_to(&self, file_type: &FileType) -> bool {
        self.file_types
            .iter()
            .any(|s| matches!(s, FileTypeSelector::Only(t) if t == file_type))
    }
}

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    Signature,
    Heuristic,
}

impl FindingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSource::Signature => "signature",
            FindingSource::Heuristic => "heuristic",
        }
    }
}

/// A single positive match produced by a rule or heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    /// Absolute path or an `mcp://host/...` virtual path.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub source: FindingSource,
    /// The matched text, when a rule produced this finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_reason: Option<String>,
}

impl Finding {
    pub fn signature(rule: &Rule, file: &str, line: usize, matched: &str) -> Self {
        Self {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            message: format!(
                "{}: {}",
                rule.description.as_deref().unwrap_or(&rule.id),
                matched.trim()
            ),
            file: file.to_string(),
            line: Some(line),
            category: Some(rule.category.clone()),
            remediation: rule.remediation.clone(),
            source: FindingSource::Signature,
            snippet: Some(matched.trim().to_string()),
            confidence: None,
            confidence_reason: None,
        }
    }

    pub fn heuristic(
        rule_id: &str,
        severity: Severity,
        category: &str,
        message: String,
        file: &str,
        line: Option<usize>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message,
            file: file.to_string(),
            line,
            category: Some(category.to_string()),
            remediation: None,
            source: FindingSource::Heuristic,
            snippet: None,
            confidence: None,
            confidence_reason: None,
        }
    }

    /// Key used by the meta-analyzer to collapse duplicates.
    pub fn dedup_key(&self) -> (String, String, Option<usize>, String) {
        (
            self.rule_id.clone(),
            self.file.clone(),
            self.line,
            self.message.clone(),
        )
    }
}

/// Per-severity finding counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl Summary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let (critical, high, medium, low) =
            findings
                .iter()
                .fold((0, 0, 0, 0), |(c, h, m, l), f| match f.severity {
                    Severity::Critical => (c + 1, h, m, l),
                    Severity::High => (c, h + 1, m, l),
                    Severity::Medium => (c, h, m + 1, l),
                    Severity::Low => (c, h, m, l + 1),
                });

        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }

    /// Highest severity present, if any.
    pub fn worst(&self) -> Option<Severity> {
        if self.critical > 0 {
            Some(Severity::Critical)
        } else if self.high > 0 {
            Some(Severity::High)
        } else if self.medium > 0 {
            Some(Severity::Medium)
        } else if self.low > 0 {
            Some(Severity::Low)
        } else {
            None
        }
    }
}
