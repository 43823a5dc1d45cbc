//! YAML rule catalog loading.
//!
//! Each catalog entry is validated on its own: a malformed entry or an
//! uncompilable pattern is dropped with a tracing warning and the rest of
//! the catalog continues to load. The raw catalog text is hashed into the
//! rule version that keys cache entries.

use regex::RegexBuilder;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;

use crate::error::RuleLoadError;
use crate::rules::types::{FileTypeSelector, Rule, Severity};

/// Rule ids that heuristics emit directly. A catalog rule with these ids is
/// retained even when none of its patterns compile, so catalog metadata
/// (remediation text) stays attached to heuristic findings.
const HEURISTIC_RULE_IDS: &[&str] = &[
    "HEURISTIC_HIGH_ENTROPY_STRING",
    "SUPPLY_CHAIN_INSTALL_SCRIPT",
    "SUPPLY_CHAIN_REMOTE_FETCH",
    "SUPPLY_CHAIN_REMOTE_EXEC",
    "SUPPLY_CHAIN_PERMISSION_CHANGE",
    "CODE_JS_EVAL_OR_FUNCTION",
    "CODE_JS_DYNAMIC_SCRIPT_INJECT",
    "CODE_JS_EXFIL_SOURCES_TO_NETWORK",
    "CODE_PY_SUBPROCESS_SHELL",
    "CODE_PY_PICKLE_LOAD",
    "CODE_SH_REMOTE_PIPE",
];

/// Raw YAML shape of one catalog entry. Required fields are `Option` so a
/// bad entry can be skipped instead of failing the whole document.
#[derive(Debug, Deserialize)]
struct RawRule {
    id: Option<String>,
    category: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    exclude_patterns: Vec<String>,
    #[serde(default)]
    file_types: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    remediation: Option<String>,
}

/// A loaded, compiled rule catalog plus its version tag.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    pub rules: Vec<Rule>,
    pub version: String,
}

impl RuleCatalog {
    /// Load the built-in catalog shipped with the binary.
    pub fn builtin() -> Result<Self, RuleLoadError> {
        Self::from_yaml(include_str!("default_rules.yaml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleLoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| RuleLoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse a YAML sequence of rule objects into a compiled catalog.
    pub fn from_yaml(text: &str) -> Result<Self, RuleLoadError> {
        let raw: Vec<RawRule> = serde_yaml::from_str(text)?;
        let version = rule_version(text);

        let mut rules = Vec::with_capacity(raw.len());
        for entry in raw {
            if let Some(rule) = compile_rule(entry) {
                rules.push(rule);
            }
        }

        if rules.is_empty() {
            return Err(RuleLoadError::EmptyCatalog);
        }

        Ok(Self { rules, version })
    }
}

/// Opaque version tag for a catalog text; any edit invalidates all cached
/// findings.
pub fn rule_version(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{:x}", digest)
}

fn compile_rule(raw: RawRule) -> Option<Rule> {
    let id = match raw.id {
        Some(id) if !id.is_empty() => id,
        _ => {
            warn!("skipping rule with missing id");
            return None;
        }
    };

    let Some(category) = raw.category else {
        warn!(rule = %id, "skipping rule with missing category");
        return None;
    };
    let severity = match raw.severity.as_deref().and_then(Severity::parse) {
        Some(s) => s,
        None => {
            warn!(rule = %id, "skipping rule with missing or invalid severity");
            return None;
        }
    };
    if raw.patterns.is_empty() {
        warn!(rule = %id, "skipping rule with no patterns");
        return None;
    }
    if raw.file_types.is_empty() {
        warn!(rule = %id, "skipping rule with no file_types");
        return None;
    }

    let patterns: Vec<_> = raw
        .patterns
        .iter()
        .filter_map(|p| compile_pattern(&id, p))
        .collect();
    let exclude_patterns: Vec<_> = raw
        .exclude_patterns
        .iter()
        .filter_map(|p| compile_pattern(&id, p))
        .collect();

    if patterns.is_empty() && !HEURISTIC_RULE_IDS.contains(&id.as_str()) {
        warn!(rule = %id, "skipping rule: no pattern compiled");
        return None;
    }

    let file_types = raw
        .file_types
        .iter()
        .map(|s| FileTypeSelector::parse(s))
        .collect();

    Some(Rule {
        id,
        category,
        severity,
        patterns,
        exclude_patterns,
        file_types,
        description: raw.description,
        remediation: raw.remediation,
    })
}

/// Compile one pattern, translating an embedded PCRE `(?i)` flag into the
/// builder's case-insensitivity switch.
fn compile_pattern(rule_id: &str, source: &str) -> Option<regex::Regex> {
    let case_insensitive = source.contains("(?i)");
    let cleaned = if case_insensitive {
        source.replace("(?i)", "")
    } else {
        source.to_string()
    };

    match RegexBuilder::new(&cleaned)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(rule = %rule_id, pattern = %source, error = %e, "dropping uncompilable pattern");
            None
        }
    }
}
