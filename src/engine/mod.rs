//! The scanning engine: rule evaluation over a single file's content.
//!
//! Rules matching the file's type run first (signature findings), then the
//! behavioral heuristics when enabled. Regex execution is bounded by a
//! wall-clock deadline checked between non-overlapping match pulls; a rule
//! that exceeds its budget stops for that file and is reported as a
//! warning, never an error.

pub mod confidence;
pub mod heuristics;

use std::time::{Duration, Instant};

use crate::limits::MAX_FINDINGS_PER_RULE_PER_FILE;
use crate::rules::types::{FileType, Finding, Rule};
use crate::rules::IndexedRuleEngine;

/// Byte offsets of line starts, built once per content.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// 1-based line number containing the byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// Output of one engine pass over one file.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub findings: Vec<Finding>,
    /// Human-readable warnings (regex timeouts); printing is the caller's
    /// decision because JSON output suppresses them.
    pub warnings: Vec<String>,
}

/// Scans one file's content against the indexed catalog plus heuristics.
pub struct ContentScanner<'a> {
    engine: &'a IndexedRuleEngine,
    regex_timeout: Duration,
    behavioral: bool,
}

impl<'a> ContentScanner<'a> {
    pub fn new(engine: &'a IndexedRuleEngine, regex_timeout: Duration, behavioral: bool) -> Self {
        Self {
            engine,
            regex_timeout,
            behavioral,
        }
    }

    /// Run every applicable rule and heuristic against `content`.
    ///
    /// `file` is the path recorded on findings; for MCP targets it is the
    /// `mcp://` virtual path.
    pub fn scan(&self, content: &str, file: &str, file_type: &FileType) -> EngineOutput {
        let mut output = EngineOutput::default();
        let index = LineIndex::new(content);

        for rule in self.engine.rules_for(file_type) {
            self.run_rule(rule, content, file, &index, &mut output);
        }

        if self.behavioral && *file_type != FileType::Binary {
            heuristics::run_all(content, file, file_type, &index, &mut output.findings);
        }

        output
    }

    fn run_rule(
        &self,
        rule: &Rule,
        content: &str,
        file: &str,
        index: &LineIndex,
        output: &mut EngineOutput,
    ) {
        let mut emitted = 0usize;
        let cumulative_cap = self.regex_timeout * 5;

        'patterns: for pattern in &rule.patterns {
            let pattern_start = Instant::now();
            let mut at = 0usize;

            while at <= content.len() {
                let call_start = Instant::now();
                let matched = pattern.find_at(content, at);
                let call_elapsed = call_start.elapsed();

                if call_elapsed > self.regex_timeout
                    || pattern_start.elapsed() > cumulative_cap
                {
                    output.warnings.push(format!(
                        "regex budget exceeded for rule {} on {}; rule skipped for this file",
                        rule.id, file
                    ));
                    break 'patterns;
                }

                let Some(m) = matched else { break };

                // Zero-length matches would otherwise loop forever.
                at = if m.end() == m.start() {
                    m.start() + 1
                } else {
                    m.end()
                };

                if rule
                    .exclude_patterns
                    .iter()
                    .any(|e| e.is_match(m.as_str()))
                {
                    continue;
                }

                let line = index.line_of(m.start());
                output
                    .findings
                    .push(Finding::signature(rule, file, line, m.as_str()));
                emitted += 1;

                if emitted >= MAX_FINDINGS_PER_RULE_PER_FILE {
                    return;
                }
            }
        }
    }
}
