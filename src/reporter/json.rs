//! JSON report envelope.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::pipeline::ScanResult;
use crate::reporter::Reporter;
use crate::targets::{TargetKind, TargetMeta};

pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    summary: EnvelopeSummary,
    detected: Detected,
    targets: &'a [crate::targets::Target],
    findings: &'a [crate::rules::types::Finding],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeSummary {
    scanned_at: String,
    scanned_files: usize,
    elapsed_ms: u128,
    finding_count: usize,
    severities: Severities,
}

#[derive(Serialize)]
struct Severities {
    critical: usize,
    high: usize,
    medium: usize,
    low: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Detected {
    target_kinds: Vec<String>,
    sources: Vec<String>,
    rules: Vec<String>,
    categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mcp: Option<McpDetected>,
}

#[derive(Serialize)]
struct McpDetected {
    servers: usize,
    objects: McpObjects,
}

#[derive(Serialize)]
struct McpObjects {
    tools: u64,
    prompts: u64,
    resources: u64,
    instructions: u64,
}

impl Reporter for JsonReporter {
    fn report(&self, result: &ScanResult) -> String {
        let summary = result.summary();

        let target_kinds: BTreeSet<String> = result
            .targets
            .iter()
            .map(|t| t.kind.as_str().to_string())
            .collect();
        let sources: BTreeSet<String> = result
            .findings
            .iter()
            .map(|f| f.source.as_str().to_string())
            .collect();
        let rules: BTreeSet<String> =
            result.findings.iter().map(|f| f.rule_id.clone()).collect();
        let categories: BTreeSet<String> = result
            .findings
            .iter()
            .filter_map(|f| f.category.clone())
            .collect();

        let mcp_targets: Vec<_> = result
            .targets
            .iter()
            .filter(|t| t.kind == TargetKind::Mcp)
            .collect();
        let mcp = if mcp_targets.is_empty() {
            None
        } else {
            let mut objects = McpObjects {
                tools: 0,
                prompts: 0,
                resources: 0,
                instructions: 0,
            };
            for target in &mcp_targets {
                if let TargetMeta::Mcp { extras, .. } = &target.meta {
                    let count = |key: &str| {
                        extras.get(key).and_then(Value::as_u64).unwrap_or(0)
                    };
                    objects.tools += count("tools");
                    objects.prompts += count("prompts");
                    objects.resources += count("resources");
                    objects.instructions += count("instructions");
                }
            }
            Some(McpDetected {
                servers: mcp_targets.len(),
                objects,
            })
        };

        let envelope = Envelope {
            summary: EnvelopeSummary {
                scanned_at: result.scanned_at.clone(),
                scanned_files: result.scanned_files,
                elapsed_ms: result.elapsed_ms,
                finding_count: result.findings.len(),
                severities: Severities {
                    critical: summary.critical,
                    high: summary.high,
                    medium: summary.medium,
                    low: summary.low,
                },
            },
            detected: Detected {
                target_kinds: target_kinds.into_iter().collect(),
                sources: sources.into_iter().collect(),
                rules: rules.into_iter().collect(),
                categories: categories.into_iter().collect(),
                mcp,
            },
            targets: &result.targets,
            findings: &result.findings,
        };

        serde_json::to_string_pretty(&envelope)
            .unwrap_or_else(|e| format!(r#"{{"error": "failed to serialize report: {e}"}}"#))
    }
}
