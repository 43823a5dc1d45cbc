//! SARIF 2.1.0 output: one run, one driver, one result per finding.

use serde::Serialize;

use crate::pipeline::ScanResult;
use crate::reporter::Reporter;
use crate::rules::types::Severity;

const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const DRIVER_NAME: &str = "Security Scanner";

pub struct SarifReporter;

impl SarifReporter {
    pub fn new() -> Self {
        Self
    }

    fn severity_to_level(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical | Severity::High => "error",
            Severity::Medium => "warning",
            Severity::Low => "note",
        }
    }
}

impl Default for SarifReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct SarifReport {
    #[serde(rename = "$schema")]
    schema: String,
    version: String,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
struct SarifDriver {
    name: String,
    version: String,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRule {
    id: String,
    short_description: SarifMessage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id: String,
    level: String,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifPhysicalLocation {
    artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<SarifRegion>,
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRegion {
    start_line: usize,
}

impl SarifReport {
    pub fn from_scan_result(result: &ScanResult) -> Self {
        let mut rules: Vec<SarifRule> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for finding in &result.findings {
            if seen.insert(finding.rule_id.clone()) {
                rules.push(SarifRule {
                    id: finding.rule_id.clone(),
                    short_description: SarifMessage {
                        text: finding
                            .category
                            .clone()
                            .unwrap_or_else(|| finding.rule_id.clone()),
                    },
                });
            }
        }

        let results = result
            .findings
            .iter()
            .map(|f| SarifResult {
                rule_id: f.rule_id.clone(),
                level: SarifReporter::severity_to_level(f.severity).to_string(),
                message: SarifMessage {
                    text: f.message.clone(),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifactLocation {
                            uri: f.file.clone(),
                        },
                        region: f.line.map(|start_line| SarifRegion { start_line }),
                    },
                }],
            })
            .collect();

        SarifReport {
            schema: SARIF_SCHEMA.to_string(),
            version: "2.1.0".to_string(),
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: DRIVER_NAME.to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        rules,
                    },
                },
                results,
            }],
        }
    }
}

impl Reporter for SarifReporter {
    fn report(&self, result: &ScanResult) -> String {
        let report = SarifReport::from_scan_result(result);
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| format!(r#"{{"error": "failed to serialize SARIF: {e}"}}"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::Finding;
    use serde_json::Value;

    fn result_with(findings: Vec<Finding>) -> ScanResult {
        ScanResult {
            scanned_at: "2026-07-01T12:00:00+00:00".to_string(),
            targets: vec![],
            findings,
            scanned_files: 1,
            elapsed_ms: 1,
        }
    }

    fn finding(rule: &str, severity: Severity, line: Option<usize>) -> Finding {
        Finding::heuristic(rule, severity, "cat", "msg".to_string(), "/a/b.sh", line)
    }

    #[test]
    fn test_schema_and_driver() {
        let out = SarifReporter::new().report(&result_with(vec![]));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["version"], "2.1.0");
        assert_eq!(parsed["runs"][0]["tool"]["driver"]["name"], "Security Scanner");
    }

    #[test]
    fn test_level_mapping() {
        let out = SarifReporter::new().report(&result_with(vec![
            finding("C", Severity::Critical, Some(1)),
            finding("H", Severity::High, Some(2)),
            finding("M", Severity::Medium, Some(3)),
            finding("L", Severity::Low, Some(4)),
        ]));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let levels: Vec<_> = parsed["runs"][0]["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["level"].as_str().unwrap())
            .collect();
        assert_eq!(levels, vec!["error", "error", "warning", "note"]);
    }

    #[test]
    fn test_unique_rule_ids_become_rules() {
        let out = SarifReporter::new().report(&result_with(vec![
            finding("DUP", Severity::High, Some(1)),
            finding("DUP", Severity::High, Some(2)),
            finding("OTHER", Severity::Low, Some(3)),
        ]));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed["runs"][0]["tool"]["driver"]["rules"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_location_carries_uri_and_optional_line() {
        let out = SarifReporter::new().report(&result_with(vec![
            finding("A", Severity::High, Some(42)),
            finding("B", Severity::High, None),
        ]));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let results = parsed["runs"][0]["results"].as_array().unwrap();

        let loc = &results[0]["locations"][0]["physicalLocation"];
        assert_eq!(loc["artifactLocation"]["uri"], "/a/b.sh");
        assert_eq!(loc["region"]["startLine"], 42);

        let no_line = &results[1]["locations"][0]["physicalLocation"];
        assert!(no_line.get("region").is_none());
    }

    #[test]
    fn test_mcp_virtual_path_as_uri() {
        let mut f = finding("A", Severity::High, Some(1));
        f.file = "mcp://host/tools/x/description.md".to_string();
        let out = SarifReporter::new().report(&result_with(vec![f]));
        assert!(out.contains("mcp://host/tools/x/description.md"));
    }
}
