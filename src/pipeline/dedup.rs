//! Meta-analysis pass: collapse findings that share the same identity.

use rustc_hash::FxHashSet;

use crate::rules::types::Finding;

/// Drop findings whose `(rule_id, file, line, message)` was already seen,
/// keeping first occurrences in order.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = FxHashSet::default();
    findings
        .into_iter()
        .filter(|f| seen.insert(f.dedup_key()))
        .collect()
}
