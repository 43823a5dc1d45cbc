//! File-type index over the rule catalog.

use rustc_hash::FxHashMap;

use crate::rules::types::{FileType, FileTypeSelector, Rule};

/// Rules partitioned by the file type they declare, with a separate list
/// for wildcard (`any`) rules. Lookup returns universal rules first, then
/// the type bucket, preserving catalog declaration order within each.
pub struct IndexedRuleEngine {
    rules: Vec<Rule>,
    universal: Vec<usize>,
    by_type: FxHashMap<FileType, Vec<usize>>,
    version: String,
}

impl IndexedRuleEngine {
    pub fn new(rules: Vec<Rule>, version: String) -> Self {
        let mut universal = Vec::new();
        let mut by_type: FxHashMap<FileType, Vec<usize>> = FxHashMap::default();

        for (idx, rule) in rules.iter().enumerate() {
            if rule.applies_to_any() {
                universal.push(idx);
            }
            for selector in &rule.file_types {
                if let FileTypeSelector::Only(t) = selector {
                    let bucket = by_type.entry(t.clone()).or_default();
                    // A rule listing both `any` and the concrete type would
                    // otherwise run twice on that type.
                    if !rule.applies_to_any() && !bucket.contains(&idx) {
                        bucket.push(idx);
                    }
                }
            }
        }

        Self {
            rules,
            universal,
            by_type,
            version,
        }
    }

    /// All rules that apply to the given file type, in declaration order.
    pub fn rules_for(&self, file_type: &FileType) -> Vec<&Rule> {
        let mut indices: Vec<usize> = self.universal.clone();
        if let Some(bucket) = self.by_type.get(file_type) {
            indices.extend(bucket.iter().copied());
        }
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.rules[i]).collect()
    }

    /// Whether the catalog declares any rules against binary files; the
    /// walker only admits binary extensions when it does.
    pub fn has_binary_rules(&self) -> bool {
        self.by_type.contains_key(&FileType::Binary)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn all_rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Find a rule by id (used to attach catalog remediation to heuristic
    /// findings).
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}
