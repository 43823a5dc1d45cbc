//! Rule catalog: data model, YAML loading, and the file-type index.

pub mod engine;
pub mod loader;
pub mod types;

pub use engine::IndexedRuleEngine;
pub use loader::{rule_version, RuleCatalog};
pub use types::{
    FileType, FileTypeSelector, Finding, FindingSource, Rule, Severity, Summary,
};
