pub mod cache;
pub mod cli;
pub mod engine;
pub mod error;
pub mod fix;
pub mod limits;
pub mod mcp;
pub mod pipeline;
pub mod reporter;
pub mod rules;
pub mod run;
pub mod security;
pub mod targets;

pub use cache::{CacheEntry, ScanCache};
pub use cli::{Cli, Command, OutputFormat};
pub use error::{AuditError, McpError, Result, RuleLoadError};
pub use fix::{FixApplier, FixOutcome};
pub use limits::Limits;
pub use mcp::{CollectOptions, McpClient, McpInventory, VirtualFile};
pub use pipeline::{ScanOptions, ScanResult, Scanner};
pub use reporter::{JsonReporter, Reporter, SarifReporter, TerminalReporter};
pub use rules::{FileType, Finding, FindingSource, IndexedRuleEngine, Rule, RuleCatalog, Severity, Summary};
pub use targets::{Target, TargetKind, TargetMeta};
