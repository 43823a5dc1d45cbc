//! Scan orchestration: target iteration, cache-first file scanning,
//! parallel fan-out, budgets, and the ordered post-pass.

pub mod dedup;
pub mod walk;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::ScanCache;
use crate::engine::{confidence, ContentScanner};
use crate::fix::FixApplier;
use crate::limits::Limits;
use crate::mcp::VirtualFile;
use crate::rules::loader::RuleCatalog;
use crate::rules::types::{FileType, Finding, Summary};
use crate::rules::IndexedRuleEngine;
use crate::security::content::{read_scan_file, ContentError};
use crate::security::paths::{sanitize_path, PathGuard};
use crate::targets::{Target, TargetKind};
use walk::{collect_files, WalkOptions};

/// Behavior switches for one run.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Run the behavioral heuristics.
    pub behavioral: bool,
    /// Collapse duplicate findings after scanning.
    pub enable_meta: bool,
    /// Attach confidence scores.
    pub with_confidence: bool,
    /// Drop findings below this confidence (implies attachment).
    pub min_confidence: Option<f64>,
    /// Comment out offending lines after reporting.
    pub apply_fixes: bool,
    /// Suppress stderr warnings (JSON/SARIF output modes).
    pub quiet_warnings: bool,
    /// Bound directory traversal depth.
    pub max_depth: Option<usize>,
}

/// The outcome of one run. Owned by the pipeline until reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scanned_at: String,
    pub targets: Vec<Target>,
    pub findings: Vec<Finding>,
    pub scanned_files: usize,
    pub elapsed_ms: u128,
}

impl ScanResult {
    pub fn summary(&self) -> Summary {
        Summary::from_findings(&self.findings)
    }
}

/// Per-run scanner context. Rules are read-only after construction; the
/// cache carries its own locking; dropping the scanner persists the cache.
pub struct Scanner {
    engine: IndexedRuleEngine,
    limits: Limits,
    cache: Option<ScanCache>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(catalog: RuleCatalog, limits: Limits, options: ScanOptions) -> Self {
        let cache = if limits.cache_enabled {
            let path = ScanCache::default_path(&limits);
            Some(ScanCache::load(path, catalog.version.clone(), &limits))
        } else {
            None
        };

        let version = catalog.version.clone();
        Self {
            engine: IndexedRuleEngine::new(catalog.rules, version),
            limits,
            cache,
            options,
        }
    }

    pub fn engine(&self) -> &IndexedRuleEngine {
        &self.engine
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan a set of targets. MCP targets read their pre-collected virtual
    /// files from `virtual_files`, keyed by target path; everything else
    /// walks the filesystem. Returns the post-passed result.
    pub fn scan_targets(
        &self,
        targets: Vec<Target>,
        virtual_files: &HashMap<String, Vec<VirtualFile>>,
    ) -> ScanResult {
        let started = Instant::now();
        let mut all_findings: Vec<Finding> = Vec::new();
        let mut scanned_files = 0usize;
        let mut budget_hit = false;

        for target in &targets {
            if budget_hit {
                break;
            }

            let (mut findings, files) = match target.kind {
                TargetKind::Mcp => {
                    let files = virtual_files
                        .get(&target.path)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    self.scan_virtual_files(files)
                }
                _ => self.scan_directory_target(target),
            };
            scanned_files += files;

            let remaining = self
                .limits
                .max_total_findings
                .saturating_sub(all_findings.len());
            if findings.len() >= remaining {
                findings.truncate(remaining);
                budget_hit = true;
                self.warn(format!(
                    "finding budget of {} reached; further targets skipped",
                    self.limits.max_total_findings
                ));
            }
            all_findings.extend(findings);
        }

        let findings = self.post_pass(all_findings);

        ScanResult {
            scanned_at: chrono::Utc::now().to_rfc3339(),
            targets,
            findings,
            scanned_files,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }

    fn scan_directory_target(&self, target: &Target) -> (Vec<Finding>, usize) {
        let root = sanitize_path(&target.path);
        let walk_options = WalkOptions {
            include_binary: self.engine.has_binary_rules(),
            max_depth: self.options.max_depth,
        };
        let files = collect_files(&root, &walk_options);
        debug!(target = %target.name, files = files.len(), "collected target files");

        let guard = PathGuard::new(Some(root.clone()));
        guard.reset();

        let findings = self.scan_files(&guard, &files);
        (findings, files.len())
    }

    /// Fan the file list out to workers. Large targets get chunked
    /// parallelism; small ones a bounded pool.
    fn scan_files(&self, guard: &PathGuard, files: &[std::path::PathBuf]) -> Vec<Finding> {
        if files.is_empty() {
            return Vec::new();
        }

        let chunked = self.limits.parallel_enabled && files.len() >= self.limits.parallel_threshold;
        let workers = if chunked {
            self.limits.chunk_workers(files.len())
        } else {
            self.limits.bounded_workers().min(files.len()).max(1)
        };

        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build();
        match pool {
            Ok(pool) => {
                let chunk_size = files.len().div_ceil(workers);
                pool.install(|| {
                    files
                        .par_chunks(chunk_size.max(1))
                        .flat_map_iter(|chunk| {
                            chunk
                                .iter()
                                .flat_map(|path| self.scan_one(guard, path))
                                .collect::<Vec<_>>()
                        })
                        .collect()
                })
            }
            Err(e) => {
                warn!(error = %e, "thread pool unavailable, scanning sequentially");
                files.iter().flat_map(|p| self.scan_one(guard, p)).collect()
            }
        }
    }

    /// Cache-first scan of one file. Every failure is absorbed here: the
    /// file yields no findings and at most a warning.
    fn scan_one(&self, guard: &PathGuard, path: &Path) -> Vec<Finding> {
        if let Err(e) = guard.check(path) {
            self.warn(format!("skipping {}: {e}", path.display()));
            return Vec::new();
        }

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get_cached(path) {
                debug!(path = %path.display(), "cache hit");
                return hit;
            }
        }

        // The guard has already vetted any symlink; read its resolved
        // target so the no-follow open does not refuse it.
        let read_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let content = match read_scan_file(&read_path, self.limits.max_scan_bytes) {
            Ok(content) => content,
            Err(ContentError::BinaryDetected(_)) => return Vec::new(),
            Err(e) => {
                self.warn(format!("skipping {}: {e}", path.display()));
                return Vec::new();
            }
        };

        let file = path.display().to_string();
        let file_type = FileType::from_path(path);
        let scanner = ContentScanner::new(
            &self.engine,
            self.limits.regex_timeout(),
            self.options.behavioral,
        );
        let output = scanner.scan(&content, &file, &file_type);

        for warning in &output.warnings {
            self.warn(warning.clone());
        }

        let mut findings = output.findings;
        if findings.len() > self.limits.max_findings_per_file {
            self.warn(format!(
                "{} produced {} findings; truncated to {}",
                path.display(),
                findings.len(),
                self.limits.max_findings_per_file
            ));
            findings.truncate(self.limits.max_findings_per_file);
        }

        if let Some(cache) = &self.cache {
            cache.set_cached(path, &findings);
        }

        findings
    }

    /// Scan pre-built virtual files (MCP state). No cache: virtual content
    /// has no filesystem identity to re-hash.
    pub fn scan_virtual_files(&self, files: &[VirtualFile]) -> (Vec<Finding>, usize) {
        let findings = Mutex::new(Vec::new());

        files.par_iter().for_each(|vf| {
            let file_type = FileType::from_path(Path::new(&vf.path));
            let scanner = ContentScanner::new(
                &self.engine,
                self.limits.regex_timeout(),
                self.options.behavioral,
            );
            let output = scanner.scan(&vf.content, &vf.path, &file_type);
            for warning in &output.warnings {
                self.warn(warning.clone());
            }

            let mut collected = output.findings;
            if collected.len() > self.limits.max_findings_per_file {
                collected.truncate(self.limits.max_findings_per_file);
            }
            findings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(collected);
        });

        (
            findings.into_inner().unwrap_or_else(|e| e.into_inner()),
            files.len(),
        )
    }

    /// Ordered post-pass: meta-dedup, confidence attach, confidence filter,
    /// fix application.
    fn post_pass(&self, findings: Vec<Finding>) -> Vec<Finding> {
        let mut findings = findings;

        if self.options.enable_meta {
            let before = findings.len();
            findings = dedup::dedup_findings(findings);
            if findings.len() < before {
                debug!(removed = before - findings.len(), "meta-dedup collapsed findings");
            }
        }

        if self.options.with_confidence || self.options.min_confidence.is_some() {
            confidence::attach(&mut findings);
        }

        if let Some(threshold) = self.options.min_confidence {
            let before = findings.len();
            findings.retain(|f| f.confidence.unwrap_or(0.0) >= threshold);
            let dropped = before - findings.len();
            if dropped > 0 {
                self.warn(format!(
                    "{dropped} finding(s) below confidence {threshold:.2} dropped"
                ));
            }
        }

        if self.options.apply_fixes {
            let applier = FixApplier::new();
            let outcome = applier.apply(&findings);
            if !self.options.quiet_warnings {
                eprintln!(
                    "fixes: {} applied, {} skipped",
                    outcome.applied.len(),
                    outcome.skipped.len()
                );
            }
        }

        findings
    }

    /// Persist the cache now instead of waiting for Drop.
    pub fn flush_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.persist();
        }
    }

    fn warn(&self, message: String) {
        warn!("{message}");
        if !self.options.quiet_warnings {
            eprintln!("Warning: {message}");
        }
    }
}
