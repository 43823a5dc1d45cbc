//! File enumeration for scan targets.
//!
//! Walks a target directory, pruning skip-dirs at every path segment and
//! admitting only files the rule catalog can do something with. Archive
//! containers are never scanned, even when binary rules exist.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directories pruned at any depth.
pub const SKIP_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", "__pycache__"];

/// Extensions admitted as scannable text.
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "mdx", "markdown", "txt", "json", "yaml", "yml", "toml", "xml", "html", "css", "py",
    "pyw", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "sh", "bash", "zsh", "fish",
    "rb", "go", "rs", "java", "c", "cc", "cpp", "h", "hpp", "php", "pl", "env", "cfg", "conf",
    "ini",
];

/// Admitted only when the catalog declares binary rules.
const BINARY_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib", "bin", "wasm", "node"];

/// Never scanned; unpacking is out of scope.
const ARCHIVE_EXTENSIONS: &[&str] = &["crx", "xpi", "zip"];

/// Basenames admitted regardless of extension.
const SPECIAL_BASENAMES: &[&str] = &[
    "SKILL.md",
    "manifest.json",
    "package.json",
    "Dockerfile",
    "Makefile",
];

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Admit binary extensions (catalog has binary rules).
    pub include_binary: bool,
    /// Maximum traversal depth; `None` is unlimited.
    pub max_depth: Option<usize>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_binary: false,
            max_depth: None,
        }
    }
}

/// Whether a directory component is on the skip list.
pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Whether a file is worth handing to the engine.
pub fn is_scannable(path: &Path, include_binary: bool) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if SPECIAL_BASENAMES.contains(&name) {
            return true;
        }
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();

    if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return true;
    }
    include_binary && BINARY_EXTENSIONS.contains(&ext.as_str())
}

/// Collect the files of one target, sorted for deterministic chunking.
pub fn collect_files(root: &Path, options: &WalkOptions) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_scannable(root, options.include_binary) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(is_skipped_dir))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_scannable(e.path(), options.include_binary))
        .map(|e| e.path().to_path_buf())
        .collect();

    files.sort();
    files
}
