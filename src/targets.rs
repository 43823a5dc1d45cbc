//! Scan targets: what a run points the engine at.
//!
//! A target is a logical unit (one skill bundle, one extension, one MCP
//! server). Discovery here resolves explicit roots into targets; finding
//! the platform default roots belongs to the CLI layer.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::pipeline::walk::is_skipped_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Skill,
    Extension,
    IdeExtension,
    Mcp,
    Path,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Skill => "skill",
            TargetKind::Extension => "extension",
            TargetKind::IdeExtension => "ide-extension",
            TargetKind::Mcp => "mcp",
            TargetKind::Path => "path",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed metadata per target kind, with an open map for the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetMeta {
    Browser {
        #[serde(skip_serializing_if = "Option::is_none")]
        browser: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extras: BTreeMap<String, Value>,
    },
    Ide {
        #[serde(skip_serializing_if = "Option::is_none")]
        ide: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extras: BTreeMap<String, Value>,
    },
    Mcp {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extras: BTreeMap<String, Value>,
    },
    Path {
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extras: BTreeMap<String, Value>,
    },
}

impl TargetMeta {
    pub fn path() -> Self {
        TargetMeta::Path {
            extras: BTreeMap::new(),
        }
    }

    /// Record a per-target failure without failing the run.
    pub fn set_error(&mut self, message: String) {
        match self {
            TargetMeta::Mcp { error, .. } => *error = Some(message),
            TargetMeta::Browser { extras, .. }
            | TargetMeta::Ide { extras, .. }
            | TargetMeta::Path { extras } => {
                extras.insert("error".to_string(), Value::String(message));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub name: String,
    /// Filesystem directory or an MCP URL.
    pub path: String,
    pub meta: TargetMeta,
}

impl Target {
    pub fn path_target(path: &Path) -> Self {
        Self {
            kind: TargetKind::Path,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.display().to_string(),
            meta: TargetMeta::path(),
        }
    }
}

const DISCOVERY_DEPTH: usize = 4;

/// Skill bundles: directories containing a `SKILL.md`.
pub fn discover_skills(root: &Path) -> Vec<Target> {
    let mut targets = Vec::new();

    for entry in bounded_walk(root) {
        if entry.file_name() == "SKILL.md" {
            let dir = entry.path().parent().unwrap_or(root);
            targets.push(Target {
                kind: TargetKind::Skill,
                name: dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string()),
                path: dir.display().to_string(),
                meta: TargetMeta::path(),
            });
        }
    }

    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets
}

/// Unpacked browser extensions: directories with a v2/v3 `manifest.json`.
pub fn discover_extensions(root: &Path, browser: Option<&str>) -> Vec<Target> {
    let mut targets = Vec::new();

    for entry in bounded_walk(root) {
        if entry.file_name() != "manifest.json" {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let Ok(json) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if !matches!(json.get("manifest_version").and_then(Value::as_u64), Some(2) | Some(3)) {
            continue;
        }

        let dir = entry.path().parent().unwrap_or(root);
        let name = json
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        targets.push(Target {
            kind: TargetKind::Extension,
            name,
            path: dir.display().to_string(),
            meta: TargetMeta::Browser {
                browser: browser.map(str::to_string),
                extras: BTreeMap::new(),
            },
        });
    }

    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets
}

/// IDE extensions: VS Code (`package.json` with `engines.vscode`),
/// JetBrains (`plugin.xml`), Zed (`extension.toml`).
pub fn discover_ide_extensions(root: &Path) -> Vec<Target> {
    let mut targets = Vec::new();

    for entry in bounded_walk(root) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let dir = entry.path().parent().unwrap_or(root);

        let ide = match name.as_str() {
            "package.json" => {
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let Ok(json) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if json.pointer("/engines/vscode").is_none() {
                    continue;
                }
                "vscode"
            }
            "plugin.xml" => "jetbrains",
            "extension.toml" => "zed",
            _ => continue,
        };

        targets.push(Target {
            kind: TargetKind::IdeExtension,
            name: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: dir.display().to_string(),
            meta: TargetMeta::Ide {
                ide: Some(ide.to_string()),
                extras: BTreeMap::new(),
            },
        });
    }

    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets.dedup_by(|a, b| a.path == b.path);
    targets
}

fn bounded_walk(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .max_depth(DISCOVERY_DEPTH)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name().to_str().is_some_and(is_skipped_dir))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
}
