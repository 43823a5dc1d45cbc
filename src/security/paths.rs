//! Path sanitization and symlink safety.
//!
//! Provides secure path handling so hostile bundle layouts (circular
//! symlinks, links escaping the scan root, device nodes) cannot steer the
//! scanner outside the tree it was pointed at.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during path security validation.
#[derive(Debug, Error)]
pub enum PathSecurityError {
    #[error("circular symlink at {0}")]
    CircularSymlink(PathBuf),

    #[error("symlink {0} resolves outside the scan root")]
    EscapesRoot(PathBuf),

    #[error("broken symlink at {0}")]
    BrokenSymlink(PathBuf),

    #[error("special file (device/socket/pipe) at {0}")]
    SpecialFile(PathBuf),

    #[error("permission denied for {0}")]
    PermissionDenied(PathBuf),

    #[error("path does not exist: {0}")]
    Missing(PathBuf),
}

/// Sanitize a raw path string into a normalized absolute path.
///
/// Strips null bytes, expands a leading `~`, resolves `.`/`..` segments
/// lexically, and absolutizes against the current directory. Idempotent:
/// `sanitize_path(sanitize_path(p)) == sanitize_path(p)`.
pub fn sanitize_path(raw: &str) -> PathBuf {
    let cleaned: String = raw.chars().filter(|c| *c != '\0').collect();

    let expanded = if cleaned == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = cleaned.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(&cleaned),
        }
    } else {
        PathBuf::from(&cleaned)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(expanded)
    };

    normalize(&absolute)
}

/// Lexical `.`/`..` resolution. Does not touch the filesystem, so symlink
/// targets are judged separately by [`PathGuard`].
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::RootDir);
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::RootDir);
    }
    out
}

/// Symlink and special-file safety checks with per-scan circularity state.
///
/// The visited set tracks resolved symlink targets for one scan root and is
/// reset via [`PathGuard::reset`] before each new root. Insertions are
/// synchronized so worker threads can share one guard.
pub struct PathGuard {
    root: Option<PathBuf>,
    visited: Mutex<HashSet<PathBuf>>,
}

impl PathGuard {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Clear circularity state before scanning a new root.
    pub fn reset(&self) {
        self.visited.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Validate one path. Returns `Ok(())` when the file is safe to read.
    pub fn check(&self, path: &Path) -> Result<(), PathSecurityError> {
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(PathSecurityError::PermissionDenied(path.to_path_buf()));
            }
            Err(_) => return Err(PathSecurityError::Missing(path.to_path_buf())),
        };

        if metadata.file_type().is_symlink() {
            let target = match std::fs::canonicalize(path) {
                Ok(t) => t,
                Err(_) => return Err(PathSecurityError::BrokenSymlink(path.to_path_buf())),
            };

            {
                let mut visited = self.visited.lock().unwrap_or_else(|e| e.into_inner());
                if !visited.insert(target.clone()) {
                    return Err(PathSecurityError::CircularSymlink(path.to_path_buf()));
                }
            }

            if let Some(root) = &self.root {
                let root_canonical = std::fs::canonicalize(root)
                    .unwrap_or_else(|_| root.clone());
                if !target.starts_with(&root_canonical) {
                    return Err(PathSecurityError::EscapesRoot(path.to_path_buf()));
                }
            }

            // Judge the link target's file type below.
            let target_meta = std::fs::metadata(path)
                .map_err(|_| PathSecurityError::BrokenSymlink(path.to_path_buf()))?;
            if !target_meta.is_file() && !target_meta.is_dir() {
                return Err(PathSecurityError::SpecialFile(path.to_path_buf()));
            }
            return Ok(());
        }

        if !metadata.is_file() && !metadata.is_dir() {
            return Err(PathSecurityError::SpecialFile(path.to_path_buf()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_null_bytes() {
        let sanitized = sanitize_path("/tmp/te\0st.txt");
        assert!(!sanitized.to_string_lossy().contains('\0'));
        assert!(sanitized.to_string_lossy().ends_with("test.txt"));
    }

    #[test]
    fn test_sanitize_is_absolute() {
        let sanitized = sanitize_path("relative/file.txt");
        assert!(sanitized.is_absolute());
    }

    #[test]
    fn test_sanitize_expands_home() {
        let sanitized = sanitize_path("~/skills");
        let home = dirs::home_dir().unwrap();
        assert!(sanitized.starts_with(&home));
    }

    #[test]
    fn test_sanitize_normalizes_dot_segments() {
        let sanitized = sanitize_path("/tmp/a/./b/../c");
        assert_eq!(sanitized, PathBuf::from("/tmp/a/c"));
    }

    #[test]
    fn test_sanitize_parent_escape_stops_at_root() {
        let sanitized = sanitize_path("/../../etc/passwd");
        assert_eq!(sanitized, PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in ["/tmp/a/../b", "~/x/./y", "rel/path", "/tmp/te\0st"] {
            let once = sanitize_path(raw);
            let twice = sanitize_path(&once.to_string_lossy());
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_guard_accepts_regular_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let guard = PathGuard::new(Some(dir.path().to_path_buf()));
        assert!(guard.check(&file).is_ok());
    }

    #[test]
    fn test_guard_rejects_missing_file() {
        let guard = PathGuard::new(None);
        let result = guard.check(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(PathSecurityError::Missing(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_rejects_broken_symlink() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let link = dir.path().join("dangling");
        symlink(dir.path().join("gone.txt"), &link).unwrap();

        let guard = PathGuard::new(Some(dir.path().to_path_buf()));
        assert!(matches!(
            guard.check(&link),
            Err(PathSecurityError::BrokenSymlink(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_rejects_escape_from_root() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        fs::write(&secret, "s").unwrap();

        let dir = TempDir::new().unwrap();
        let link = dir.path().join("escape");
        symlink(&secret, &link).unwrap();

        let guard = PathGuard::new(Some(dir.path().to_path_buf()));
        assert!(matches!(
            guard.check(&link),
            Err(PathSecurityError::EscapesRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_flags_repeat_visit_as_circular() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real.txt");
        fs::write(&target, "x").unwrap();
        let link_a = dir.path().join("a");
        let link_b = dir.path().join("b");
        symlink(&target, &link_a).unwrap();
        symlink(&target, &link_b).unwrap();

        let guard = PathGuard::new(Some(dir.path().to_path_buf()));
        assert!(guard.check(&link_a).is_ok());
        // Second link to the same resolved target trips the visited set.
        assert!(matches!(
            guard.check(&link_b),
            Err(PathSecurityError::CircularSymlink(_))
        ));

        guard.reset();
        assert!(guard.check(&link_a).is_ok());
    }
}
