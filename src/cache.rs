//! Content-addressed per-file result cache.
//!
//! Keyed by absolute path, validated by rule version, age, and a SHA-256
//! re-hash of the file. Writers and readers for the same path serialize
//! behind a per-path lock; different paths do not contend. Eviction is
//! LRU-by-creation-timestamp, triggered by entry count or estimated byte
//! size. The map persists as one JSON file and is written back atomically
//! when dirty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::limits::Limits;
use crate::rules::types::Finding;

const CACHE_FILE_NAME: &str = "scan-cache.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub sha256: String,
    pub findings: Vec<Finding>,
    /// Creation time, seconds since the epoch.
    pub timestamp: u64,
    pub rule_version: String,
}

struct Stored {
    entry: CacheEntry,
    est_bytes: u64,
}

pub struct ScanCache {
    entries: Mutex<HashMap<PathBuf, Stored>>,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    dirty: AtomicBool,
    rule_version: String,
    ttl: Duration,
    max_entries: usize,
    max_size_bytes: u64,
    persist_path: PathBuf,
    unreadable_counter: AtomicU64,
}

impl ScanCache {
    /// Resolve the persist location from limits or the OS cache directory.
    pub fn default_path(limits: &Limits) -> PathBuf {
        limits
            .cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("agent-audit")))
            .unwrap_or_else(|| PathBuf::from(".agent-audit-cache"))
            .join(CACHE_FILE_NAME)
    }

    /// Load the persisted map, dropping entries that no longer validate.
    pub fn load(persist_path: PathBuf, rule_version: String, limits: &Limits) -> Self {
        let mut entries = HashMap::new();

        if let Ok(text) = std::fs::read_to_string(&persist_path) {
            match serde_json::from_str::<HashMap<PathBuf, CacheEntry>>(&text) {
                Ok(on_disk) => {
                    let now = epoch_secs();
                    for (path, entry) in on_disk {
                        if entry.rule_version != rule_version {
                            continue;
                        }
                        if now.saturating_sub(entry.timestamp) >= limits.cache_max_age_secs {
                            continue;
                        }
                        let est_bytes = estimate_bytes(&entry);
                        entries.insert(path, Stored { entry, est_bytes });
                    }
                    debug!(count = entries.len(), "loaded scan cache");
                }
                Err(e) => warn!(error = %e, "scan cache unreadable, starting fresh"),
            }
        }

        Self {
            entries: Mutex::new(entries),
            path_locks: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            rule_version,
            ttl: limits.cache_ttl(),
            max_entries: limits.cache_max_entries,
            max_size_bytes: limits.cache_max_size_bytes,
            persist_path,
            unreadable_counter: AtomicU64::new(0),
        }
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Look up cached findings for a file. Misses when the entry is absent,
    /// stale, from another rule version, or the file's bytes changed.
    pub fn get_cached(&self, path: &Path) -> Option<Vec<Finding>> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let now = epoch_secs();
        let valid = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let stored = entries.get(path)?;
            stored.entry.rule_version == self.rule_version
                && now.saturating_sub(stored.entry.timestamp) < self.ttl.as_secs()
                && stored.entry.sha256 == self.hash_file(path)
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if valid {
            entries.get(path).map(|s| s.entry.findings.clone())
        } else {
            // Stale or changed content: evict so the next write replaces it.
            if entries.remove(path).is_some() {
                self.dirty.store(true, Ordering::Relaxed);
            }
            None
        }
    }

    /// Store findings for a file, evicting oldest entries until both the
    /// entry-count and byte budgets hold.
    pub fn set_cached(&self, path: &Path, findings: &[Finding]) {
        let lock = self.path_lock(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let entry = CacheEntry {
            sha256: self.hash_file(path),
            findings: findings.to_vec(),
            timestamp: epoch_secs(),
            rule_version: self.rule_version.clone(),
        };
        let est_bytes = estimate_bytes(&entry);

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        while entries.len() >= self.max_entries
            || total_bytes(&entries) + est_bytes >= self.max_size_bytes
        {
            let oldest = entries
                .iter()
                .min_by_key(|(_, s)| s.entry.timestamp)
                .map(|(p, _)| p.clone());
            match oldest {
                Some(victim) if victim != path => {
                    entries.remove(&victim);
                }
                _ => break,
            }
        }

        entries.insert(path.to_path_buf(), Stored { entry, est_bytes });
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// SHA-256 of the file contents. A read failure synthesizes a unique
    /// token so any previously cached entry misses.
    pub fn hash_file(&self, path: &Path) -> String {
        match std::fs::read(path) {
            Ok(bytes) => {
                let digest = Sha256::digest(&bytes);
                format!("{:x}", digest)
            }
            Err(_) => {
                let n = self.unreadable_counter.fetch_add(1, Ordering::Relaxed);
                format!("unreadable:{n}")
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Write the map back to disk if anything changed. Failures are logged,
    /// never raised.
    pub fn persist(&self) {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }

        let snapshot: HashMap<PathBuf, CacheEntry> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .iter()
                .map(|(p, s)| (p.clone(), s.entry.clone()))
                .collect()
        };

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.persist_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = self.persist_path.with_extension("json.tmp");
            let text = serde_json::to_string(&snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::fs::write(&tmp, text)?;
            std::fs::rename(&tmp, &self.persist_path)?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!(error = %e, path = %self.persist_path.display(), "failed to persist scan cache");
        }
    }
}

impl Drop for ScanCache {
    fn drop(&mut self) {
        self.persist();
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn estimate_bytes(entry: &CacheEntry) -> u64 {
    serde_json::to_string(entry).map(|s| s.len() as u64).unwrap_or(256)
}

fn total_bytes(entries: &HashMap<PathBuf, Stored>) -> u64 {
    entries.values().map(|s| s.est_bytes).sum()
}
