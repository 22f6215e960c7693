//! Memoized log loading.
//!
//! Each entry is keyed by the log root and stamped with a [`Fingerprint`] of
//! the root's modification state. A lookup whose fingerprint no longer
//! matches reloads from disk, so logs appended during a long session show up
//! on the next render.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use evalscope_types::RunMap;

use crate::discovery::{discover_files, load_runs};

/// Modification state of a log root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub exists: bool,
    pub root_modified: Option<SystemTime>,
    /// Newest mtime among run directories and log files
    pub newest: Option<SystemTime>,
    pub files: usize,
    pub bytes: u64,
}

impl Fingerprint {
    pub fn of(root: &Path) -> Self {
        let Ok(meta) = std::fs::metadata(root) else {
            return Self::default();
        };
        if !meta.is_dir() {
            return Self::default();
        }
        let mut fp = Fingerprint {
            exists: true,
            root_modified: meta.modified().ok(),
            ..Self::default()
        };

        if let Ok(entries) = std::fs::read_dir(root) {
            for entry in entries.flatten() {
                if let Ok(m) = entry.metadata() {
                    if m.is_dir() {
                        fp.bump(m.modified().ok());
                    }
                }
            }
        }
        for file in discover_files(root) {
            if let Ok(m) = std::fs::metadata(&file.path) {
                fp.files += 1;
                fp.bytes += m.len();
                fp.bump(m.modified().ok());
            }
        }
        fp
    }

    fn bump(&mut self, modified: Option<SystemTime>) {
        if modified > self.newest {
            self.newest = modified;
        }
    }
}

struct CachedRuns {
    fingerprint: Fingerprint,
    runs: Arc<RunMap>,
}

/// Result of a cache lookup.
pub struct Fetched {
    pub runs: Arc<RunMap>,
    /// True when the logs were read from disk on this call
    pub reloaded: bool,
}

#[derive(Default)]
pub struct LogCache {
    entries: HashMap<PathBuf, CachedRuns>,
}

impl LogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&mut self, root: &Path) -> Fetched {
        let fingerprint = Fingerprint::of(root);
        if let Some(cached) = self.entries.get(root) {
            if cached.fingerprint == fingerprint {
                return Fetched {
                    runs: Arc::clone(&cached.runs),
                    reloaded: false,
                };
            }
        }

        let runs = Arc::new(load_runs(root));
        info!(
            root = %root.display(),
            runs = runs.len(),
            files = fingerprint.files,
            "reloaded agent logs"
        );
        self.entries.insert(
            root.to_path_buf(),
            CachedRuns {
                fingerprint,
                runs: Arc::clone(&runs),
            },
        );
        Fetched {
            runs,
            reloaded: true,
        }
    }

    pub fn load(&mut self, root: &Path) -> Arc<RunMap> {
        self.fetch(root).runs
    }

    /// Drop the entry for `root`; returns whether one existed.
    pub fn invalidate(&mut self, root: &Path) -> bool {
        self.entries.remove(root).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
