//! Finding task logs under a log root and grouping them into runs.
//!
//! Two layouts are supported side by side:
//! - flat: `root/*.jsonl`, run taken from the log content (else `default`)
//! - nested: `root/<run_id>/*.jsonl`, run taken from the directory name

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use evalscope_types::{RunMap, TaskLog, DEFAULT_RUN};

use crate::jsonl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Flat,
    /// One directory below the root; the directory names the run
    Nested { run_id: String },
}

/// A log file found under the root, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub layout: Layout,
}

impl LogFile {
    /// File stem, used as the task identifier.
    pub fn task_id(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Enumerate log files: flat files first, then nested ones, each group in
/// path order. A missing or unreadable root yields nothing.
pub fn discover_files(root: &Path) -> Vec<LogFile> {
    if !root.is_dir() {
        debug!(root = %root.display(), "log root missing; nothing to load");
        return Vec::new();
    }

    let flat = glob_sorted(root, "*.jsonl").into_iter().map(|path| LogFile {
        path,
        layout: Layout::Flat,
    });

    let nested = glob_sorted(root, "*/*.jsonl").into_iter().filter_map(|path| {
        let run_id = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())?;
        Some(LogFile {
            path,
            layout: Layout::Nested { run_id },
        })
    });

    flat.chain(nested).collect()
}

fn glob_sorted(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let escaped = PathBuf::from(Pattern::escape(&root.to_string_lossy())).join(pattern);
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let entries = match glob::glob_with(&escaped.to_string_lossy(), options) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %root.display(), %err, "invalid log glob");
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(%err, "skipping unreadable log path");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    paths
}

/// Load every task log under `root`, grouped by run.
pub fn load_runs(root: &Path) -> RunMap {
    let mut runs = RunMap::new();
    for file in discover_files(root) {
        let events = match jsonl::read_events(&file.path) {
            Ok(events) => events,
            Err(err) => {
                warn!(path = %file.path.display(), %err, "skipping unreadable log");
                continue;
            }
        };
        let run_id = match &file.layout {
            Layout::Nested { run_id } => run_id.clone(),
            Layout::Flat => jsonl::detect_run_id(&events)
                .unwrap_or(DEFAULT_RUN)
                .to_string(),
        };
        runs.entry(run_id).or_default().push(TaskLog {
            task_id: file.task_id(),
            path: file.path,
            events,
        });
    }
    debug!(root = %root.display(), runs = runs.len(), "loaded agent logs");
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_log;

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_runs(&dir.path().join("nope")).is_empty());
        assert!(discover_files(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_flat_file_uses_content_run_id() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "a.jsonl", &[r#"{"event": "task_start", "run_id": "nightly"}"#]);
        write_log(dir.path(), "b.jsonl", &[r#"{"event": "task_start"}"#]);
        let runs = load_runs(dir.path());
        assert_eq!(runs.keys().collect::<Vec<_>>(), vec!["default", "nightly"]);
        assert_eq!(runs["nightly"][0].task_id, "a");
    }

    #[test]
    fn test_directory_name_overrides_content() {
        let dir = tempfile::tempdir().unwrap();
        write_log(&dir.path().join("run_b"), "t.jsonl", &[r#"{"event": "task_start", "run_id": "other"}"#]);
        let runs = load_runs(dir.path());
        assert_eq!(runs.keys().collect::<Vec<_>>(), vec!["run_b"]);
    }

    #[test]
    fn test_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jsonl", "a.jsonl", "b.jsonl"] {
            write_log(dir.path(), name, &[r#"{"event": "task_start"}"#]);
        }
        write_log(dir.path(), "notes.txt", &["ignored"]);
        write_log(dir.path(), ".hidden.jsonl", &[r#"{"event": "task_start"}"#]);
        let ids: Vec<String> = discover_files(dir.path()).iter().map(LogFile::task_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_deeper_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_log(&dir.path().join("r").join("deep"), "x.jsonl", &[r#"{"event": "task_start"}"#]);
        assert!(load_runs(dir.path()).is_empty());
    }
}
