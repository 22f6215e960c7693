//! Fixture builders and assertions for tests over agent logs.
//!
//! The fixture helpers panic on I/O failure; they are meant for test code
//! working in a temporary directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{json, Value};

use evalscope_types::RunStats;

/// Write `lines` as a log file `dir/name`, creating `dir` if needed.
///
/// # Panics
/// If the directory or file cannot be written.
pub fn write_log(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create log dir");
    let path = dir.join(name);
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body).expect("write log file");
    path
}

/// Append one line to an existing log.
///
/// # Panics
/// If the file cannot be opened for appending.
pub fn append_line(path: &Path, line: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open log for append");
    writeln!(file, "{line}").expect("append log line");
}

/// One serialized event line: `fields` merged over the discriminator and
/// timestamp.
pub fn event_line(kind: &str, ts: Option<f64>, fields: Value) -> String {
    let mut obj = json!({ "event": kind });
    if let Some(ts) = ts {
        obj["ts"] = json!(ts);
    }
    if let (Some(target), Value::Object(extra)) = (obj.as_object_mut(), fields) {
        target.extend(extra);
    }
    obj.to_string()
}

/// Fail unless at least `min_rate` of the run's tasks completed.
///
/// # Example
/// ```ignore
/// let runs = load_runs(Path::new("agent_logs"));
/// let summaries: Vec<_> = runs["nightly"].iter().map(|t| summarize_task(&t.events)).collect();
/// assert_completion_rate(&RunStats::from_summaries(&summaries), 0.9)?;
/// ```
pub fn assert_completion_rate(stats: &RunStats, min_rate: f64) -> Result<()> {
    let rate = if stats.tasks == 0 {
        0.0
    } else {
        stats.completed as f64 / stats.tasks as f64
    };
    if rate < min_rate {
        anyhow::bail!(
            "Run check failed: completion rate {:.1}% is below threshold {:.1}% ({}/{} tasks completed)",
            rate * 100.0,
            min_rate * 100.0,
            stats.completed,
            stats.tasks
        );
    }
    Ok(())
}

/// Fail if any task of the run ended in error.
pub fn assert_no_errors(stats: &RunStats) -> Result<()> {
    if stats.errored > 0 {
        anyhow::bail!(
            "Run check failed: {}/{} tasks ended in error",
            stats.errored,
            stats.tasks
        );
    }
    Ok(())
}
