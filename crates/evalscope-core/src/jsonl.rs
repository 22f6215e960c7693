//! Newline-delimited JSON event logs.
//!
//! Parsing is lossy on purpose: a line that is not valid JSON, or that is
//! rejected by [`Event::from_value`], is dropped and the rest of the file is
//! still returned. A corrupted tail must not hide the rest of a run.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use evalscope_types::Event;

/// Events read from one log, plus how many lines were dropped.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub events: Vec<Event>,
    pub skipped: usize,
}

/// Parse a whole log body, keeping input order.
pub fn parse_report(text: &str) -> ParseReport {
    let mut report = ParseReport::default();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(err) => {
                debug!(line = idx + 1, %err, "skipping malformed JSON line");
                report.skipped += 1;
                continue;
            }
        };
        match Event::from_value(value) {
            Ok(event) => report.events.push(event),
            Err(err) => {
                debug!(line = idx + 1, %err, "skipping invalid event");
                report.skipped += 1;
            }
        }
    }
    report
}

pub fn parse_events(text: &str) -> Vec<Event> {
    parse_report(text).events
}

/// Read and parse one log file. Invalid UTF-8 is replaced, not fatal.
pub fn read_report(path: &Path) -> std::io::Result<ParseReport> {
    let bytes = std::fs::read(path)?;
    let report = parse_report(&String::from_utf8_lossy(&bytes));
    if report.skipped > 0 {
        debug!(path = %path.display(), skipped = report.skipped, "dropped unreadable lines");
    }
    Ok(report)
}

pub fn read_events(path: &Path) -> std::io::Result<Vec<Event>> {
    read_report(path).map(|r| r.events)
}

/// First run identifier carried by any event, in log order.
pub fn detect_run_id(events: &[Event]) -> Option<&str> {
    events.iter().find_map(|e| e.run_id.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalscope_types::EventKind;

    #[test]
    fn test_invalid_lines_dropped_in_order() {
        let text = r#"{"event": "task_start", "ts": 1}
not json at all
{"event": "tool_use", "tool": "Bash", "ts": 2}

{"event": "assistant_text", "text": "hi"
{"event": "task_complete", "ts": 3}
"#;
        let report = parse_report(text);
        assert_eq!(report.skipped, 2);
        let kinds: Vec<&str> = report.events.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["task_start", "tool_use", "task_complete"]);
    }

    #[test]
    fn test_blank_and_whitespace_lines_skipped() {
        let events = parse_events("\n   \n\t{\"event\": \"result\", \"session_id\": \"abc\"}  \n\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::Result(_)));
    }

    #[test]
    fn test_rejected_records_count_as_skipped() {
        let report = parse_report("42\n{\"ts\": 1}\n{\"event\": \"error\", \"error\": \"boom\"}\n");
        assert_eq!(report.skipped, 2);
        assert_eq!(report.events.len(), 1);
    }

    #[test]
    fn test_odd_payload_types_keep_every_line() {
        let text = r#"{"event": "task_start", "ts": 1.0, "run_id": 7}
{"event": "error", "ts": 2.0, "error": {"type": "Timeout", "message": "took too long"}}
{"event": "task_complete", "ts": 3.0, "response_len": 12.0}"#;
        let report = parse_report(text);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.events.len(), 3);
        assert_eq!(detect_run_id(&report.events), Some("7"));
    }

    #[test]
    fn test_detect_run_id_takes_first() {
        let events = parse_events(
            r#"{"event": "task_start"}
{"event": "tool_use", "run_id": "r1"}
{"event": "task_complete", "run_id": "r2"}"#,
        );
        assert_eq!(detect_run_id(&events), Some("r1"));
        assert_eq!(detect_run_id(&events[..1]), None);
        assert_eq!(detect_run_id(&[]), None);
    }

    #[test]
    fn test_read_events_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let mut bytes = b"{\"event\": \"assistant_text\", \"text\": \"ok\"}\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(&path, bytes).unwrap();
        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 1);
    }
}
