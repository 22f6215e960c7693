use chrono::DateTime;

use evalscope_types::{Event, EventKind, TaskStatus, TaskSummary};

pub use evalscope_types::RunStats;

const FUNCTION_MARKER: &str = "def ";
const DESCRIPTION_MARKER: &str = "## Problem Description";

/// Reduce a task's events to its summary. Never fails: anything whose
/// preconditions are missing is simply left unset.
pub fn summarize_task(events: &[Event]) -> TaskSummary {
	let mut summary = TaskSummary::default();

	let task_start = events.iter().find_map(|e| match &e.kind {
		EventKind::TaskStart(start) => Some(start),
		_ => None,
	});
	if let Some(start) = task_start {
		let prompt = start.prompt.as_deref().unwrap_or_default();
		summary.function = extract_function(prompt);
		summary.description = extract_description(prompt);
		summary.model = Some(start.model.clone().unwrap_or_else(|| "unknown".to_string()));
		summary.workspace = start.workspace.clone();
	}

	let mut has_error = false;
	let mut has_complete = false;
	for event in events {
		match &event.kind {
			EventKind::ToolUse(tool_use) => {
				let name = tool_use.tool.clone().unwrap_or_else(|| "unknown".to_string());
				*summary.tool_breakdown.entry(name).or_insert(0) += 1;
				summary.tool_call_count += 1;
			}
			EventKind::AssistantText(_) => summary.assistant_message_count += 1,
			EventKind::TaskComplete(complete) => {
				has_complete = true;
				// a later completion overrides an earlier one
				if let Some(len) = complete.response_len {
					summary.response_len = Some(len);
				}
			}
			EventKind::Error(_) => has_error = true,
			_ => {}
		}
	}
	summary.status = classify(has_error, has_complete);

	// First and last timestamped events by position, not min/max.
	let mut stamps = events.iter().filter_map(|e| e.ts);
	if let Some(first) = stamps.next() {
		if let Some(last) = stamps.last() {
			summary.duration_seconds = round_tenths(last - first);
			summary.start_time = format_ts(first);
			summary.end_time = format_ts(last);
		}
	}

	summary
}

fn classify(has_error: bool, has_complete: bool) -> TaskStatus {
	if has_complete {
		TaskStatus::Completed
	} else if has_error {
		TaskStatus::Error
	} else {
		TaskStatus::Unknown
	}
}

/// Name of the first `def name(...)` line in the prompt.
fn extract_function(prompt: &str) -> Option<String> {
	prompt
		.lines()
		.map(str::trim)
		.find(|line| line.starts_with(FUNCTION_MARKER))
		.map(|line| {
			let head = line.split('(').next().unwrap_or(line);
			head.replace(FUNCTION_MARKER, "")
		})
}

/// First prose line under the "## Problem Description" heading.
fn extract_description(prompt: &str) -> Option<String> {
	prompt
		.lines()
		.skip_while(|line| !line.contains(DESCRIPTION_MARKER))
		.skip(1)
		.find(|line| {
			!line.trim().is_empty() && !line.starts_with("##") && !line.contains(DESCRIPTION_MARKER)
		})
		.map(|line| line.trim().to_string())
}

/// Round to one decimal the way the exact decimal value dictates, ties to
/// even: 0.25 becomes 0.2 and 0.35 (stored just below) becomes 0.3.
fn round_tenths(seconds: f64) -> f64 {
	format!("{seconds:.1}").parse().unwrap_or(seconds)
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS UTC`.
pub fn format_ts(ts: f64) -> Option<String> {
	if !ts.is_finite() {
		return None;
	}
	let secs = ts.floor();
	let nanos = ((ts - secs) * 1e9) as u32;
	DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
		.map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::jsonl::parse_events;
	use serde_json::json;

	fn events(lines: &[serde_json::Value]) -> Vec<Event> {
		let text: Vec<String> = lines.iter().map(|v| v.to_string()).collect();
		parse_events(&text.join("\n"))
	}

	#[test]
	fn test_status_truth_table() {
		let complete = json!({"event": "task_complete"});
		let error = json!({"event": "error", "error": "boom"});
		let text = json!({"event": "assistant_text", "text": "hi"});

		assert_eq!(summarize_task(&events(&[complete.clone()])).status, TaskStatus::Completed);
		assert_eq!(summarize_task(&events(&[error.clone()])).status, TaskStatus::Error);
		assert_eq!(summarize_task(&events(&[text])).status, TaskStatus::Unknown);
		assert_eq!(summarize_task(&events(&[error.clone(), complete.clone()])).status, TaskStatus::Completed);
		assert_eq!(summarize_task(&events(&[complete, error])).status, TaskStatus::Completed);
		assert_eq!(summarize_task(&[]).status, TaskStatus::Unknown);
	}

	#[test]
	fn test_duration_from_first_and_last_stamp() {
		let s = summarize_task(&events(&[
			json!({"event": "task_start", "ts": 10.0}),
			json!({"event": "assistant_text"}),
			json!({"event": "tool_use", "ts": 12.5}),
			json!({"event": "task_complete", "ts": 15.0}),
		]));
		assert_eq!(s.duration_seconds, 5.0);
		assert_eq!(s.start_time.as_deref(), Some("1970-01-01 00:00:10 UTC"));
		assert_eq!(s.end_time.as_deref(), Some("1970-01-01 00:00:15 UTC"));
	}

	#[test]
	fn test_duration_uses_position_not_extremes() {
		let s = summarize_task(&events(&[
			json!({"event": "task_start", "ts": 20.0}),
			json!({"event": "tool_use", "ts": 5.0}),
			json!({"event": "task_complete", "ts": 26.04}),
		]));
		assert_eq!(s.duration_seconds, 6.0);
	}

	#[test]
	fn test_single_stamp_has_no_duration() {
		let s = summarize_task(&events(&[
			json!({"event": "task_start", "ts": 10.0}),
			json!({"event": "task_complete"}),
		]));
		assert_eq!(s.duration_seconds, 0.0);
		assert!(s.start_time.is_none());
		assert!(s.end_time.is_none());
	}

	#[test]
	fn test_function_and_description_from_prompt() {
		let prompt = "Implement the model.\n\n## Problem Description\n\n### Details\nSimulate transmission.\nMore text.\n\n## Signature\n    def solve_model(x):\n        pass\n";
		let s = summarize_task(&events(&[json!({
			"event": "task_start", "prompt": prompt, "model": "claude", "workspace": "/tmp/ws"
		})]));
		assert_eq!(s.function.as_deref(), Some("solve_model"));
		assert_eq!(s.description.as_deref(), Some("Simulate transmission."));
		assert_eq!(s.model.as_deref(), Some("claude"));
		assert_eq!(s.workspace.as_deref(), Some("/tmp/ws"));
	}

	#[test]
	fn test_only_first_task_start_counts() {
		let s = summarize_task(&events(&[
			json!({"event": "task_start", "prompt": "def first():"}),
			json!({"event": "task_start", "prompt": "def second():", "model": "m2"}),
		]));
		assert_eq!(s.function.as_deref(), Some("first"));
		assert_eq!(s.model.as_deref(), Some("unknown"));
	}

	#[test]
	fn test_no_task_start_leaves_fields_unset() {
		let s = summarize_task(&events(&[json!({"event": "tool_use", "tool": "Bash"})]));
		assert!(s.function.is_none());
		assert!(s.description.is_none());
		assert!(s.model.is_none());
		assert!(s.workspace.is_none());
	}

	#[test]
	fn test_tool_breakdown() {
		let s = summarize_task(&events(&[
			json!({"event": "tool_use", "tool": "Bash"}),
			json!({"event": "tool_use", "tool": "Bash"}),
			json!({"event": "tool_use", "tool": "Task"}),
			json!({"event": "tool_use"}),
		]));
		assert_eq!(s.tool_call_count, 4);
		assert_eq!(s.tool_breakdown.get("Bash"), Some(&2));
		assert_eq!(s.tool_breakdown.get("Task"), Some(&1));
		assert_eq!(s.tool_breakdown.get("unknown"), Some(&1));
	}

	#[test]
	fn test_last_response_len_wins() {
		let s = summarize_task(&events(&[
			json!({"event": "task_complete", "response_len": 10}),
			json!({"event": "task_complete", "response_len": 42}),
			json!({"event": "task_complete"}),
			json!({"event": "assistant_text", "text": "a"}),
			json!({"event": "assistant_text", "text": "b"}),
		]));
		assert_eq!(s.response_len, Some(42));
		assert_eq!(s.assistant_message_count, 2);
	}

	#[test]
	fn test_round_tenths_uses_exact_value() {
		assert_eq!(round_tenths(0.25), 0.2);
		assert_eq!(round_tenths(0.75), 0.8);
		assert_eq!(round_tenths(0.35), 0.3);
		assert_eq!(round_tenths(0.45), 0.5);
		assert_eq!(round_tenths(4.5), 4.5);
		assert_eq!(round_tenths(2.0), 2.0);
	}

	#[test]
	fn test_structured_error_and_float_len_still_count() {
		let summary = summarize_task(&events(&[
			json!({"event": "task_start", "ts": 1.0, "run_id": 7}),
			json!({"event": "error", "ts": 2.0, "error": {"type": "Timeout"}}),
		]));
		assert_eq!(summary.status, TaskStatus::Error);
		assert_eq!(summary.duration_seconds, 1.0);

		let summary = summarize_task(&events(&[
			json!({"event": "task_start", "ts": 1.0, "run_id": 7}),
			json!({"event": "error", "ts": 2.0, "error": {"type": "Timeout"}}),
			json!({"event": "task_complete", "ts": 3.0, "response_len": 12.0}),
		]));
		assert_eq!(summary.status, TaskStatus::Completed);
		assert_eq!(summary.duration_seconds, 2.0);
		assert_eq!(summary.response_len, Some(12));
	}

	#[test]
	fn test_format_ts_fractional() {
		assert_eq!(format_ts(1_700_000_000.75).as_deref(), Some("2023-11-14 22:13:20 UTC"));
		assert_eq!(format_ts(f64::NAN), None);
	}
}
