use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tabled::Tabled;
use thiserror::Error;

/// Why a log record was rejected at the parse boundary.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("missing or non-string `event` discriminator")]
    MissingDiscriminator,

    #[error("malformed `{kind}` event: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One record of an agent task log.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub ts: Option<f64>,

    /// Explicit run identifier, when the writer recorded one
    pub run_id: Option<String>,

    pub kind: EventKind,

    /// The object exactly as it was read, for raw display
    pub raw: Value,
}

/// Kind-specific payload, selected by the `event` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    TaskStart(TaskStart),
    ToolUse(ToolUse),
    AssistantText(AssistantText),
    Result(ResultEvent),
    TaskComplete(TaskComplete),
    Error(ErrorEvent),
    /// Any discriminator this crate does not know about
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaskStart {
    #[serde(deserialize_with = "lenient::option")]
    pub prompt: Option<String>,
    #[serde(deserialize_with = "lenient::option")]
    pub model: Option<String>,
    #[serde(deserialize_with = "lenient::option")]
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToolUse {
    #[serde(deserialize_with = "lenient::option")]
    pub tool: Option<String>,
    /// Usually JSON-shaped text, but writers are free to put anything here
    pub input: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssistantText {
    #[serde(deserialize_with = "lenient::option")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResultEvent {
    #[serde(deserialize_with = "lenient::option")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaskComplete {
    #[serde(deserialize_with = "lenient::count")]
    pub response_len: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    /// Structured errors are kept as their JSON text
    #[serde(deserialize_with = "lenient::text")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default, deserialize_with = "lenient::option")]
    ts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::scalar")]
    run_id: Option<String>,
}

/// Field decoders that never fail: a value of an unexpected JSON type
/// reads as absent instead of rejecting the record.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn option<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).ok())
    }

    /// Non-negative whole numbers, including ones written as `12.0`.
    pub fn count<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(d)?;
        Ok(value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }))
    }

    /// Strings, numbers and booleans as text.
    pub fn scalar<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
            _ => None,
        })
    }

    /// Any non-null value as text; containers become compact JSON.
    pub fn text<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }
}

impl Event {
    /// Build a typed event from one decoded JSON line.
    ///
    /// Only a missing `event` discriminator rejects the record. Payload
    /// fields of the wrong JSON type read as absent.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let obj = match &value {
            Value::Object(obj) => obj,
            other => return Err(EventError::NotAnObject(json_type_name(other))),
        };
        let kind_name = obj
            .get("event")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingDiscriminator)?
            .to_string();

        let payload_err = |source| EventError::Payload {
            kind: kind_name.clone(),
            source,
        };

        let envelope = Envelope::deserialize(&value).map_err(payload_err)?;
        let kind = match kind_name.as_str() {
            "task_start" => EventKind::TaskStart(TaskStart::deserialize(&value).map_err(payload_err)?),
            "tool_use" => EventKind::ToolUse(ToolUse::deserialize(&value).map_err(payload_err)?),
            "assistant_text" => {
                EventKind::AssistantText(AssistantText::deserialize(&value).map_err(payload_err)?)
            }
            "result" => EventKind::Result(ResultEvent::deserialize(&value).map_err(payload_err)?),
            "task_complete" => {
                EventKind::TaskComplete(TaskComplete::deserialize(&value).map_err(payload_err)?)
            }
            "error" => EventKind::Error(ErrorEvent::deserialize(&value).map_err(payload_err)?),
            _ => EventKind::Unknown(kind_name.clone()),
        };

        Ok(Event {
            ts: envelope.ts,
            run_id: envelope.run_id,
            kind,
            raw: value,
        })
    }

    /// The discriminator as written in the log.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            EventKind::TaskStart(_) => "task_start",
            EventKind::ToolUse(_) => "tool_use",
            EventKind::AssistantText(_) => "assistant_text",
            EventKind::Result(_) => "result",
            EventKind::TaskComplete(_) => "task_complete",
            EventKind::Error(_) => "error",
            EventKind::Unknown(name) => name,
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The events of one task, read from one file.
#[derive(Debug, Clone)]
pub struct TaskLog {
    /// File stem of the source log
    pub task_id: String,
    pub path: PathBuf,
    pub events: Vec<Event>,
}

/// Run identifier → task logs of that run.
pub type RunMap = BTreeMap<String, Vec<TaskLog>>;

/// Run identifier used when neither the layout nor the content names one.
pub const DEFAULT_RUN: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Error,
    #[default]
    Unknown,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Unknown => "unknown",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "Completed",
            TaskStatus::Error => "Error",
            TaskStatus::Unknown => "Unknown",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "✅",
            TaskStatus::Error => "❌",
            TaskStatus::Unknown => "⏳",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics derived from a task log. Never stored, always recomputed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSummary {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub workspace: Option<String>,
	pub tool_call_count: usize,
	pub tool_breakdown: BTreeMap<String, usize>,
	pub duration_seconds: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub start_time: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end_time: Option<String>,
	pub status: TaskStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_len: Option<u64>,
	pub assistant_message_count: usize,
}

impl TaskSummary {
	/// Tool names ordered by descending call count; ties keep name order.
	pub fn tools_by_usage(&self) -> Vec<(&str, usize)> {
		let mut tools: Vec<(&str, usize)> = self
			.tool_breakdown
			.iter()
			.map(|(name, count)| (name.as_str(), *count))
			.collect();
		tools.sort_by(|a, b| b.1.cmp(&a.1));
		tools
	}
}

/// Aggregates over every task of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
	pub tasks: usize,
	pub completed: usize,
	pub errored: usize,
	pub tool_calls: usize,
	pub total_seconds: f64,
}

impl RunStats {
	pub fn from_summaries<'a, I>(summaries: I) -> Self
	where
		I: IntoIterator<Item = &'a TaskSummary>,
	{
		let mut stats = RunStats::default();
		for s in summaries {
			stats.tasks += 1;
			match s.status {
				TaskStatus::Completed => stats.completed += 1,
				TaskStatus::Error => stats.errored += 1,
				TaskStatus::Unknown => {}
			}
			stats.tool_calls += s.tool_call_count;
			stats.total_seconds += s.duration_seconds;
		}
		stats
	}
}

#[derive(Debug, Clone, Tabled)]
struct TaskRow {
	task: String,
	status: String,
	function: String,
	description: String,
	duration_s: String,
	tool_calls: usize,
	messages: usize,
	model: String,
}

/// Render a run's task summaries as a terminal table, followed by the
/// run aggregates.
pub fn summary_table(run_id: &str, tasks: &[(String, TaskSummary)]) -> String {
	use tabled::Table;
	let rows: Vec<TaskRow> = tasks
		.iter()
		.map(|(task_id, s)| TaskRow {
			task: task_id.clone(),
			status: format!("{} {}", s.status.icon(), s.status),
			function: s.function.clone().unwrap_or_else(|| "-".to_string()),
			description: truncate(s.description.clone().unwrap_or_default(), 48),
			duration_s: format!("{:.1}", s.duration_seconds),
			tool_calls: s.tool_call_count,
			messages: s.assistant_message_count,
			model: s.model.clone().unwrap_or_else(|| "-".to_string()),
		})
		.collect();

	let table = Table::new(rows);
	let stats = RunStats::from_summaries(tasks.iter().map(|(_, s)| s));

	let summary_text = format!(
		"Run: {}  Tasks: {}  Completed: {}  Errors: {}  Tool calls: {}  Total time: {:.0}s",
		run_id, stats.tasks, stats.completed, stats.errored, stats.tool_calls, stats.total_seconds
	);

	format!("{}\n\n{}\n", table, summary_text)
}

/// One row of an evaluation-results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
	pub task_name: String,
	#[serde(default)]
	pub model: String,
	/// Headline score value; absent for runs that never produced one
	#[serde(default)]
	pub score: Option<f64>,
	/// Task arguments, keyed without the `task_arg_` prefix
	#[serde(default)]
	pub task_args: BTreeMap<String, Value>,
}

/// Column-name prefix the results table uses for task arguments.
pub const TASK_ARG_PREFIX: &str = "task_arg_";

impl EvalRecord {
	pub fn new(task_name: impl Into<String>, model: impl Into<String>, score: Option<f64>) -> Self {
		Self {
			task_name: task_name.into(),
			model: model.into(),
			score,
			task_args: BTreeMap::new(),
		}
	}

	pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
		self.task_args.insert(name.into(), value);
		self
	}

	/// Look up a column by name. Task arguments answer to both their bare
	/// name and their `task_arg_`-prefixed column name.
	pub fn column(&self, name: &str) -> Option<Value> {
		match name {
			"task_name" => Some(Value::String(self.task_name.clone())),
			"model" => Some(Value::String(self.model.clone())),
			"score" | "score_headline_value" => self.score.map(Value::from),
			other => {
				let arg = other.strip_prefix(TASK_ARG_PREFIX).unwrap_or(other);
				self.task_args.get(arg).filter(|v| !v.is_null()).cloned()
			}
		}
	}
}

/// Text form of a cell for labels and previews.
pub fn value_preview(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		_ => v.to_string(),
	}
}

/// Cut `s` to at most `max_len` characters, marking the cut with `…`.
pub fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
