//! Human-readable rendering of single log events.
//!
//! [`event_view`] turns an event into a backend-neutral [`EventView`]; the
//! [`html`] and [`text`] modules draw that view for the dashboard page and
//! the terminal. Malformed payloads degrade to raw text, never to errors.

use serde_json::Value;

use evalscope_types::{value_preview, Event, EventKind};

use crate::summary::format_ts;

/// Longest slice of a tool payload shown before it is cut.
pub const PAYLOAD_LIMIT: usize = 2000;
const SESSION_PREFIX: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Labelled inline value, e.g. the model name
    Field { label: &'static str, value: String },
    Code { language: &'static str, text: String },
    Text(String),
    Emphasis(String),
    Failure(String),
    Json(Value),
    /// Collapsed by default
    Disclosure { summary: &'static str, body: Vec<Block> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventView {
    /// Discriminator, used by the page's type filter
    pub kind: String,
    pub icon: &'static str,
    pub title: String,
    pub timestamp: Option<String>,
    pub failure: bool,
    pub blocks: Vec<Block>,
}

pub fn icon_for(kind: &str) -> &'static str {
    match kind {
        "task_start" => "🚀",
        "tool_use" => "🔧",
        "assistant_text" => "💬",
        "result" => "📋",
        "task_complete" => "✅",
        "error" => "❌",
        _ => "📌",
    }
}

/// How a tool call's input is shown.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInputView {
    /// Shell tool with a `command`
    Shell { command: String },
    /// Sub-task tool with a `prompt`; the prompt is already clipped
    SubTask { description: String, prompt: String },
    Structured(Value),
    /// Unparseable or non-object input, already clipped
    Raw(String),
    Empty,
}

impl ToolInputView {
    pub fn classify(tool: &str, input: Option<&Value>) -> Self {
        let input = match input {
            Some(v) if is_truthy(v) => v,
            _ => return ToolInputView::Empty,
        };
        let text = match input {
            Value::String(s) if s.starts_with('{') => s,
            other => return ToolInputView::Raw(clip(&value_preview(other), PAYLOAD_LIMIT)),
        };
        let parsed: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return ToolInputView::Raw(clip(text, PAYLOAD_LIMIT)),
        };
        let command = parsed.get("command").map(value_preview);
        let prompt = parsed.get("prompt").map(value_preview);
        match (tool, command, prompt) {
            ("Bash", Some(command), _) => ToolInputView::Shell { command },
            ("Task", _, Some(prompt)) => ToolInputView::SubTask {
                description: parsed
                    .get("description")
                    .map(value_preview)
                    .unwrap_or_default(),
                prompt: clip(&prompt, PAYLOAD_LIMIT),
            },
            _ => ToolInputView::Structured(parsed),
        }
    }

    fn into_blocks(self) -> Vec<Block> {
        match self {
            ToolInputView::Shell { command } => vec![Block::Code {
                language: "bash",
                text: command,
            }],
            ToolInputView::SubTask {
                description,
                prompt,
            } => vec![
                Block::Emphasis(description),
                Block::Disclosure {
                    summary: "Task prompt",
                    body: vec![Block::Text(prompt)],
                },
            ],
            ToolInputView::Structured(value) => vec![Block::Disclosure {
                summary: "Input",
                body: vec![Block::Json(value)],
            }],
            ToolInputView::Raw(text) => vec![Block::Disclosure {
                summary: "Input",
                body: vec![Block::Text(text)],
            }],
            ToolInputView::Empty => Vec::new(),
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First `max` characters of `s`, with no marker.
pub fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn event_view(event: &Event) -> EventView {
    let kind = event.kind_name().to_string();
    let mut view = EventView {
        icon: icon_for(&kind),
        kind,
        title: String::new(),
        timestamp: event.ts.and_then(format_ts),
        failure: false,
        blocks: Vec::new(),
    };

    match &event.kind {
        EventKind::TaskStart(start) => {
            view.title = "Task Started".to_string();
            view.blocks.push(Block::Field {
                label: "Model",
                value: start.model.clone().unwrap_or_else(|| "unknown".to_string()),
            });
            if let Some(ws) = start.workspace.as_deref().filter(|w| !w.is_empty()) {
                view.blocks.push(Block::Field {
                    label: "Workspace",
                    value: ws.to_string(),
                });
            }
            view.blocks.push(Block::Disclosure {
                summary: "Full Prompt",
                body: vec![Block::Text(
                    start.prompt.clone().unwrap_or_else(|| "_no prompt_".to_string()),
                )],
            });
        }
        EventKind::ToolUse(tool_use) => {
            let tool = tool_use.tool.as_deref().unwrap_or("unknown");
            view.title = format!("Tool Call: {tool}");
            view.blocks = ToolInputView::classify(tool, tool_use.input.as_ref()).into_blocks();
        }
        EventKind::AssistantText(text) => {
            view.title = "Assistant".to_string();
            view.blocks.push(Block::Text(text.text.clone().unwrap_or_default()));
        }
        EventKind::Result(result) => {
            view.title = "Result".to_string();
            let session = result.session_id.as_deref().unwrap_or("unknown");
            view.blocks.push(Block::Field {
                label: "Session",
                value: format!("{}...", clip(session, SESSION_PREFIX)),
            });
        }
        EventKind::TaskComplete(complete) => {
            view.title = "Task Complete".to_string();
            let len = complete
                .response_len
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string());
            view.blocks.push(Block::Text(format!("response length: {len} chars")));
        }
        EventKind::Error(error) => {
            view.title = "Error".to_string();
            view.failure = true;
            view.blocks.push(Block::Failure(
                error.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        EventKind::Unknown(name) => {
            view.title = name.clone();
            view.blocks.push(Block::Disclosure {
                summary: "Raw event",
                body: vec![Block::Json(event.raw.clone())],
            });
        }
    }

    view
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub mod html {
    use super::{html_escape, Block, EventView};

    pub fn render_event(view: &EventView) -> String {
        let class = if view.failure { "event failure" } else { "event" };
        let ts = view
            .timestamp
            .as_deref()
            .map(|t| format!(r#" <span class="ts">— {}</span>"#, html_escape(t)))
            .unwrap_or_default();
        let body: String = view.blocks.iter().map(render_block).collect();
        format!(
            r#"<div class="{}" data-kind="{}"><div class="event-head"><strong>{} {}</strong>{}</div>{}</div>"#,
            class,
            html_escape(&view.kind),
            view.icon,
            html_escape(&view.title),
            ts,
            body
        )
    }

    fn render_block(block: &Block) -> String {
        match block {
            Block::Field { label, value } => format!(
                r#"<div class="field"><strong>{}:</strong> <code>{}</code></div>"#,
                label,
                html_escape(value)
            ),
            Block::Code { language, text } => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                language,
                html_escape(text)
            ),
            Block::Text(text) => format!(r#"<div class="text">{}</div>"#, html_escape(text)),
            Block::Emphasis(text) => {
                format!(r#"<div class="text"><em>{}</em></div>"#, html_escape(text))
            }
            Block::Failure(text) => {
                format!(r#"<div class="failure-msg">{}</div>"#, html_escape(text))
            }
            Block::Json(value) => format!(
                r#"<pre class="json">{}</pre>"#,
                html_escape(&serde_json::to_string_pretty(value).unwrap_or_default())
            ),
            Block::Disclosure { summary, body } => format!(
                "<details><summary>{}</summary>{}</details>",
                summary,
                body.iter().map(render_block).collect::<String>()
            ),
        }
    }
}

pub mod text {
    use super::{Block, EventView};

    pub fn render_event(view: &EventView) -> String {
        let mut out = format!("{} {}", view.icon, view.title);
        if let Some(ts) = &view.timestamp {
            out.push_str(" — ");
            out.push_str(ts);
        }
        out.push('\n');
        for block in &view.blocks {
            render_block(block, 1, &mut out);
        }
        out
    }

    fn render_block(block: &Block, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match block {
            Block::Field { label, value } => out.push_str(&format!("{pad}{label}: {value}\n")),
            Block::Code { text, .. } => push_lines(out, &format!("{pad}  "), text),
            Block::Text(text) => push_lines(out, &pad, text),
            Block::Emphasis(text) => out.push_str(&format!("{pad}_{text}_\n")),
            Block::Failure(text) => push_lines(out, &format!("{pad}! "), text),
            Block::Json(value) => {
                push_lines(out, &pad, &serde_json::to_string_pretty(value).unwrap_or_default())
            }
            Block::Disclosure { summary, body } => {
                out.push_str(&format!("{pad}▸ {summary}\n"));
                for inner in body {
                    render_block(inner, depth + 1, out);
                }
            }
        }
    }

    fn push_lines(out: &mut String, prefix: &str, text: &str) {
        for line in text.lines() {
            out.push_str(prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
}
