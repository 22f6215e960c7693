use evalscope_types::{RunMap, RunStats, TaskLog, TaskSummary, DEFAULT_RUN};

use crate::render::{event_view, html, html_escape};
use crate::summary::summarize_task;

pub const NO_LOGS_MESSAGE: &str = "No agent logs found. Run an evaluation to generate logs.";

/// Everything the dashboard shows, computed once per render pass.
pub struct DashboardModel<'a> {
    pub runs: Vec<RunView<'a>>,
}

pub struct RunView<'a> {
    pub run_id: &'a str,
    pub label: String,
    pub stats: RunStats,
    pub tasks: Vec<TaskView<'a>>,
}

pub struct TaskView<'a> {
    pub log: &'a TaskLog,
    pub summary: TaskSummary,
    pub label: String,
}

impl<'a> DashboardModel<'a> {
    pub fn build(runs: &'a RunMap) -> Self {
        let runs = runs
            .iter()
            .map(|(run_id, logs)| {
                let tasks: Vec<TaskView<'a>> = logs
                    .iter()
                    .map(|log| {
                        let summary = summarize_task(&log.events);
                        let label = task_label(&log.task_id, &summary);
                        TaskView { log, summary, label }
                    })
                    .collect();
                RunView {
                    run_id,
                    label: run_label(run_id),
                    stats: RunStats::from_summaries(tasks.iter().map(|t| &t.summary)),
                    tasks,
                }
            })
            .collect();
        Self { runs }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

pub fn run_label(run_id: &str) -> String {
    if run_id == DEFAULT_RUN {
        "Default (flat logs)".to_string()
    } else {
        format!("Run: {run_id}")
    }
}

/// `<status icon> <function | description | task id> (<duration>s)`
pub fn task_label(task_id: &str, summary: &TaskSummary) -> String {
    let name = [summary.function.as_deref(), summary.description.as_deref()]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or(task_id);
    format!(
        "{} {} ({:.1}s)",
        summary.status.icon(),
        name,
        summary.duration_seconds
    )
}

/// Distinct event kinds of a task, sorted.
pub fn event_kinds(log: &TaskLog) -> Vec<&str> {
    let mut kinds: Vec<&str> = log.events.iter().map(|e| e.kind_name()).collect();
    kinds.sort_unstable();
    kinds.dedup();
    kinds
}

pub fn dashboard_html(runs: &RunMap) -> String {
    generate_dashboard_html(&DashboardModel::build(runs))
}

pub fn generate_dashboard_html(model: &DashboardModel) -> String {
    let body = if model.is_empty() {
        format!(r#"<div class="notice">{}</div>"#, NO_LOGS_MESSAGE)
    } else {
        render_body(model)
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Agent Logs Viewer</title>
    <style>{}</style>
</head>
<body>
    <h1>📊 Agent Execution Logs</h1>
    <div class="timestamp">Generated: {}</div>
    {}
    <script>{}</script>
</body>
</html>"#,
        STYLE,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        body,
        SCRIPT
    )
}

fn render_body(model: &DashboardModel) -> String {
    let mut run_options = String::new();
    let mut sidebars = String::new();
    let mut sections = String::new();

    for (ri, run) in model.runs.iter().enumerate() {
        run_options.push_str(&format!(
            r#"<option value="{}">{}</option>"#,
            ri,
            html_escape(&run.label)
        ));

        let task_options: String = run
            .tasks
            .iter()
            .enumerate()
            .map(|(ti, t)| {
                format!(
                    r#"<option value="task-{}-{}">{}</option>"#,
                    ri,
                    ti,
                    html_escape(&t.label)
                )
            })
            .collect();

        sidebars.push_str(&format!(
            r#"
        <div class="run" id="run-{}" hidden>
            <label>Task</label>
            <select class="task-select">{}</select>
            <hr>
            <div class="run-stats">
                <div><strong>Tasks in run:</strong> {}</div>
                <div><strong>Completed:</strong> {} | <strong>Errors:</strong> {}</div>
                <div><strong>Total tool calls:</strong> {}</div>
                <div><strong>Total time:</strong> {:.0}s</div>
            </div>
        </div>"#,
            ri,
            task_options,
            run.stats.tasks,
            run.stats.completed,
            run.stats.errored,
            run.stats.tool_calls,
            run.stats.total_seconds
        ));

        for (ti, task) in run.tasks.iter().enumerate() {
            sections.push_str(&render_task(&format!("task-{ri}-{ti}"), task));
        }
    }

    format!(
        r#"<div class="layout">
    <aside class="sidebar">
        <label>Evaluation Run</label>
        <select id="run-select">{}</select>
        {}
    </aside>
    <main>{}</main>
</div>"#,
        run_options, sidebars, sections
    )
}

fn metric(label: &str, value: &str) -> String {
    format!(
        r#"<div class="metric"><div class="metric-label">{}</div><div class="metric-value">{}</div></div>"#,
        label,
        html_escape(value)
    )
}

fn render_task(id: &str, task: &TaskView) -> String {
    let s = &task.summary;

    let metrics_top = [
        metric("Status", s.status.title()),
        metric("Duration", &format!("{:.1}s", s.duration_seconds)),
        metric("Tool Calls", &s.tool_call_count.to_string()),
        metric("Assistant Messages", &s.assistant_message_count.to_string()),
    ]
    .concat();
    let response = s
        .response_len
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".to_string());
    let metrics_bottom = [
        metric("Model", s.model.as_deref().unwrap_or("unknown")),
        metric("Response Length", &format!("{response} chars")),
        metric("Start Time", s.start_time.as_deref().unwrap_or("?")),
    ]
    .concat();

    let breakdown = if s.tool_breakdown.is_empty() {
        String::new()
    } else {
        let cells: String = s
            .tools_by_usage()
            .into_iter()
            .map(|(tool, count)| metric(&html_escape(tool), &count.to_string()))
            .collect();
        format!(r#"<h3>Tool Usage Breakdown</h3><div class="metrics">{cells}</div>"#)
    };

    let filters: String = event_kinds(task.log)
        .into_iter()
        .map(|kind| {
            format!(
                r#"<label class="filter"><input type="checkbox" class="kind-filter" value="{0}" checked> {0}</label>"#,
                html_escape(kind)
            )
        })
        .collect();

    let timeline: String = task
        .log
        .events
        .iter()
        .map(|e| html::render_event(&event_view(e)))
        .collect();

    let raw: Vec<&serde_json::Value> = task.log.events.iter().map(|e| &e.raw).collect();
    let raw = serde_json::to_string_pretty(&raw).unwrap_or_default();

    format!(
        r#"
        <section class="task" id="{}" hidden>
            <h2>Task Summary</h2>
            <div class="task-id">{}</div>
            <div class="metrics">{}</div>
            <div class="metrics">{}</div>
            {}
            <h2>Event Timeline</h2>
            <div class="filters">Filter by event type: {}</div>
            <div class="timeline">{}</div>
            <details class="raw"><summary>Raw JSONL data</summary><pre class="json">{}</pre></details>
        </section>"#,
        id,
        html_escape(&task.log.path.display().to_string()),
        metrics_top,
        metrics_bottom,
        breakdown,
        filters,
        timeline,
        html_escape(&raw)
    )
}

const STYLE: &str = r#"
        * { box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            color: #333;
        }
        h1 { margin: 0 0 10px 0; }
        .timestamp { color: #6c757d; font-size: 14px; margin-bottom: 20px; }
        .notice {
            padding: 16px;
            background: #fff3cd;
            color: #856404;
            border-radius: 6px;
        }
        .layout { display: flex; gap: 20px; align-items: flex-start; }
        .sidebar {
            width: 300px;
            flex-shrink: 0;
            background: white;
            padding: 20px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }
        .sidebar label {
            display: block;
            font-size: 12px;
            color: #666;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin: 10px 0 5px 0;
        }
        .sidebar select { width: 100%; padding: 6px; }
        .run-stats div { margin: 6px 0; font-size: 14px; }
        main {
            flex: 1;
            min-width: 0;
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }
        .task-id { color: #6c757d; font-size: 12px; margin-bottom: 10px; }
        .metrics { display: flex; flex-wrap: wrap; gap: 20px; margin: 10px 0; padding: 16px; background: #f8f9fa; border-radius: 6px; }
        .metric { flex: 1; min-width: 120px; }
        .metric-label {
            font-size: 12px;
            color: #666;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin-bottom: 5px;
        }
        .metric-value { font-size: 22px; font-weight: 600; word-break: break-word; }
        .filters { margin: 10px 0 20px 0; font-size: 14px; }
        .filter { margin-right: 12px; white-space: nowrap; }
        .event { padding: 10px 0; border-bottom: 1px solid #dee2e6; }
        .event.failure { background: #fef3f2; border-left: 3px solid #dc3545; padding-left: 12px; }
        .event-head { margin-bottom: 6px; }
        .ts { color: #6c757d; font-size: 13px; }
        .field { margin: 4px 0; font-size: 14px; }
        .text { white-space: pre-wrap; word-break: break-word; font-size: 14px; }
        .failure-msg { color: #721c24; white-space: pre-wrap; }
        pre {
            margin: 6px 0;
            padding: 8px;
            background: #f8f9fa;
            border-radius: 4px;
            font-size: 12px;
            max-height: 400px;
            overflow: auto;
            white-space: pre-wrap;
            word-break: break-word;
        }
        details { margin: 6px 0; }
        summary { cursor: pointer; color: #007bff; font-size: 13px; font-weight: 600; }
        hr { border: none; border-top: 1px solid #dee2e6; margin: 12px 0; }
"#;

const SCRIPT: &str = r#"
        (function () {
            const runSelect = document.getElementById('run-select');
            if (!runSelect) { return; }
            function showTask(id) {
                document.querySelectorAll('section.task').forEach(function (s) { s.hidden = s.id !== id; });
            }
            function showRun(index) {
                document.querySelectorAll('.run').forEach(function (r) { r.hidden = r.id !== 'run-' + index; });
                const taskSelect = document.querySelector('#run-' + index + ' .task-select');
                if (taskSelect) { showTask(taskSelect.value); }
            }
            runSelect.addEventListener('change', function () { showRun(runSelect.value); });
            document.querySelectorAll('.task-select').forEach(function (sel) {
                sel.addEventListener('change', function () { showTask(sel.value); });
            });
            document.querySelectorAll('.kind-filter').forEach(function (box) {
                box.addEventListener('change', function () {
                    const section = box.closest('section.task');
                    section.querySelectorAll('.event').forEach(function (ev) {
                        if (ev.dataset.kind === box.value) { ev.hidden = !box.checked; }
                    });
                });
            });
            showRun(runSelect.value);
        })();
"#;
