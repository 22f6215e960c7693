//! End-to-end tests over the fixture logs in `tests/fixtures/agent_logs/`
//! and the results table in `tests/fixtures/results.jsonl`.

use std::path::PathBuf;
use std::sync::Arc;

use evalscope_core::page::{task_label, NO_LOGS_MESSAGE};
use evalscope_core::testing::{assert_completion_rate, assert_no_errors, event_line, write_log};
use evalscope_core::{
    build_bars, dashboard_html, generate_chart_page, load_all, load_runs, summarize_task,
    ChartSpec, JsonlResultSource, ResultSource, RunStats, TaskFilter, TaskStatus, DEFAULT_RUN,
};
use serde_json::json;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

// ============================================
// Log loading
// ============================================

#[test]
fn test_fixture_runs_grouped() {
    evalscope_core::logging::init_test();
    let runs = load_runs(&fixture_path("agent_logs"));
    let run_ids: Vec<&str> = runs.keys().map(String::as_str).collect();
    assert_eq!(run_ids, vec![DEFAULT_RUN, "run_a"]);

    let flat: Vec<&str> = runs[DEFAULT_RUN].iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(flat, vec!["add_numbers", "reverse_list"]);
    assert_eq!(runs["run_a"].len(), 1);
    assert_eq!(runs["run_a"][0].task_id, "sort_items");
}

#[test]
fn test_bad_lines_dropped() {
    let runs = load_runs(&fixture_path("agent_logs"));
    let reverse = &runs[DEFAULT_RUN][1];
    let kinds: Vec<&str> = reverse.events.iter().map(|e| e.kind_name()).collect();
    assert_eq!(kinds, vec!["task_start", "tool_use", "error"]);
}

#[test]
fn test_fixture_summaries() {
    let runs = load_runs(&fixture_path("agent_logs"));

    let add = summarize_task(&runs[DEFAULT_RUN][0].events);
    assert_eq!(add.status, TaskStatus::Completed);
    assert_eq!(add.function.as_deref(), Some("add_numbers"));
    assert_eq!(add.description.as_deref(), Some("Add two numbers."));
    assert_eq!(add.model.as_deref(), Some("claude-sonnet"));
    assert_eq!(add.duration_seconds, 4.5);
    assert_eq!(add.tool_breakdown.get("Bash"), Some(&1));
    assert_eq!(add.response_len, Some(5));
    assert_eq!(task_label("add_numbers", &add), "✅ add_numbers (4.5s)");

    let reverse = summarize_task(&runs[DEFAULT_RUN][1].events);
    assert_eq!(reverse.status, TaskStatus::Error);
    assert_eq!(reverse.model.as_deref(), Some("unknown"));
    assert_eq!(reverse.duration_seconds, 2.0);

    let sort = summarize_task(&runs["run_a"][0].events);
    assert_eq!(sort.status, TaskStatus::Unknown);
    assert_eq!(sort.assistant_message_count, 1);
}

#[test]
fn test_run_checks() {
    let runs = load_runs(&fixture_path("agent_logs"));
    let summaries: Vec<_> = runs[DEFAULT_RUN]
        .iter()
        .map(|t| summarize_task(&t.events))
        .collect();
    let stats = RunStats::from_summaries(&summaries);
    assert_eq!((stats.tasks, stats.completed, stats.errored), (2, 1, 1));
    assert!(assert_completion_rate(&stats, 0.5).is_ok());
    assert!(assert_completion_rate(&stats, 0.6).is_err());
    assert!(assert_no_errors(&stats).is_err());
}

#[test]
fn test_flat_log_takes_run_from_content() {
    let dir = tempfile::tempdir().unwrap();
    let start = event_line("task_start", Some(1.0), json!({"run_id": null}));
    let tagged = event_line("tool_use", Some(2.0), json!({"run_id": "nightly", "tool": "Bash"}));
    write_log(dir.path(), "t1.jsonl", &[&start, &tagged]);
    write_log(dir.path(), "t2.jsonl", &[&start]);

    let runs = load_runs(dir.path());
    assert_eq!(runs["nightly"].len(), 1);
    assert_eq!(runs[DEFAULT_RUN].len(), 1);
    assert_eq!(runs[DEFAULT_RUN][0].task_id, "t2");
}

// ============================================
// Dashboard page
// ============================================

#[test]
fn test_dashboard_for_fixtures() {
    let page = dashboard_html(&load_runs(&fixture_path("agent_logs")));
    assert!(page.starts_with("<!DOCTYPE html>"));
    assert!(page.contains("Default (flat logs)"));
    assert!(page.contains("Run: run_a"));
    assert!(page.contains("✅ add_numbers (4.5s)"));
    assert!(page.contains("❌ reverse_list (2.0s)"));
    assert!(page.contains("python -c &#39;print(1+2)&#39;"));
    assert!(!page.contains(NO_LOGS_MESSAGE));
}

#[test]
fn test_dashboard_without_logs() {
    let dir = tempfile::tempdir().unwrap();
    let page = dashboard_html(&load_runs(&dir.path().join("agent_logs")));
    assert!(page.contains(NO_LOGS_MESSAGE));
}

// ============================================
// Charts
// ============================================

#[tokio::test]
async fn test_charts_from_results_file() {
    let sources: Vec<Arc<dyn ResultSource>> =
        vec![Arc::new(JsonlResultSource::new(fixture_path("results.jsonl")))];
    let records = load_all(&sources).await.unwrap();
    assert_eq!(records.len(), 5);

    let timeout = build_bars(&ChartSpec::timeout_preset(), &records).unwrap();
    let labels: Vec<&str> = timeout.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["60", "600"]);
    assert!((timeout[0].value - 0.2).abs() < 1e-9);
    assert!((timeout[1].value - 0.6).abs() < 1e-9);
    assert_eq!(timeout[1].count, 2);

    let models = build_bars(&ChartSpec::model_preset(), &records).unwrap();
    let labels: Vec<&str> = models.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["claude", "gpt"]);

    let page = generate_chart_page(&[
        (ChartSpec::timeout_preset(), timeout),
        (ChartSpec::model_preset(), models),
    ]);
    assert_eq!(page.matches("<svg").count(), 2);
    assert!(page.contains("Starsim Agent Benchmark"));
}

#[tokio::test]
async fn test_per_task_charts() {
    let records = JsonlResultSource::new(fixture_path("results.jsonl"))
        .load()
        .await
        .unwrap();
    let specs = ChartSpec::per_task(&ChartSpec::default(), &records).unwrap();
    let titles: Vec<String> = specs.iter().map(ChartSpec::title).collect();
    assert_eq!(titles, vec!["starsim_agent_benchmark", "starsim_benchmark"]);

    let only_agent = ChartSpec {
        task: TaskFilter::Pattern("_agent_".to_string()),
        ..ChartSpec::default()
    };
    let specs = ChartSpec::per_task(&only_agent, &records).unwrap();
    let titles: Vec<String> = specs.iter().map(ChartSpec::title).collect();
    assert_eq!(titles, vec!["starsim_agent_benchmark"]);
}

#[cfg(feature = "persistence")]
#[tokio::test]
async fn test_store_as_result_source() {
    let records = JsonlResultSource::new(fixture_path("results.jsonl"))
        .load()
        .await
        .unwrap();
    let store = evalscope_store::Store::open_in_memory().unwrap();
    let run = store.create_run(None).unwrap();
    store.save_records(run, &records).unwrap();

    let sources: Vec<Arc<dyn ResultSource>> = vec![Arc::new(store)];
    assert_eq!(load_all(&sources).await.unwrap(), records);
}
