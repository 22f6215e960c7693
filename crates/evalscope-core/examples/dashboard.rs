use std::path::Path;
use std::sync::Arc;

use evalscope_core::{
    build_bars, dashboard_html, load_all, load_runs, render_bar_chart, summarize_task,
    summary_table, ChartSpec, EvalRecord, ResultSource, RunStats, VecResultSource,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: Inline results, one bar per timeout setting
    let records = vec![
        EvalRecord::new("starsim_agent_benchmark", "claude", Some(0.4)).with_arg("request_timeout", json!(60)),
        EvalRecord::new("starsim_agent_benchmark", "claude", Some(0.6)).with_arg("request_timeout", json!(60)),
        EvalRecord::new("starsim_agent_benchmark", "claude", Some(0.9)).with_arg("request_timeout", json!(600)),
    ];
    let sources: Vec<Arc<dyn ResultSource>> = vec![Arc::new(VecResultSource::new(records))];
    let records = load_all(&sources).await?;

    let spec = ChartSpec::timeout_preset();
    let bars = build_bars(&spec, &records)?;
    for bar in &bars {
        println!("{:>8} {:.2} (n={})", bar.label, bar.value, bar.count);
    }
    let svg = render_bar_chart(&spec, &bars);
    println!("rendered {} bytes of SVG", svg.len());

    // Example 2: Summarize a log directory if provided
    if let Some(root) = std::env::args().nth(1) {
        let runs = load_runs(Path::new(&root));
        for (run_id, logs) in &runs {
            let summaries: Vec<(String, _)> = logs
                .iter()
                .map(|log| (log.task_id.clone(), summarize_task(&log.events)))
                .collect();
            println!("{}", summary_table(run_id, &summaries));
            let stats = RunStats::from_summaries(summaries.iter().map(|(_, s)| s));
            println!("{}/{} tasks completed", stats.completed, stats.tasks);
        }
        std::fs::write("agent_logs.html", dashboard_html(&runs))?;
        println!("wrote agent_logs.html");
    }

    Ok(())
}
