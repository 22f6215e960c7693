use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use evalscope_core::{
	build_bars, dashboard_html, event_view, generate_chart_page, load_all, load_runs, logging,
	render::text, summarize_task, summary_table, ChartSpec, Config, JsonlResultSource, LogCache,
	ResultSource, RunMap, TaskFilter, TaskLog,
};
use evalscope_store::Store;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "evalscope", about = "Browse agent task logs and chart evaluation results")]
struct Cli {
	/// YAML configuration file
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Log filter (overrides the config file; RUST_LOG wins over both)
	#[arg(long, global = true)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Write the log dashboard as a static HTML page
	Dashboard(PageArgs),
	/// Rewrite the dashboard whenever the logs change
	Watch(WatchArgs),
	/// Print per-run task tables
	Summary(SummaryArgs),
	/// Print one task's timeline
	Show(ShowArgs),
	/// Draw bar charts from evaluation results
	Chart(ChartArgs),
	/// Copy results files into the SQLite store
	Import(ImportArgs),
}

#[derive(Debug, Clone, Parser)]
struct PageArgs {
	/// Log root (defaults to `logs_dir` from the config)
	#[arg(long)]
	logs: Option<PathBuf>,

	/// Output HTML file
	#[arg(long)]
	out: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
struct WatchArgs {
	#[command(flatten)]
	page: PageArgs,

	/// Seconds between checks
	#[arg(long)]
	interval: Option<u64>,
}

#[derive(Debug, Clone, Parser)]
struct SummaryArgs {
	#[arg(long)]
	logs: Option<PathBuf>,

	/// Only this run
	#[arg(long)]
	run: Option<String>,
}

#[derive(Debug, Clone, Parser)]
struct ShowArgs {
	#[arg(long)]
	logs: Option<PathBuf>,

	/// Task id (the log file name without extension)
	#[arg(long)]
	task: String,

	/// Run to look in; all runs are searched when omitted
	#[arg(long)]
	run: Option<String>,

	/// Only events of these kinds (repeatable)
	#[arg(long = "type")]
	kinds: Vec<String>,
}

#[derive(Debug, Clone, Parser)]
struct ChartArgs {
	/// Results JSONL files (repeatable)
	#[arg(long)]
	results: Vec<PathBuf>,

	/// Also read every row from this results store
	#[arg(long)]
	db: Option<PathBuf>,

	/// Only records of this task
	#[arg(long, conflicts_with = "task_regex")]
	task: Option<String>,

	/// Only records whose task name matches this pattern
	#[arg(long)]
	task_regex: Option<String>,

	/// Column to sort by before grouping
	#[arg(long)]
	sort_by: Option<String>,

	/// Column whose values label the bars
	#[arg(long)]
	label_by: Option<String>,

	/// One chart per task name
	#[arg(long, action = ArgAction::SetTrue)]
	per_task: bool,

	/// Output HTML file
	#[arg(long, default_value = "eval_charts.html")]
	out: PathBuf,
}

#[derive(Debug, Clone, Parser)]
struct ImportArgs {
	/// Results JSONL files (repeatable)
	#[arg(long, required = true)]
	results: Vec<PathBuf>,

	/// SQLite store to write into
	#[arg(long)]
	db: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let config = Config::load_or_default(cli.config.as_deref())
		.with_context(|| format!("loading config {:?}", cli.config))?;
	logging::init(cli.log_level.as_deref().unwrap_or(&config.logging.level));

	match cli.command {
		Commands::Dashboard(args) => dashboard(&config, args)?,
		Commands::Watch(args) => watch(&config, args).await?,
		Commands::Summary(args) => summary(&config, args),
		Commands::Show(args) => show(&config, args)?,
		Commands::Chart(args) => chart(&config, args).await?,
		Commands::Import(args) => import(args).await?,
	}
	Ok(())
}

fn page_paths(config: &Config, args: &PageArgs) -> (PathBuf, PathBuf) {
	(
		args.logs.clone().unwrap_or_else(|| config.logs_dir.clone()),
		args.out.clone().unwrap_or_else(|| config.output.clone()),
	)
}

fn write_dashboard(runs: &RunMap, out: &Path) -> Result<()> {
	std::fs::write(out, dashboard_html(runs))
		.with_context(|| format!("writing {}", out.display()))?;
	info!(out = %out.display(), runs = runs.len(), "wrote dashboard");
	Ok(())
}

fn dashboard(config: &Config, args: PageArgs) -> Result<()> {
	let (logs, out) = page_paths(config, &args);
	write_dashboard(&load_runs(&logs), &out)?;
	println!("Dashboard written to {}", out.display());
	Ok(())
}

async fn watch(config: &Config, args: WatchArgs) -> Result<()> {
	let (logs, out) = page_paths(config, &args.page);
	let secs = args.interval.unwrap_or(config.watch.interval_secs).max(1);
	let mut cache = LogCache::new();
	let mut ticker = tokio::time::interval(Duration::from_secs(secs));
	info!(logs = %logs.display(), interval_secs = secs, "watching agent logs");

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let fetched = cache.fetch(&logs);
				if fetched.reloaded {
					if let Err(err) = write_dashboard(&fetched.runs, &out) {
						warn!("{err:#}");
					}
				}
			}
			_ = tokio::signal::ctrl_c() => {
				info!("stopping watch");
				break;
			}
		}
	}
	Ok(())
}

fn summary(config: &Config, args: SummaryArgs) {
	let logs = args.logs.unwrap_or_else(|| config.logs_dir.clone());
	let runs = load_runs(&logs);
	if runs.is_empty() {
		println!("{}", evalscope_core::page::NO_LOGS_MESSAGE);
		return;
	}
	for (run_id, tasks) in &runs {
		if args.run.as_ref().is_some_and(|r| r != run_id) {
			continue;
		}
		let summaries: Vec<(String, _)> = tasks
			.iter()
			.map(|log| (log.task_id.clone(), summarize_task(&log.events)))
			.collect();
		println!("{}", summary_table(run_id, &summaries));
	}
}

fn find_task<'a>(runs: &'a RunMap, task: &str, run: Option<&str>) -> Option<(&'a str, &'a TaskLog)> {
	runs.iter()
		.filter(|(run_id, _)| run.map_or(true, |r| r == run_id.as_str()))
		.find_map(|(run_id, logs)| {
			logs.iter()
				.find(|log| log.task_id == task)
				.map(|log| (run_id.as_str(), log))
		})
}

fn show(config: &Config, args: ShowArgs) -> Result<()> {
	let logs = args.logs.unwrap_or_else(|| config.logs_dir.clone());
	let runs = load_runs(&logs);
	let (run_id, log) = find_task(&runs, &args.task, args.run.as_deref())
		.with_context(|| format!("no task {:?} under {}", args.task, logs.display()))?;

	let summary = summarize_task(&log.events);
	println!(
		"{} {} [{}] {} events, {:.1}s",
		summary.status.icon(),
		log.task_id,
		run_id,
		log.events.len(),
		summary.duration_seconds
	);
	for event in &log.events {
		if !args.kinds.is_empty() && !args.kinds.iter().any(|k| k == event.kind_name()) {
			continue;
		}
		println!("{}", text::render_event(&event_view(event)));
	}
	Ok(())
}

/// A chart built from the command line, if any chart flag was given.
fn custom_spec(args: &ChartArgs) -> Option<ChartSpec> {
	let custom = args.task.is_some()
		|| args.task_regex.is_some()
		|| args.sort_by.is_some()
		|| args.label_by.is_some()
		|| args.per_task;
	if !custom {
		return None;
	}
	let mut spec = ChartSpec::default();
	if let Some(task) = &args.task {
		spec.task = TaskFilter::Name(task.clone());
	}
	if let Some(pattern) = &args.task_regex {
		spec.task = TaskFilter::Pattern(pattern.clone());
	}
	if let Some(column) = &args.sort_by {
		spec.sort_by = column.clone();
	}
	if let Some(column) = &args.label_by {
		spec.label_by = column.clone();
	}
	Some(spec)
}

async fn chart(config: &Config, args: ChartArgs) -> Result<()> {
	let mut sources: Vec<Arc<dyn ResultSource>> = args
		.results
		.iter()
		.map(|p| Arc::new(JsonlResultSource::new(p)) as Arc<dyn ResultSource>)
		.collect();
	if let Some(db) = &args.db {
		let store = Store::open(db).with_context(|| format!("opening store {}", db.display()))?;
		sources.push(Arc::new(store));
	}
	if sources.is_empty() {
		anyhow::bail!("no results given; pass --results and/or --db");
	}
	let records = load_all(&sources).await?;
	info!(records = records.len(), "loaded evaluation results");

	let specs = match custom_spec(&args) {
		Some(template) if args.per_task => ChartSpec::per_task(&template, &records)?,
		Some(spec) => {
			spec.validate()?;
			vec![spec]
		}
		None if !config.charts.is_empty() => config.charts.clone(),
		None => ChartSpec::presets(),
	};

	let mut charts = Vec::with_capacity(specs.len());
	for spec in specs {
		let bars = build_bars(&spec, &records)?;
		if bars.is_empty() {
			warn!(chart = %spec.title(), "no records matched");
		}
		charts.push((spec, bars));
	}

	tokio::fs::write(&args.out, generate_chart_page(&charts))
		.await
		.with_context(|| format!("writing {}", args.out.display()))?;
	info!(out = %args.out.display(), charts = charts.len(), "wrote charts");
	println!("Charts written to {}", args.out.display());
	Ok(())
}

async fn import(args: ImportArgs) -> Result<()> {
	let store = Store::open(&args.db).with_context(|| format!("opening store {}", args.db.display()))?;
	for path in &args.results {
		let records = JsonlResultSource::new(path)
			.load()
			.await
			.with_context(|| format!("reading {}", path.display()))?;
		let run = store.create_run(Some(json!({ "source": path.display().to_string() })))?;
		let saved = store.save_records(run, &records)?;
		info!(run, saved, source = %path.display(), "imported results");
		println!("Imported {} rows from {} as run {}", saved, path.display(), run);
	}
	Ok(())
}
