//! evalscope-core: browse agent task logs and chart evaluation results.
//! Logs are discovered, parsed and summarized into a static dashboard page;
//! result tables are filtered, grouped and drawn as bar charts.
//! See `examples/dashboard.rs` for a quickstart.

pub mod cache;
pub mod chart;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jsonl;
pub mod logging;
pub mod page;
pub mod render;
pub mod results;
pub mod summary;
pub mod testing;

pub use cache::{Fetched, Fingerprint, LogCache};
pub use chart::{build_bars, generate_chart_page, render_bar_chart, Bar, ChartSpec, TaskFilter};
pub use config::Config;
pub use discovery::{discover_files, load_runs, Layout, LogFile};
pub use error::{Error, Result};
pub use jsonl::{detect_run_id, parse_events, read_events};
pub use page::{dashboard_html, generate_dashboard_html, DashboardModel};
pub use render::{event_view, Block, EventView, ToolInputView};
pub use results::{load_all, JsonlResultSource, ResultSource, VecResultSource};
pub use summary::{summarize_task, RunStats};
pub use evalscope_types::{
    summary_table, EvalRecord, Event, EventKind, RunMap, TaskLog, TaskStatus, TaskSummary,
    DEFAULT_RUN,
};
