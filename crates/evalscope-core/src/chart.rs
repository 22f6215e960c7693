//! Comparison bar charts over evaluation results.
//!
//! Records are filtered to one task, sorted by a column, grouped by a label
//! column and averaged; each group becomes one bar of an SVG chart.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use evalscope_types::{value_preview, EvalRecord};

use crate::error::{Error, Result};
use crate::render::html_escape;

/// Which task's records a chart shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    Name(String),
    /// Regular expression over the task name
    Pattern(String),
    #[default]
    Any,
}

enum TaskMatcher {
    Name(String),
    Pattern(Regex),
    Any,
}

impl TaskMatcher {
    fn matches(&self, task_name: &str) -> bool {
        match self {
            TaskMatcher::Name(name) => name == task_name,
            TaskMatcher::Pattern(re) => re.is_match(task_name),
            TaskMatcher::Any => true,
        }
    }
}

impl TaskFilter {
    fn matcher(&self) -> Result<TaskMatcher> {
        Ok(match self {
            TaskFilter::Name(name) => TaskMatcher::Name(name.clone()),
            TaskFilter::Pattern(p) => TaskMatcher::Pattern(Regex::new(p)?),
            TaskFilter::Any => TaskMatcher::Any,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Written as `{ name: ... }`, `{ pattern: ... }` or `any`
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub task: TaskFilter,
    #[serde(default = "default_column")]
    pub sort_by: String,
    #[serde(default = "default_column")]
    pub label_by: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Defaults to the label column name
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default = "default_y_label")]
    pub y_label: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_y_range")]
    pub y_range: (f64, f64),
    #[serde(default)]
    pub rotate_labels: bool,
}

fn default_column() -> String {
    "model".to_string()
}

fn default_y_label() -> String {
    "Pass rate".to_string()
}

fn default_color() -> String {
    "#0343df".to_string()
}

fn default_y_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self {
            task: TaskFilter::Any,
            sort_by: default_column(),
            label_by: default_column(),
            title: None,
            x_label: None,
            y_label: default_y_label(),
            color: default_color(),
            y_range: default_y_range(),
            rotate_labels: false,
        }
    }
}

impl ChartSpec {
    pub fn for_task(task: impl Into<String>) -> Self {
        Self {
            task: TaskFilter::Name(task.into()),
            ..Self::default()
        }
    }

    /// Pass rate against the allowed time per problem.
    pub fn timeout_preset() -> Self {
        Self {
            sort_by: "request_timeout".to_string(),
            label_by: "request_timeout".to_string(),
            title: Some("Starsim Agent Benchmark".to_string()),
            x_label: Some("Allowed time to solve per problem (seconds)".to_string()),
            ..Self::for_task("starsim_agent_benchmark")
        }
    }

    /// Pass rate per model.
    pub fn model_preset() -> Self {
        Self {
            title: Some("Starsim LLM Benchmark".to_string()),
            x_label: Some("Model".to_string()),
            color: "#7bc8f6".to_string(),
            rotate_labels: true,
            ..Self::for_task("starsim_benchmark")
        }
    }

    pub fn presets() -> Vec<Self> {
        vec![Self::timeout_preset(), Self::model_preset()]
    }

    /// One copy of `template` per distinct task name in `records` that the
    /// template's own task filter accepts, in name order.
    pub fn per_task(template: &ChartSpec, records: &[EvalRecord]) -> Result<Vec<Self>> {
        let matcher = template.task.matcher()?;
        let names: BTreeSet<&str> = records
            .iter()
            .map(|r| r.task_name.as_str())
            .filter(|name| matcher.matches(name))
            .collect();
        Ok(names
            .into_iter()
            .map(|name| Self {
                task: TaskFilter::Name(name.to_string()),
                title: None,
                ..template.clone()
            })
            .collect())
    }

    pub fn validate(&self) -> Result<()> {
        self.task.matcher()?;
        let (lo, hi) = self.y_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(Error::Config(format!("chart y_range ({lo}, {hi}) is empty")));
        }
        Ok(())
    }

    pub fn title(&self) -> String {
        match (&self.title, &self.task) {
            (Some(title), _) => title.clone(),
            (None, TaskFilter::Name(name)) => name.clone(),
            (None, _) => "Evaluation results".to_string(),
        }
    }

    pub fn x_label(&self) -> &str {
        self.x_label.as_deref().unwrap_or(&self.label_by)
    }
}

/// One bar of a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    /// Mean score of the group; 0 when no record had a score
    pub value: f64,
    /// Records in the group
    pub count: usize,
    pub missing: bool,
}

#[derive(Debug, PartialEq)]
enum SortKey {
    Num(f64),
    Text(String),
    Missing,
}

impl SortKey {
    fn of(v: Option<Value>) -> Self {
        match v {
            None | Some(Value::Null) => SortKey::Missing,
            Some(Value::Number(n)) => n.as_f64().map(SortKey::Num).unwrap_or(SortKey::Missing),
            Some(other) => SortKey::Text(value_preview(&other)),
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        use SortKey::*;
        match (self, other) {
            (Num(a), Num(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Num(_), _) | (Text(_), Missing) => Ordering::Less,
            (Missing, Missing) => Ordering::Equal,
            _ => Ordering::Greater,
        }
    }
}

/// Records of the chart's task, stably sorted by its sort column.
pub fn select<'a>(spec: &ChartSpec, records: &'a [EvalRecord]) -> Result<Vec<&'a EvalRecord>> {
    let matcher = spec.task.matcher()?;
    let mut keyed: Vec<(SortKey, &EvalRecord)> = records
        .iter()
        .filter(|r| matcher.matches(&r.task_name))
        .map(|r| (SortKey::of(r.column(&spec.sort_by)), r))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, r)| r).collect())
}

/// Group sorted records by label, in order of first appearance, averaging
/// the scores of each group.
pub fn aggregate(spec: &ChartSpec, rows: &[&EvalRecord]) -> Vec<Bar> {
    let mut groups: Vec<(String, Vec<f64>, usize)> = Vec::new();
    for row in rows {
        let label = row
            .column(&spec.label_by)
            .map(|v| value_preview(&v))
            .unwrap_or_else(|| "(none)".to_string());
        let idx = match groups.iter().position(|(l, _, _)| *l == label) {
            Some(idx) => idx,
            None => {
                groups.push((label, Vec::new(), 0));
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.2 += 1;
        if let Some(score) = row.score {
            group.1.push(score);
        }
    }

    groups
        .into_iter()
        .map(|(label, scores, count)| {
            let missing = scores.is_empty();
            let value = if missing {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            Bar {
                label,
                value,
                count,
                missing,
            }
        })
        .collect()
}

pub fn build_bars(spec: &ChartSpec, records: &[EvalRecord]) -> Result<Vec<Bar>> {
    let rows = select(spec, records)?;
    Ok(aggregate(spec, &rows))
}

const PLOT_HEIGHT: f64 = 200.0;
const SLOT_WIDTH: f64 = 60.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const Y_TICKS: usize = 5;

/// Draw bars as a standalone SVG element.
pub fn render_bar_chart(spec: &ChartSpec, bars: &[Bar]) -> String {
    let margin_bottom = if spec.rotate_labels { 110.0 } else { 60.0 };
    let plot_width = (bars.len().max(1) as f64 * SLOT_WIDTH).max(260.0);
    let slot = plot_width / bars.len().max(1) as f64;
    let width = MARGIN_LEFT + plot_width + MARGIN_RIGHT;
    let height = MARGIN_TOP + PLOT_HEIGHT + margin_bottom;
    let base_y = MARGIN_TOP + PLOT_HEIGHT;
    let (lo, hi) = spec.y_range;

    let scale = |v: f64| -> f64 {
        let frac = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        frac * PLOT_HEIGHT
    };

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" font-family="sans-serif" font-size="11">"#,
        w = width,
        h = height
    );
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="22" text-anchor="middle" font-size="14" font-weight="600">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        html_escape(&spec.title())
    ));

    for i in 0..=Y_TICKS {
        let v = lo + (hi - lo) * i as f64 / Y_TICKS as f64;
        let y = base_y - scale(v);
        svg.push_str(&format!(
            r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e0e0e0"/><text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"##,
            MARGIN_LEFT,
            MARGIN_LEFT + plot_width,
            MARGIN_LEFT - 6.0,
            y + 4.0,
            format_tick(v),
            y = y
        ));
    }

    for (i, bar) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + slot * i as f64 + slot * 0.1;
        let h = scale(bar.value);
        let cx = x + slot * 0.4;
        let opacity = if bar.missing { "0.3" } else { "1" };
        svg.push_str(&format!(
            r#"<rect class="bar" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" fill-opacity="{}"><title>{}: {:.3} (n={})</title></rect>"#,
            x,
            base_y - h,
            slot * 0.8,
            h,
            html_escape(&spec.color),
            opacity,
            html_escape(&bar.label),
            bar.value,
            bar.count
        ));
        let label = if spec.rotate_labels {
            format!(
                r#"<text x="{cx:.1}" y="{:.1}" text-anchor="end" transform="rotate(-45 {cx:.1} {:.1})">{}</text>"#,
                base_y + 14.0,
                base_y + 14.0,
                html_escape(&bar.label),
                cx = cx
            )
        } else {
            format!(
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
                cx,
                base_y + 16.0,
                html_escape(&bar.label)
            )
        };
        svg.push_str(&label);
    }

    svg.push_str(&format!(
        r##"<line x1="{l:.1}" y1="{b:.1}" x2="{r:.1}" y2="{b:.1}" stroke="#333"/><line x1="{l:.1}" y1="{t:.1}" x2="{l:.1}" y2="{b:.1}" stroke="#333"/>"##,
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_width,
        t = MARGIN_TOP,
        b = base_y
    ));
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        height - 10.0,
        html_escape(spec.x_label())
    ));
    svg.push_str(&format!(
        r#"<text x="16" y="{y:.1}" text-anchor="middle" font-size="12" transform="rotate(-90 16 {y:.1})">{}</text>"#,
        html_escape(&spec.y_label),
        y = MARGIN_TOP + PLOT_HEIGHT / 2.0
    ));
    svg.push_str("</svg>");
    svg
}

fn format_tick(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// Wrap rendered charts in one HTML page.
pub fn generate_chart_page(charts: &[(ChartSpec, Vec<Bar>)]) -> String {
    let body: String = if charts.is_empty() {
        r#"<div class="notice">No evaluation results matched.</div>"#.to_string()
    } else {
        charts
            .iter()
            .map(|(spec, bars)| {
                let inner = if bars.is_empty() {
                    format!(
                        r#"<div class="notice">No results for {}.</div>"#,
                        html_escape(&spec.title())
                    )
                } else {
                    render_bar_chart(spec, bars)
                };
                format!(r#"<figure>{inner}</figure>"#)
            })
            .collect()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Evaluation Charts</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background: #f5f5f5; padding: 20px; }}
        figure {{ display: inline-block; background: white; margin: 10px; padding: 10px; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }}
        .notice {{ padding: 12px; color: #856404; background: #fff3cd; border-radius: 6px; }}
    </style>
</head>
<body>
    <h1>Evaluation Charts</h1>
    <div class="timestamp">Generated: {}</div>
    {}
</body>
</html>"#,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        body
    )
}
