use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};

use evalscope_types::{EvalRecord, TASK_ARG_PREFIX};

use crate::error::{Error, Result};

/// Anything that can hand over a table of evaluation results.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn load(&self) -> Result<Vec<EvalRecord>>;
}

pub struct VecResultSource {
    records: Vec<EvalRecord>,
}

impl VecResultSource {
    pub fn new(records: Vec<EvalRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ResultSource for VecResultSource {
    async fn load(&self) -> Result<Vec<EvalRecord>> {
        Ok(self.records.clone())
    }
}

/// Read JSONL where each line is one results row, e.g.
/// `{"task_name": "...", "model": "...", "score_headline_value": 0.8, "task_arg_request_timeout": 600}`
///
/// Unlike agent logs, results files are strict: a bad row is an error that
/// names its line.
pub struct JsonlResultSource {
    path: PathBuf,
}

impl JsonlResultSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSource for JsonlResultSource {
    async fn load(&self) -> Result<Vec<EvalRecord>> {
        let content = read_to_string(&self.path).await?;
        parse_results(&content)
    }
}

pub fn parse_results(content: &str) -> Result<Vec<EvalRecord>> {
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row_err = |message: String| Error::Results {
            line: idx + 1,
            message,
        };
        let value: Value =
            serde_json::from_str(line).map_err(|e| row_err(format!("invalid JSON: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| row_err("expected object".to_string()))?;
        records.push(record_from_row(obj).map_err(row_err)?);
    }
    Ok(records)
}

fn record_from_row(obj: &Map<String, Value>) -> std::result::Result<EvalRecord, String> {
    let task_name = obj
        .get("task_name")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'task_name'".to_string())?;
    let model = match obj.get("model") {
        None | Some(Value::Null) => "",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err("'model' must be a string".to_string()),
    };
    let score = match obj.get("score_headline_value").or_else(|| obj.get("score")) {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| "score must be a number".to_string())?,
        ),
    };

    let mut record = EvalRecord::new(task_name, model, score);
    if let Some(Value::Object(args)) = obj.get("task_args") {
        for (name, value) in args {
            record.task_args.insert(name.clone(), value.clone());
        }
    }
    for (column, value) in obj {
        if let Some(name) = column.strip_prefix(TASK_ARG_PREFIX) {
            record.task_args.insert(name.to_string(), value.clone());
        }
    }
    Ok(record)
}

/// Load several sources concurrently, concatenated in source order.
pub async fn load_all(sources: &[Arc<dyn ResultSource>]) -> Result<Vec<EvalRecord>> {
    let loaded = try_join_all(sources.iter().map(|s| s.load())).await?;
    Ok(loaded.into_iter().flatten().collect())
}

#[cfg(feature = "persistence")]
#[async_trait]
impl ResultSource for evalscope_store::Store {
    async fn load(&self) -> Result<Vec<EvalRecord>> {
        self.load_records()
            .map_err(|e| Error::Store(format!("{e:#}")))
    }
}

#[cfg(not(feature = "sync-fs"))]
async fn read_to_string(path: &PathBuf) -> Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

#[cfg(feature = "sync-fs")]
async fn read_to_string(path: &PathBuf) -> Result<String> {
    let path_clone = path.clone();
    tokio::task::spawn_blocking(move || std::fs::read_to_string(&path_clone))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_columns() {
        let records = parse_results(
            r#"{"task_name": "starsim_agent_benchmark", "model": "claude", "score_headline_value": 0.6, "task_arg_request_timeout": 600, "task_arg_background": true}

{"task_name": "starsim_benchmark", "score": null, "task_args": {"plugin_url": "http://x"}}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, Some(0.6));
        assert_eq!(records[0].task_args["request_timeout"], json!(600));
        assert_eq!(records[0].task_args["background"], json!(true));
        assert_eq!(records[1].model, "");
        assert_eq!(records[1].score, None);
        assert_eq!(records[1].column("plugin_url"), Some(json!("http://x")));
    }

    #[test]
    fn test_bad_rows_name_their_line() {
        let err = parse_results("{\"task_name\": \"a\"}\n{\"model\": \"m\"}\n").unwrap_err();
        assert!(matches!(err, Error::Results { line: 2, .. }));
        let err = parse_results("{\"task_name\": \"a\", \"score\": \"high\"}").unwrap_err();
        assert!(err.to_string().contains("score must be a number"));
        assert!(parse_results("[1]").is_err());
        assert!(parse_results("{oops").is_err());
    }

    #[tokio::test]
    async fn test_jsonl_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        tokio::fs::write(&path, "{\"task_name\": \"t\", \"model\": \"m\", \"score\": 1}\n")
            .await
            .unwrap();
        let records = JsonlResultSource::new(&path).load().await.unwrap();
        assert_eq!(records, vec![EvalRecord::new("t", "m", Some(1.0))]);

        let missing = JsonlResultSource::new(dir.path().join("nope.jsonl")).load().await;
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_load_all_keeps_source_order() {
        let a: Arc<dyn ResultSource> = Arc::new(VecResultSource::new(vec![EvalRecord::new("a", "m", None)]));
        let b: Arc<dyn ResultSource> = Arc::new(VecResultSource::new(vec![
            EvalRecord::new("b", "m", None),
            EvalRecord::new("c", "m", None),
        ]));
        let records = load_all(&[a, b]).await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.task_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
