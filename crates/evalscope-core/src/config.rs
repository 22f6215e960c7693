use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chart::ChartSpec;
use crate::error::{Error, Result};

/// Settings read from `evalscope.yaml`. Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Charts drawn by `evalscope chart` when no chart flags are given
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            output: default_output(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
            charts: Vec::new(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("agent_logs")
}

fn default_output() -> PathBuf {
    PathBuf::from("agent_logs.html")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        // serde_yaml reads an empty document as unit, not as an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Load `path` when given, else use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.watch.interval_secs == 0 {
            return Err(Error::Config("watch.interval_secs must be at least 1".to_string()));
        }
        for chart in &self.charts {
            chart.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::TaskFilter;

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.logs_dir, PathBuf::from("agent_logs"));
        assert_eq!(config.output, PathBuf::from("agent_logs.html"));
        assert_eq!(config.watch.interval_secs, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.charts.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_yaml(
            r#"
logs_dir: /var/agent_logs
logging:
  level: debug
charts:
  - task: { name: starsim_benchmark }
    sort_by: model
    label_by: model
    title: Starsim LLM Benchmark
    rotate_labels: true
"#,
        )
        .unwrap();
        assert_eq!(config.logs_dir, PathBuf::from("/var/agent_logs"));
        assert_eq!(config.watch.interval_secs, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.charts.len(), 1);
        assert_eq!(config.charts[0].task, TaskFilter::Name("starsim_benchmark".to_string()));
        assert!(config.charts[0].rotate_labels);
        assert_eq!(config.charts[0].y_range, (0.0, 1.0));
    }

    #[test]
    fn test_chart_task_forms() {
        let config = Config::from_yaml(
            "charts:\n  - task: { pattern: \"^starsim_\" }\n  - task: any\n  - label_by: request_timeout\n",
        )
        .unwrap();
        assert_eq!(config.charts[0].task, TaskFilter::Pattern("^starsim_".to_string()));
        assert_eq!(config.charts[1].task, TaskFilter::Any);
        assert_eq!(config.charts[2].task, TaskFilter::Any);
        assert_eq!(config.charts[2].label_by, "request_timeout");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_yaml("watch:\n  interval_secs: 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::from_yaml("logs_dir: [1, 2"), Err(Error::Yaml(_))));
        assert!(matches!(
            Config::from_yaml("charts:\n  - task: { pattern: \"(\" }\n"),
            Err(Error::Regex(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(Config::load_or_default(None).is_ok());
    }
}
