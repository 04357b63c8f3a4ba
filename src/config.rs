//! TOML configuration parsing and validation.
//!
//! The configuration file names the SQLite database, the data root holding
//! benchmark outputs, where the generated task index is persisted, the HTTP
//! bind address, and the static task → benchmark list the indexer walks.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data: DataConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,
    #[serde(default)]
    pub evaluators: BTreeMap<String, EvaluatorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory holding `{benchmark}/...` output trees.
    pub root: PathBuf,
    /// Where the generated task index is written.
    pub task_config: PathBuf,
    #[serde(default = "default_true")]
    pub index_on_startup: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Empty means any origin, without credentials.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_cookie_name() -> String {
    "review_session".to_string()
}
fn default_session_ttl_hours() -> i64 {
    24
}

/// How a task's benchmark directories are nested on disk.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `{benchmark}/{model}/{language}.jsonl`
    #[default]
    Flat,
    /// `{benchmark}/{lang_type}/{model}/{language}.jsonl`
    LangType,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskSpec {
    pub benchmarks: Vec<String>,
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluatorConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_evaluator_timeout")]
    pub timeout_secs: u64,
}

fn default_evaluator_timeout() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

pub fn validate(config: &Config) -> Result<()> {
    if config.tasks.is_empty() {
        anyhow::bail!("at least one [tasks.<name>] entry is required");
    }

    for (task, spec) in &config.tasks {
        if task.trim().is_empty() {
            anyhow::bail!("task names must not be empty");
        }
        if spec.benchmarks.iter().any(|b| b.trim().is_empty()) {
            anyhow::bail!("tasks.{}.benchmarks contains an empty name", task);
        }
    }

    if config.auth.session_ttl_hours <= 0 {
        anyhow::bail!("auth.session_ttl_hours must be > 0");
    }
    if config.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
        anyhow::bail!(
            "auth.session_ttl_hours must be at most {} (one year)",
            MAX_SESSION_TTL_HOURS
        );
    }
    if config.auth.cookie_name.trim().is_empty() {
        anyhow::bail!("auth.cookie_name must not be empty");
    }

    for (name, ev) in &config.evaluators {
        if ev.command.trim().is_empty() {
            anyhow::bail!("evaluators.{}.command must not be empty", name);
        }
        if ev.timeout_secs == 0 {
            anyhow::bail!("evaluators.{}.timeout_secs must be > 0", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "/tmp/review.sqlite"

[data]
root = "/tmp/outputs"
task_config = "/tmp/tasks.json"

[server]
bind = "127.0.0.1:5000"
"#;

    #[test]
    fn test_defaults_applied() {
        let text = format!("{}\n[tasks.Classification]\nbenchmarks = [\"SIB-200\"]\n", BASE);
        let config: Config = toml::from_str(&text).unwrap();
        validate(&config).unwrap();

        assert!(config.data.index_on_startup);
        assert_eq!(config.auth.cookie_name, "review_session");
        assert_eq!(config.auth.session_ttl_hours, 24);
        assert_eq!(config.tasks["Classification"].layout, Layout::Flat);
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn test_lang_type_layout() {
        let text = format!(
            "{}\n[tasks.Translation]\nbenchmarks = [\"Flores\"]\nlayout = \"lang_type\"\n",
            BASE
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.tasks["Translation"].layout, Layout::LangType);
    }

    #[test]
    fn test_no_tasks_rejected() {
        let config: Config = toml::from_str(BASE).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("tasks"));
    }

    #[test]
    fn test_session_ttl_bounds() {
        let with_ttl = |ttl: i64| {
            let text = format!(
                "{}\n[auth]\nsession_ttl_hours = {}\n\n[tasks.Classification]\nbenchmarks = [\"SIB-200\"]\n",
                BASE, ttl
            );
            toml::from_str::<Config>(&text).unwrap()
        };

        assert!(validate(&with_ttl(MAX_SESSION_TTL_HOURS)).is_ok());
        assert!(validate(&with_ttl(0)).is_err());
        let err = validate(&with_ttl(i64::MAX / 1000)).unwrap_err();
        assert!(err.to_string().contains("session_ttl_hours"));
    }

    #[test]
    fn test_zero_evaluator_timeout_rejected() {
        let text = format!(
            "{}\n[tasks.Classification]\nbenchmarks = [\"SIB-200\"]\n\n[evaluators.demo]\ncommand = \"cat\"\ntimeout_secs = 0\n",
            BASE
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }
}
