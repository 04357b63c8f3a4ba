//! Evaluator plugins.
//!
//! An evaluator takes a JSON document and returns a JSON document. Plugins
//! are never loaded into this process: [`SubprocessEvaluator`] runs the
//! configured command, writes the input to its stdin, and parses its stdout.
//! The process is killed if it outlives `timeout_secs`.
//!
//! ```toml
//! [evaluators.length]
//! command = "python3"
//! args = ["evaluators/length.py"]
//! timeout_secs = 30
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{Config, EvaluatorConfig};

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, input: Value) -> Result<Value>;
}

pub struct SubprocessEvaluator {
    name: String,
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessEvaluator {
    pub fn new(name: &str, config: &EvaluatorConfig) -> Self {
        Self {
            name: name.to_string(),
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl Evaluator for SubprocessEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, input: Value) -> Result<Value> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start evaluator '{}'", self.name))?;

        let payload = serde_json::to_vec(&input)?;
        let stdin = child.stdin.take();
        let write_input = async move {
            let Some(mut stdin) = stdin else {
                return Ok::<(), std::io::Error>(());
            };
            match stdin.write_all(&payload).await {
                // A plugin may exit without reading its input.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };

        // Output is drained while the input is written; the child is killed
        // if the deadline drops this future.
        let run = async move {
            let (written, output) = tokio::join!(write_input, child.wait_with_output());
            written.and(output)
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(output) => output?,
            Err(_) => bail!(
                "evaluator '{}' timed out after {}s",
                self.name,
                self.timeout.as_secs()
            ),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "evaluator '{}' exited with {}: {}",
                self.name,
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("evaluator '{}' did not print valid JSON", self.name))
    }
}

#[derive(Default)]
pub struct EvaluatorRegistry {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, ev) in &config.evaluators {
            registry.register(Box::new(SubprocessEvaluator::new(name, ev)));
        }
        registry
    }

    pub fn register(&mut self, evaluator: Box<dyn Evaluator>) {
        self.evaluators.push(evaluator);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Evaluator> {
        self.evaluators
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn subprocess(command: &str, args: &[&str], timeout_secs: u64) -> SubprocessEvaluator {
        SubprocessEvaluator::new(
            "test",
            &EvaluatorConfig {
                command: command.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                timeout_secs,
            },
        )
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let ev = subprocess("cat", &[], 5);
        let out = ev.evaluate(json!({"items": [1, 2, 3]})).await.unwrap();
        assert_eq!(out, json!({"items": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let ev = subprocess("sh", &["-c", "cat >/dev/null; echo boom >&2; exit 3"], 5);
        let err = ev.evaluate(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("boom"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_non_json_output_is_error() {
        let ev = subprocess("sh", &["-c", "cat >/dev/null; echo not-json"], 5);
        assert!(ev.evaluate(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout() {
        let ev = subprocess("sh", &["-c", "sleep 5"], 1);
        let err = ev.evaluate(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_with_unread_large_input() {
        let ev = subprocess("sleep", &["30"], 1);
        let big = "x".repeat(1024 * 1024 + 1);

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            ev.evaluate(json!({ "s": big })),
        )
        .await
        .expect("evaluator deadline did not fire");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_large_echo_does_not_deadlock() {
        let ev = subprocess("cat", &[], 10);
        let big = "y".repeat(512 * 1024);
        let out = ev.evaluate(json!({ "s": big.clone() })).await.unwrap();
        assert_eq!(out["s"].as_str().map(str::len), Some(big.len()));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = EvaluatorRegistry::new();
        registry.register(Box::new(subprocess("cat", &[], 5)));
        assert!(registry.find("test").is_some());
        assert!(registry.find("other").is_none());
        assert_eq!(registry.names(), vec!["test"]);
    }
}
