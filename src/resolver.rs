//! Path resolution for data selectors.
//!
//! Looks a `(task, benchmark, model, language)` selector up in the current
//! [`TaskConfig`] level by level and fails at the first missing key. The
//! index stores an explicit relative path per language; the resolver never
//! synthesizes one.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::ReviewError;
use crate::task_config::TaskConfig;

/// The four keys that identify one reviewable output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub task: String,
    pub benchmark: String,
    pub model: String,
    pub language: String,
}

/// Request body of `POST /api/data`. Every field is optional so that a
/// missing one can be reported by name.
#[derive(Debug, Default, Deserialize)]
pub struct SelectorRequest {
    pub task: Option<String>,
    pub benchmark: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

impl SelectorRequest {
    pub fn into_selector(self) -> Result<Selector, ReviewError> {
        fn required(value: Option<String>, name: &'static str) -> Result<String, ReviewError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(ReviewError::MissingParameter(name)),
            }
        }

        Ok(Selector {
            task: required(self.task, "task")?,
            benchmark: required(self.benchmark, "benchmark")?,
            model: required(self.model, "model")?,
            language: required(self.language, "language")?,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("task '{task}' not found")]
    UnknownTask { task: String },

    #[error("benchmark '{benchmark}' not found for task '{task}'")]
    UnknownBenchmark { task: String, benchmark: String },

    #[error("model '{model}' not found for benchmark '{benchmark}'")]
    UnknownModel { benchmark: String, model: String },

    #[error("language '{language}' not found for model '{model}'")]
    UnknownLanguage { model: String, language: String },
}

/// Resolve a selector to its path relative to the data root.
pub fn resolve<'a>(config: &'a TaskConfig, sel: &Selector) -> Result<&'a str, ResolveError> {
    let benchmarks = config
        .tasks
        .get(&sel.task)
        .ok_or_else(|| ResolveError::UnknownTask {
            task: sel.task.clone(),
        })?;

    let models = benchmarks
        .get(&sel.benchmark)
        .ok_or_else(|| ResolveError::UnknownBenchmark {
            task: sel.task.clone(),
            benchmark: sel.benchmark.clone(),
        })?;

    let languages = models
        .get(&sel.model)
        .ok_or_else(|| ResolveError::UnknownModel {
            benchmark: sel.benchmark.clone(),
            model: sel.model.clone(),
        })?;

    languages
        .get(&sel.language)
        .map(String::as_str)
        .ok_or_else(|| ResolveError::UnknownLanguage {
            model: sel.model.clone(),
            language: sel.language.clone(),
        })
}

/// Resolve a selector and check that the file exists under `data_root`.
pub fn locate(config: &TaskConfig, data_root: &Path, sel: &Selector) -> Result<PathBuf, ReviewError> {
    let relative = resolve(config, sel)?;
    let path = data_root.join(relative);
    if !path.is_file() {
        return Err(ReviewError::FileNotFound(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_config::{BenchmarkMap, LanguageMap, ModelMap};
    use tempfile::TempDir;

    fn config() -> TaskConfig {
        let mut langs = LanguageMap::new();
        langs.insert("en".to_string(), "SIB-200/gpt4/en.jsonl".to_string());
        let mut models = ModelMap::new();
        models.insert("gpt4".to_string(), langs);
        let mut benches = BenchmarkMap::new();
        benches.insert("SIB-200".to_string(), models);
        let mut cfg = TaskConfig::default();
        cfg.tasks.insert("Classification".to_string(), benches);
        cfg
    }

    fn sel(task: &str, benchmark: &str, model: &str, language: &str) -> Selector {
        Selector {
            task: task.to_string(),
            benchmark: benchmark.to_string(),
            model: model.to_string(),
            language: language.to_string(),
        }
    }

    #[test]
    fn test_resolves_explicit_path() {
        let cfg = config();
        let path = resolve(&cfg, &sel("Classification", "SIB-200", "gpt4", "en")).unwrap();
        assert_eq!(path, "SIB-200/gpt4/en.jsonl");
    }

    #[test]
    fn test_each_level_reports_its_own_key() {
        let cfg = config();

        let err = resolve(&cfg, &sel("Generation", "SIB-200", "gpt4", "en")).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownTask { .. }));
        assert!(err.to_string().starts_with("task 'Generation'"));

        let err = resolve(&cfg, &sel("Classification", "Flores", "gpt4", "en")).unwrap_err();
        assert!(err.to_string().starts_with("benchmark 'Flores'"));

        let err = resolve(&cfg, &sel("Classification", "SIB-200", "gpt5", "en")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "model 'gpt5' not found for benchmark 'SIB-200'"
        );

        let err = resolve(&cfg, &sel("Classification", "SIB-200", "gpt4", "de")).unwrap_err();
        assert!(err.to_string().starts_with("language 'de'"));
    }

    #[test]
    fn test_locate_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = locate(&config(), tmp.path(), &sel("Classification", "SIB-200", "gpt4", "en"))
            .unwrap_err();
        assert!(matches!(err, ReviewError::FileNotFound(_)));
    }

    #[test]
    fn test_missing_parameter_named() {
        let req = SelectorRequest {
            task: Some("Classification".to_string()),
            benchmark: Some("SIB-200".to_string()),
            model: Some("  ".to_string()),
            language: None,
        };
        match req.into_selector() {
            Err(ReviewError::MissingParameter(name)) => assert_eq!(name, "model"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
