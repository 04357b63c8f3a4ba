//! The task index and its store.
//!
//! [`TaskConfig`] maps task → benchmark → model → language → file path
//! (relative to the data root). Maps are `BTreeMap`s so the serialized form
//! is key-ordered and byte-stable across rebuilds.
//!
//! [`TaskConfigStore`] owns the current index for the running server. It is
//! loaded once, re-read on demand, and rebuilt wholesale by the indexer.
//! Rebuilds are serialized by a single-writer lock; readers keep seeing the
//! previous snapshot until the new one is swapped in.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::config::{Config, TaskSpec};
use crate::indexer;

/// language → relative file path
pub type LanguageMap = BTreeMap<String, String>;
/// model → languages
pub type ModelMap = BTreeMap<String, LanguageMap>;
/// benchmark → models
pub type BenchmarkMap = BTreeMap<String, ModelMap>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskConfig {
    pub tasks: BTreeMap<String, BenchmarkMap>,
}

impl TaskConfig {
    /// Number of indexed files across all tasks.
    pub fn file_count(&self) -> usize {
        self.tasks
            .values()
            .flat_map(|b| b.values())
            .flat_map(|m| m.values())
            .map(|l| l.len())
            .sum()
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Read a persisted index. A missing file is an empty index.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task index: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse task index: {}", path.display()))
    }

    /// Overwrite `path` with this index. Writes a sibling temp file first and
    /// renames it into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?)
            .with_context(|| format!("Failed to write task index: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace task index: {}", path.display()))?;
        Ok(())
    }
}

pub struct TaskConfigStore {
    path: PathBuf,
    data_root: PathBuf,
    tasks: BTreeMap<String, TaskSpec>,
    current: RwLock<Arc<TaskConfig>>,
    writer: Mutex<()>,
}

impl TaskConfigStore {
    /// Load whatever index is on disk (possibly none) without rebuilding.
    pub fn open(config: &Config) -> Result<Self> {
        let initial = TaskConfig::read(&config.data.task_config)?;
        Ok(Self {
            path: config.data.task_config.clone(),
            data_root: config.data.root.clone(),
            tasks: config.tasks.clone(),
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn current(&self) -> Arc<TaskConfig> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn swap(&self, next: TaskConfig) -> Arc<TaskConfig> {
        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut guard) => *guard = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        next
    }

    /// Re-read the persisted index from disk.
    pub async fn reload(&self) -> Result<Arc<TaskConfig>> {
        let _guard = self.writer.lock().await;
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || TaskConfig::read(&path)).await??;
        Ok(self.swap(loaded))
    }

    /// Walk the data root, persist the fresh index over the old one, and make
    /// it current.
    pub async fn rebuild(&self) -> Result<Arc<TaskConfig>> {
        let _guard = self.writer.lock().await;

        let root = self.data_root.clone();
        let tasks = self.tasks.clone();
        let path = self.path.clone();
        let built = tokio::task::spawn_blocking(move || -> Result<TaskConfig> {
            let built = indexer::build_task_config(&root, &tasks)?;
            built.write(&path)?;
            Ok(built)
        })
        .await??;

        tracing::info!(
            path = %self.path.display(),
            tasks = built.tasks.len(),
            files = built.file_count(),
            "task index rebuilt"
        );
        Ok(self.swap(built))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> TaskConfig {
        let mut langs = LanguageMap::new();
        langs.insert("en".to_string(), "SIB-200/gpt4/en.jsonl".to_string());
        let mut models = ModelMap::new();
        models.insert("gpt4".to_string(), langs);
        let mut benches = BenchmarkMap::new();
        benches.insert("SIB-200".to_string(), models);
        let mut tasks = BTreeMap::new();
        tasks.insert("Classification".to_string(), benches);
        TaskConfig { tasks }
    }

    #[test]
    fn test_serializes_as_plain_nested_objects() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(
            json["Classification"]["SIB-200"]["gpt4"]["en"],
            "SIB-200/gpt4/en.jsonl"
        );
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("tasks.json");
        sample().write(&path).unwrap();

        assert_eq!(TaskConfig::read(&path).unwrap(), sample());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = TaskConfig::read(&tmp.path().join("absent.json")).unwrap();
        assert!(loaded.tasks.is_empty());
        assert_eq!(loaded.file_count(), 0);
    }
}
