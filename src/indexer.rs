//! Directory indexer.
//!
//! Walks the data root for every configured task and benchmark and produces
//! a fresh [`TaskConfig`]:
//!
//! ```text
//! flat:      {root}/{benchmark}/{model}/{language}.jsonl
//! lang_type: {root}/{benchmark}/{lang_type}/{model}/{language}.jsonl
//! ```
//!
//! For `lang_type` tasks the language key is `{lang_type}_{stem}`. A
//! benchmark directory that does not exist yields an empty model map.
//! Traversal is sorted by file name, so two runs over the same tree produce
//! identical output. Symlinked model directories and files are followed;
//! a link that loops back to an ancestor is logged and skipped.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::config::{Layout, TaskSpec};
use crate::task_config::{ModelMap, TaskConfig};

pub fn build_task_config(root: &Path, tasks: &BTreeMap<String, TaskSpec>) -> Result<TaskConfig> {
    let mut config = TaskConfig::default();

    for (task, spec) in tasks {
        let benchmarks = config.tasks.entry(task.clone()).or_default();
        for benchmark in &spec.benchmarks {
            let models = scan_benchmark(root, benchmark, spec.layout)?;
            benchmarks.insert(benchmark.clone(), models);
        }
    }

    Ok(config)
}

fn scan_benchmark(root: &Path, benchmark: &str, layout: Layout) -> Result<ModelMap> {
    let mut models = ModelMap::new();

    let bench_dir = root.join(benchmark);
    if !bench_dir.is_dir() {
        tracing::debug!(dir = %bench_dir.display(), "benchmark directory missing");
        return Ok(models);
    }

    let depth = match layout {
        Layout::Flat => 2,
        Layout::LangType => 3,
    };

    let walker = WalkDir::new(&bench_dir)
        .follow_links(true)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                tracing::warn!(error = %e, "skipping symlink loop");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }

        let relative = path.strip_prefix(&bench_dir).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };

        let (model, language) = match (layout, parts.as_slice()) {
            (Layout::Flat, [model, _file]) => (model.clone(), stem),
            (Layout::LangType, [lang_type, model, _file]) => {
                (model.clone(), format!("{}_{}", lang_type, stem))
            }
            _ => continue,
        };

        // Always `/`-separated.
        let rel_path = std::iter::once(benchmark.to_string())
            .chain(parts)
            .collect::<Vec<_>>()
            .join("/");

        models.entry(model).or_default().insert(language, rel_path);
    }

    Ok(models)
}
