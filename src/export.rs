//! Snapshot export of every annotation and comment as JSON.
//!
//! Served by `GET /api/export` as a download and by `review export` on the
//! command line. User credentials are never included.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;

use crate::annotations;
use crate::comments;
use crate::config::Config;
use crate::db;
use crate::error::ReviewError;
use crate::migrate;
use crate::models::{Annotation, Comment};

#[derive(Debug, Serialize)]
pub struct ExportData {
    pub exported_at: String,
    pub annotations: Vec<Annotation>,
    pub comments: Vec<Comment>,
}

pub async fn snapshot(pool: &SqlitePool) -> Result<ExportData, ReviewError> {
    let annotations = annotations::list(pool, None).await?;
    let mut comments = comments::list(pool, None).await?;
    comments.sort_by_key(|c| c.id);

    Ok(ExportData {
        exported_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        annotations,
        comments,
    })
}

/// Export annotations and comments as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let data = snapshot(&pool).await?;
    pool.close().await;

    let ann_count = data.annotations.len();
    let comment_count = data.comments.len();
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} annotations, {} comments to {}",
                ann_count,
                comment_count,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
