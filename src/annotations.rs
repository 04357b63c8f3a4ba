//! Span annotation storage.
//!
//! A submission either carries one span (`error_type` + `span`) or a batch
//! (`annotations: [...]`). Batches are written in one transaction.

use serde::Deserialize;
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{ReviewError, Result};
use crate::models::{format_ts_iso, parse_row_data, Annotation, NewAnnotation};

/// Body of `POST /api/annotation`.
#[derive(Debug, Default, Deserialize)]
pub struct AnnotationRequest {
    pub entry_id: Option<String>,
    #[serde(default)]
    pub row_data: Value,
    #[serde(alias = "errorType")]
    pub error_type: Option<String>,
    pub span: Option<[i64; 2]>,
    pub annotations: Option<Vec<SpanInput>>,
}

/// One item of a batch. The span may come as `start`/`end` or as `span`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanInput {
    #[serde(alias = "errorType")]
    pub error_type: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub span: Option<[i64; 2]>,
}

/// A validated submission.
#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Single(NewAnnotation),
    Batch(Vec<NewAnnotation>),
}

fn new_annotation(error_type: &str, start: i64, end: i64) -> Result<NewAnnotation> {
    if error_type.trim().is_empty() {
        return Err(ReviewError::MissingParameter("error_type"));
    }
    if start < 0 || end < start {
        return Err(ReviewError::BadRequest(format!(
            "invalid span [{}, {}]: expected 0 <= start <= end",
            start, end
        )));
    }
    Ok(NewAnnotation {
        error_type: error_type.to_string(),
        span_start: start,
        span_end: end,
    })
}

impl AnnotationRequest {
    pub fn entry_id(&self) -> Result<&str> {
        match self.entry_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(ReviewError::MissingParameter("entry_id")),
        }
    }

    pub fn submission(&self) -> Result<Submission> {
        if let Some(ref items) = self.annotations {
            if items.is_empty() {
                return Err(ReviewError::BadRequest("no annotations to submit".to_string()));
            }
            let batch = items
                .iter()
                .map(|item| {
                    let [start, end] = match (item.span, item.start, item.end) {
                        (Some(span), _, _) => span,
                        (None, Some(s), Some(e)) => [s, e],
                        _ => return Err(ReviewError::MissingParameter("span")),
                    };
                    new_annotation(&item.error_type, start, end)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Submission::Batch(batch));
        }

        let error_type = self
            .error_type
            .as_deref()
            .ok_or(ReviewError::MissingParameter("error_type"))?;
        let [start, end] = self.span.ok_or(ReviewError::MissingParameter("span"))?;
        Ok(Submission::Single(new_annotation(error_type, start, end)?))
    }
}

fn row_to_annotation(row: &SqliteRow) -> Annotation {
    let row_data: String = row.get("row_data");
    let created_at: i64 = row.get("created_at");
    Annotation {
        id: row.get("id"),
        username: row.get("username"),
        entry_id: row.get("entry_id"),
        row_data: parse_row_data(&row_data),
        error_type: row.get("error_type"),
        span_start: row.get("span_start"),
        span_end: row.get("span_end"),
        timestamp: format_ts_iso(created_at),
    }
}

const INSERT_SQL: &str = "INSERT INTO annotations \
     (username, entry_id, row_data, error_type, span_start, span_end, created_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?)";

pub async fn insert_one(
    pool: &SqlitePool,
    username: &str,
    entry_id: &str,
    row_data: &Value,
    ann: &NewAnnotation,
) -> Result<i64> {
    let result = sqlx::query(INSERT_SQL)
        .bind(username)
        .bind(entry_id)
        .bind(row_data.to_string())
        .bind(&ann.error_type)
        .bind(ann.span_start)
        .bind(ann.span_end)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Insert every span or none of them.
pub async fn insert_batch(
    pool: &SqlitePool,
    username: &str,
    entry_id: &str,
    row_data: &Value,
    batch: &[NewAnnotation],
) -> Result<usize> {
    let now = chrono::Utc::now().timestamp();
    let row_json = row_data.to_string();
    let mut tx = pool.begin().await?;

    for ann in batch {
        sqlx::query(INSERT_SQL)
            .bind(username)
            .bind(entry_id)
            .bind(&row_json)
            .bind(&ann.error_type)
            .bind(ann.span_start)
            .bind(ann.span_end)
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(batch.len())
}

pub async fn list(pool: &SqlitePool, entry_id: Option<&str>) -> Result<Vec<Annotation>> {
    let base = "SELECT id, username, entry_id, row_data, error_type, span_start, span_end, created_at \
                FROM annotations";
    let rows = match entry_id {
        Some(entry_id) => {
            sqlx::query(&format!("{} WHERE entry_id = ? ORDER BY span_start, id", base))
                .bind(entry_id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query(&format!("{} ORDER BY id", base))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.iter().map(row_to_annotation).collect())
}

pub async fn delete(pool: &SqlitePool, id: i64, username: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM annotations WHERE id = ? AND username = ?")
        .bind(id)
        .bind(username)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        Err(ReviewError::Forbidden(
            "you can only delete your own annotations".to_string(),
        ))
    } else {
        Err(ReviewError::NotFound(format!("annotation not found: {}", id)))
    }
}
