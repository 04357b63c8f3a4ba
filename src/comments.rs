//! Comment storage: create, list, edit, delete, vote.
//!
//! Edit and delete are owner-only. Votes are single `UPDATE ... + 1`
//! statements so concurrent votes on one comment never lose increments.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{ReviewError, Result};
use crate::models::{
    format_ts_iso, parse_row_data, Comment, CommentPatch, NewComment, VoteCounts, VoteType,
};

const SELECT_COLUMNS: &str = "SELECT id, username, entry_id, row_data, question, feedback, rating, \
     thumbs_up, thumbs_down, created_at, updated_at FROM comments";

fn row_to_comment(row: &SqliteRow) -> Comment {
    let row_data: String = row.get("row_data");
    let created_at: i64 = row.get("created_at");
    let updated_at: Option<i64> = row.get("updated_at");
    Comment {
        id: row.get("id"),
        username: row.get("username"),
        entry_id: row.get("entry_id"),
        row_data: parse_row_data(&row_data),
        question: row.get("question"),
        feedback: row.get("feedback"),
        rating: row.get("rating"),
        thumbs_up: row.get("thumbs_up"),
        thumbs_down: row.get("thumbs_down"),
        timestamp: format_ts_iso(created_at),
        updated_at: updated_at.map(format_ts_iso),
    }
}

fn check_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(ReviewError::BadRequest(format!(
            "rating must be between 1 and 5, got {}",
            rating
        )));
    }
    Ok(())
}

fn check_text(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReviewError::MissingParameter(name));
    }
    Ok(())
}

pub async fn create(pool: &SqlitePool, username: &str, new: &NewComment) -> Result<i64> {
    check_text(&new.entry_id, "entry_id")?;
    check_text(&new.question, "question")?;
    check_text(&new.feedback, "feedback")?;
    check_rating(new.rating)?;

    let result = sqlx::query(
        "INSERT INTO comments (username, entry_id, row_data, question, feedback, rating, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(&new.entry_id)
    .bind(new.row_data.to_string())
    .bind(&new.question)
    .bind(&new.feedback)
    .bind(new.rating)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Newest first, optionally restricted to one entry.
pub async fn list(pool: &SqlitePool, entry_id: Option<&str>) -> Result<Vec<Comment>> {
    let rows = match entry_id {
        Some(entry_id) => {
            sqlx::query(&format!(
                "{} WHERE entry_id = ? ORDER BY created_at DESC, id DESC",
                SELECT_COLUMNS
            ))
            .bind(entry_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS))
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.iter().map(row_to_comment).collect())
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Comment> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref()
        .map(row_to_comment)
        .ok_or_else(|| ReviewError::NotFound(format!("comment not found: {}", id)))
}

/// Tell a missing row apart from one owned by somebody else after a scoped
/// write touched nothing.
async fn ownership_failure(pool: &SqlitePool, id: i64, username: &str) -> ReviewError {
    match get(pool, id).await {
        Ok(comment) => {
            tracing::warn!(id, owner = %comment.username, username, "comment ownership mismatch");
            ReviewError::Forbidden("you can only modify your own comments".to_string())
        }
        Err(e) => e,
    }
}

pub async fn update(pool: &SqlitePool, id: i64, username: &str, patch: &CommentPatch) -> Result<Comment> {
    if let Some(ref q) = patch.question {
        check_text(q, "question")?;
    }
    if let Some(ref f) = patch.feedback {
        check_text(f, "feedback")?;
    }
    if let Some(r) = patch.rating {
        check_rating(r)?;
    }

    let result = sqlx::query(
        r#"
        UPDATE comments SET
            question = COALESCE(?, question),
            feedback = COALESCE(?, feedback),
            rating = COALESCE(?, rating),
            updated_at = ?
        WHERE id = ? AND username = ?
        "#,
    )
    .bind(&patch.question)
    .bind(&patch.feedback)
    .bind(patch.rating)
    .bind(chrono::Utc::now().timestamp())
    .bind(id)
    .bind(username)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ownership_failure(pool, id, username).await);
    }

    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: i64, username: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM comments WHERE id = ? AND username = ?")
        .bind(id)
        .bind(username)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ownership_failure(pool, id, username).await);
    }
    Ok(())
}

pub async fn vote(pool: &SqlitePool, id: i64, vote: VoteType) -> Result<VoteCounts> {
    let sql = match vote {
        VoteType::Up => {
            "UPDATE comments SET thumbs_up = thumbs_up + 1 WHERE id = ? \
             RETURNING thumbs_up, thumbs_down"
        }
        VoteType::Down => {
            "UPDATE comments SET thumbs_down = thumbs_down + 1 WHERE id = ? \
             RETURNING thumbs_up, thumbs_down"
        }
    };

    let row = sqlx::query(sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReviewError::NotFound(format!("comment not found: {}", id)))?;

    Ok(VoteCounts {
        comment_id: id,
        thumbs_up: row.get("thumbs_up"),
        thumbs_down: row.get("thumbs_down"),
    })
}
