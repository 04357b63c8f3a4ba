//! Review data types stored in SQLite and returned over HTTP.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A span-level error annotation on one record.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub id: i64,
    pub username: String,
    pub entry_id: String,
    pub row_data: Value,
    pub error_type: String,
    pub span_start: i64,
    pub span_end: i64,
    pub timestamp: String, // ISO8601
}

/// Free-text feedback on one record, with vote counters.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub username: String,
    pub entry_id: String,
    pub row_data: Value,
    pub question: String,
    pub feedback: String,
    pub rating: i64,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
    pub timestamp: String, // ISO8601
    pub updated_at: Option<String>,
}

/// Fields accepted when creating a comment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub entry_id: String,
    #[serde(default)]
    pub row_data: Value,
    pub question: String,
    pub feedback: String,
    pub rating: i64,
}

/// Fields accepted when editing a comment. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentPatch {
    pub question: Option<String>,
    pub feedback: Option<String>,
    pub rating: Option<i64>,
}

/// One span to store for an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub error_type: String,
    pub span_start: i64,
    pub span_end: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(VoteType::Up),
            "down" => Some(VoteType::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteCounts {
    pub comment_id: i64,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Row snapshots are stored as JSON text; anything unreadable comes back as `{}`.
pub(crate) fn parse_row_data(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or(serde_json::json!({}))
}
