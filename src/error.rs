//! Error type shared by the retrieval pipeline, the review store and the
//! HTTP layer.
//!
//! Every variant maps to one HTTP status and a machine-readable code. The
//! JSON body has the shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "model 'x' not found for benchmark 'y'" } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::resolver::ResolveError;

pub type Result<T> = std::result::Result<T, ReviewError>;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Unresolved(#[from] ResolveError),

    #[error("data file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("evaluator error: {0}")]
    Evaluator(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReviewError::MissingParameter(_)
            | ReviewError::Unresolved(_)
            | ReviewError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ReviewError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ReviewError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReviewError::FileNotFound(_) | ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::Io(_)
            | ReviewError::Database(_)
            | ReviewError::Evaluator(_)
            | ReviewError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::MissingParameter(_) => "missing_parameter",
            ReviewError::Unresolved(_) | ReviewError::BadRequest(_) => "bad_request",
            ReviewError::Unauthorized(_) => "unauthorized",
            ReviewError::Forbidden(_) => "forbidden",
            ReviewError::FileNotFound(_) | ReviewError::NotFound(_) => "not_found",
            ReviewError::Io(_) => "io_error",
            ReviewError::Database(_) => "database_error",
            ReviewError::Evaluator(_) => "evaluator_error",
            ReviewError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for ReviewError {
    fn from(err: anyhow::Error) -> Self {
        ReviewError::Internal(format!("{:#}", err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
