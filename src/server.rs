//! Review HTTP server.
//!
//! Serves the task index and record retrieval to the review UI and accepts
//! comments, annotations and votes from logged-in users.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | | Health check (returns version) |
//! | `POST` | `/api/signup` | | Create an account and log in |
//! | `POST` | `/api/login` | | Log in; sets the session cookie |
//! | `POST` | `/api/logout` | | Drop the session |
//! | `GET`  | `/api/me` | ✓ | Current username |
//! | `GET`  | `/api/tasks` | | Current task index (`?refresh=true` re-reads it from disk) |
//! | `POST` | `/api/tasks/reindex` | ✓ | Rebuild the task index from disk |
//! | `POST` | `/api/data` | | Records for one task/benchmark/model/language |
//! | `POST` | `/api/annotation` | ✓ | Store one span or a batch |
//! | `GET`  | `/api/annotations` | | List annotations (`?entry_id=`) |
//! | `DELETE` | `/api/annotations/{id}` | owner | Delete an annotation |
//! | `GET`  | `/api/comments` | | List comments (`?entry_id=`) |
//! | `POST` | `/api/comments` | ✓ | Create a comment |
//! | `GET`  | `/api/comments/{id}` | | One comment |
//! | `PUT`  | `/api/comments/{id}` | owner | Edit a comment |
//! | `DELETE` | `/api/comments/{id}` | owner | Delete a comment |
//! | `POST` | `/api/comments/thumbs` | ✓ | Up/down vote |
//! | `GET`  | `/api/export` | | Download all annotations and comments |
//! | `GET`  | `/api/evaluators` | | Configured evaluator names |
//! | `POST` | `/api/evaluators/{name}` | ✓ | Run an evaluator on a JSON body |
//!
//! Errors use the body shape documented in [`crate::error`].

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::annotations::{self, AnnotationRequest, Submission};
use crate::auth::{self, CurrentUser};
use crate::comments;
use crate::config::Config;
use crate::db;
use crate::error::{ReviewError, Result};
use crate::evaluator::EvaluatorRegistry;
use crate::export;
use crate::jsonl;
use crate::migrate;
use crate::models::{CommentPatch, NewComment, VoteType};
use crate::resolver::{self, SelectorRequest};
use crate::task_config::{TaskConfig, TaskConfigStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub tasks: Arc<TaskConfigStore>,
    pub evaluators: Arc<EvaluatorRegistry>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, tasks: TaskConfigStore) -> Self {
        let evaluators = EvaluatorRegistry::from_config(&config);
        Self {
            config: Arc::new(config),
            pool,
            tasks: Arc::new(tasks),
            evaluators: Arc::new(evaluators),
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.server.allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/signup", post(handle_signup))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/me", get(handle_me))
        .route("/tasks", get(handle_tasks))
        .route("/tasks/reindex", post(handle_reindex))
        .route("/data", post(handle_data))
        .route("/annotation", post(handle_create_annotation))
        .route("/annotations", get(handle_list_annotations))
        .route("/annotations/{id}", delete(handle_delete_annotation))
        .route(
            "/comments",
            get(handle_list_comments).post(handle_create_comment),
        )
        .route("/comments/thumbs", post(handle_vote))
        .route(
            "/comments/{id}",
            get(handle_get_comment)
                .put(handle_update_comment)
                .delete(handle_delete_comment),
        )
        .route("/export", get(handle_export))
        .route("/evaluators", get(handle_list_evaluators))
        .route("/evaluators/{name}", post(handle_run_evaluator));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the review server: migrates the database, optionally rebuilds the
/// task index, then serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let tasks = TaskConfigStore::open(config)?;
    if config.data.index_on_startup {
        tasks.rebuild().await?;
    } else {
        tracing::info!(path = %tasks.path().display(), "using persisted task index");
    }

    let state = AppState::new(config.clone(), pool, tasks);
    let app = build_router(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("review server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Map a JSON body rejection to our error shape instead of axum's plain text.
fn json_body<T>(body: JsonBody<T>) -> Result<T> {
    body.map(|Json(v)| v)
        .map_err(|e| ReviewError::BadRequest(e.body_text()))
}

type PathParam<T> = std::result::Result<Path<T>, PathRejection>;

fn path_param<T>(param: PathParam<T>) -> Result<T> {
    param
        .map(|Path(v)| v)
        .map_err(|e| ReviewError::BadRequest(e.body_text()))
}

type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;

fn query_params<T>(params: QueryParams<T>) -> Result<T> {
    params
        .map(|Query(v)| v)
        .map_err(|e| ReviewError::BadRequest(e.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Auth ============

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn with_cookie(status: StatusCode, cookie: String, body: Value) -> Result<Response> {
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| ReviewError::Internal(e.to_string()))?;
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn handle_signup(
    State(state): State<AppState>,
    body: JsonBody<Credentials>,
) -> Result<Response> {
    let creds = json_body(body)?;
    let user_id = auth::create_user(&state.pool, &creds.username, &creds.password).await?;

    let ttl = state.config.auth.session_ttl_hours;
    let token = auth::create_session(&state.pool, user_id, ttl).await?;
    with_cookie(
        StatusCode::CREATED,
        auth::session_cookie(&state.config.auth.cookie_name, &token, ttl),
        json!({ "username": creds.username.trim(), "message": "User created successfully" }),
    )
}

async fn handle_login(
    State(state): State<AppState>,
    body: JsonBody<Credentials>,
) -> Result<Response> {
    let creds = json_body(body)?;
    let user = auth::authenticate(&state.pool, &creds.username, &creds.password).await?;

    let ttl = state.config.auth.session_ttl_hours;
    let token = auth::create_session(&state.pool, user.user_id, ttl).await?;
    tracing::info!(username = %user.username, "login");
    with_cookie(
        StatusCode::OK,
        auth::session_cookie(&state.config.auth.cookie_name, &token, ttl),
        json!({ "username": user.username, "token": token, "message": "Login successful" }),
    )
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = auth::session_token(&headers, cookie_name) {
        auth::delete_session(&state.pool, &token).await?;
    }
    with_cookie(
        StatusCode::OK,
        auth::clear_cookie(cookie_name),
        json!({ "message": "Logged out" }),
    )
}

async fn handle_me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "username": user.username }))
}

// ============ Tasks and data ============

#[derive(Deserialize)]
struct TasksQuery {
    #[serde(default)]
    refresh: bool,
}

async fn handle_tasks(
    State(state): State<AppState>,
    query: QueryParams<TasksQuery>,
) -> Result<Json<TaskConfig>> {
    let query = query_params(query)?;
    let current = if query.refresh {
        state.tasks.reload().await?
    } else {
        state.tasks.current()
    };
    Ok(Json(current.as_ref().clone()))
}

async fn handle_reindex(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<TaskConfig>> {
    tracing::info!(username = %user.username, "task index rebuild requested");
    let rebuilt = state.tasks.rebuild().await?;
    Ok(Json(rebuilt.as_ref().clone()))
}

async fn handle_data(
    State(state): State<AppState>,
    body: JsonBody<SelectorRequest>,
) -> Result<Json<Vec<jsonl::Record>>> {
    let selector = json_body(body)?.into_selector()?;
    let config = state.tasks.current();
    let path = resolver::locate(&config, state.tasks.data_root(), &selector)?;

    let records = tokio::task::spawn_blocking(move || match jsonl::load_records(&path, &selector) {
        Ok(records) => Ok(records),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReviewError::FileNotFound(path)),
        Err(e) => Err(ReviewError::Io(e)),
    })
    .await
    .map_err(|e| ReviewError::Internal(e.to_string()))??;

    Ok(Json(records))
}

// ============ Annotations ============

#[derive(Deserialize)]
struct EntryFilter {
    entry_id: Option<String>,
}

async fn handle_create_annotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: JsonBody<AnnotationRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let req = json_body(body)?;
    let entry_id = req.entry_id()?;

    match req.submission()? {
        Submission::Single(ann) => {
            let id =
                annotations::insert_one(&state.pool, &user.username, entry_id, &req.row_data, &ann)
                    .await?;
            Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
        }
        Submission::Batch(batch) => {
            let saved = annotations::insert_batch(
                &state.pool,
                &user.username,
                entry_id,
                &req.row_data,
                &batch,
            )
            .await?;
            Ok((StatusCode::CREATED, Json(json!({ "saved": saved }))))
        }
    }
}

async fn handle_list_annotations(
    State(state): State<AppState>,
    filter: QueryParams<EntryFilter>,
) -> Result<Json<Vec<crate::models::Annotation>>> {
    let filter = query_params(filter)?;
    let items = annotations::list(&state.pool, filter.entry_id.as_deref()).await?;
    Ok(Json(items))
}

async fn handle_delete_annotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: PathParam<i64>,
) -> Result<Json<Value>> {
    let id = path_param(id)?;
    annotations::delete(&state.pool, id, &user.username).await?;
    Ok(Json(json!({ "deleted": id })))
}

// ============ Comments ============

async fn handle_list_comments(
    State(state): State<AppState>,
    filter: QueryParams<EntryFilter>,
) -> Result<Json<Vec<crate::models::Comment>>> {
    let filter = query_params(filter)?;
    let items = comments::list(&state.pool, filter.entry_id.as_deref()).await?;
    Ok(Json(items))
}

async fn handle_create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: JsonBody<NewComment>,
) -> Result<(StatusCode, Json<Value>)> {
    let new = json_body(body)?;
    let id = comments::create(&state.pool, &user.username, &new).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Comment saved successfully" })),
    ))
}

async fn handle_get_comment(
    State(state): State<AppState>,
    id: PathParam<i64>,
) -> Result<Json<crate::models::Comment>> {
    let id = path_param(id)?;
    Ok(Json(comments::get(&state.pool, id).await?))
}

async fn handle_update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: PathParam<i64>,
    body: JsonBody<CommentPatch>,
) -> Result<Json<crate::models::Comment>> {
    let id = path_param(id)?;
    let patch = json_body(body)?;
    let updated = comments::update(&state.pool, id, &user.username, &patch).await?;
    Ok(Json(updated))
}

async fn handle_delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: PathParam<i64>,
) -> Result<Json<Value>> {
    let id = path_param(id)?;
    comments::delete(&state.pool, id, &user.username).await?;
    Ok(Json(json!({ "deleted": id })))
}

#[derive(Deserialize)]
struct VoteRequest {
    comment_id: Option<i64>,
    vote_type: Option<String>,
}

async fn handle_vote(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    body: JsonBody<VoteRequest>,
) -> Result<Json<crate::models::VoteCounts>> {
    let req = json_body(body)?;
    let id = req
        .comment_id
        .ok_or(ReviewError::MissingParameter("comment_id"))?;
    let raw = req
        .vote_type
        .ok_or(ReviewError::MissingParameter("vote_type"))?;
    let vote = VoteType::parse(&raw).ok_or_else(|| {
        ReviewError::BadRequest(format!(
            "invalid vote_type '{}': expected 'up' or 'down'",
            raw
        ))
    })?;

    Ok(Json(comments::vote(&state.pool, id, vote).await?))
}

// ============ Export ============

async fn handle_export(State(state): State<AppState>) -> Result<Response> {
    let data = export::snapshot(&state.pool).await?;
    let body = serde_json::to_vec_pretty(&data).map_err(|e| ReviewError::Internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"review_export.json\"",
            ),
        ],
        body,
    )
        .into_response())
}

// ============ Evaluators ============

async fn handle_list_evaluators(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "evaluators": state.evaluators.names() }))
}

async fn handle_run_evaluator(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    name: PathParam<String>,
    body: JsonBody<Value>,
) -> Result<Json<Value>> {
    let name = path_param(name)?;
    let input = json_body(body)?;
    let evaluator = state
        .evaluators
        .find(&name)
        .ok_or_else(|| ReviewError::NotFound(format!("no evaluator named '{}'", name)))?;

    tracing::info!(evaluator = %name, username = %user.username, "running evaluator");
    let result = evaluator
        .evaluate(input)
        .await
        .map_err(|e| ReviewError::Evaluator(format!("{:#}", e)))?;

    Ok(Json(json!({ "result": result })))
}
