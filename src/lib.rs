//! # Bench Review
//!
//! A review and annotation backend for benchmark evaluation outputs.
//!
//! Model outputs live on disk as JSONL files under a data root. The indexer
//! maps them into a task → benchmark → model → language table, the resolver
//! turns a selector into a file, and the loader streams its records with
//! stable entry IDs. Reviewers then attach comments, votes and span
//! annotations, stored in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │ data root  │──▶│  Indexer    │──▶│ Resolver │──▶│  Loader  │
//! │ *.jsonl    │   │ tasks.json  │   │          │   │ entry_id │
//! └────────────┘   └─────────────┘   └──────────┘   └────┬─────┘
//!                                                        │
//!                        ┌───────────────────────────────┤
//!                        ▼                               ▼
//!                  ┌──────────┐                    ┌──────────┐
//!                  │  SQLite  │◀───── reviews ─────│   HTTP   │
//!                  │ comments │                    │  (axum)  │
//!                  └──────────┘                    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! review init                   # create database
//! review index                  # scan the data root, write tasks.json
//! review serve                  # start HTTP server
//! review export -o dump.json    # snapshot all reviews
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`task_config`] | Task index type and its persisted store |
//! | [`indexer`] | Directory walk that rebuilds the task index |
//! | [`resolver`] | Selector → file path lookup |
//! | [`jsonl`] | JSONL record loader with entry IDs |
//! | [`auth`] | Users, password digests, sessions |
//! | [`comments`] | Comment CRUD and votes |
//! | [`annotations`] | Span annotation storage |
//! | [`export`] | JSON snapshot of reviews |
//! | [`evaluator`] | Evaluator plugins over a subprocess boundary |
//! | [`server`] | HTTP server (Axum) with CORS |
//! | [`error`] | Error type and HTTP error bodies |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |

pub mod annotations;
pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod indexer;
pub mod jsonl;
pub mod migrate;
pub mod models;
pub mod resolver;
pub mod server;
pub mod task_config;

pub use error::ReviewError;
pub use resolver::Selector;
pub use task_config::{TaskConfig, TaskConfigStore};
