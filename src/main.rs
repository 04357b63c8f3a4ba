//! # Bench Review CLI (`review`)
//!
//! ## Usage
//!
//! ```bash
//! review --config ./config/review.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `review init` | Create the SQLite database and run schema migrations |
//! | `review index` | Rebuild the task index from the data root |
//! | `review tasks` | Print the persisted task index |
//! | `review export` | Write all annotations and comments as JSON |
//! | `review serve` | Start the HTTP server |

use bench_review::{config, export, migrate, server, TaskConfig, TaskConfigStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Review backend for benchmark evaluation outputs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "review",
    about = "Bench Review — serve benchmark outputs for review and store annotations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/review.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the users, sessions, comments
    /// and annotations tables. Running it again is harmless.
    Init,

    /// Rebuild the task index.
    ///
    /// Walks the data root for every configured task and benchmark and
    /// overwrites the persisted index.
    Index,

    /// Print the persisted task index.
    Tasks,

    /// Export all annotations and comments as JSON.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. Rebuilds the task index first unless
    /// `data.index_on_startup = false`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index => {
            let store = TaskConfigStore::open(&cfg)?;
            let index = store.rebuild().await?;
            println!(
                "Indexed {} files across {} tasks into {}",
                index.file_count(),
                index.tasks.len(),
                store.path().display()
            );
        }
        Commands::Tasks => {
            let index = TaskConfig::read(&cfg.data.task_config)?;
            print!("{}", index.to_json()?);
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
