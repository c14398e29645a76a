//! # Audit Assistant CLI (`auditor`)
//!
//! ## Usage
//!
//! ```bash
//! auditor --config ./config/auditor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `auditor init` | Create the SQLite database and schema |
//! | `auditor seed [csv]` | Load invoice rows from a CSV file |
//! | `auditor ingest [path]` | Index `.md`/`.txt` documents (file or directory) |
//! | `auditor route "<query>"` | Show the routing decision for a query |
//! | `auditor ask "<query>"` | Answer a question from the terminal |
//! | `auditor serve` | Start the HTTP API |
//!
//! Logs go to stderr. The level comes from `[logging] level` and can be
//! overridden with `RUST_LOG`.

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use audit_assistant::app::{bootstrap, open};
use audit_assistant::config::{load_config, Config};
use audit_assistant::ingest::{ingest_path, seed_invoices};
use audit_assistant::server::run_server;
use audit_assistant_core::engine::QueryRequest;
use audit_assistant_core::router::QueryRouter;

/// Accounting audit assistant: answers questions over invoice records and
/// audit reports.
#[derive(Parser)]
#[command(name = "auditor", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/auditor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Idempotent.
    Init,

    /// Load invoices from a CSV file. Rows with an existing invoice_id are skipped.
    Seed {
        /// CSV path. Defaults to `[ingest] invoices_csv`.
        csv: Option<PathBuf>,
    },

    /// Index Markdown and text documents.
    Ingest {
        /// File or directory. Defaults to `[ingest] data_dir`.
        path: Option<PathBuf>,
    },

    /// Classify a query without answering it.
    Route { query: String },

    /// Answer a question.
    Ask {
        query: String,

        /// Conversation thread identifier. Logged only.
        #[arg(long)]
        thread: Option<String>,
    },

    /// Start the HTTP server on `[server] bind`.
    Serve,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config);

    match cli.command {
        Commands::Init => {
            open(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Seed { csv } => {
            let Some(path) = csv.or_else(|| config.ingest.invoices_csv.clone()) else {
                bail!("No CSV given and [ingest] invoices_csv is not set");
            };
            let services = open(&config).await?;
            let inserted = seed_invoices(services.invoices.as_ref(), &path).await?;
            println!("seeded invoices: {} inserted", inserted);
        }
        Commands::Ingest { path } => {
            let path = path.unwrap_or_else(|| config.ingest.data_dir.clone());
            let services = open(&config).await?;
            let stats = ingest_path(&services.retriever, &path, config.ingest.max_tokens).await?;
            println!(
                "ingested files: {}, chunks added: {}",
                stats.files, stats.chunks_added
            );
        }
        Commands::Route { query } => {
            let router = QueryRouter::new(
                &config.router.structured_keywords,
                &config.router.unstructured_keywords,
            );
            let decision = router.classify(&query);
            println!(
                "route: {} (structured: {}, unstructured: {})",
                decision.route, decision.structured_score, decision.unstructured_score
            );
        }
        Commands::Ask { query, thread } => {
            if query.trim().is_empty() {
                bail!("query must not be empty");
            }
            let services = bootstrap(&config).await?;
            let mut request = QueryRequest::new(query);
            if let Some(thread) = thread {
                request = request.with_session(thread);
            }
            let response = services.assistant.ask(request).await?;
            println!("{}", response.answer);
            println!();
            println!(
                "[route: {} | mode: {} | sources: {}]",
                response.decision.route,
                response.mode.as_str(),
                if response.sources.is_empty() {
                    "none".to_string()
                } else {
                    response.sources.join(", ")
                }
            );
        }
        Commands::Serve => {
            let services = bootstrap(&config).await?;
            run_server(&services).await?;
        }
    }

    Ok(())
}
