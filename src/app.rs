//! Service wiring shared by the CLI and the HTTP server.
//!
//! [`open`] connects to the database, creates the schema, builds the stores,
//! indexes and answer strategy, and loads persisted chunks into memory.
//! [`bootstrap`] additionally seeds empty stores from the configured CSV and
//! data directory, the way the server starts up.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use audit_assistant_core::engine::AuditAssistant;
use audit_assistant_core::index::MemoryVectorIndex;
use audit_assistant_core::planner::StructuredPlanner;
use audit_assistant_core::router::QueryRouter;
use audit_assistant_core::search::HybridRetriever;
use audit_assistant_core::store::{InvoiceFilter, InvoiceStore};

use crate::completion::create_generator;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::ingest::{ingest_path, seed_invoices};
use crate::migrate::run_migrations;
use crate::sqlite_store::{SqliteChunkStore, SqliteInvoiceStore};

pub struct Services {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub invoices: Arc<SqliteInvoiceStore>,
    pub retriever: Arc<HybridRetriever>,
    pub assistant: Arc<AuditAssistant>,
}

pub async fn open(config: &Config) -> Result<Services> {
    let pool = db::connect(config).await?;
    run_migrations(&pool).await?;

    let embedder = create_embedder(&config.embedding)?;
    let invoices = Arc::new(SqliteInvoiceStore::new(pool.clone()));
    let chunks = Arc::new(SqliteChunkStore::new(pool.clone(), embedder.model_name()));
    let vectors = Arc::new(MemoryVectorIndex::with_dims(embedder.dims()));

    let retriever = Arc::new(HybridRetriever::new(embedder, vectors, chunks));
    let loaded = retriever.load().await.with_context(|| {
        format!(
            "Failed to load stored chunks from {}; delete the database and re-ingest after changing the embedding model",
            config.db.path.display()
        )
    })?;
    info!(chunks = loaded, "document index ready");

    let router = QueryRouter::new(
        &config.router.structured_keywords,
        &config.router.unstructured_keywords,
    );
    let planner = StructuredPlanner::new(invoices.clone())
        .with_limits(config.planner.list_limit, config.planner.sample_size);
    let generator = create_generator(&config.llm)?;

    let assistant = Arc::new(
        AuditAssistant::new(router, planner, retriever.clone(), generator)
            .with_top_k(config.retrieval.top_k),
    );

    Ok(Services {
        config: Arc::new(config.clone()),
        pool,
        invoices,
        retriever,
        assistant,
    })
}

/// [`open`], then fill empty stores from `ingest.invoices_csv` and
/// `ingest.data_dir`. Missing seed sources are skipped with a warning.
pub async fn bootstrap(config: &Config) -> Result<Services> {
    let services = open(config).await?;

    let invoice_count = services.invoices.totals(&InvoiceFilter::all()).await?.count;
    if invoice_count == 0 {
        match &config.ingest.invoices_csv {
            Some(path) if path.exists() => {
                seed_invoices(services.invoices.as_ref(), path).await?;
            }
            Some(path) => warn!(path = %path.display(), "invoice CSV not found; table stays empty"),
            None => {}
        }
    }

    if services.retriever.is_empty().await {
        let data_dir = &config.ingest.data_dir;
        if data_dir.is_dir() {
            let stats = ingest_path(&services.retriever, data_dir, config.ingest.max_tokens).await?;
            info!(files = stats.files, chunks = stats.chunks_added, "indexed data directory");
        } else {
            warn!(path = %data_dir.display(), "data directory not found; no documents indexed");
        }
    }

    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_assistant_core::engine::QueryRequest;
    use audit_assistant_core::models::Route;

    fn config_for(dir: &std::path::Path) -> Config {
        let data_dir = dir.join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("audit_report_2024_Q4.md"),
            "# Q4 2024 Audit Report\n\nRevenue growth reached 12% with no material compliance findings.",
        )
        .unwrap();
        let csv = dir.join("invoices.csv");
        std::fs::write(
            &csv,
            "invoice_id,vendor,amount,date,status\n\
             INV-1,Cloud Services Inc,1200.00,2024-10-01,Pending\n\
             INV-2,Legal Associates,800.00,2024-10-03,Paid\n",
        )
        .unwrap();

        let toml_src = format!(
            "[db]\npath = \"{}\"\n[ingest]\ndata_dir = \"{}\"\ninvoices_csv = \"{}\"\n[llm]\napi_key_env = \"AUDITOR_TEST_UNSET_KEY\"\n",
            dir.join("auditor.sqlite").display(),
            data_dir.display(),
            csv.display()
        );
        toml::from_str(&toml_src).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_and_answers() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let services = bootstrap(&config).await.unwrap();

        assert_eq!(
            services.invoices.totals(&InvoiceFilter::all()).await.unwrap().count,
            2
        );
        assert!(!services.retriever.is_empty().await);

        let response = services
            .assistant
            .ask(QueryRequest::new("How many pending invoices?"))
            .await
            .unwrap();
        assert_eq!(response.decision.route, Route::Structured);
        assert!(response.answer.contains("Pending invoices: 1"));
    }

    #[tokio::test]
    async fn test_reopen_loads_persisted_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let first = bootstrap(&config).await.unwrap();
        let indexed = first.retriever.len().await;
        first.pool.close().await;

        let second = open(&config).await.unwrap();
        assert_eq!(second.retriever.len().await, indexed);
    }
}
