use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `invoices` and `chunks` tables and their indexes.
/// Idempotent; there is no versioned migration history.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            invoice_id TEXT PRIMARY KEY,
            vendor TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            issue_date TEXT NOT NULL,
            due_date TEXT,
            status TEXT NOT NULL,
            payment_terms TEXT NOT NULL,
            po_number TEXT,
            category TEXT NOT NULL,
            department TEXT NOT NULL,
            subtotal_cents INTEGER NOT NULL,
            tax_rate REAL NOT NULL DEFAULT 0,
            tax_cents INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at INTEGER NOT NULL,
            CHECK (amount_cents = subtotal_cents + tax_cents)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            source TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_invoices_vendor ON invoices(vendor COLLATE NOCASE)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_invoices_issue_date ON invoices(issue_date DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_seq ON chunks(seq)")
        .execute(pool)
        .await?;

    Ok(())
}
