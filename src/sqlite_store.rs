//! SQLite implementations of the core store traits.
//!
//! | Store | Table | Notes |
//! |-------|-------|-------|
//! | [`SqliteInvoiceStore`] | `invoices` | Filters and aggregates pushed down to SQL; amounts as integer cents |
//! | [`SqliteChunkStore`] | `chunks` | Embeddings as little-endian f32 BLOBs, loaded in insertion order |
//!
//! Dates are stored as ISO `YYYY-MM-DD` text so `ORDER BY issue_date`
//! is chronological; timestamps are Unix seconds.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use audit_assistant_core::embedding::{blob_to_vec, vec_to_blob};
use audit_assistant_core::error::{AuditError, Result};
use audit_assistant_core::models::{ChunkMetadata, DocumentChunk, InvoiceRecord};
use audit_assistant_core::money::Money;
use audit_assistant_core::store::{
    sort_groups, ChunkStore, GroupBy, GroupTotal, InvoiceFilter, InvoiceStore, Totals,
};

fn unavailable(e: sqlx::Error) -> AuditError {
    AuditError::store_unavailable(e.to_string())
}

fn chunk_store_error(e: sqlx::Error) -> AuditError {
    AuditError::DocumentStore {
        message: e.to_string(),
    }
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

// ============ Invoices ============

pub struct SqliteInvoiceStore {
    pool: SqlitePool,
}

impl SqliteInvoiceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn group_column(group_by: GroupBy) -> &'static str {
    match group_by {
        GroupBy::Status => "status",
        GroupBy::Vendor => "vendor",
        GroupBy::Category => "category",
        GroupBy::Department => "department",
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &InvoiceFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(vendor) = &filter.vendor {
        qb.push(" AND vendor = ")
            .push_bind(vendor.clone())
            .push(" COLLATE NOCASE");
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(department) = filter.department {
        qb.push(" AND department = ").push_bind(department.as_str());
    }
}

fn parse_date(value: &str, column: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        AuditError::invalid_record(format!("bad {} '{}': {}", column, value, e))
    })
}

fn row_to_record(row: &SqliteRow) -> Result<InvoiceRecord> {
    let get_str = |col: &str| -> Result<String> { row.try_get(col).map_err(unavailable) };
    let get_opt = |col: &str| -> Result<Option<String>> { row.try_get(col).map_err(unavailable) };
    let get_i64 = |col: &str| -> Result<i64> { row.try_get(col).map_err(unavailable) };

    let due_date = match get_opt("due_date")? {
        Some(d) => Some(parse_date(&d, "due_date")?),
        None => None,
    };

    Ok(InvoiceRecord {
        invoice_id: get_str("invoice_id")?,
        vendor: get_str("vendor")?,
        amount: Money::from_cents(get_i64("amount_cents")?),
        issue_date: parse_date(&get_str("issue_date")?, "issue_date")?,
        due_date,
        status: get_str("status")?.parse()?,
        payment_terms: get_str("payment_terms")?.parse()?,
        po_number: get_opt("po_number")?,
        category: get_str("category")?.parse()?,
        department: get_str("department")?.parse()?,
        subtotal: Money::from_cents(get_i64("subtotal_cents")?),
        tax_rate: row.try_get("tax_rate").map_err(unavailable)?,
        tax_amount: Money::from_cents(get_i64("tax_cents")?),
        notes: get_opt("notes")?,
        created_at: timestamp_to_utc(get_i64("created_at")?),
    })
}

#[async_trait]
impl InvoiceStore for SqliteInvoiceStore {
    async fn query(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM invoices");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY issue_date DESC, invoice_id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(unavailable)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn totals(&self, filter: &InvoiceFilter) -> Result<Totals> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS n, COALESCE(SUM(amount_cents), 0) AS total FROM invoices",
        );
        push_filter(&mut qb, filter);

        let row = qb.build().fetch_one(&self.pool).await.map_err(unavailable)?;
        let count: i64 = row.try_get("n").map_err(unavailable)?;
        let total: i64 = row.try_get("total").map_err(unavailable)?;
        Ok(Totals {
            count: count.max(0) as u64,
            total: Money::from_cents(total),
        })
    }

    async fn aggregate(&self, group_by: GroupBy, filter: &InvoiceFilter) -> Result<Vec<GroupTotal>> {
        let column = group_column(group_by);
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} AS key, COUNT(*) AS n, COALESCE(SUM(amount_cents), 0) AS total FROM invoices",
            column
        ));
        push_filter(&mut qb, filter);
        qb.push(format!(" GROUP BY {}", column));

        let rows = qb.build().fetch_all(&self.pool).await.map_err(unavailable)?;
        let mut groups = rows
            .iter()
            .map(|row| {
                let n: i64 = row.try_get("n").map_err(unavailable)?;
                Ok(GroupTotal {
                    key: row.try_get("key").map_err(unavailable)?,
                    count: n.max(0) as u64,
                    total: Money::from_cents(row.try_get("total").map_err(unavailable)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        sort_groups(&mut groups);
        Ok(groups)
    }

    async fn vendors(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT vendor FROM invoices ORDER BY vendor")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)
    }

    async fn insert(&self, records: &[InvoiceRecord]) -> Result<usize> {
        for r in records {
            r.validate()?;
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let mut inserted = 0usize;
        for r in records {
            let result = sqlx::query(
                r#"
                INSERT INTO invoices (invoice_id, vendor, amount_cents, issue_date, due_date, status,
                    payment_terms, po_number, category, department, subtotal_cents, tax_rate,
                    tax_cents, notes, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(invoice_id) DO NOTHING
                "#,
            )
            .bind(&r.invoice_id)
            .bind(&r.vendor)
            .bind(r.amount.cents())
            .bind(r.issue_date.format("%Y-%m-%d").to_string())
            .bind(r.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .bind(r.status.as_str())
            .bind(r.payment_terms.to_string())
            .bind(&r.po_number)
            .bind(r.category.as_str())
            .bind(r.department.as_str())
            .bind(r.subtotal.cents())
            .bind(r.tax_rate)
            .bind(r.tax_amount.cents())
            .bind(&r.notes)
            .bind(r.created_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(inserted)
    }
}

// ============ Chunks ============

pub struct SqliteChunkStore {
    pool: SqlitePool,
    model: String,
}

impl SqliteChunkStore {
    /// `model` is recorded next to every vector written by this store.
    pub fn new(pool: SqlitePool, model: impl Into<String>) -> Self {
        Self {
            pool,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn load_all(&self) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, doc_type, source, created_at, embedding \
             FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(chunk_store_error)?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = row.try_get("embedding").map_err(chunk_store_error)?;
                let doc_type: String = row.try_get("doc_type").map_err(chunk_store_error)?;
                let created_at: i64 = row.try_get("created_at").map_err(chunk_store_error)?;
                Ok(DocumentChunk {
                    id: row.try_get("id").map_err(chunk_store_error)?,
                    document_id: row.try_get("document_id").map_err(chunk_store_error)?,
                    chunk_index: row.try_get("chunk_index").map_err(chunk_store_error)?,
                    text: row.try_get("text").map_err(chunk_store_error)?,
                    embedding: blob_to_vec(&blob),
                    metadata: ChunkMetadata {
                        doc_type: doc_type.parse()?,
                        source: row.try_get("source").map_err(chunk_store_error)?,
                        created_at: timestamp_to_utc(created_at),
                    },
                })
            })
            .collect()
    }

    async fn append(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(chunk_store_error)?;
        let next_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), -1) + 1 FROM chunks")
            .fetch_one(&mut *tx)
            .await
            .map_err(chunk_store_error)?;

        for (offset, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, doc_type, source,
                    created_at, model, dims, embedding, seq)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.metadata.doc_type.as_str())
            .bind(&chunk.metadata.source)
            .bind(chunk.metadata.created_at.timestamp())
            .bind(&self.model)
            .bind(chunk.embedding.len() as i64)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(next_seq + offset as i64)
            .execute(&mut *tx)
            .await
            .map_err(chunk_store_error)?;
        }

        tx.commit().await.map_err(chunk_store_error)?;
        Ok(())
    }

    async fn remove(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(chunk_store_error)?;
        for id in ids {
            sqlx::query("DELETE FROM chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(chunk_store_error)?;
        }
        tx.commit().await.map_err(chunk_store_error)?;
        Ok(())
    }
}
