//! Ingestion: invoice CSV seeding and document loading.
//!
//! Invoice CSV columns:
//!
//! | Column | Required | Notes |
//! |--------|----------|-------|
//! | `invoice_id`, `vendor` | yes | non-empty |
//! | `amount` | yes | `1234.50`, `$1,234.50` |
//! | `date` | yes | issue date, `YYYY-MM-DD` |
//! | `status` | yes | Pending, Approved, Rejected, Paid, Overdue, On Hold, Cancelled |
//! | `due_date`, `payment_terms`, `po_number`, `notes` | no | |
//! | `category`, `department` | no | unknown labels fall back to Other / Unassigned |
//! | `subtotal`, `tax_rate`, `tax_amount` | no | subtotal defaults to amount − tax |
//!
//! Documents are `.md` / `.txt` files, split into paragraph chunks. A
//! file whose name mentions "invoice" is indexed as invoice-derived text,
//! anything else as a report.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use audit_assistant_core::chunk::chunk_document;
use audit_assistant_core::models::{
    Category, ChunkMetadata, DocType, Department, InvoiceRecord, InvoiceStatus, PaymentTerms,
};
use audit_assistant_core::money::Money;
use audit_assistant_core::search::HybridRetriever;
use audit_assistant_core::store::InvoiceStore;

#[derive(Debug, Deserialize)]
struct CsvRow {
    invoice_id: String,
    vendor: String,
    amount: String,
    date: String,
    status: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    payment_terms: Option<String>,
    #[serde(default)]
    po_number: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    subtotal: Option<String>,
    #[serde(default)]
    tax_rate: Option<String>,
    #[serde(default)]
    tax_amount: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}' (expected YYYY-MM-DD)", value))
}

impl CsvRow {
    fn into_record(self) -> Result<InvoiceRecord> {
        let amount: Money = self.amount.parse()?;
        let subtotal = non_blank(self.subtotal).map(|s| s.parse::<Money>()).transpose()?;
        let tax_field = non_blank(self.tax_amount)
            .map(|s| s.parse::<Money>())
            .transpose()?;

        let tax_amount = match (tax_field, subtotal) {
            (Some(tax), _) => tax,
            (None, Some(sub)) => amount - sub,
            (None, None) => Money::ZERO,
        };
        let subtotal = subtotal.unwrap_or(amount - tax_amount);

        let tax_rate = match non_blank(self.tax_rate) {
            Some(rate) => rate
                .trim_end_matches('%')
                .parse::<f64>()
                .with_context(|| format!("invalid tax_rate '{}'", rate))
                .map(|r| if r > 1.0 { r / 100.0 } else { r })?,
            None if subtotal.cents() != 0 => tax_amount.cents() as f64 / subtotal.cents() as f64,
            None => 0.0,
        };

        let category = match non_blank(self.category) {
            Some(c) => c.parse().unwrap_or_else(|_| {
                warn!(invoice_id = %self.invoice_id, category = %c, "unknown category; using Other");
                Category::Other
            }),
            None => Category::Other,
        };
        let department = match non_blank(self.department) {
            Some(d) => d.parse().unwrap_or_else(|_| {
                warn!(invoice_id = %self.invoice_id, department = %d, "unknown department; using Unassigned");
                Department::Unassigned
            }),
            None => Department::Unassigned,
        };

        let record = InvoiceRecord {
            invoice_id: self.invoice_id.trim().to_string(),
            vendor: self.vendor.trim().to_string(),
            amount,
            issue_date: parse_date(&self.date)?,
            due_date: non_blank(self.due_date).map(|d| parse_date(&d)).transpose()?,
            status: self.status.parse::<InvoiceStatus>()?,
            payment_terms: non_blank(self.payment_terms)
                .map(|t| t.parse::<PaymentTerms>())
                .transpose()?
                .unwrap_or(PaymentTerms::Net30),
            po_number: non_blank(self.po_number),
            category,
            department,
            subtotal,
            tax_rate,
            tax_amount,
            notes: non_blank(self.notes),
            created_at: Utc::now(),
        };
        record.validate()?;
        Ok(record)
    }
}

/// Parse invoice rows from CSV. Any invalid row fails the whole parse.
pub fn parse_invoices_csv<R: Read>(reader: R) -> Result<Vec<InvoiceRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (i, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.with_context(|| format!("CSV line {}", line))?;
        let record = row
            .into_record()
            .with_context(|| format!("CSV line {}", line))?;
        records.push(record);
    }

    Ok(records)
}

/// Load a CSV file into the invoice store. Returns rows inserted; rows
/// whose `invoice_id` already exists are skipped.
pub async fn seed_invoices(store: &dyn InvoiceStore, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open invoice CSV: {}", path.display()))?;
    let records = parse_invoices_csv(file)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let inserted = store.insert(&records).await?;
    info!(
        path = %path.display(),
        rows = records.len(),
        inserted,
        "seeded invoices"
    );
    Ok(inserted)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub chunks_added: usize,
}

fn is_document(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref ext) if ext == "md" || ext == "txt"
    )
}

/// Stable document ID derived from the source name and content. Re-ingesting
/// an unchanged file yields the same chunk IDs and therefore adds nothing.
pub fn document_id(source: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// Chunk, embed and index one document. Returns the number of chunks added.
pub async fn ingest_document(
    retriever: &HybridRetriever,
    source: &str,
    content: &str,
    max_tokens: usize,
) -> Result<usize> {
    let metadata = ChunkMetadata {
        doc_type: DocType::infer(source),
        source: source.to_string(),
        created_at: Utc::now(),
    };
    let chunks = chunk_document(&document_id(source, content), content, max_tokens, &metadata);
    if chunks.is_empty() {
        warn!(source, "document is empty; nothing to index");
        return Ok(0);
    }
    let added = retriever.ingest(chunks).await?;
    info!(source, doc_type = metadata.doc_type.as_str(), added, "ingested document");
    Ok(added)
}

/// Ingest a single `.md`/`.txt` file, or every such file under a directory.
pub async fn ingest_path(
    retriever: &HybridRetriever,
    path: &Path,
    max_tokens: usize,
) -> Result<IngestStats> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }

    let mut files: Vec<std::path::PathBuf> = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_document(e.path()))
            .map(|e| e.into_path())
            .collect()
    };
    files.sort();

    let mut stats = IngestStats::default();
    for file in files {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let source = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        stats.chunks_added += ingest_document(retriever, &source, &content, max_tokens).await?;
        stats.files += 1;
    }

    Ok(stats)
}
