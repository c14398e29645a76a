//! Storage abstractions for the two evidence stores.
//!
//! [`InvoiceStore`] is the structured side (invoice table with filters and
//! aggregates); [`ChunkStore`] persists embedded document chunks so the
//! in-memory indexes can be rebuilt at startup.
//!
//! Implementations must be `Send + Sync` to be shared across request tasks.
//! Backend failures are reported as [`AuditError::StoreUnavailable`]
//! (invoices) or [`AuditError::DocumentStore`] (chunks).
//!
//! [`AuditError::StoreUnavailable`]: crate::error::AuditError::StoreUnavailable
//! [`AuditError::DocumentStore`]: crate::error::AuditError::DocumentStore

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Category, Department, DocumentChunk, InvoiceRecord, InvoiceStatus};
use crate::money::Money;

/// Conjunctive filter over the invoice table. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    /// Case-insensitive exact vendor name.
    pub vendor: Option<String>,
    pub category: Option<Category>,
    pub department: Option<Department>,
    /// Maximum rows for [`InvoiceStore::query`]; ignored by aggregates.
    pub limit: Option<usize>,
}

impl InvoiceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn vendor(vendor: impl Into<String>) -> Self {
        Self {
            vendor: Some(vendor.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation, shared by backends that cannot push filters down.
    pub fn matches(&self, record: &InvoiceRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
            && self
                .vendor
                .as_deref()
                .is_none_or(|v| record.vendor.eq_ignore_ascii_case(v))
            && self.category.is_none_or(|c| record.category == c)
            && self.department.is_none_or(|d| record.department == d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Status,
    Vendor,
    Category,
    Department,
}

impl GroupBy {
    pub fn label(&self) -> &'static str {
        match self {
            GroupBy::Status => "status",
            GroupBy::Vendor => "vendor",
            GroupBy::Category => "category",
            GroupBy::Department => "department",
        }
    }

    pub fn plural_label(&self) -> &'static str {
        match self {
            GroupBy::Status => "statuses",
            GroupBy::Vendor => "vendors",
            GroupBy::Category => "categories",
            GroupBy::Department => "departments",
        }
    }

    pub fn key_of(&self, record: &InvoiceRecord) -> String {
        match self {
            GroupBy::Status => record.status.to_string(),
            GroupBy::Vendor => record.vendor.clone(),
            GroupBy::Category => record.category.to_string(),
            GroupBy::Department => record.department.to_string(),
        }
    }
}

/// Count and sum of `amount` over a set of invoices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub count: u64,
    pub total: Money,
}

/// One group of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub count: u64,
    pub total: Money,
}

/// Sort groups by total (desc), then key (asc), so output is deterministic.
pub fn sort_groups(groups: &mut [GroupTotal]) {
    groups.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
}

/// Read side of the structured evidence store, plus the ingestion insert.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`query`](InvoiceStore::query) | Filtered rows, newest issue date first |
/// | [`totals`](InvoiceStore::totals) | Count and sum for a filter |
/// | [`aggregate`](InvoiceStore::aggregate) | Count and sum grouped by a column |
/// | [`vendors`](InvoiceStore::vendors) | Distinct vendor names |
/// | [`insert`](InvoiceStore::insert) | Ingestion-side insert (skips existing IDs) |
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn query(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>>;

    async fn totals(&self, filter: &InvoiceFilter) -> Result<Totals>;

    /// Groups ordered by total descending, then key ascending.
    async fn aggregate(&self, group_by: GroupBy, filter: &InvoiceFilter) -> Result<Vec<GroupTotal>>;

    async fn vendors(&self) -> Result<Vec<String>>;

    /// Insert records, skipping IDs already present. Returns rows inserted.
    async fn insert(&self, records: &[InvoiceRecord]) -> Result<usize>;
}

/// Persistence for embedded chunks. Append-only.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<DocumentChunk>>;

    /// Persist a batch atomically: either every chunk is stored or none is.
    async fn append(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Delete chunks by ID. Unknown IDs are ignored.
    async fn remove(&self, ids: &[String]) -> Result<()>;
}
