//! In-memory store implementations for tests and embedding.
//!
//! Both stores keep their rows in a `Vec` behind a `tokio::sync::RwLock`.
//! Filters and aggregates are evaluated by scanning.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{DocumentChunk, InvoiceRecord};
use crate::money::Money;

use super::{sort_groups, ChunkStore, GroupBy, GroupTotal, InvoiceFilter, InvoiceStore, Totals};

/// Invoice table held in memory.
#[derive(Default)]
pub struct MemoryInvoiceStore {
    records: RwLock<Vec<InvoiceRecord>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<InvoiceRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn query(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>> {
        let records = self.records.read().await;
        let mut rows: Vec<InvoiceRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        });
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn totals(&self, filter: &InvoiceFilter) -> Result<Totals> {
        let records = self.records.read().await;
        let matching = records.iter().filter(|r| filter.matches(r));
        let mut totals = Totals::default();
        for r in matching {
            totals.count += 1;
            totals.total += r.amount;
        }
        Ok(totals)
    }

    async fn aggregate(&self, group_by: GroupBy, filter: &InvoiceFilter) -> Result<Vec<GroupTotal>> {
        let records = self.records.read().await;
        let mut groups: BTreeMap<String, (u64, Money)> = BTreeMap::new();
        for r in records.iter().filter(|r| filter.matches(r)) {
            let entry = groups.entry(group_by.key_of(r)).or_insert((0, Money::ZERO));
            entry.0 += 1;
            entry.1 += r.amount;
        }
        let mut out: Vec<GroupTotal> = groups
            .into_iter()
            .map(|(key, (count, total))| GroupTotal { key, count, total })
            .collect();
        sort_groups(&mut out);
        Ok(out)
    }

    async fn vendors(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut names: Vec<String> = records
            .iter()
            .map(|r| r.vendor.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn insert(&self, new_records: &[InvoiceRecord]) -> Result<usize> {
        for r in new_records {
            r.validate()?;
        }
        let mut records = self.records.write().await;
        let mut seen: HashSet<String> = records.iter().map(|r| r.invoice_id.clone()).collect();
        let mut inserted = 0;
        for r in new_records {
            if seen.insert(r.invoice_id.clone()) {
                records.push(r.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Chunk persistence held in memory (nothing survives the process).
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn load_all(&self) -> Result<Vec<DocumentChunk>> {
        Ok(self.chunks.read().await.clone())
    }

    async fn append(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.chunks.write().await.extend_from_slice(chunks);
        Ok(())
    }

    async fn remove(&self, ids: &[String]) -> Result<()> {
        self.chunks.write().await.retain(|c| !ids.contains(&c.id));
        Ok(())
    }
}
