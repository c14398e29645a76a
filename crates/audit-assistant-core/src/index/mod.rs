//! Search indexes over the unstructured evidence store.
//!
//! - [`VectorIndex`]: nearest-neighbour search over chunk embeddings, with a
//!   dimensionality fixed for the lifetime of the index.
//! - [`KeywordIndex`]: term-frequency ranking over chunk text, rebuilt from
//!   the full corpus at ingestion time.

pub mod bm25;
pub mod vector;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::DocumentChunk;

pub use bm25::Bm25Index;
pub use vector::MemoryVectorIndex;

/// A chunk ID with the raw score a search pass assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub chunk_id: String,
    pub score: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The established dimensionality, or `None` while empty and unpinned.
    async fn dims(&self) -> Option<usize>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a batch. Every vector is checked before anything is inserted,
    /// so a mismatched batch leaves the index untouched.
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Top-`k` chunk IDs by similarity, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>>;
}

pub trait KeywordIndex: Send + Sync {
    /// Replace the index contents with `chunks`. O(corpus size).
    fn rebuild(&mut self, chunks: &[DocumentChunk]);

    /// Top-`k` chunk IDs with a positive score for the tokenized query.
    fn search(&self, tokens: &[String], k: usize) -> Vec<ScoredId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
