//! Brute-force in-memory [`VectorIndex`].
//!
//! Vectors live in a `Vec` behind a `tokio::sync::RwLock`; search scores
//! every entry with cosine similarity. The dimensionality is pinned either
//! at construction ([`MemoryVectorIndex::with_dims`]) or by the first
//! non-empty batch, and never changes afterwards.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::{check_dims, cosine_similarity};
use crate::error::{AuditError, Result};
use crate::models::DocumentChunk;

use super::{ScoredId, VectorIndex};

#[derive(Default)]
struct VectorState {
    dims: Option<usize>,
    entries: Vec<(String, Vec<f32>)>,
}

#[derive(Default)]
pub struct MemoryVectorIndex {
    state: RwLock<VectorState>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            state: RwLock::new(VectorState {
                dims: Some(dims),
                entries: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn dims(&self) -> Option<usize> {
        self.state.read().await.dims
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn add(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        let expected = state.dims.unwrap_or(first.embedding.len());
        if expected == 0 {
            return Err(AuditError::Embedding {
                message: format!("chunk {} has an empty embedding", first.id),
            });
        }
        for chunk in chunks {
            check_dims(expected, chunk.embedding.len())?;
        }

        let mut seen: HashSet<String> = state.entries.iter().map(|(id, _)| id.clone()).collect();
        state.dims = Some(expected);
        for chunk in chunks {
            if seen.insert(chunk.id.clone()) {
                state.entries.push((chunk.id.clone(), chunk.embedding.clone()));
            }
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        let state = self.state.read().await;
        if let Some(dims) = state.dims {
            check_dims(dims, query.len())?;
        }
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredId> = state
            .entries
            .iter()
            .map(|(id, vec)| ScoredId {
                chunk_id: id.clone(),
                score: cosine_similarity(query, vec) as f64,
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, DocType};
    use chrono::Utc;

    fn chunk(id: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            chunk_index: 0,
            text: format!("text of {}", id),
            embedding,
            metadata: ChunkMetadata {
                doc_type: DocType::Report,
                source: "report.md".to_string(),
                created_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_first_batch_pins_dims() {
        let index = MemoryVectorIndex::new();
        assert_eq!(index.dims().await, None);
        index.add(&[chunk("a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(index.dims().await, Some(3));
    }

    #[tokio::test]
    async fn test_mismatched_batch_leaves_index_unchanged() {
        let index = MemoryVectorIndex::with_dims(384);
        index.add(&[chunk("a", vec![0.1; 384])]).await.unwrap();

        let err = index
            .add(&[chunk("b", vec![0.1; 384]), chunk("c", vec![0.1; 768])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::EmbeddingDimensionMismatch {
                expected: 384,
                actual: 768
            }
        ));
        assert_eq!(index.len().await, 1);
        assert_eq!(index.dims().await, Some(384));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_is_error() {
        let index = MemoryVectorIndex::with_dims(4);
        let err = index.search(&[1.0, 0.0], 3).await.unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let index = MemoryVectorIndex::new();
        index
            .add(&[
                chunk("east", vec![1.0, 0.0]),
                chunk("north", vec![0.0, 1.0]),
                chunk("northeast", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let hits = index.search(&[0.0, 1.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["north", "northeast"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_ignored() {
        let index = MemoryVectorIndex::new();
        index.add(&[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        index.add(&[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(index.len().await, 1);
    }
}
