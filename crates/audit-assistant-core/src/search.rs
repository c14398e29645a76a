//! Hybrid retrieval over document chunks.
//!
//! A query runs two passes and merges them:
//!
//! 1. **Vector**: embed the query and take the top-k chunks by cosine
//!    similarity from the [`VectorIndex`].
//! 2. **Keyword**: tokenize the query and take the top-k chunks with a
//!    positive score from the [`KeywordIndex`].
//!
//! Results are merged in first-seen order (vector hits first), deduplicated
//! by normalized chunk text, and truncated to k.
//!
//! # Corpus snapshots
//!
//! The keyword index and the chunk lookup table live in an immutable
//! `Corpus` snapshot behind `RwLock<Arc<_>>`. A query clones the `Arc`
//! once and works against that snapshot for its whole lifetime. Ingestion
//! (serialized by a mutex) builds a fresh snapshot, rebuilding the keyword
//! index once per batch, and swaps it in. Vector hits for chunks the
//! query's snapshot does not know yet are dropped, so a query never mixes
//! pre- and post-ingestion state.
//!
//! # Ingestion order
//!
//! embed → validate dimensions → persist ([`ChunkStore::append`]) →
//! vector insert → snapshot swap. Any failure before the swap leaves the
//! searchable state untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::embedding::{check_dims, embed_one, Embedder};
use crate::error::{AuditError, Result};
use crate::index::{Bm25Index, KeywordIndex, VectorIndex};
use crate::models::{DocumentChunk, MatchSource, NewChunk, RetrievedChunk};
use crate::store::ChunkStore;
use crate::text::{normalize_for_dedup, tokenize};

pub const DEFAULT_TOP_K: usize = 5;

/// Immutable view of the chunk corpus plus its keyword index.
struct Corpus<K> {
    chunks: Vec<DocumentChunk>,
    by_id: HashMap<String, usize>,
    keywords: K,
}

impl<K: KeywordIndex + Default> Corpus<K> {
    fn build(chunks: Vec<DocumentChunk>) -> Self {
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        let mut keywords = K::default();
        keywords.rebuild(&chunks);
        Self {
            chunks,
            by_id,
            keywords,
        }
    }

    fn get(&self, id: &str) -> Option<&DocumentChunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    /// A new snapshot with `added` appended. Embeddings are not kept here;
    /// the vector index owns them.
    fn extended(&self, added: &[DocumentChunk]) -> Self {
        let mut chunks = self.chunks.clone();
        chunks.extend(added.iter().map(without_embedding));
        Self::build(chunks)
    }
}

fn without_embedding(chunk: &DocumentChunk) -> DocumentChunk {
    DocumentChunk {
        embedding: Vec::new(),
        ..chunk.clone()
    }
}

pub struct HybridRetriever<K = Bm25Index> {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn ChunkStore>,
    corpus: RwLock<Arc<Corpus<K>>>,
    ingest_lock: Mutex<()>,
}

impl HybridRetriever {
    /// Retriever with the default BM25 keyword index.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self::from_parts(embedder, vectors, store)
    }
}

impl<K: KeywordIndex + Default> HybridRetriever<K> {
    pub fn from_parts(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            store,
            corpus: RwLock::new(Arc::new(Corpus::build(Vec::new()))),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Number of chunks in the current snapshot.
    pub async fn len(&self) -> usize {
        self.corpus.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Load every persisted chunk into the indexes. Called once at startup.
    pub async fn load(&self) -> Result<usize> {
        let _guard = self.ingest_lock.lock().await;
        let persisted = self.store.load_all().await?;
        let current = self.corpus.read().await.clone();
        let fresh: Vec<DocumentChunk> = persisted
            .into_iter()
            .filter(|c| current.get(&c.id).is_none())
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        self.validate(&fresh).await?;
        self.vectors.add(&fresh).await?;
        let next = Arc::new(current.extended(&fresh));
        *self.corpus.write().await = next;
        info!(chunks = fresh.len(), "loaded persisted chunks");
        Ok(fresh.len())
    }

    /// Embed, persist, and index a batch of chunks. Chunks whose ID is
    /// already indexed are skipped. Returns the number of chunks added.
    pub async fn ingest(&self, batch: Vec<NewChunk>) -> Result<usize> {
        let _guard = self.ingest_lock.lock().await;
        let current = self.corpus.read().await.clone();
        let batch: Vec<NewChunk> = batch
            .into_iter()
            .filter(|c| current.get(&c.id).is_none())
            .collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(AuditError::Embedding {
                message: format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ),
            });
        }
        let docs: Vec<DocumentChunk> = batch
            .into_iter()
            .zip(vectors)
            .map(|(c, v)| c.with_embedding(v))
            .collect();

        self.commit(current, docs).await
    }

    /// Index chunks that already carry embeddings.
    pub async fn add_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let _guard = self.ingest_lock.lock().await;
        let current = self.corpus.read().await.clone();
        let docs: Vec<DocumentChunk> = chunks
            .into_iter()
            .filter(|c| current.get(&c.id).is_none())
            .collect();
        if docs.is_empty() {
            return Ok(0);
        }
        self.commit(current, docs).await
    }

    async fn commit(&self, current: Arc<Corpus<K>>, docs: Vec<DocumentChunk>) -> Result<usize> {
        self.validate(&docs).await?;
        self.store.append(&docs).await?;
        // Persisted rows without vectors would resurface on the next load.
        if let Err(e) = self.vectors.add(&docs).await {
            let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
            if let Err(undo) = self.store.remove(&ids).await {
                warn!(error = %undo, chunks = ids.len(), "could not roll back persisted chunks");
            }
            return Err(e);
        }

        let next = Arc::new(current.extended(&docs));
        *self.corpus.write().await = next;
        info!(
            chunks = docs.len(),
            corpus = current.chunks.len() + docs.len(),
            "indexed chunk batch"
        );
        Ok(docs.len())
    }

    /// Every vector must match the index dimension, or the embedder's when
    /// the index is still unpinned.
    async fn validate(&self, docs: &[DocumentChunk]) -> Result<()> {
        let expected = match self.vectors.dims().await {
            Some(d) => d,
            None => self.embedder.dims(),
        };
        for doc in docs {
            check_dims(expected, doc.embedding.len())?;
        }
        Ok(())
    }

    /// Up to `k` chunks for `query`, no two with the same normalized text.
    ///
    /// Fails only on [`AuditError::EmbeddingDimensionMismatch`]. Any other
    /// embedding failure degrades to keyword-only results.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let corpus = self.corpus.read().await.clone();

        let vector_hits = match embed_one(self.embedder.as_ref(), query).await {
            Ok(v) => self.vectors.search(&v, k).await?,
            Err(e) if e.is_dimension_mismatch() => return Err(e),
            Err(e) => {
                warn!(error = %e, "query embedding failed; using keyword results only");
                Vec::new()
            }
        };
        let keyword_hits = corpus.keywords.search(&tokenize(query), k);
        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            "retrieval passes complete"
        );

        let passes = vector_hits
            .into_iter()
            .map(|h| (h, MatchSource::Vector))
            .chain(keyword_hits.into_iter().map(|h| (h, MatchSource::Keyword)));

        let mut out: Vec<RetrievedChunk> = Vec::with_capacity(k);
        let mut seen_text: HashSet<String> = HashSet::new();
        for (hit, source) in passes {
            let Some(chunk) = corpus.get(&hit.chunk_id) else {
                continue;
            };
            if !seen_text.insert(normalize_for_dedup(&chunk.text)) {
                if let Some(prev) = out.iter_mut().find(|r| r.chunk_id == hit.chunk_id) {
                    if prev.found_by != source {
                        prev.found_by = MatchSource::Both;
                    }
                }
                continue;
            }
            out.push(RetrievedChunk {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                source: chunk.metadata.source.clone(),
                text: chunk.text.clone(),
                score: hit.score,
                found_by: source,
            });
        }
        out.truncate(k);
        Ok(out)
    }
}
