//! Okapi BM25 keyword index.
//!
//! ```text
//!                         tf × (k1 + 1)
//! score(d, q) = Σ idf(t) × ───────────────────────────────
//!               t∈q        tf + k1 × (1 − b + b × |d| / avgdl)
//!
//! idf(t) = ln(1 + (N − n(t) + 0.5) / (n(t) + 0.5))
//! ```
//!
//! The `ln(1 + …)` form keeps idf positive even for terms present in every
//! chunk, so small corpora (a single audit report) still rank.

use std::collections::HashMap;

use crate::models::DocumentChunk;
use crate::text::tokenize;

use super::{KeywordIndex, ScoredId};

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

#[derive(Debug, Clone)]
struct IndexedDoc {
    chunk_id: String,
    len: usize,
    term_freqs: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    docs: Vec<IndexedDoc>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25Index {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            docs: Vec::new(),
            doc_freqs: HashMap::new(),
            avg_len: 0.0,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        let total = self.docs.len() as f64;
        (1.0 + (total - n + 0.5) / (n + 0.5)).ln()
    }

    fn score(&self, doc: &IndexedDoc, tokens: &[String], idfs: &[f64]) -> f64 {
        let norm = if self.avg_len > 0.0 {
            1.0 - self.b + self.b * doc.len as f64 / self.avg_len
        } else {
            1.0
        };
        tokens
            .iter()
            .zip(idfs)
            .map(|(t, idf)| {
                let tf = doc.term_freqs.get(t).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    0.0
                } else {
                    idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
                }
            })
            .sum()
    }
}

impl KeywordIndex for Bm25Index {
    fn rebuild(&mut self, chunks: &[DocumentChunk]) {
        self.docs.clear();
        self.doc_freqs.clear();

        let mut total_len = 0usize;
        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for t in &tokens {
                *term_freqs.entry(t.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *self.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            self.docs.push(IndexedDoc {
                chunk_id: chunk.id.clone(),
                len: tokens.len(),
                term_freqs,
            });
        }

        self.avg_len = if self.docs.is_empty() {
            0.0
        } else {
            total_len as f64 / self.docs.len() as f64
        };
    }

    fn search(&self, tokens: &[String], k: usize) -> Vec<ScoredId> {
        if tokens.is_empty() || k == 0 || self.docs.is_empty() {
            return Vec::new();
        }
        let idfs: Vec<f64> = tokens.iter().map(|t| self.idf(t)).collect();

        let mut scored: Vec<ScoredId> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let score = self.score(doc, tokens, &idfs);
                (score > 0.0).then(|| ScoredId {
                    chunk_id: doc.chunk_id.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, DocType};
    use chrono::Utc;

    fn chunk(id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding: Vec::new(),
            metadata: ChunkMetadata {
                doc_type: DocType::Report,
                source: "report.md".to_string(),
                created_at: Utc::now(),
            },
        }
    }

    fn corpus() -> Bm25Index {
        let mut index = Bm25Index::default();
        index.rebuild(&[
            chunk("rev", "Revenue analysis: Q1 $1,200,000, Q4 $1,500,000."),
            chunk("gaap", "All financial statements are in accordance with GAAP standards."),
            chunk("vendor", "Cloud Services Inc remains the largest vendor by volume."),
        ]);
        index
    }

    #[test]
    fn test_exact_identifier_ranks_first() {
        let hits = corpus().search(&tokenize("GAAP compliance"), 3);
        assert_eq!(hits[0].chunk_id, "gaap");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_no_match_returns_empty() {
        assert!(corpus().search(&tokenize("payroll"), 3).is_empty());
    }

    #[test]
    fn test_single_document_corpus_still_scores() {
        let mut index = Bm25Index::default();
        index.rebuild(&[chunk("only", "Annual audit report 2024")]);
        let hits = index.search(&tokenize("audit report"), 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut index = corpus();
        assert_eq!(index.len(), 3);
        index.rebuild(&[chunk("new", "fresh text")]);
        assert_eq!(index.len(), 1);
        assert!(index.search(&tokenize("GAAP"), 3).is_empty());
    }

    #[test]
    fn test_respects_k() {
        let mut index = Bm25Index::default();
        let chunks: Vec<DocumentChunk> = (0..10)
            .map(|i| chunk(&format!("c{}", i), "invoice audit"))
            .collect();
        index.rebuild(&chunks);
        assert_eq!(index.search(&tokenize("audit"), 4).len(), 4);
    }

    #[test]
    fn test_term_frequency_matters() {
        let mut index = Bm25Index::default();
        index.rebuild(&[
            chunk("once", "audit of the ledger and other accounts"),
            chunk("twice", "audit audit of the ledger and accounts"),
        ]);
        let hits = index.search(&tokenize("audit"), 2);
        assert_eq!(hits[0].chunk_id, "twice");
    }
}
