//! Paragraph-boundary text splitter used by document ingestion.
//!
//! Splits a document body into [`NewChunk`]s that respect a `max_tokens`
//! limit, breaking on paragraph boundaries (`\n\n`) and hard-splitting
//! oversized paragraphs at the nearest newline or space.
//!
//! Chunk IDs are UUIDv5 values derived from the document ID, the chunk
//! index, and the SHA-256 of the chunk text, so re-ingesting an unchanged
//! document produces the same IDs.
//!
//! ```rust
//! use audit_assistant_core::chunk::chunk_document;
//! use audit_assistant_core::models::{ChunkMetadata, DocType};
//!
//! let meta = ChunkMetadata {
//!     doc_type: DocType::Report,
//!     source: "audit_report_2024.md".to_string(),
//!     created_at: chrono::Utc::now(),
//! };
//! let chunks = chunk_document("doc-1", "Hello world.\n\nSecond paragraph.", 250, &meta);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{ChunkMetadata, NewChunk};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks of at most `max_tokens × 4` characters.
///
/// Blank input yields no chunks. Indices are contiguous from 0.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    metadata: &ChunkMetadata,
) -> Vec<NewChunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, piece, metadata))
        .collect()
}

/// Split an oversized paragraph at newline/space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        // A single multi-byte char wider than max_chars still has to move forward.
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, text: String, metadata: &ChunkMetadata) -> NewChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let name = format!("{}:{}:{}", document_id, index, hash);

    NewChunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        metadata: metadata.clone(),
    }
}
