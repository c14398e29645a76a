//! Context assembly: merges planner output and retrieved chunks into the
//! single text block handed to the answer generator.
//!
//! Layout:
//!
//! ```text
//! ## Invoice records
//! Pending invoices: 20 totaling $45,231.10
//! ...
//!
//! ## Documents
//! [1] Source: audit_report_2024_Q4.md
//! <chunk text>
//! ---
//! [2] Source: ...
//! ```
//!
//! The result is never empty: with no evidence at all it is
//! [`NO_DATA_SENTINEL`].

use serde::Serialize;

use crate::models::RetrievedChunk;
use crate::planner::StructuredSummary;

pub const NO_DATA_SENTINEL: &str = "No relevant data found.";
pub const NO_DOCUMENTS: &str = "No relevant documents found.";
pub const STRUCTURED_UNAVAILABLE: &str = "Structured data unavailable";

/// What the structured side contributed to a query.
#[derive(Debug, Clone)]
pub enum StructuredEvidence {
    NotRequested,
    Summary(StructuredSummary),
    Unavailable(String),
}

impl StructuredEvidence {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StructuredEvidence::Unavailable(_))
    }
}

/// What the document side contributed to a query.
#[derive(Debug, Clone)]
pub enum DocumentEvidence {
    NotRequested,
    /// Retrieval ran; an empty list means nothing relevant was found.
    Chunks(Vec<RetrievedChunk>),
    Unavailable(String),
}

impl DocumentEvidence {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DocumentEvidence::Unavailable(_))
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, DocumentEvidence::NotRequested)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub text: String,
    #[serde(skip)]
    pub structured: Option<StructuredSummary>,
    #[serde(skip)]
    pub chunks: Vec<RetrievedChunk>,
    pub structured_unavailable: bool,
}

impl AssembledContext {
    pub fn top_chunk(&self) -> Option<&RetrievedChunk> {
        self.chunks.first()
    }

    /// Distinct chunk sources in rank order.
    pub fn document_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for c in &self.chunks {
            if !out.contains(&c.source) {
                out.push(c.source.clone());
            }
        }
        out
    }
}

pub fn assemble(structured: StructuredEvidence, documents: DocumentEvidence) -> AssembledContext {
    let mut sections: Vec<String> = Vec::new();
    let mut structured_unavailable = false;

    let summary = match structured {
        StructuredEvidence::Summary(s) => {
            sections.push(format!("## Invoice records\n{}", s.text));
            Some(s)
        }
        StructuredEvidence::Unavailable(reason) => {
            structured_unavailable = true;
            sections.push(format!("{}: {}", STRUCTURED_UNAVAILABLE, reason));
            None
        }
        StructuredEvidence::NotRequested => None,
    };

    let chunks = match documents {
        DocumentEvidence::Chunks(chunks) if !chunks.is_empty() => {
            let body = chunks
                .iter()
                .enumerate()
                .map(|(i, c)| format!("[{}] Source: {}\n{}", i + 1, c.source, c.text.trim()))
                .collect::<Vec<_>>()
                .join("\n---\n");
            sections.push(format!("## Documents\n{}", body));
            chunks
        }
        DocumentEvidence::Chunks(_) => {
            if summary.is_some() {
                sections.push(NO_DOCUMENTS.to_string());
            }
            Vec::new()
        }
        DocumentEvidence::Unavailable(reason) => {
            sections.push(format!("Documents unavailable: {}", reason));
            Vec::new()
        }
        DocumentEvidence::NotRequested => Vec::new(),
    };

    if summary.is_none() && chunks.is_empty() {
        sections.insert(0, NO_DATA_SENTINEL.to_string());
    }

    AssembledContext {
        text: sections.join("\n\n"),
        structured: summary,
        chunks,
        structured_unavailable,
    }
}
