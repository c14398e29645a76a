//! The query pipeline.
//!
//! [`AuditAssistant`] is built once at startup from its collaborators and
//! shared by reference (`Arc<AuditAssistant>`) across request tasks:
//!
//! ```text
//! query → QueryRouter → { StructuredPlanner | HybridRetriever | both, concurrently }
//!       → assemble → AnswerGenerator → QueryResponse
//! ```
//!
//! # Degradation
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | invoice store down, documents reachable | answer from documents, with a note |
//! | structured-only route, invoice store down | falls back to document retrieval |
//! | document-only route, retrieval down | falls back to the planner |
//! | both down | [`AuditError::StoreUnavailable`] |
//! | embedding dimension mismatch | error, never degraded |
//! | model failure | canned answer (see [`crate::answer`]) |

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::answer::{AnswerGenerator, AnswerMode};
use crate::context::{assemble, DocumentEvidence, StructuredEvidence};
use crate::error::{AuditError, Result};
use crate::models::{Route, RouterDecision};
use crate::planner::StructuredPlanner;
use crate::router::QueryRouter;
use crate::search::{HybridRetriever, DEFAULT_TOP_K};

/// Label used in `sources` when invoice records contributed to an answer.
pub const INVOICE_SOURCE: &str = "invoices";

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    /// Accepted and logged; never influences routing or retrieval.
    pub session_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub decision: RouterDecision,
    pub sources: Vec<String>,
    pub mode: AnswerMode,
}

pub struct AuditAssistant {
    router: QueryRouter,
    planner: StructuredPlanner,
    retriever: Arc<HybridRetriever>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
}

impl AuditAssistant {
    pub fn new(
        router: QueryRouter,
        planner: StructuredPlanner,
        retriever: Arc<HybridRetriever>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            router,
            planner,
            retriever,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.generator.mode()
    }

    /// Answer one query. Fails only when no evidence source is reachable or
    /// on an embedding dimension mismatch.
    pub async fn ask(&self, request: QueryRequest) -> Result<QueryResponse> {
        let query = request.query.trim();
        let decision = self.router.classify(query);
        info!(
            route = decision.route.as_str(),
            structured_score = decision.structured_score,
            unstructured_score = decision.unstructured_score,
            session = request.session_id.as_deref().unwrap_or("-"),
            "routing query"
        );

        let (mut structured, mut documents) = match decision.route {
            Route::Structured => (self.structured(query).await, DocumentEvidence::NotRequested),
            Route::Unstructured => (StructuredEvidence::NotRequested, self.documents(query).await?),
            Route::Both => {
                let (s, d) = tokio::join!(self.structured(query), self.documents(query));
                (s, d?)
            }
        };

        if structured.is_unavailable() && !documents.is_requested() {
            warn!("invoice store unavailable; falling back to document retrieval");
            documents = self.documents(query).await?;
        }
        if documents.is_unavailable() && matches!(structured, StructuredEvidence::NotRequested) {
            warn!("document retrieval unavailable; falling back to invoice records");
            structured = self.structured(query).await;
        }
        if let (StructuredEvidence::Unavailable(s), DocumentEvidence::Unavailable(d)) =
            (&structured, &documents)
        {
            return Err(AuditError::store_unavailable(format!(
                "invoices: {}; documents: {}",
                s, d
            )));
        }

        let context = assemble(structured, documents);
        let answer = self.generator.generate(query, &context).await;

        let mut sources: Vec<String> = Vec::new();
        if context.structured.is_some() {
            sources.push(INVOICE_SOURCE.to_string());
        }
        sources.extend(context.document_sources());

        info!(mode = answer.mode.as_str(), sources = sources.len(), "answered query");
        Ok(QueryResponse {
            answer: answer.text,
            decision,
            sources,
            mode: answer.mode,
        })
    }

    async fn structured(&self, query: &str) -> StructuredEvidence {
        match self.planner.plan_and_run(query).await {
            Ok(summary) => StructuredEvidence::Summary(summary),
            Err(e) => {
                warn!(error = %e, "structured lookup failed");
                StructuredEvidence::Unavailable(e.to_string())
            }
        }
    }

    /// Errors only on a dimension mismatch; other failures become
    /// [`DocumentEvidence::Unavailable`].
    async fn documents(&self, query: &str) -> Result<DocumentEvidence> {
        match self.retriever.retrieve(query, self.top_k).await {
            Ok(chunks) => Ok(DocumentEvidence::Chunks(chunks)),
            Err(e) if e.is_dimension_mismatch() => Err(e),
            Err(e) => {
                warn!(error = %e, "document retrieval failed");
                Ok(DocumentEvidence::Unavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::CannedGenerator;
    use crate::embedding::HashEmbedder;
    use crate::index::{MemoryVectorIndex, ScoredId, VectorIndex};
    use crate::models::{DocumentChunk, InvoiceRecord};
    use crate::store::memory::{MemoryChunkStore, MemoryInvoiceStore};
    use crate::store::{GroupBy, GroupTotal, InvoiceFilter, InvoiceStore, Totals};
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl InvoiceStore for DownStore {
        async fn query(&self, _: &InvoiceFilter) -> Result<Vec<InvoiceRecord>> {
            Err(AuditError::store_unavailable("database is locked"))
        }
        async fn totals(&self, _: &InvoiceFilter) -> Result<Totals> {
            Err(AuditError::store_unavailable("database is locked"))
        }
        async fn aggregate(&self, _: GroupBy, _: &InvoiceFilter) -> Result<Vec<GroupTotal>> {
            Err(AuditError::store_unavailable("database is locked"))
        }
        async fn vendors(&self) -> Result<Vec<String>> {
            Err(AuditError::store_unavailable("database is locked"))
        }
        async fn insert(&self, _: &[InvoiceRecord]) -> Result<usize> {
            Err(AuditError::store_unavailable("database is locked"))
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn dims(&self) -> Option<usize> {
            None
        }
        async fn len(&self) -> usize {
            0
        }
        async fn add(&self, _: &[DocumentChunk]) -> Result<()> {
            Err(AuditError::DocumentStore {
                message: "index offline".to_string(),
            })
        }
        async fn search(&self, _: &[f32], _: usize) -> Result<Vec<ScoredId>> {
            Err(AuditError::DocumentStore {
                message: "index offline".to_string(),
            })
        }
    }

    fn assistant(store: Arc<dyn InvoiceStore>, vectors: Arc<dyn VectorIndex>) -> AuditAssistant {
        let retriever = HybridRetriever::new(
            Arc::new(HashEmbedder::new(64)),
            vectors,
            Arc::new(MemoryChunkStore::new()),
        );
        AuditAssistant::new(
            QueryRouter::default(),
            StructuredPlanner::new(store),
            Arc::new(retriever),
            Arc::new(CannedGenerator),
        )
    }

    #[tokio::test]
    async fn test_greeting_routes_both_and_answers() {
        let a = assistant(Arc::new(MemoryInvoiceStore::new()), Arc::new(MemoryVectorIndex::new()));
        let resp = a.ask(QueryRequest::new("hello").with_session("t-1")).await.unwrap();
        assert_eq!(resp.decision.route, Route::Both);
        assert!(!resp.answer.is_empty());
        assert_eq!(resp.mode, AnswerMode::Canned);
    }

    #[tokio::test]
    async fn test_structured_route_falls_back_to_documents() {
        let a = assistant(Arc::new(DownStore), Arc::new(MemoryVectorIndex::new()));
        let resp = a.ask(QueryRequest::new("how many invoices")).await.unwrap();
        assert_eq!(resp.decision.route, Route::Structured);
        assert!(!resp.sources.contains(&INVOICE_SOURCE.to_string()));
        assert!(!resp.answer.is_empty());
    }

    #[tokio::test]
    async fn test_document_route_falls_back_to_invoices() {
        let a = assistant(Arc::new(MemoryInvoiceStore::new()), Arc::new(DownIndex));
        let resp = a.ask(QueryRequest::new("audit report findings")).await.unwrap();
        assert_eq!(resp.decision.route, Route::Unstructured);
        assert_eq!(resp.sources, vec![INVOICE_SOURCE.to_string()]);
    }

    #[tokio::test]
    async fn test_both_stores_down_is_error() {
        let a = assistant(Arc::new(DownStore), Arc::new(DownIndex));
        let err = a.ask(QueryRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, AuditError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_degraded() {
        let a = assistant(
            Arc::new(MemoryInvoiceStore::new()),
            Arc::new(MemoryVectorIndex::with_dims(768)),
        );
        let err = a.ask(QueryRequest::new("audit report")).await.unwrap_err();
        assert!(err.is_dimension_mismatch());
    }
}
