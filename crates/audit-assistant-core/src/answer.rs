//! Answer generation strategies.
//!
//! [`AnswerGenerator`] has two implementations, picked once at startup:
//!
//! - [`ModelBackedGenerator`] sends the persona + assembled context as the
//!   system message and the query as the user message to a
//!   [`CompletionClient`], and returns the completion verbatim. Errors,
//!   timeouts, and blank completions fall back to the canned path.
//! - [`CannedGenerator`] answers from the assembled context with a fixed,
//!   ordered set of templates. It never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::context::AssembledContext;
use crate::error::Result;
use crate::planner::{Plan, StructuredSummary};
use crate::text::excerpt;

pub const SYSTEM_PERSONA: &str = "You are an accounting audit assistant. Use the following retrieved \
context to answer the user's question. If the context does not contain the answer, say so and give a \
brief, professional response.";

pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

const EXCERPT_CHARS: usize = 300;
const CANNED_DETAIL_LINES: usize = 3;

/// Build the system message for a model-backed completion.
pub fn system_prompt(context: &str) -> String {
    format!("{}\n\n--- Context ---\n{}", SYSTEM_PERSONA, context)
}

/// Chat-style completion endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Model,
    Canned,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Model => "model",
            AnswerMode::Canned => "canned",
        }
    }
}

/// A generated answer and the path that actually produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub mode: AnswerMode,
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// The configured strategy. A model-backed generator may still return
    /// canned answers when the model fails.
    fn mode(&self) -> AnswerMode;

    async fn generate(&self, query: &str, context: &AssembledContext) -> Answer;
}

// ============ Canned ============

#[derive(Debug, Clone, Copy, Default)]
pub struct CannedGenerator;

impl CannedGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Template selection, first match wins.
    pub fn render(&self, context: &AssembledContext) -> String {
        let quote = context.top_chunk().map(|c| {
            format!(
                "According to {}: \"{}\"",
                c.source,
                excerpt(&c.text, EXCERPT_CHARS)
            )
        });

        let mut text = match (&context.structured, &quote) {
            (Some(summary), Some(q)) if summary.matched > 0 => {
                format!("{}\n\n{}", records_sentence(summary), q)
            }
            (Some(summary), None) if summary.matched > 0 => records_sentence(summary),
            (Some(summary), _) if quote.is_none() => summary.headline().to_string(),
            (_, Some(q)) => q.clone(),
            (None, None) if context.structured_unavailable => {
                "The invoice database is currently unavailable and no relevant documents were \
                 found. Please try again later."
                    .to_string()
            }
            _ => "I could not find invoice records or audit documents relevant to that question. \
                  Try asking about invoice counts and statuses, vendor or category totals, or the \
                  audit reports."
                .to_string(),
        };

        let sources = context.document_sources();
        if !sources.is_empty() {
            text.push_str("\n\nSources: ");
            text.push_str(&sources.join(", "));
        }
        if context.structured_unavailable && context.structured.is_none() && quote.is_some() {
            text.push_str("\n\nNote: structured invoice data is currently unavailable.");
        }
        text
    }
}

/// Headline plus the planner's leading groups or records.
fn records_sentence(summary: &StructuredSummary) -> String {
    let mut text = format!("From the invoice records: {}.", summary.headline());
    let details: Vec<&str> = summary.details().collect();
    let Some(first) = details.first() else {
        return text;
    };

    if let Plan::GroupTotals(group_by) = summary.plan {
        text.push_str(&format!(" The largest {} is {}.", group_by.label(), first));
    }
    let caption = match summary.plan {
        Plan::GroupTotals(group_by) => format!("Top {}", group_by.plural_label()),
        _ => "Records".to_string(),
    };
    text.push_str(&format!("\n{}:", caption));
    for line in details.iter().take(CANNED_DETAIL_LINES) {
        text.push_str("\n- ");
        text.push_str(line);
    }
    if details.len() > CANNED_DETAIL_LINES {
        text.push_str(&format!("\n(and {} more)", details.len() - CANNED_DETAIL_LINES));
    }
    text
}

#[async_trait]
impl AnswerGenerator for CannedGenerator {
    fn mode(&self) -> AnswerMode {
        AnswerMode::Canned
    }

    async fn generate(&self, _query: &str, context: &AssembledContext) -> Answer {
        Answer {
            text: self.render(context),
            mode: AnswerMode::Canned,
        }
    }
}

// ============ Model-backed ============

pub struct ModelBackedGenerator {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    fallback: CannedGenerator,
}

impl ModelBackedGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_COMPLETION_TIMEOUT,
            fallback: CannedGenerator,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AnswerGenerator for ModelBackedGenerator {
    fn mode(&self) -> AnswerMode {
        AnswerMode::Model
    }

    async fn generate(&self, query: &str, context: &AssembledContext) -> Answer {
        let system = system_prompt(&context.text);
        let outcome = tokio::time::timeout(self.timeout, self.client.complete(&system, query)).await;

        match outcome {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                return Answer {
                    text,
                    mode: AnswerMode::Model,
                }
            }
            Ok(Ok(_)) => warn!(model = self.client.model_name(), "empty completion; using canned answer"),
            Ok(Err(e)) => warn!(
                model = self.client.model_name(),
                error = %e,
                "completion failed; using canned answer"
            ),
            Err(_) => warn!(
                model = self.client.model_name(),
                timeout_secs = self.timeout.as_secs_f64(),
                "completion timed out; using canned answer"
            ),
        }
        self.fallback.generate(query, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{assemble, DocumentEvidence, StructuredEvidence};
    use crate::error::AuditError;
    use crate::models::{MatchSource, RetrievedChunk};
    use crate::planner::{Plan, StructuredSummary};
    use crate::store::GroupBy;
    use std::sync::Mutex;

    fn summary(matched: u64, text: &str) -> StructuredSummary {
        StructuredSummary {
            plan: Plan::TotalCount,
            matched,
            text: text.to_string(),
        }
    }

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            source: source.to_string(),
            text: text.to_string(),
            score: 1.0,
            found_by: MatchSource::Keyword,
        }
    }

    #[test]
    fn test_system_prompt_shape() {
        let p = system_prompt("ctx");
        assert!(p.starts_with("You are an accounting audit assistant."));
        assert!(p.ends_with("\n\n--- Context ---\nctx"));
    }

    #[test]
    fn test_canned_echoes_headline() {
        let ctx = assemble(
            StructuredEvidence::Summary(summary(20, "Pending invoices: 20 totaling $45,231.10\nRecords:")),
            DocumentEvidence::NotRequested,
        );
        let text = CannedGenerator.render(&ctx);
        assert_eq!(
            text,
            "From the invoice records: Pending invoices: 20 totaling $45,231.10."
        );
    }

    #[test]
    fn test_canned_names_top_group() {
        let ctx = assemble(
            StructuredEvidence::Summary(StructuredSummary {
                plan: Plan::GroupTotals(GroupBy::Vendor),
                matched: 4,
                text: "Invoice totals by vendor: 4 invoices totaling $4,100.00 across 3 vendors\n\
                       - Cloud Services Inc: $3,500.00 (2 invoices)\n\
                       - Marketing Pros: $500.00 (1 invoice)\n\
                       - Legal Associates: $100.00 (1 invoice)"
                    .to_string(),
            }),
            DocumentEvidence::NotRequested,
        );
        let text = CannedGenerator.render(&ctx);
        assert!(text.starts_with(
            "From the invoice records: Invoice totals by vendor: 4 invoices totaling $4,100.00 across 3 vendors."
        ));
        assert!(text.contains("The largest vendor is Cloud Services Inc: $3,500.00 (2 invoices)."));
        assert!(text.contains("Top vendors:\n- Cloud Services Inc"));
        assert!(text.ends_with("- Legal Associates: $100.00 (1 invoice)"));
    }

    #[test]
    fn test_canned_lists_leading_records() {
        let rows: Vec<String> = (1..=5).map(|i| format!("- INV-{} | Acme", i)).collect();
        let ctx = assemble(
            StructuredEvidence::Summary(StructuredSummary {
                plan: Plan::Sample,
                matched: 5,
                text: format!("Invoices on file: 5 totaling $50.00\nRecords:\n{}", rows.join("\n")),
            }),
            DocumentEvidence::NotRequested,
        );
        let text = CannedGenerator.render(&ctx);
        assert!(text.contains("Records:\n- INV-1 | Acme\n- INV-2 | Acme\n- INV-3 | Acme"));
        assert!(!text.contains("INV-4"));
        assert!(text.ends_with("(and 2 more)"));
    }

    #[test]
    fn test_canned_quotes_top_chunk_with_source() {
        let ctx = assemble(
            StructuredEvidence::NotRequested,
            DocumentEvidence::Chunks(vec![chunk(
                "audit_report_2024_Q4.md",
                "Quarterly Financial Audit Report - Q4 2024",
            )]),
        );
        let text = CannedGenerator.render(&ctx);
        assert!(text.starts_with("According to audit_report_2024_Q4.md: \"Quarterly Financial"));
        assert!(text.ends_with("Sources: audit_report_2024_Q4.md"));
    }

    #[test]
    fn test_canned_no_match_uses_planner_text() {
        let ctx = assemble(
            StructuredEvidence::Summary(summary(0, "No matching records with status Overdue.")),
            DocumentEvidence::NotRequested,
        );
        assert_eq!(CannedGenerator.render(&ctx), "No matching records with status Overdue.");
    }

    #[tokio::test]
    async fn test_canned_never_empty() {
        let contexts = [
            assemble(StructuredEvidence::NotRequested, DocumentEvidence::NotRequested),
            assemble(
                StructuredEvidence::Unavailable("down".to_string()),
                DocumentEvidence::Chunks(Vec::new()),
            ),
            assemble(
                StructuredEvidence::Unavailable("down".to_string()),
                DocumentEvidence::Chunks(vec![chunk("a.md", "")]),
            ),
        ];
        for ctx in &contexts {
            for q in ["", "hello", "??", "How many invoices?"] {
                let answer = CannedGenerator.generate(q, ctx).await;
                assert!(!answer.text.trim().is_empty());
                assert_eq!(answer.mode, AnswerMode::Canned);
            }
        }
    }

    struct ScriptedClient {
        reply: Mutex<Option<Result<String>>>,
        delay: Duration,
        seen_system: Mutex<String>,
    }

    impl ScriptedClient {
        fn new(reply: Result<String>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                delay: Duration::ZERO,
                seen_system: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, system: &str, _user: &str) -> Result<String> {
            *self.seen_system.lock().unwrap() = system.to_string();
            tokio::time::sleep(self.delay).await;
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn context() -> AssembledContext {
        assemble(
            StructuredEvidence::Summary(summary(2, "Total invoices: 2 totaling $10.00")),
            DocumentEvidence::NotRequested,
        )
    }

    #[tokio::test]
    async fn test_model_reply_verbatim() {
        let client = Arc::new(ScriptedClient::new(Ok("There are 2 invoices.".to_string())));
        let generator = ModelBackedGenerator::new(client.clone());
        let answer = generator.generate("how many invoices", &context()).await;
        assert_eq!(answer.text, "There are 2 invoices.");
        assert_eq!(answer.mode, AnswerMode::Model);
        assert!(client.seen_system.lock().unwrap().contains("Total invoices: 2"));
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let client = Arc::new(ScriptedClient::new(Err(AuditError::ModelCompletion {
            message: "401 Unauthorized".to_string(),
        })));
        let answer = ModelBackedGenerator::new(client)
            .generate("how many invoices", &context())
            .await;
        assert_eq!(answer.mode, AnswerMode::Canned);
        assert!(answer.text.contains("Total invoices: 2"));
    }

    #[tokio::test]
    async fn test_blank_completion_falls_back() {
        let client = Arc::new(ScriptedClient::new(Ok("   ".to_string())));
        let answer = ModelBackedGenerator::new(client)
            .generate("q", &context())
            .await;
        assert_eq!(answer.mode, AnswerMode::Canned);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let mut client = ScriptedClient::new(Ok("late".to_string()));
        client.delay = Duration::from_millis(200);
        let answer = ModelBackedGenerator::new(Arc::new(client))
            .with_timeout(Duration::from_millis(10))
            .generate("q", &context())
            .await;
        assert_eq!(answer.mode, AnswerMode::Canned);
    }
}
