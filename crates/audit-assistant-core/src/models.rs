//! Core data models shared by the router, planner, retriever, and answer path.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, Result};
use crate::money::Money;

// ============ Structured evidence ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
    Overdue,
    OnHold,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Approved,
        InvoiceStatus::Rejected,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::OnHold,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "Pending",
            InvoiceStatus::Approved => "Approved",
            InvoiceStatus::Rejected => "Rejected",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Overdue => "Overdue",
            InvoiceStatus::OnHold => "On Hold",
            InvoiceStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "pending" => Ok(InvoiceStatus::Pending),
            "approved" => Ok(InvoiceStatus::Approved),
            "rejected" => Ok(InvoiceStatus::Rejected),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "onhold" => Ok(InvoiceStatus::OnHold),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(AuditError::invalid_record(format!(
                "unknown invoice status: '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentTerms {
    Net15,
    Net30,
    Net45,
    Net60,
    DueOnReceipt,
    Other(String),
}

impl fmt::Display for PaymentTerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentTerms::Net15 => f.write_str("Net 15"),
            PaymentTerms::Net30 => f.write_str("Net 30"),
            PaymentTerms::Net45 => f.write_str("Net 45"),
            PaymentTerms::Net60 => f.write_str("Net 60"),
            PaymentTerms::DueOnReceipt => f.write_str("Due on Receipt"),
            PaymentTerms::Other(s) => f.write_str(s),
        }
    }
}

impl FromStr for PaymentTerms {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Ok(match key.as_str() {
            "net15" => PaymentTerms::Net15,
            "" | "net30" => PaymentTerms::Net30,
            "net45" => PaymentTerms::Net45,
            "net60" => PaymentTerms::Net60,
            "dueonreceipt" | "cod" => PaymentTerms::DueOnReceipt,
            _ => PaymentTerms::Other(s.trim().to_string()),
        })
    }
}

/// Declares a closed label set with display names and lenient parsing.
macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident, fallback = $fallback:ident, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AuditError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim();
                if wanted.is_empty() {
                    return Ok($name::$fallback);
                }
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        AuditError::invalid_record(format!(
                            concat!("unknown ", stringify!($name), ": '{}'"),
                            s
                        ))
                    })
            }
        }
    };
}

label_enum!(
    /// Spending category of an invoice.
    Category, fallback = Other, {
        It => "IT",
        Legal => "Legal",
        Marketing => "Marketing",
        Operations => "Operations",
        Hr => "HR",
        Finance => "Finance",
        Consulting => "Consulting",
        Supplies => "Supplies",
        Other => "Other",
    }
);

label_enum!(
    /// Department that owns an invoice.
    Department, fallback = Unassigned, {
        Engineering => "Engineering",
        Sales => "Sales",
        Marketing => "Marketing",
        Finance => "Finance",
        Operations => "Operations",
        Hr => "HR",
        Legal => "Legal",
        Executive => "Executive",
        Unassigned => "Unassigned",
    }
);

/// One row of the invoice table. Snapshot only; the core never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub vendor: String,
    pub amount: Money,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub payment_terms: PaymentTerms,
    pub po_number: Option<String>,
    pub category: Category,
    pub department: Department,
    pub subtotal: Money,
    /// Fractional rate, e.g. `0.08` for 8 %.
    pub tax_rate: f64,
    pub tax_amount: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Check the record-level invariants enforced at ingestion time.
    pub fn validate(&self) -> Result<()> {
        if self.invoice_id.trim().is_empty() {
            return Err(AuditError::invalid_record("invoice_id must not be empty"));
        }
        if self.vendor.trim().is_empty() {
            return Err(AuditError::invalid_record(format!(
                "{}: vendor must not be empty",
                self.invoice_id
            )));
        }
        if self.subtotal + self.tax_amount != self.amount {
            return Err(AuditError::invalid_record(format!(
                "{}: amount {} != subtotal {} + tax {}",
                self.invoice_id, self.amount, self.subtotal, self.tax_amount
            )));
        }
        Ok(())
    }

    /// One-line rendering used in planner listings.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} | {} | {} | issued {} | {} | {} / {}",
            self.invoice_id,
            self.vendor,
            self.amount.usd(),
            self.issue_date,
            self.status,
            self.category,
            self.department
        );
        if let Some(due) = self.due_date {
            line.push_str(&format!(" | due {}", due));
        }
        line
    }
}

// ============ Unstructured evidence ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    InvoiceDerived,
    Report,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::InvoiceDerived => "invoice",
            DocType::Report => "report",
        }
    }

    /// Infer the type from a source file name.
    pub fn infer(source: &str) -> Self {
        if source.to_ascii_lowercase().contains("invoice") {
            DocType::InvoiceDerived
        } else {
            DocType::Report
        }
    }
}

impl FromStr for DocType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "invoice" => Ok(DocType::InvoiceDerived),
            "report" => Ok(DocType::Report),
            other => Err(AuditError::invalid_record(format!(
                "unknown document type: '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_type: DocType,
    /// Source identifier shown to the model, e.g. `audit_report_2024_Q4.md`.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A chunk produced by upstream splitting, before it is embedded.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl NewChunk {
    pub fn with_embedding(self, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: self.id,
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            text: self.text,
            embedding,
            metadata: self.metadata,
        }
    }
}

/// A stored, embedded chunk. Immutable once stored.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

// ============ Routing and retrieval ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Structured,
    Unstructured,
    Both,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Structured => "structured",
            Route::Unstructured => "unstructured",
            Route::Both => "both",
        }
    }

    pub fn wants_structured(&self) -> bool {
        matches!(self, Route::Structured | Route::Both)
    }

    pub fn wants_documents(&self) -> bool {
        matches!(self, Route::Unstructured | Route::Both)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router output, with the scores kept for tracing and the API trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterDecision {
    pub route: Route,
    pub structured_score: usize,
    pub unstructured_score: usize,
}

/// Which search pass surfaced a retrieved chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Vector,
    Keyword,
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source: String,
    pub text: String,
    pub score: f64,
    pub found_by: MatchSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: &str, subtotal: &str, tax: &str) -> InvoiceRecord {
        InvoiceRecord {
            invoice_id: "INV-2024-001".to_string(),
            vendor: "Cloud Services Inc".to_string(),
            amount: amount.parse().unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2024, 10, 3).unwrap(),
            due_date: None,
            status: InvoiceStatus::Pending,
            payment_terms: PaymentTerms::Net30,
            po_number: None,
            category: Category::It,
            department: Department::Engineering,
            subtotal: subtotal.parse().unwrap(),
            tax_rate: 0.08,
            tax_amount: tax.parse().unwrap(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_parse_variants() {
        assert_eq!("pending".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Pending);
        assert_eq!("On Hold".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::OnHold);
        assert_eq!("on-hold".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::OnHold);
        assert_eq!("Canceled".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Cancelled);
        assert!("archived".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_status_display_roundtrips() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.to_string().parse::<InvoiceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_label_sets() {
        assert_eq!("it".parse::<Category>().unwrap(), Category::It);
        assert_eq!("".parse::<Category>().unwrap(), Category::Other);
        assert_eq!("hr".parse::<Department>().unwrap(), Department::Hr);
        assert_eq!("".parse::<Department>().unwrap(), Department::Unassigned);
        assert!("Catering".parse::<Category>().is_err());
    }

    #[test]
    fn test_payment_terms() {
        assert_eq!("NET-30".parse::<PaymentTerms>().unwrap(), PaymentTerms::Net30);
        assert_eq!(
            "Due on receipt".parse::<PaymentTerms>().unwrap(),
            PaymentTerms::DueOnReceipt
        );
        assert_eq!(
            "2/10 Net 30".parse::<PaymentTerms>().unwrap(),
            PaymentTerms::Other("2/10 Net 30".to_string())
        );
    }

    #[test]
    fn test_validate_amount_invariant() {
        assert!(record("108.00", "100.00", "8.00").validate().is_ok());
        let err = record("110.00", "100.00", "8.00").validate().unwrap_err();
        assert!(err.to_string().contains("INV-2024-001"));
    }

    #[test]
    fn test_doc_type_inference() {
        assert_eq!(DocType::infer("INV-2024-001_invoice.md"), DocType::InvoiceDerived);
        assert_eq!(DocType::infer("audit_report_2024_Q4.md"), DocType::Report);
    }

    #[test]
    fn test_route_flags() {
        assert!(Route::Both.wants_structured() && Route::Both.wants_documents());
        assert!(!Route::Structured.wants_documents());
        assert!(!Route::Unstructured.wants_structured());
    }
}
