//! Structured query planner.
//!
//! Turns a query with structured intent into exactly one [`Plan`] and runs
//! it against an [`InvoiceStore`]. Selection is an ordered rule table; the
//! first rule whose predicate holds wins:
//!
//! | # | Rule | Plan |
//! |---|------|------|
//! | 1 | count intent, no status / grouping / vendor | [`Plan::TotalCount`] |
//! | 2 | a status word | [`Plan::ByStatus`] |
//! | 3 | vendor dimension, no vendor named | [`Plan::GroupTotals`] by vendor |
//! | 4 | category dimension | [`Plan::GroupTotals`] by category |
//! | 5 | department dimension | [`Plan::GroupTotals`] by department |
//! | 6 | a known vendor name | [`Plan::VendorLookup`] |
//! | 7 | always | [`Plan::Sample`] |
//!
//! Output is formatted text for the model context. The first line is always
//! a headline carrying the count and the dollar sum.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{InvoiceRecord, InvoiceStatus};
use crate::money::Money;
use crate::store::{GroupBy, InvoiceFilter, InvoiceStore};
use crate::text::{contains_phrase, tokenize};

pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

const COUNT_PHRASES: &[&str] = &["how many", "count", "number of", "total number"];
const VENDOR_WORDS: &[&str] = &["vendor", "supplier"];
const CATEGORY_WORDS: &[&str] = &["category"];
const DEPARTMENT_WORDS: &[&str] = &["department", "dept"];

/// Words too common to identify a vendor on their own.
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "by", "do", "for", "from", "in", "is", "me", "my",
    "of", "on", "or", "our", "show", "the", "to", "we", "with",
];

/// A vendor name is matchable when at least one of its words is
/// distinctive (two or more characters and not a stopword).
fn is_distinctive(words: &[String]) -> bool {
    words
        .iter()
        .any(|w| w.chars().count() > 1 && !STOPWORDS.contains(&w.as_str()))
}

const STATUS_PHRASES: &[(InvoiceStatus, &[&str])] = &[
    (InvoiceStatus::Pending, &["pending"]),
    (InvoiceStatus::Paid, &["paid"]),
    (InvoiceStatus::Overdue, &["overdue", "past due"]),
    (InvoiceStatus::Approved, &["approved"]),
    (InvoiceStatus::Rejected, &["rejected"]),
    (InvoiceStatus::Cancelled, &["cancelled", "canceled"]),
    (InvoiceStatus::OnHold, &["on hold"]),
];

/// The operation chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Plan {
    TotalCount,
    ByStatus(InvoiceStatus),
    GroupTotals(#[serde(serialize_with = "serialize_group")] GroupBy),
    VendorLookup(String),
    Sample,
}

fn serialize_group<S: serde::Serializer>(g: &GroupBy, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(g.label())
}

/// Planner output: the plan that ran and its rendered text.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredSummary {
    pub plan: Plan,
    /// Number of invoices the plan covered (0 means "no matching records").
    pub matched: u64,
    pub text: String,
}

impl StructuredSummary {
    pub fn headline(&self) -> &str {
        self.text.lines().next().unwrap_or_default()
    }

    /// Group or record lines under the headline, without the `- ` bullet,
    /// in the order the planner ranked them.
    pub fn details(&self) -> impl Iterator<Item = &str> {
        self.text.lines().skip(1).filter_map(|l| l.strip_prefix("- "))
    }
}

/// Lexical features of a query that the rule table reads.
struct Signals {
    count_intent: bool,
    status: Option<InvoiceStatus>,
    mentions_vendor: bool,
    mentions_category: bool,
    mentions_department: bool,
    named_vendor: Option<String>,
}

impl Signals {
    fn extract(query: &str, vendors: &[String]) -> Self {
        let tokens = tokenize(query);
        let any = |phrases: &[&str]| phrases.iter().any(|p| contains_phrase(&tokens, &tokenize(p)));

        let status = STATUS_PHRASES
            .iter()
            .find(|(_, phrases)| any(*phrases))
            .map(|(s, _)| *s);

        // Longest name wins so "Cloud Services Inc" beats a shorter overlap;
        // `vendors` arrives sorted, which fixes ties.
        let named_vendor = vendors
            .iter()
            .filter_map(|v| {
                let words = tokenize(v);
                let hit = is_distinctive(&words)
                    && words.len() <= tokens.len()
                    && tokens.windows(words.len()).any(|w| w == words.as_slice());
                hit.then_some((words.len(), v))
            })
            .fold(None::<(usize, &String)>, |best, cur| match best {
                Some(b) if b.0 >= cur.0 => Some(b),
                _ => Some(cur),
            })
            .map(|(_, v)| v.clone());

        Self {
            count_intent: any(COUNT_PHRASES),
            status,
            mentions_vendor: any(VENDOR_WORDS),
            mentions_category: any(CATEGORY_WORDS),
            mentions_department: any(DEPARTMENT_WORDS),
            named_vendor,
        }
    }

    fn has_grouping(&self) -> bool {
        self.mentions_vendor || self.mentions_category || self.mentions_department
    }
}

struct Rule {
    name: &'static str,
    select: fn(&Signals) -> Option<Plan>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "total_count",
        select: |s| {
            (s.count_intent && s.status.is_none() && !s.has_grouping() && s.named_vendor.is_none())
                .then_some(Plan::TotalCount)
        },
    },
    Rule {
        name: "status",
        select: |s| s.status.map(Plan::ByStatus),
    },
    Rule {
        name: "vendor_totals",
        select: |s| {
            (s.mentions_vendor && s.named_vendor.is_none()).then_some(Plan::GroupTotals(GroupBy::Vendor))
        },
    },
    Rule {
        name: "category_totals",
        select: |s| s.mentions_category.then_some(Plan::GroupTotals(GroupBy::Category)),
    },
    Rule {
        name: "department_totals",
        select: |s| s.mentions_department.then_some(Plan::GroupTotals(GroupBy::Department)),
    },
    Rule {
        name: "vendor_lookup",
        select: |s| s.named_vendor.clone().map(Plan::VendorLookup),
    },
    Rule {
        name: "sample",
        select: |_| Some(Plan::Sample),
    },
];

/// Pure plan selection against a known vendor list.
pub fn select_plan(query: &str, vendors: &[String]) -> Plan {
    let signals = Signals::extract(query, vendors);
    for rule in RULES {
        if let Some(plan) = (rule.select)(&signals) {
            debug!(rule = rule.name, ?plan, "selected structured plan");
            return plan;
        }
    }
    Plan::Sample
}

pub struct StructuredPlanner {
    store: Arc<dyn InvoiceStore>,
    list_limit: usize,
    sample_size: usize,
}

impl StructuredPlanner {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self {
            store,
            list_limit: DEFAULT_LIST_LIMIT,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_limits(mut self, list_limit: usize, sample_size: usize) -> Self {
        self.list_limit = list_limit;
        self.sample_size = sample_size;
        self
    }

    /// Select a plan for `query` and run it. Store failures propagate as
    /// [`AuditError::StoreUnavailable`](crate::error::AuditError::StoreUnavailable).
    pub async fn plan_and_run(&self, query: &str) -> Result<StructuredSummary> {
        let vendors = self.store.vendors().await?;
        let plan = select_plan(query, &vendors);
        self.run(plan).await
    }

    pub async fn run(&self, plan: Plan) -> Result<StructuredSummary> {
        let (matched, text) = match &plan {
            Plan::TotalCount => {
                let t = self.store.totals(&InvoiceFilter::all()).await?;
                (
                    t.count,
                    format!("Total invoices: {} totaling {}", t.count, t.total.usd()),
                )
            }
            Plan::ByStatus(status) => {
                let filter = InvoiceFilter::status(*status);
                let t = self.store.totals(&filter).await?;
                if t.count == 0 {
                    (0, format!("No matching records with status {}.", status))
                } else {
                    let rows = self.store.query(&filter.with_limit(self.list_limit)).await?;
                    let mut text =
                        format!("{} invoices: {} totaling {}", status, t.count, t.total.usd());
                    push_listing(&mut text, &rows, t.count);
                    (t.count, text)
                }
            }
            Plan::GroupTotals(group_by) => {
                let groups = self.store.aggregate(*group_by, &InvoiceFilter::all()).await?;
                let count: u64 = groups.iter().map(|g| g.count).sum();
                if groups.is_empty() {
                    (0, "No matching records in the invoice table.".to_string())
                } else {
                    let total = groups.iter().map(|g| g.total).sum::<Money>();
                    let mut text = format!(
                        "Invoice totals by {}: {} invoices totaling {} across {} {}",
                        group_by.label(),
                        count,
                        total.usd(),
                        groups.len(),
                        if groups.len() == 1 {
                            group_by.label()
                        } else {
                            group_by.plural_label()
                        }
                    );
                    for g in &groups {
                        text.push_str(&format!(
                            "\n- {}: {} ({} invoice{})",
                            g.key,
                            g.total.usd(),
                            g.count,
                            if g.count == 1 { "" } else { "s" }
                        ));
                    }
                    (count, text)
                }
            }
            Plan::VendorLookup(vendor) => {
                let filter = InvoiceFilter::vendor(vendor.clone());
                let t = self.store.totals(&filter).await?;
                if t.count == 0 {
                    (0, format!("No matching records for vendor {}.", vendor))
                } else {
                    let rows = self.store.query(&filter.with_limit(self.list_limit)).await?;
                    let mut text = format!(
                        "Invoices from {}: {} totaling {}",
                        vendor,
                        t.count,
                        t.total.usd()
                    );
                    push_listing(&mut text, &rows, t.count);
                    (t.count, text)
                }
            }
            Plan::Sample => {
                let t = self.store.totals(&InvoiceFilter::all()).await?;
                if t.count == 0 {
                    (0, "No matching records: the invoice table is empty.".to_string())
                } else {
                    let rows = self
                        .store
                        .query(&InvoiceFilter::all().with_limit(self.sample_size))
                        .await?;
                    let mut text = format!(
                        "Invoices on file: {} totaling {}",
                        t.count,
                        t.total.usd()
                    );
                    push_listing(&mut text, &rows, t.count);
                    (t.count, text)
                }
            }
        };

        Ok(StructuredSummary {
            plan,
            matched,
            text,
        })
    }
}

fn push_listing(text: &mut String, rows: &[InvoiceRecord], total: u64) {
    if rows.is_empty() {
        return;
    }
    if (rows.len() as u64) < total {
        text.push_str(&format!("\nMost recent {} of {}:", rows.len(), total));
    } else {
        text.push_str("\nRecords:");
    }
    for r in rows {
        text.push_str("\n- ");
        text.push_str(&r.summary_line());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::models::{Category, Department, PaymentTerms};
    use crate::store::memory::MemoryInvoiceStore;
    use crate::store::{GroupTotal, Totals};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    fn invoice(
        id: &str,
        vendor: &str,
        subtotal: i64,
        tax: i64,
        status: InvoiceStatus,
        category: Category,
    ) -> InvoiceRecord {
        InvoiceRecord {
            invoice_id: id.to_string(),
            vendor: vendor.to_string(),
            amount: Money::from_cents(subtotal + tax),
            issue_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            due_date: None,
            status,
            payment_terms: PaymentTerms::Net30,
            po_number: None,
            category,
            department: Department::Operations,
            subtotal: Money::from_cents(subtotal),
            tax_rate: 0.08,
            tax_amount: Money::from_cents(tax),
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn vendors() -> Vec<String> {
        vec![
            "Clean & Green".to_string(),
            "Cloud Services Inc".to_string(),
            "Marketing Pros".to_string(),
        ]
    }

    fn planner(records: Vec<InvoiceRecord>) -> StructuredPlanner {
        StructuredPlanner::new(Arc::new(MemoryInvoiceStore::with_records(records)))
    }

    #[test]
    fn test_rule_order() {
        let v = vendors();
        assert_eq!(select_plan("How many invoices do we have?", &v), Plan::TotalCount);
        assert_eq!(
            select_plan("How many invoices are pending?", &v),
            Plan::ByStatus(InvoiceStatus::Pending)
        );
        assert_eq!(
            select_plan("invoices on hold", &v),
            Plan::ByStatus(InvoiceStatus::OnHold)
        );
        assert_eq!(
            select_plan("total spend by vendor", &v),
            Plan::GroupTotals(GroupBy::Vendor)
        );
        assert_eq!(
            select_plan("breakdown by categories", &v),
            Plan::GroupTotals(GroupBy::Category)
        );
        assert_eq!(
            select_plan("spend per department", &v),
            Plan::GroupTotals(GroupBy::Department)
        );
        assert_eq!(
            select_plan("show invoices from Cloud Services Inc", &v),
            Plan::VendorLookup("Cloud Services Inc".to_string())
        );
        assert_eq!(select_plan("hello", &v), Plan::Sample);
    }

    #[test]
    fn test_vendor_and_department_precedence() {
        // Vendor grouping outranks department grouping.
        assert_eq!(
            select_plan("vendor totals per department", &vendors()),
            Plan::GroupTotals(GroupBy::Vendor)
        );
        // A named vendor disables vendor grouping but not department grouping.
        assert_eq!(
            select_plan("Marketing Pros vendor spend per department", &vendors()),
            Plan::GroupTotals(GroupBy::Department)
        );
    }

    #[test]
    fn test_stopword_vendor_name_is_not_matched() {
        let v = vec!["A".to_string(), "The Print Shop".to_string()];
        assert_eq!(select_plan("show me a summary", &v), Plan::Sample);
        assert_eq!(
            select_plan("invoices from the print shop", &v),
            Plan::VendorLookup("The Print Shop".to_string())
        );
    }

    #[test]
    fn test_details_skip_headline_and_captions() {
        let summary = StructuredSummary {
            plan: Plan::Sample,
            matched: 2,
            text: "Invoices on file: 2 totaling $3.00\nRecords:\n- INV-1 | A\n- INV-2 | B".to_string(),
        };
        assert_eq!(summary.details().collect::<Vec<_>>(), vec!["INV-1 | A", "INV-2 | B"]);
    }

    #[test]
    fn test_count_with_vendor_name_is_lookup() {
        assert_eq!(
            select_plan("how many invoices from clean & green", &vendors()),
            Plan::VendorLookup("Clean & Green".to_string())
        );
    }

    #[tokio::test]
    async fn test_count_on_empty_store_is_zero() {
        let summary = planner(Vec::new()).run(Plan::TotalCount).await.unwrap();
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.headline(), "Total invoices: 0 totaling $0.00");
    }

    #[tokio::test]
    async fn test_status_plan_headline_and_listing() {
        let records = (0..20)
            .map(|i| {
                invoice(
                    &format!("INV-{:03}", i),
                    "Cloud Services Inc",
                    100_000,
                    8_000,
                    InvoiceStatus::Pending,
                    Category::It,
                )
            })
            .collect();
        let summary = planner(records)
            .plan_and_run("How many invoices are pending?")
            .await
            .unwrap();
        assert_eq!(summary.plan, Plan::ByStatus(InvoiceStatus::Pending));
        assert_eq!(summary.matched, 20);
        assert!(summary.headline().contains("20"));
        assert!(summary.headline().contains("$21,600.00"));
        assert!(summary.text.contains("Most recent 10 of 20"));
    }

    #[tokio::test]
    async fn test_vendor_sum_equals_subtotal_plus_tax() {
        let records = vec![
            invoice("INV-1", "Marketing Pros", 123_45, 9_88, InvoiceStatus::Paid, Category::Marketing),
            invoice("INV-2", "Marketing Pros", 1_000_00, 80_00, InvoiceStatus::Pending, Category::Marketing),
            invoice("INV-3", "Clean & Green", 50_00, 4_00, InvoiceStatus::Paid, Category::Operations),
        ];
        let expected: Money = records
            .iter()
            .filter(|r| r.vendor == "Marketing Pros")
            .map(|r| r.subtotal + r.tax_amount)
            .sum();
        let summary = planner(records)
            .run(Plan::VendorLookup("Marketing Pros".to_string()))
            .await
            .unwrap();
        assert_eq!(summary.matched, 2);
        assert!(summary.headline().ends_with(&expected.usd()));
    }

    #[tokio::test]
    async fn test_empty_filter_is_explicit_text() {
        let records = vec![invoice(
            "INV-1",
            "Clean & Green",
            10_00,
            0,
            InvoiceStatus::Paid,
            Category::Supplies,
        )];
        let summary = planner(records)
            .run(Plan::ByStatus(InvoiceStatus::Overdue))
            .await
            .unwrap();
        assert_eq!(summary.matched, 0);
        assert!(summary.text.starts_with("No matching records"));
    }

    #[tokio::test]
    async fn test_group_totals_sorted() {
        let records = vec![
            invoice("INV-1", "A", 10_00, 0, InvoiceStatus::Paid, Category::Legal),
            invoice("INV-2", "B", 500_00, 0, InvoiceStatus::Paid, Category::It),
            invoice("INV-3", "C", 20_00, 0, InvoiceStatus::Paid, Category::Legal),
        ];
        let summary = planner(records)
            .run(Plan::GroupTotals(GroupBy::Category))
            .await
            .unwrap();
        let lines: Vec<&str> = summary.text.lines().collect();
        assert_eq!(
            lines[0],
            "Invoice totals by category: 3 invoices totaling $530.00 across 2 categories"
        );
        assert_eq!(lines[1], "- IT: $500.00 (1 invoice)");
        assert_eq!(lines[2], "- Legal: $30.00 (2 invoices)");
    }

    #[tokio::test]
    async fn test_sample_respects_sample_size() {
        let records = (0..8)
            .map(|i| invoice(&format!("INV-{}", i), "A", 1_00, 0, InvoiceStatus::Paid, Category::It))
            .collect();
        let summary = planner(records)
            .with_limits(10, 3)
            .run(Plan::Sample)
            .await
            .unwrap();
        assert_eq!(summary.text.lines().filter(|l| l.starts_with("- ")).count(), 3);
    }

    struct DownStore;

    #[async_trait]
    impl InvoiceStore for DownStore {
        async fn query(&self, _: &InvoiceFilter) -> Result<Vec<InvoiceRecord>> {
            Err(AuditError::store_unavailable("connection refused"))
        }
        async fn totals(&self, _: &InvoiceFilter) -> Result<Totals> {
            Err(AuditError::store_unavailable("connection refused"))
        }
        async fn aggregate(&self, _: GroupBy, _: &InvoiceFilter) -> Result<Vec<GroupTotal>> {
            Err(AuditError::store_unavailable("connection refused"))
        }
        async fn vendors(&self) -> Result<Vec<String>> {
            Err(AuditError::store_unavailable("connection refused"))
        }
        async fn insert(&self, _: &[InvoiceRecord]) -> Result<usize> {
            Err(AuditError::store_unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let planner = StructuredPlanner::new(Arc::new(DownStore));
        let err = planner.plan_and_run("how many invoices").await.unwrap_err();
        assert!(matches!(err, AuditError::StoreUnavailable { .. }));
    }
}
