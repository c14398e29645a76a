//! Lexical query router.
//!
//! Scores a query against two keyword sets and picks the evidence source(s)
//! to consult:
//!
//! | Structured score vs unstructured score | Route |
//! |----------------------------------------|-------|
//! | both zero | `both` |
//! | structured greater | `structured` |
//! | unstructured greater | `unstructured` |
//! | equal and non-zero | `both` |
//!
//! A score is the number of *distinct* keywords of a set found in the query.
//! Keywords match on word boundaries (see [`contains_phrase`]): `sum` does
//! not fire inside `summary`, `count` does not fire inside `accounting`,
//! while `invoice` matches `invoices`.

use tracing::debug;

use crate::models::{Route, RouterDecision};
use crate::text::{contains_phrase, tokenize};

pub const DEFAULT_STRUCTURED_KEYWORDS: &[&str] = &[
    "invoice",
    "vendor",
    "supplier",
    "amount",
    "total",
    "sum",
    "count",
    "how many",
    "how much",
    "list all",
    "paid",
    "pending",
    "overdue",
    "approved",
    "rejected",
    "cancelled",
    "on hold",
    "status",
    "category",
    "department",
    "payment",
    "spend",
];

pub const DEFAULT_UNSTRUCTURED_KEYWORDS: &[&str] = &[
    "report",
    "audit",
    "analysis",
    "summary",
    "growth",
    "compliance",
    "revenue",
    "gaap",
    "quarter",
    "quarterly",
    "q1",
    "q2",
    "q3",
    "q4",
    "trend",
    "findings",
    "recommendation",
    "risk",
];

#[derive(Debug, Clone)]
struct Keyword {
    words: Vec<String>,
}

impl Keyword {
    fn parse(phrase: &str) -> Option<Self> {
        let words = tokenize(phrase);
        (!words.is_empty()).then_some(Self { words })
    }
}

/// Pure, deterministic query classifier. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    structured: Vec<Keyword>,
    unstructured: Vec<Keyword>,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new(DEFAULT_STRUCTURED_KEYWORDS, DEFAULT_UNSTRUCTURED_KEYWORDS)
    }
}

impl QueryRouter {
    /// Build a router from two keyword lists. Blank entries are ignored;
    /// repeated entries count once.
    pub fn new<S: AsRef<str>>(structured: &[S], unstructured: &[S]) -> Self {
        Self {
            structured: parse_set(structured),
            unstructured: parse_set(unstructured),
        }
    }

    pub fn classify(&self, query: &str) -> RouterDecision {
        let tokens = tokenize(query);
        let structured_score = score(&self.structured, &tokens);
        let unstructured_score = score(&self.unstructured, &tokens);

        let route = match structured_score.cmp(&unstructured_score) {
            std::cmp::Ordering::Greater => Route::Structured,
            std::cmp::Ordering::Less => Route::Unstructured,
            std::cmp::Ordering::Equal => Route::Both,
        };

        debug!(
            route = route.as_str(),
            structured_score, unstructured_score, "classified query"
        );
        RouterDecision {
            route,
            structured_score,
            unstructured_score,
        }
    }
}

fn parse_set<S: AsRef<str>>(phrases: &[S]) -> Vec<Keyword> {
    let mut out: Vec<Keyword> = Vec::new();
    for phrase in phrases {
        if let Some(kw) = Keyword::parse(phrase.as_ref()) {
            if !out.iter().any(|k| k.words == kw.words) {
                out.push(kw);
            }
        }
    }
    out
}

fn score(keywords: &[Keyword], tokens: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| contains_phrase(tokens, &k.words))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(q: &str) -> Route {
        QueryRouter::default().classify(q).route
    }

    #[test]
    fn test_structured_only_query() {
        let d = QueryRouter::default().classify("How many invoices are pending?");
        assert_eq!(d.route, Route::Structured);
        assert_eq!(d.structured_score, 3);
        assert_eq!(d.unstructured_score, 0);
    }

    #[test]
    fn test_unstructured_only_query() {
        assert_eq!(route("Show me the Q4 audit report"), Route::Unstructured);
        assert_eq!(route("Summarize the GAAP compliance findings"), Route::Unstructured);
    }

    #[test]
    fn test_no_keywords_falls_back_to_both() {
        let d = QueryRouter::default().classify("hello");
        assert_eq!(d.route, Route::Both);
        assert_eq!((d.structured_score, d.unstructured_score), (0, 0));
        assert_eq!(route(""), Route::Both);
    }

    #[test]
    fn test_tie_routes_to_both() {
        // invoice vs audit
        assert_eq!(route("invoice audit"), Route::Both);
    }

    #[test]
    fn test_word_boundaries() {
        // "summary" must not also count as "sum"
        let d = QueryRouter::default().classify("executive summary");
        assert_eq!(d.structured_score, 0);
        assert_eq!(d.unstructured_score, 1);
        // "accounting" must not count as "count"
        assert_eq!(QueryRouter::default().classify("accounting").structured_score, 0);
    }

    #[test]
    fn test_distinct_keywords_counted_once() {
        let d = QueryRouter::default().classify("report report report invoice invoice");
        assert_eq!(d.structured_score, 1);
        assert_eq!(d.unstructured_score, 1);
        assert_eq!(d.route, Route::Both);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(route("PENDING INVOICES"), Route::Structured);
    }

    #[test]
    fn test_deterministic() {
        let router = QueryRouter::default();
        let q = "total revenue growth by vendor";
        assert_eq!(router.classify(q), router.classify(q));
    }

    #[test]
    fn test_custom_keyword_sets() {
        let router = QueryRouter::new(&["ledger"], &["memo", "memo", " "]);
        assert_eq!(router.classify("ledger entries").route, Route::Structured);
        assert_eq!(router.classify("the memo").unstructured_score, 1);
        assert_eq!(router.classify("invoice").route, Route::Both);
    }
}
