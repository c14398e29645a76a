//! # Audit Assistant Core
//!
//! Query routing, structured planning, hybrid retrieval, and answer
//! generation for accounting question answering. This crate holds the
//! storage-agnostic logic; the `audit-assistant` crate adds SQLite
//! persistence, network providers, the HTTP server, and the CLI.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`router`] | Lexical classification into structured / unstructured / both |
//! | [`planner`] | Rule-table selection and execution of invoice aggregates |
//! | [`search`] | Hybrid (vector + BM25) chunk retrieval with snapshot corpus |
//! | [`context`] | Merges evidence into a single context block |
//! | [`answer`] | Model-backed and canned answer strategies |
//! | [`engine`] | The end-to-end [`AuditAssistant`](engine::AuditAssistant) pipeline |
//! | [`store`] | Invoice and chunk store traits, in-memory backends |
//! | [`index`] | Vector and keyword index traits and implementations |
//! | [`embedding`] | `Embedder` trait, offline hash embedder, vector helpers |
//! | [`chunk`] | Paragraph-boundary document splitter |
//! | [`models`] | Records, chunks, routes |
//! | [`money`] | Exact cent amounts |

pub mod answer;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod models;
pub mod money;
pub mod planner;
pub mod router;
pub mod search;
pub mod store;
pub mod text;

pub use error::{AuditError, Result};
