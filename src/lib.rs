//! # Audit Assistant
//!
//! Application shell around [`audit_assistant_core`]: SQLite persistence,
//! embedding and completion providers, ingestion, and the CLI / HTTP
//! surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CSV / .md │──▶│   Ingest     │──▶│   SQLite     │
//! │   files   │   │ chunk+embed  │   │ invoices +   │
//! └───────────┘   └──────────────┘   │ chunks       │
//!                                    └──────┬───────┘
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │(auditor) │        │  /query  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Service wiring and startup bootstrap |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite invoice and chunk stores |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Chat completion client and answer strategy selection |
//! | [`http`] | JSON POST with retry |
//! | [`ingest`] | CSV seeding and document ingestion |
//! | [`server`] | HTTP API |

pub mod app;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
