//! # learnbase
//!
//! A local-first store for math and machine-learning learning content.
//!
//! Content is authored as markdown with YAML frontmatter. The ingestion
//! pipeline splits off the frontmatter, pulls code blocks, display formulas
//! and images out of the body, validates the result and reconciles it with
//! the store by title. Stored content is exposed through a CLI and a JSON
//! HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌────────────┐
//! │ .md files /  │──▶│ frontmatter+extract │──▶│ reconciler │
//! │ HTTP uploads │   │  → payload (valid)  │   │  by title  │
//! └──────────────┘   └─────────────────────┘   └─────┬──────┘
//!                                                    ▼
//!                                              ┌──────────┐
//!                                              │  SQLite  │
//!                                              └────┬─────┘
//!                                    ┌──────────────┤
//!                                    ▼              ▼
//!                               ┌─────────┐    ┌──────────┐
//!                               │   CLI   │    │   HTTP   │
//!                               │ (lbase) │    │  (axum)  │
//!                               └─────────┘    └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion error type |
//! | [`frontmatter`] | YAML frontmatter splitting |
//! | [`extract`] | Code, formula and image extraction |
//! | [`payload`] | Payload assembly and validation |
//! | [`ingest`] | Upsert-by-title reconciler and batch import |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`content`] | Listing and retrieval |
//! | [`search`] | Substring search |
//! | [`server`] | HTTP API |
//! | [`auth`] | User accounts, tokens and favorites |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod extract;
pub mod frontmatter;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod search;
pub mod server;
pub mod store;
