//! # Groundwork
//!
//! Grounded question answering over a private document collection.
//!
//! Documents are chunked, embedded, and stored in SQLite. Questions are
//! answered either by a single retrieve-then-answer pass over the most
//! similar chunks, or by a bounded tool loop in which the language model
//! searches and reads documents itself. Every answer carries citations
//! back to the documents that supplied its evidence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ Document │──▶│ Chunk+Embed  │──▶│      SQLite       │
//! │   text   │   │  (ingest)    │   │ embeddings + FTS5 │
//! └──────────┘   └──────────────┘   └────────┬─────────┘
//!                                            │
//!                  ┌─────────────────────────┤
//!                  ▼                         ▼
//!          ┌───────────────┐        ┌────────────────┐
//!          │ retrieve +    │        │  agent loop    │
//!          │ synthesize    │        │ search / fetch │
//!          └───────┬───────┘        └───────┬────────┘
//!                  └──────────┬─────────────┘
//!                             ▼
//!                   ┌───────────────────┐
//!                   │  CLI (gw) / HTTP  │
//!                   └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gw init
//! gw add ./w2-2023.txt --type tax --year 2023
//! gw ask "What were my wages in 2023?"
//! gw chat "What is my adjusted gross income?"
//! gw serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`openai`] | Shared OpenAI HTTP plumbing |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion providers |
//! | [`ingest`] | Embedding generation |
//! | [`retrieve`] | Vector retrieval |
//! | [`lexical`] | Keyword search and document fetch |
//! | [`synthesize`] | Grounded answer synthesis |
//! | [`tools`] | Tools exposed to the model |
//! | [`agent`] | Tool-driven answer loop |
//! | [`cancel`] | Request cancellation |
//! | [`app`] | Component wiring |
//! | [`server`] | HTTP server |

pub mod agent;
pub mod app;
pub mod cancel;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod lexical;
pub mod llm;
pub mod migrate;
pub mod openai;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
pub mod synthesize;
pub mod tools;
