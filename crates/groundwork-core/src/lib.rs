//! # Groundwork Core
//!
//! Runtime-agnostic building blocks of the retrieval-and-grounding pipeline:
//! data models, the position-tracking chunker, provider traits for
//! embeddings and language models, the [`Store`](store::Store) abstraction,
//! lexical query parsing and headline generation, citation deduplication,
//! and the prompt builders shared by the answer paths.
//!
//! This crate contains no tokio, sqlx, or network code. Concrete backends
//! (SQLite, OpenAI) live in the `groundwork` app crate.

pub mod chunk;
pub mod citations;
pub mod embedding;
pub mod lexical;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod store;
