//! In-memory catalog storage backend.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is intended for
//! development and tests.
//!
//! # Features
//!
//! - **Document-database semantics** - Filters, patches and pipelines behave like a document store
//! - **Store order** - Records are returned in insertion order
//! - **Atomic calls** - Each operation holds the store lock for its whole duration
//!
//! # Quick Start
//!
//! ```ignore
//! use catalog::prelude::*;
//! use catalog::memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = CatalogService::new(InMemoryStore::builder().build().await?);
//!     let ids = catalog.insert_many("books", &Book::samples()).await?;
//!     assert_eq!(ids.len(), 5);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as catalog_memory;

mod aggregate;
mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
