//! Main catalog crate providing typed access to a library catalog held in a
//! JSON document store.
//!
//! This crate is the primary entry point for users of the catalog. It re-exports the
//! core types from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Typed records** - Books, users, products and orders as serde types
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//! - **Composable queries** - Filters, merge patches and aggregation pipelines
//! - **Diagnosable failures** - Every error names its operation, collection and input
//!
//! # Quick Start
//!
//! ```ignore
//! use catalog::{prelude::*, memory::InMemoryStore};
//! use futures::TryStreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = CatalogService::new(InMemoryStore::builder().build().await?);
//!     let books = catalog.typed_collection::<Book>();
//!
//!     books.create().await?;
//!     books.insert_many(&Book::samples()).await?;
//!
//!     // Books by a specific author
//!     let rowling = books
//!         .find(Filter::eq("author", "J.K. Rowling"))
//!         .await?
//!         .try_collect::<Vec<_>>()
//!         .await?;
//!
//!     // Correct a publication year
//!     books
//!         .update_one(Filter::eq("title", "The Great Gatsby"), Patch::set("publishedYear", 1926))
//!         .await?;
//!
//!     // Count books per genre
//!     let per_genre = books
//!         .aggregate(Pipeline::new().group_by("genre", [("totalBooks", Reducer::Count)]))
//!         .await?;
//!
//!     catalog.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use catalog_core::{backend, collection, config, error, filter, model, patch, pipeline, record, service};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use catalog_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use catalog_mongodb::{MongoDbStore, MongoDbStoreBuilder, error::categorize};
}
