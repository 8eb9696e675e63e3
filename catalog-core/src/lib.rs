//! A thin, typed library catalog layer over JSON document stores.
//!
//! This crate is the core of the catalog project and provides:
//!
//! - **Records** ([`record`]) - Traits for serializing catalog entities to store documents
//! - **Catalog model** ([`model`]) - Books, users, products and orders
//! - **Filters, patches and pipelines** ([`filter`], [`patch`], [`pipeline`]) - Typed query construction
//! - **Store backend abstraction** ([`backend`]) - The trait concrete document stores implement
//! - **Catalog service** ([`service`]) - The operations, with validation, context and logging
//! - **Typed collections** ([`collection`]) - Collection handles bound to a record type
//! - **Connection config** ([`config`]) - Host, credentials, database and timeout settings
//! - **Error handling** ([`error`]) - The catalog's error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use catalog::prelude::*;
//! use catalog::memory::InMemoryStore;
//!
//! let catalog = CatalogService::new(InMemoryStore::new());
//! let books = catalog.typed_collection::<Book>();
//!
//! books.create().await?;
//! books.insert_many(&Book::samples()).await?;
//!
//! let per_genre = books
//!     .aggregate(Pipeline::new().group_by("genre", [("totalBooks", Reducer::Count)]))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as catalog_core;

pub mod backend;
pub mod collection;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod patch;
pub mod pipeline;
pub mod record;
pub mod service;
