//! MongoDB backend implementation for the catalog.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, patches and pipelines are sent to the server in their native query
//! document form, so the server's own matching and aggregation semantics apply.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! catalog = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Build the store from a DSN and database name, or from a
//! [`ConnectionConfig`](catalog_core::config::ConnectionConfig), whose connect timeout
//! bounds both connection establishment and server selection.
//!
//! # Errors
//!
//! Driver errors are categorized by [`error::categorize`]: network failures and
//! rejected credentials become connection errors, timeouts become timeouts, and
//! server-side rejections of malformed input become validation errors.
//!
//! # Example
//!
//! ```ignore
//! use catalog::{backend::StoreBackendBuilder, config::ConnectionConfig, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::from_toml_str(r#"host = "localhost""#)?;
//!     let store = MongoDbStore::from_config(&config).build().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as catalog_mongodb;

pub mod error;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
