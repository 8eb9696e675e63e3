//! Convenient re-exports of commonly used types from the catalog.
//!
//! ```ignore
//! use catalog::prelude::*;
//! ```

pub use catalog_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome, WriteScope},
    collection::TypedCollection,
    config::{ConnectionConfig, Credentials},
    error::{CatalogError, CatalogResult, ConfigError, ErrorKind, Operation, StoreError, StoreResult},
    filter::{Condition, Filter, FilterVisitor},
    model::{Book, Order, OrderLine, Product, User},
    patch::Patch,
    pipeline::{Pipeline, Reducer, SortDirection, Stage},
    record::{Record, RecordExt, RecordId, Stored},
    service::{CatalogService, RecordStream},
};
