//! Storage backend abstraction for the catalog.
//!
//! The [`StoreBackend`] trait is the only seam between the catalog and a concrete
//! document store. Each method is a single request against the store; backends add
//! no retries, caching or cross-call state of their own.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. Whether concurrent calls are safe beyond
//! that is a property of the underlying client and should be documented by the
//! implementer.
//!
//! # Error Handling
//!
//! Backends categorize their failures into [`StoreError`](crate::error::StoreError)
//! variants and pass the store's message through unchanged.

use std::fmt::Debug;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

use crate::{
    error::StoreResult,
    filter::Filter,
    patch::Patch,
    pipeline::{Pipeline, SortDirection},
    record::RecordId,
};

/// A stored document paired with its identifier. The document excludes `_id`.
pub type RawRecord = (RecordId, Document);

/// Lazily produced records returned by [`StoreBackend::find_records`].
pub type RawRecordStream = BoxStream<'static, StoreResult<RawRecord>>;

/// How many matching records a write touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Only the first match in store order.
    First,
    /// Every match.
    All,
}

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Records the filter selected.
    pub matched: u64,
    /// Records whose content actually changed.
    pub modified: u64,
}

/// Name given to a single-field index: `<field>_<1|-1>`.
pub fn index_name(field: &str, direction: SortDirection) -> String {
    format!("{field}_{}", direction.as_i32())
}

/// Abstract interface for document storage backends.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Ensures a collection exists. Succeeds if it already does.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// Drops a collection and all its records.
    ///
    /// Returns [`StoreError::NotFound`](crate::error::StoreError::NotFound) if the
    /// collection does not exist.
    async fn drop_collection(&self, name: &str) -> StoreResult<()>;

    /// Lists the names of all collections.
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Inserts records in order, creating the collection if needed.
    ///
    /// Stops at the first record the store rejects. If earlier records were already
    /// written, returns [`StoreError::PartialFailure`](crate::error::StoreError::PartialFailure)
    /// naming them. A validation error on its own means the first record was refused.
    async fn insert_records(
        &self,
        collection: &str,
        records: Vec<RawRecord>,
    ) -> StoreResult<()>;

    /// Streams the records matching `filter` in store order.
    ///
    /// A missing collection yields no records.
    async fn find_records(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<RawRecordStream>;

    /// Fetches a single record by identifier.
    async fn get_record(
        &self,
        collection: &str,
        id: RecordId,
    ) -> StoreResult<Option<Document>>;

    /// Merges `patch` into the first or every record matching `filter`.
    async fn update_records(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        scope: WriteScope,
    ) -> StoreResult<UpdateOutcome>;

    /// Removes the first or every record matching `filter`, returning how many were removed.
    async fn delete_records(
        &self,
        collection: &str,
        filter: &Filter,
        scope: WriteScope,
    ) -> StoreResult<u64>;

    /// Runs an aggregation pipeline over the collection.
    ///
    /// Records entering the pipeline carry their identifier as `_id`.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> StoreResult<Vec<Document>>;

    /// Creates an ordering index on `field`, returning its name. Idempotent.
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        direction: SortDirection,
    ) -> StoreResult<String>;

    /// Releases the backend's resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory for backends that need asynchronous setup.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}
