//! Typed collection handles.
//!
//! A [`TypedCollection`] binds a [`CatalogService`] to one [`Record`] type, so the
//! collection name comes from `D::collection_name()` and results decode into `D`.
//!
//! # Example
//!
//! ```ignore
//! use catalog::prelude::*;
//!
//! let books = catalog.typed_collection::<Book>();
//! books.create().await?;
//! books.insert_many(&Book::samples()).await?;
//!
//! let outcome = books
//!     .update_one(Filter::eq("title", "The Great Gatsby"), Patch::set("publishedYear", 1926))
//!     .await?;
//! assert_eq!(outcome.matched, 1);
//! ```

use std::marker::PhantomData;

use bson::Document;

use crate::{
    backend::{StoreBackend, UpdateOutcome},
    error::CatalogResult,
    filter::Filter,
    patch::Patch,
    pipeline::{Pipeline, SortDirection},
    record::{Record, RecordId, Stored},
    service::{CatalogService, RecordStream},
};

/// A collection handle bound to the record type `D`.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the service reference
/// * `B` - The storage backend type
/// * `D` - The record type stored in this collection
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, D: Record> {
    service: &'a CatalogService<B>,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend, D: Record> TypedCollection<'a, B, D> {
    pub(crate) fn new(service: &'a CatalogService<B>) -> Self {
        Self { service, _marker: PhantomData }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &'static str {
        D::collection_name()
    }

    /// Ensures the collection exists.
    pub async fn create(&self) -> CatalogResult<()> {
        self.service.create_collection(self.name()).await
    }

    /// Drops the collection.
    pub async fn drop(&self) -> CatalogResult<()> {
        self.service.drop_collection(self.name()).await
    }

    pub async fn insert_one(&self, record: &D) -> CatalogResult<RecordId> {
        self.service.insert_one(self.name(), record).await
    }

    pub async fn insert_many(&self, records: &[D]) -> CatalogResult<Vec<RecordId>> {
        self.service.insert_many(self.name(), records).await
    }

    pub async fn find(&self, filter: Filter) -> CatalogResult<RecordStream<D>> {
        self.service.find(self.name(), filter).await
    }

    pub async fn find_by_id(&self, id: RecordId) -> CatalogResult<Option<Stored<D>>> {
        self.service.find_by_id(self.name(), id).await
    }

    pub async fn update_one(&self, filter: Filter, patch: Patch) -> CatalogResult<UpdateOutcome> {
        self.service.update_one(self.name(), filter, patch).await
    }

    pub async fn update_many(&self, filter: Filter, patch: Patch) -> CatalogResult<UpdateOutcome> {
        self.service.update_many(self.name(), filter, patch).await
    }

    pub async fn delete_one(&self, filter: Filter) -> CatalogResult<u64> {
        self.service.delete_one(self.name(), filter).await
    }

    pub async fn delete_many(&self, filter: Filter) -> CatalogResult<u64> {
        self.service.delete_many(self.name(), filter).await
    }

    /// Runs an aggregation pipeline. Group stages change the shape of the output,
    /// so results stay untyped.
    pub async fn aggregate(&self, pipeline: Pipeline) -> CatalogResult<Vec<Document>> {
        self.service.aggregate(self.name(), pipeline).await
    }

    pub async fn create_index(&self, field: &str, direction: SortDirection) -> CatalogResult<String> {
        self.service.create_index(self.name(), field, direction).await
    }
}
