//! The catalog service: typed catalog operations over a storage backend.
//!
//! [`CatalogService`] validates its inputs, generates record identifiers, forwards
//! exactly one request per operation to the backend, and wraps any failure in a
//! [`CatalogError`] naming the operation, the collection and the offending input.
//! It never retries and keeps no state besides the backend handle.
//!
//! # Example
//!
//! ```ignore
//! use catalog::prelude::*;
//! use catalog::memory::InMemoryStore;
//!
//! let catalog = CatalogService::new(InMemoryStore::new());
//! catalog.create_collection("books").await?;
//! catalog.insert_many("books", &Book::samples()).await?;
//!
//! let rowling: Vec<Stored<Book>> = catalog
//!     .find("books", Filter::eq("author", "J.K. Rowling"))
//!     .await?
//!     .try_collect()
//!     .await?;
//! ```

use bson::{Bson, Document};
use futures::{StreamExt, stream::BoxStream};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    backend::{StoreBackend, UpdateOutcome, WriteScope},
    collection::TypedCollection,
    error::{CatalogError, CatalogResult, Operation, StoreError, StoreResult},
    filter::Filter,
    patch::Patch,
    pipeline::{Pipeline, SortDirection},
    record::{Record, RecordExt, RecordId, Stored},
};

/// Lazily decoded records returned by [`CatalogService::find`].
pub type RecordStream<D> = BoxStream<'static, CatalogResult<Stored<D>>>;

/// Typed catalog operations bound to a specific backend.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct CatalogService<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> CatalogService<B> {
    /// Creates a new catalog service over the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a collection bound to the record type `D`.
    ///
    /// The collection name is determined by `D::collection_name()`.
    pub fn typed_collection<D: Record>(&self) -> TypedCollection<'_, B, D> {
        TypedCollection::new(self)
    }

    /// Ensures a collection exists. Calling it for an existing collection succeeds.
    ///
    /// # Errors
    ///
    /// Returns a connection-kind error if the store cannot be reached.
    pub async fn create_collection(&self, name: &str) -> CatalogResult<()> {
        let operation = Operation::CreateCollection;
        validate_collection_name(name).map_err(|e| failure(operation, name, None, e))?;

        debug!(%operation, collection = name, "creating collection");
        self.backend
            .create_collection(name)
            .await
            .map_err(|e| failure(operation, name, None, e))
    }

    /// Drops a collection and every record in it.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the collection does not exist.
    pub async fn drop_collection(&self, name: &str) -> CatalogResult<()> {
        let operation = Operation::DropCollection;
        validate_collection_name(name).map_err(|e| failure(operation, name, None, e))?;

        debug!(%operation, collection = name, "dropping collection");
        self.backend
            .drop_collection(name)
            .await
            .map_err(|e| failure(operation, name, None, e))
    }

    /// Lists all collection names.
    pub async fn list_collections(&self) -> CatalogResult<Vec<String>> {
        self.backend
            .list_collections()
            .await
            .map_err(|e| failure(Operation::ListCollections, "", None, e))
    }

    /// Inserts a single record and returns its generated identifier.
    pub async fn insert_one<D>(&self, collection: &str, record: &D) -> CatalogResult<RecordId>
    where
        D: Serialize + DeserializeOwned + Sync,
    {
        let operation = Operation::InsertOne;
        validate_collection_name(collection).map_err(|e| failure(operation, collection, None, e))?;

        let document = record
            .to_document()
            .map_err(|e| failure(operation, collection, None, e))?;
        let id = RecordId::new();

        debug!(%operation, collection, %id, "inserting record");
        self.backend
            .insert_records(collection, vec![(id, document.clone())])
            .await
            .map_err(|e| failure(operation, collection, Some(render("record", &document)), e))?;

        Ok(id)
    }

    /// Inserts records in order and returns their generated identifiers in the same order.
    ///
    /// An empty batch returns immediately without contacting the store.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first record that cannot be serialized,
    /// before anything is written. If the store rejects a record after writing earlier
    /// ones, returns a `PartialFailure` whose [`inserted_ids`](CatalogError::inserted_ids)
    /// lists what was written.
    pub async fn insert_many<D>(&self, collection: &str, records: &[D]) -> CatalogResult<Vec<RecordId>>
    where
        D: Serialize + DeserializeOwned + Sync,
    {
        let operation = Operation::InsertMany;
        validate_collection_name(collection).map_err(|e| failure(operation, collection, None, e))?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .to_document()
                    .map(|document| (RecordId::new(), document))
                    .map_err(|e| failure(operation, collection, Some(format!("record #{index}")), e))
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        let ids = prepared.iter().map(|(id, _)| *id).collect::<Vec<_>>();

        debug!(%operation, collection, count = ids.len(), "inserting records");
        self.backend
            .insert_records(collection, prepared)
            .await
            .map_err(|e| {
                let context = rejected_position(&e).and_then(|index| {
                    let record = records.get(index)?;
                    Some(render(&format!("record #{index}"), record))
                });
                failure(operation, collection, context, e)
            })?;

        debug!(%operation, collection, inserted = ids.len(), "inserted records");
        Ok(ids)
    }

    /// Streams the records matching `filter` in store order. An empty filter matches everything.
    ///
    /// Decoding happens as the stream is polled; a record that does not fit `D`
    /// surfaces as a validation error for that item.
    pub async fn find<D>(&self, collection: &str, filter: Filter) -> CatalogResult<RecordStream<D>>
    where
        D: Serialize + DeserializeOwned + Send + 'static,
    {
        let operation = Operation::Find;
        let context = || Some(render("filter", &filter.to_document()));
        validate_collection_name(collection)
            .and_then(|_| filter.validate())
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, predicates = filter.predicates().len(), "finding records");
        let records = self
            .backend
            .find_records(collection, &filter)
            .await
            .map_err(|e| failure(operation, collection, context(), e))?;

        let name = collection.to_string();
        Ok(records
            .map(move |record| match record {
                Ok((id, document)) => Stored::decode(id, document)
                    .map_err(|e| failure(operation, &name, Some(format!("id: {id}")), e)),
                Err(e) => Err(failure(operation, &name, None, e)),
            })
            .boxed())
    }

    /// Fetches a record by its generated identifier.
    pub async fn find_by_id<D>(&self, collection: &str, id: RecordId) -> CatalogResult<Option<Stored<D>>>
    where
        D: Serialize + DeserializeOwned,
    {
        let operation = Operation::FindById;
        let context = || Some(format!("id: {id}"));
        validate_collection_name(collection).map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, %id, "fetching record");
        self.backend
            .get_record(collection, id)
            .await
            .and_then(|found| found.map(|document| Stored::decode(id, document)).transpose())
            .map_err(|e| failure(operation, collection, context(), e))
    }

    /// Merges `patch` into the first record matching `filter`.
    ///
    /// Matching nothing is not an error: the outcome reports zero matched.
    pub async fn update_one(&self, collection: &str, filter: Filter, patch: Patch) -> CatalogResult<UpdateOutcome> {
        self.update(Operation::UpdateOne, collection, filter, patch, WriteScope::First)
            .await
    }

    /// Merges `patch` into every record matching `filter`.
    pub async fn update_many(&self, collection: &str, filter: Filter, patch: Patch) -> CatalogResult<UpdateOutcome> {
        self.update(Operation::UpdateMany, collection, filter, patch, WriteScope::All)
            .await
    }

    async fn update(
        &self,
        operation: Operation,
        collection: &str,
        filter: Filter,
        patch: Patch,
        scope: WriteScope,
    ) -> CatalogResult<UpdateOutcome> {
        let context = || {
            Some(format!(
                "{}, {}",
                render("filter", &filter.to_document()),
                render("patch", &patch.to_document())
            ))
        };
        validate_collection_name(collection)
            .and_then(|_| filter.validate())
            .and_then(|_| patch.validate())
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, "updating records");
        let outcome = self
            .backend
            .update_records(collection, &filter, &patch, scope)
            .await
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, matched = outcome.matched, modified = outcome.modified, "updated records");
        Ok(outcome)
    }

    /// Removes the first record matching `filter`, returning how many were removed (0 or 1).
    pub async fn delete_one(&self, collection: &str, filter: Filter) -> CatalogResult<u64> {
        self.delete(Operation::DeleteOne, collection, filter, WriteScope::First)
            .await
    }

    /// Removes every record matching `filter`, returning how many were removed.
    pub async fn delete_many(&self, collection: &str, filter: Filter) -> CatalogResult<u64> {
        self.delete(Operation::DeleteMany, collection, filter, WriteScope::All)
            .await
    }

    async fn delete(&self, operation: Operation, collection: &str, filter: Filter, scope: WriteScope) -> CatalogResult<u64> {
        let context = || Some(render("filter", &filter.to_document()));
        validate_collection_name(collection)
            .and_then(|_| filter.validate())
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, "deleting records");
        let deleted = self
            .backend
            .delete_records(collection, &filter, scope)
            .await
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, deleted, "deleted records");
        Ok(deleted)
    }

    /// Runs an aggregation pipeline, applying its stages in the order given.
    pub async fn aggregate(&self, collection: &str, pipeline: Pipeline) -> CatalogResult<Vec<Document>> {
        let operation = Operation::Aggregate;
        let context = || {
            Some(format!(
                "pipeline: {}",
                Bson::from(pipeline.to_documents()).into_relaxed_extjson()
            ))
        };
        validate_collection_name(collection)
            .and_then(|_| pipeline.validate())
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, stages = pipeline.stages().len(), "running pipeline");
        let results = self
            .backend
            .aggregate(collection, &pipeline)
            .await
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, results = results.len(), "pipeline complete");
        Ok(results)
    }

    /// Creates an ordering index on `field` and returns its name.
    ///
    /// Idempotent, and never changes what queries return.
    pub async fn create_index(&self, collection: &str, field: &str, direction: SortDirection) -> CatalogResult<String> {
        let operation = Operation::CreateIndex;
        let context = || Some(format!("field: {field}"));
        validate_collection_name(collection)
            .and_then(|_| crate::filter::validate_path(field))
            .map_err(|e| failure(operation, collection, context(), e))?;

        debug!(%operation, collection, field, ?direction, "creating index");
        self.backend
            .create_index(collection, field, direction)
            .await
            .map_err(|e| failure(operation, collection, context(), e))
    }

    /// Shuts down the service and releases backend resources.
    pub async fn shutdown(self) -> CatalogResult<()> {
        self.backend
            .shutdown()
            .await
            .map_err(|e| failure(Operation::Shutdown, "", None, e))
    }
}

fn failure(operation: Operation, collection: &str, context: Option<String>, source: StoreError) -> CatalogError {
    let mut err = CatalogError::new(operation, collection, source);
    err.context = context;

    warn!(%operation, collection, kind = %err.kind(), error = %err.source, "catalog operation failed");
    err
}

fn render<R: RecordExt>(label: &str, value: &R) -> String {
    match value.to_json() {
        Ok(json) => format!("{label}: {json}"),
        Err(_) => label.to_string(),
    }
}

/// Position of the batch record a store rejected, if the error identifies one.
///
/// Backends stop at the first rejection, so a plain validation error means the
/// first record was refused.
fn rejected_position(err: &StoreError) -> Option<usize> {
    match err {
        StoreError::PartialFailure { failed, .. } => failed.first().map(|record| record.index),
        StoreError::Validation(_) => Some(0),
        _ => None,
    }
}

/// Checks that `name` can be used as a collection name.
pub(crate) fn validate_collection_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::Validation("collection name must not be empty".into()));
    }
    if name.contains('$') || name.contains('\0') {
        return Err(StoreError::Validation(format!(
            "collection name `{name}` must not contain `$` or NUL"
        )));
    }
    if name.starts_with("system.") {
        return Err(StoreError::Validation(format!(
            "collection name `{name}` uses the reserved `system.` prefix"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        backend::{RawRecord, RawRecordStream},
        error::{ErrorKind, FailedRecord},
        model::Book,
    };

    /// Backend whose inserts fail with a preset error.
    #[derive(Debug)]
    struct RejectingStore {
        error: Mutex<Option<StoreError>>,
    }

    impl RejectingStore {
        fn failing_with(error: StoreError) -> CatalogService<Self> {
            CatalogService::new(Self { error: Mutex::new(Some(error)) })
        }
    }

    #[async_trait]
    impl StoreBackend for RejectingStore {
        async fn create_collection(&self, _: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn drop_collection(&self, _: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn insert_records(&self, _: &str, _: Vec<RawRecord>) -> StoreResult<()> {
            match self.error.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn find_records(&self, _: &str, _: &Filter) -> StoreResult<RawRecordStream> {
            Ok(futures::stream::empty().boxed())
        }

        async fn get_record(&self, _: &str, _: RecordId) -> StoreResult<Option<Document>> {
            Ok(None)
        }

        async fn update_records(&self, _: &str, _: &Filter, _: &Patch, _: WriteScope) -> StoreResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }

        async fn delete_records(&self, _: &str, _: &Filter, _: WriteScope) -> StoreResult<u64> {
            Ok(0)
        }

        async fn aggregate(&self, _: &str, _: &Pipeline) -> StoreResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn create_index(&self, _: &str, field: &str, direction: SortDirection) -> StoreResult<String> {
            Ok(crate::backend::index_name(field, direction))
        }
    }

    #[tokio::test]
    async fn rejected_batch_record_is_named_in_context() {
        let catalog = RejectingStore::failing_with(StoreError::PartialFailure {
            inserted: vec![RecordId::new()],
            failed: vec![
                FailedRecord { index: 1, message: "E11000 duplicate key".into() },
                FailedRecord { index: 2, message: "not attempted".into() },
            ],
        });

        let err = catalog.insert_many("books", &Book::samples()[..3]).await.unwrap_err();
        let context = err.context.as_deref().unwrap();

        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(context.starts_with("record #1: {"), "{context}");
        assert!(context.contains(r#""title":"1984""#), "{context}");
    }

    #[tokio::test]
    async fn first_record_rejection_is_named_in_context() {
        let catalog = RejectingStore::failing_with(StoreError::Validation("E11000 duplicate key".into()));

        let err = catalog.insert_many("books", &Book::samples()).await.unwrap_err();
        let context = err.context.as_deref().unwrap();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(context.starts_with("record #0: {"), "{context}");
        assert!(context.contains("The Great Gatsby"), "{context}");
    }

    #[tokio::test]
    async fn store_failures_without_a_position_carry_no_record() {
        let catalog = RejectingStore::failing_with(StoreError::Timeout("no reply".into()));

        let err = catalog.insert_many("books", &Book::samples()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.context, None);
    }

    #[test]
    fn collection_names_are_checked() {
        assert!(validate_collection_name("books").is_ok());

        for name in ["", "bo$oks", "bo\0oks", "system.indexes"] {
            assert!(matches!(validate_collection_name(name), Err(StoreError::Validation(_))), "{name:?}");
        }
    }

    #[test]
    fn context_renders_as_json() {
        assert_eq!(
            render("filter", &Filter::eq("author", "Harper Lee").to_document()),
            r#"filter: {"author":{"$eq":"Harper Lee"}}"#
        );
    }
}
