//! In-memory storage implementation for the catalog.
//!
//! Collections keep their records in insertion order, which is the store order
//! reported by finds and consumed by `First`-scoped writes.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use tracing::trace;

use catalog_core::{
    backend::{
        RawRecord, RawRecordStream, StoreBackend, StoreBackendBuilder, UpdateOutcome, WriteScope,
        index_name,
    },
    error::{FailedRecord, StoreError, StoreResult},
    filter::Filter,
    patch::Patch,
    pipeline::{Pipeline, SortDirection},
    record::{ID_FIELD, RecordId},
};

use crate::{aggregate, evaluator::DocumentEvaluator};

#[derive(Debug, Default)]
struct CollectionState {
    /// Records in insertion order. Each document carries its id as `_id`.
    records: Vec<(RecordId, Document)>,
    ids: HashSet<RecordId>,
    /// Index metadata only; lookups always scan.
    indexes: BTreeSet<String>,
}

impl CollectionState {
    fn matching<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> impl Iterator<Item = StoreResult<(usize, &'a (RecordId, Document))>> + 'a {
        self.records
            .iter()
            .enumerate()
            .filter_map(move |(position, record)| {
                match DocumentEvaluator::matches(&record.1, filter) {
                    Ok(true) => Some(Ok((position, record))),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            })
    }
}

type StoreMap = HashMap<String, CollectionState>;

/// Thread-safe in-memory catalog storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones
/// share the same collections. Every operation holds the store lock for its whole
/// duration, which makes each call atomic with respect to the others.
///
/// # Performance
///
/// Queries scan every record in the collection; indexes are recorded but never
/// consulted.
///
/// # Example
///
/// ```ignore
/// use catalog_memory::InMemoryStore;
/// use catalog::backend::StoreBackend;
/// use bson::{Uuid, doc};
///
/// let store = InMemoryStore::new();
/// store.insert_records("books", vec![(Uuid::new(), doc! { "title": "1984" })]).await?;
/// assert_eq!(store.list_collections().await?, vec!["books".to_string()]);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> records
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder
    }

    /// Names of the indexes created on a collection.
    pub async fn index_names(&self, collection: &str) -> Vec<String> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|state| state.indexes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn with_id(id: RecordId, document: Document) -> Document {
    let mut stored = Document::new();
    stored.insert(ID_FIELD, Bson::from(id));
    stored.extend(document);
    stored
}

fn without_id(id: RecordId, document: &Document) -> RawRecord {
    let mut document = document.clone();
    document.remove(ID_FIELD);
    (id, document)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        trace!(collection = name, "collection ready");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        let mut store = self.store.write().await;

        match store.remove(name) {
            Some(state) => {
                trace!(collection = name, records = state.records.len(), "collection dropped");
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("collection `{name}` does not exist"))),
        }
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self.store.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn insert_records(&self, collection: &str, records: Vec<RawRecord>) -> StoreResult<()> {
        let mut store = self.store.write().await;
        let state = store.entry(collection.to_string()).or_default();

        let total = records.len();
        let mut inserted = Vec::with_capacity(total);

        for (index, (id, document)) in records.into_iter().enumerate() {
            if !state.ids.insert(id) {
                let message = format!("duplicate record id {id} in collection `{collection}`");
                if inserted.is_empty() {
                    return Err(StoreError::Validation(message));
                }

                let mut failed = vec![FailedRecord { index, message }];
                failed.extend((index + 1..total).map(|skipped| FailedRecord {
                    index: skipped,
                    message: format!("not attempted after record #{index} was rejected"),
                }));
                return Err(StoreError::PartialFailure { inserted, failed });
            }

            state.records.push((id, with_id(id, document)));
            inserted.push(id);
        }

        trace!(collection, inserted = inserted.len(), "records inserted");
        Ok(())
    }

    async fn find_records(&self, collection: &str, filter: &Filter) -> StoreResult<RawRecordStream> {
        let store = self.store.read().await;
        let found = match store.get(collection) {
            Some(state) => state
                .matching(filter)
                .map(|matched| matched.map(|(_, (id, document))| without_id(*id, document)))
                .collect::<StoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        trace!(collection, found = found.len(), "records found");
        Ok(stream::iter(found.into_iter().map(Ok)).boxed())
    }

    async fn get_record(&self, collection: &str, id: RecordId) -> StoreResult<Option<Document>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .and_then(|state| state.records.iter().find(|(existing, _)| *existing == id))
            .map(|(id, document)| without_id(*id, document).1))
    }

    async fn update_records(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        scope: WriteScope,
    ) -> StoreResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let mut positions = state
            .matching(filter)
            .map(|matched| matched.map(|(position, _)| position))
            .collect::<StoreResult<Vec<_>>>()?;
        if scope == WriteScope::First {
            positions.truncate(1);
        }

        // Patch copies first so a failing record leaves the collection untouched.
        let mut patched = Vec::with_capacity(positions.len());
        for position in &positions {
            let mut document = state.records[*position].1.clone();
            if patch.apply(&mut document)? {
                patched.push((*position, document));
            }
        }

        let outcome = UpdateOutcome {
            matched: positions.len() as u64,
            modified: patched.len() as u64,
        };
        for (position, document) in patched {
            state.records[position].1 = document;
        }

        trace!(collection, matched = outcome.matched, modified = outcome.modified, "records updated");
        Ok(outcome)
    }

    async fn delete_records(&self, collection: &str, filter: &Filter, scope: WriteScope) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut positions = state
            .matching(filter)
            .map(|matched| matched.map(|(position, _)| position))
            .collect::<StoreResult<Vec<_>>>()?;
        if scope == WriteScope::First {
            positions.truncate(1);
        }

        for position in positions.iter().rev() {
            let (id, _) = state.records.remove(*position);
            state.ids.remove(&id);
        }

        trace!(collection, deleted = positions.len(), "records deleted");
        Ok(positions.len() as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
        let records = self
            .store
            .read()
            .await
            .get(collection)
            .map(|state| state.records.iter().map(|(_, document)| document.clone()).collect())
            .unwrap_or_default();

        let results = aggregate::run(records, pipeline)?;

        trace!(collection, results = results.len(), "pipeline complete");
        Ok(results)
    }

    async fn create_index(&self, collection: &str, field: &str, direction: SortDirection) -> StoreResult<String> {
        let name = index_name(field, direction);

        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .indexes
            .insert(name.clone());

        trace!(collection, index = %name, "index ready");
        Ok(name)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds a fresh, empty [`InMemoryStore`]. Always succeeds.
    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;

    async fn seeded() -> (InMemoryStore, Vec<RecordId>) {
        let store = InMemoryStore::builder().build().await.unwrap();
        let records = vec![
            (RecordId::new(), doc! { "title": "1984", "genre": "Dystopian", "publishedYear": 1949 }),
            (RecordId::new(), doc! { "title": "Animal Farm", "genre": "Dystopian", "publishedYear": 1945 }),
            (RecordId::new(), doc! { "title": "The Hobbit", "genre": "Fantasy", "publishedYear": 1937 }),
        ];
        let ids = records.iter().map(|(id, _)| *id).collect();
        store.insert_records("books", records).await.unwrap();

        (store, ids)
    }

    #[tokio::test]
    async fn find_returns_store_order_without_id() {
        let (store, ids) = seeded().await;

        let found = store
            .find_records("books", &Filter::eq("genre", "Dystopian"))
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(found.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids[..2]);
        assert!(found.iter().all(|(_, document)| !document.contains_key(ID_FIELD)));
    }

    #[tokio::test]
    async fn missing_collections_read_as_empty() {
        let store = InMemoryStore::new();

        let found = store
            .find_records("nothing", &Filter::all())
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert!(found.is_empty());
        assert_eq!(store.delete_records("nothing", &Filter::all(), WriteScope::All).await.unwrap(), 0);
        assert!(matches!(store.drop_collection("nothing").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_ids_stop_an_ordered_insert() {
        let (store, ids) = seeded().await;
        let fresh = RecordId::new();

        let err = store
            .insert_records(
                "books",
                vec![
                    (fresh, doc! { "title": "Brave New World" }),
                    (ids[0], doc! { "title": "1984 (again)" }),
                    (RecordId::new(), doc! { "title": "We" }),
                ],
            )
            .await
            .unwrap_err();

        match err {
            StoreError::PartialFailure { inserted, failed } => {
                assert_eq!(inserted, vec![fresh]);
                assert_eq!(failed.iter().map(|f| f.index).collect::<Vec<_>>(), [1, 2]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = store
            .insert_records("books", vec![(ids[1], doc! { "title": "Animal Farm" })])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn update_scope_and_counts() {
        let (store, ids) = seeded().await;

        let outcome = store
            .update_records("books", &Filter::eq("genre", "Dystopian"), &Patch::set("classic", true), WriteScope::First)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        let first = store.get_record("books", ids[0]).await.unwrap().unwrap();
        let second = store.get_record("books", ids[1]).await.unwrap().unwrap();
        assert!(first.get_bool("classic").unwrap());
        assert!(!second.contains_key("classic"));

        let outcome = store
            .update_records("books", &Filter::eq("genre", "Dystopian"), &Patch::set("classic", true), WriteScope::All)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 2, modified: 1 });
    }

    #[tokio::test]
    async fn failed_patch_leaves_records_untouched() {
        let (store, ids) = seeded().await;

        let err = store
            .update_records("books", &Filter::all(), &Patch::set("title.sub", "x"), WriteScope::All)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        let untouched = store.get_record("books", ids[0]).await.unwrap().unwrap();
        assert_eq!(untouched.get_str("title").unwrap(), "1984");
    }

    #[tokio::test]
    async fn delete_first_match_only() {
        let (store, ids) = seeded().await;

        let deleted = store
            .delete_records("books", &Filter::eq("genre", "Dystopian"), WriteScope::First)
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.get_record("books", ids[0]).await.unwrap().is_none());
        assert!(store.get_record("books", ids[1]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn aggregate_sees_record_ids() {
        let (store, ids) = seeded().await;

        let results = store
            .aggregate("books", &Pipeline::new().sort("publishedYear", SortDirection::Ascending).limit(1))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get(ID_FIELD), Some(&Bson::from(ids[2])));
    }

    #[tokio::test]
    async fn indexes_are_idempotent_metadata() {
        let (store, _) = seeded().await;

        let first = store.create_index("books", "isbn", SortDirection::Ascending).await.unwrap();
        let second = store.create_index("books", "isbn", SortDirection::Ascending).await.unwrap();

        assert_eq!(first, "isbn_1");
        assert_eq!(first, second);
        assert_eq!(store.index_names("books").await, vec!["isbn_1".to_string()]);
    }
}
