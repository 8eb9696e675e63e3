use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    options::{ClientOptions, Credential},
};
use tracing::trace;

use catalog_core::{
    backend::{
        RawRecord, RawRecordStream, StoreBackend, StoreBackendBuilder, UpdateOutcome, WriteScope,
    },
    config::{ConnectionConfig, Credentials},
    error::{StoreError, StoreResult},
    filter::Filter,
    patch::Patch,
    pipeline::{Pipeline, SortDirection},
    record::{ID_FIELD, RecordId},
};

use crate::error::{NAMESPACE_EXISTS, categorize, categorize_insert};

#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Creates a builder from a connection config, carrying over its credentials and timeout.
    pub fn from_config(config: &ConnectionConfig) -> MongoDbStoreBuilder {
        let builder = MongoDbStoreBuilder::new(&config.dsn(), &config.database)
            .connect_timeout(config.connect_timeout());

        match &config.credentials {
            Some(credentials) => builder.credentials(credentials.clone()),
            None => builder,
        }
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database().collection(collection_name)
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self
            .database()
            .list_collection_names()
            .await
            .map_err(categorize)?
            .iter()
            .any(|existing| existing == name))
    }
}

fn prepare_document(id: RecordId, document: Document) -> Document {
    let mut prepared = doc! { ID_FIELD: Bson::from(id) };
    prepared.extend(document);
    prepared
}

fn restore_document(mut document: Document) -> StoreResult<RawRecord> {
    let id = match document.remove(ID_FIELD) {
        Some(Bson::Binary(binary)) => binary.to_uuid()?,
        Some(other) => {
            return Err(StoreError::Validation(format!(
                "record has a non-catalog identifier: {other}"
            )));
        }
        None => return Err(StoreError::Validation("record has no identifier".into())),
    };

    Ok((id, document))
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        match self.database().create_collection(name).await {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind.as_ref(), mongodb::error::ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS) => {
                trace!(collection = name, "collection already exists");
                Ok(())
            }
            Err(e) => Err(categorize(e)),
        }
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        // The server drops missing collections silently.
        if !self.collection_exists(name).await? {
            return Err(StoreError::NotFound(format!("collection `{name}` does not exist")));
        }

        self.get_collection(name).drop().await.map_err(categorize)
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self
            .database()
            .list_collection_names()
            .await
            .map_err(categorize)?;
        names.sort();

        Ok(names)
    }

    async fn insert_records(&self, collection: &str, records: Vec<RawRecord>) -> StoreResult<()> {
        let ids = records.iter().map(|(id, _)| *id).collect::<Vec<_>>();

        self.get_collection(collection)
            .insert_many(
                records
                    .into_iter()
                    .map(|(id, document)| prepare_document(id, document)),
            )
            .ordered(true)
            .await
            .map_err(|e| categorize_insert(e, &ids))?;

        trace!(collection, inserted = ids.len(), "records inserted");
        Ok(())
    }

    async fn find_records(&self, collection: &str, filter: &Filter) -> StoreResult<RawRecordStream> {
        let cursor = self
            .get_collection(collection)
            .find(filter.to_document())
            .await
            .map_err(categorize)?;

        Ok(cursor
            .map(|document| document.map_err(categorize).and_then(restore_document))
            .boxed())
    }

    async fn get_record(&self, collection: &str, id: RecordId) -> StoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(doc! { ID_FIELD: Bson::from(id) })
            .await
            .map_err(categorize)?
            .map(|document| restore_document(document).map(|(_, document)| document))
            .transpose()
    }

    async fn update_records(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        scope: WriteScope,
    ) -> StoreResult<UpdateOutcome> {
        let target = self.get_collection(collection);
        let result = match scope {
            WriteScope::First => target.update_one(filter.to_document(), patch.to_document()).await,
            WriteScope::All => target.update_many(filter.to_document(), patch.to_document()).await,
        }
        .map_err(categorize)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_records(&self, collection: &str, filter: &Filter, scope: WriteScope) -> StoreResult<u64> {
        let target = self.get_collection(collection);
        let result = match scope {
            WriteScope::First => target.delete_one(filter.to_document()).await,
            WriteScope::All => target.delete_many(filter.to_document()).await,
        }
        .map_err(categorize)?;

        Ok(result.deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
        self.get_collection(collection)
            .aggregate(pipeline.to_documents())
            .await
            .map_err(categorize)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(categorize)
    }

    async fn create_index(&self, collection: &str, field: &str, direction: SortDirection) -> StoreResult<String> {
        let result = self
            .get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: direction.as_i32() })
                    .build(),
            )
            .await
            .map_err(categorize)?;

        trace!(collection, index = %result.index_name, "index ready");
        Ok(result.index_name)
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Builder for [`MongoDbStore`]. The client connects lazily, so connection
/// failures surface on the first operation.
#[derive(Debug)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    credentials: Option<Credentials>,
    connect_timeout: Option<Duration>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            credentials: None,
            connect_timeout: None,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Bounds both connection establishment and server selection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn).await.map_err(categorize)?;

        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(credentials) = self.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(credentials.username)
                    .password(credentials.password)
                    .source(credentials.auth_source)
                    .build(),
            );
        }

        trace!(database = %self.database, "mongodb client configured");
        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(categorize)?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_round_trip_through_store_shape() {
        let id = RecordId::new();
        let prepared = prepare_document(id, doc! { "title": "1984", "publishedYear": 1949 });

        assert_eq!(prepared.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(
            restore_document(prepared).unwrap(),
            (id, doc! { "title": "1984", "publishedYear": 1949 })
        );
    }

    #[test]
    fn foreign_identifiers_are_rejected() {
        let err = restore_document(doc! { "_id": 7, "title": "1984" }).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = restore_document(doc! { "title": "1984" }).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn builder_applies_config() {
        let config = ConnectionConfig::new("db.internal", 27018, "catalog")
            .with_credentials("librarian", "s3cret")
            .with_connect_timeout(Duration::from_millis(1500));

        let store = MongoDbStore::from_config(&config).build().await.unwrap();

        assert_eq!(store.database, "catalog");
        assert_eq!(store.get_collection("books").name(), "books");
    }
}
