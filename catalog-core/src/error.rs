//! Error types and result types for catalog operations.
//!
//! Backends report failures as [`StoreError`]. The [`CatalogService`](crate::service::CatalogService)
//! wraps every backend failure in a [`CatalogError`] that records which operation failed,
//! against which collection, and the offending filter, patch, pipeline or record.

use std::fmt;

use bson::error::Error as BsonError;
use thiserror::Error;

use crate::record::RecordId;

/// A record that a store refused during a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRecord {
    /// Position of the record in the batch handed to the store.
    pub index: usize,
    /// The store's reason for rejecting it.
    pub message: String,
}

/// Represents all failures a storage backend can report.
///
/// Every variant maps onto one [`ErrorKind`]; the variants themselves carry the
/// store's message verbatim.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or refused the credentials.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A record, filter, patch or pipeline was malformed.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The target collection or record was absent where it was required.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The store did not answer within the configured bound.
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Part of a bulk insert was written before the store rejected a record.
    #[error(
        "Partial failure: {} record(s) inserted, {} rejected",
        inserted.len(),
        failed.len()
    )]
    PartialFailure {
        /// Identifiers of the records that were written, in batch order.
        inserted: Vec<RecordId>,
        /// The records that were not written.
        failed: Vec<FailedRecord>,
    },
    /// The store reported an error that fits none of the categories above.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

/// The category of a failure, independent of which backend produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Validation,
    NotFound,
    Timeout,
    PartialFailure,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::PartialFailure => "PartialFailure",
            ErrorKind::Backend => "BackendError",
        })
    }
}

impl StoreError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Timeout(_) => ErrorKind::Timeout,
            StoreError::PartialFailure { .. } => ErrorKind::PartialFailure,
            StoreError::Backend(_) => ErrorKind::Backend,
        }
    }
}

/// The service operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateCollection,
    DropCollection,
    ListCollections,
    InsertOne,
    InsertMany,
    Find,
    FindById,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
    CreateIndex,
    Shutdown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::CreateCollection => "createCollection",
            Operation::DropCollection => "dropCollection",
            Operation::ListCollections => "listCollections",
            Operation::InsertOne => "insertOne",
            Operation::InsertMany => "insertMany",
            Operation::Find => "find",
            Operation::FindById => "findById",
            Operation::UpdateOne => "updateOne",
            Operation::UpdateMany => "updateMany",
            Operation::DeleteOne => "deleteOne",
            Operation::DeleteMany => "deleteMany",
            Operation::Aggregate => "aggregate",
            Operation::CreateIndex => "createIndex",
            Operation::Shutdown => "shutdown",
        })
    }
}

/// A failed catalog operation.
///
/// Carries enough context to diagnose the failure without inspecting the store:
/// the operation, the target collection, and (when one was involved) the offending
/// filter, patch, pipeline or record rendered as extended JSON.
#[derive(Error, Debug)]
#[error("{operation} on `{collection}` failed: {source}{}", render_context(.context))]
pub struct CatalogError {
    /// The operation that failed.
    pub operation: Operation,
    /// The collection the operation targeted. Empty for store-wide operations.
    pub collection: String,
    /// The offending input, if any.
    pub context: Option<String>,
    /// The underlying store error.
    #[source]
    pub source: StoreError,
}

fn render_context(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" ({context})"),
        None => String::new(),
    }
}

impl CatalogError {
    pub fn new(operation: Operation, collection: impl Into<String>, source: StoreError) -> Self {
        Self { operation, collection: collection.into(), context: None, source }
    }

    /// Attaches a description of the offending input.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Identifiers written before a bulk insert failed, if the store reported them.
    pub fn inserted_ids(&self) -> Option<&[RecordId]> {
        match &self.source {
            StoreError::PartialFailure { inserted, .. } => Some(inserted),
            _ => None,
        }
    }
}

/// A specialized `Result` type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while loading a [`ConnectionConfig`](crate::config::ConnectionConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse connection config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid connection config: {0}")]
    Invalid(String),
}
