//! Core traits and types for record representation and serialization.
//!
//! Records are plain serde types. They never carry their own identifier: the
//! service generates a [`RecordId`] on insert and the store keeps it as `_id`.

use bson::{
    Document,
    de::deserialize_from_document,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Identifier generated for every inserted record.
pub type RecordId = bson::Uuid;

/// Field name under which stores keep the record identifier.
pub const ID_FIELD: &str = "_id";

/// Trait implemented by every entity of the catalog model.
///
/// # Example
///
/// ```ignore
/// use catalog::record::Record;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Author {
///     pub name: String,
/// }
///
/// impl Record for Author {
///     fn collection_name() -> &'static str {
///         "authors"
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the name of the collection this record type lives in.
    fn collection_name() -> &'static str;
}

/// Extension trait providing conversions between records and store documents.
///
/// Implemented for every serde type so untyped collections can use it as well.
pub trait RecordExt: Serialize + DeserializeOwned {
    /// Converts this record into a BSON document ready for storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the value does not serialize to a
    /// document (for example a bare scalar, or an unsigned integer too large for
    /// BSON) or if it carries the reserved `_id` field.
    fn to_document(&self) -> StoreResult<Document>;

    /// Creates a record from a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the document does not match the record's shape.
    fn from_document(document: Document) -> StoreResult<Self>;

    /// Converts this value into relaxed extended JSON.
    ///
    /// Used to describe inputs in error context, so `_id` is rendered rather than rejected.
    fn to_json(&self) -> StoreResult<Value>;
}

impl<T: Serialize + DeserializeOwned> RecordExt for T {
    fn to_document(&self) -> StoreResult<Document> {
        let document = serialize_to_document(self)?;

        if document.contains_key(ID_FIELD) {
            return Err(StoreError::Validation(format!(
                "record must not set the reserved `{ID_FIELD}` field"
            )));
        }

        Ok(document)
    }

    fn from_document(document: Document) -> StoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_json(&self) -> StoreResult<Value> {
        Ok(bson::Bson::Document(serialize_to_document(self)?).into_relaxed_extjson())
    }
}

/// A record read back from the store together with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<D> {
    pub id: RecordId,
    pub record: D,
}

impl<D> Stored<D> {
    pub fn into_record(self) -> D {
        self.record
    }
}

impl<D: DeserializeOwned + Serialize> Stored<D> {
    pub(crate) fn decode(id: RecordId, document: Document) -> StoreResult<Self> {
        Ok(Self { id, record: D::from_document(document)? })
    }
}
