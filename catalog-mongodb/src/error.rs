//! Categorization of MongoDB driver errors into catalog store errors.

use std::io;

use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};

use catalog_core::{
    error::{FailedRecord, StoreError},
    record::RecordId,
};

/// Server error codes the catalog distinguishes.
mod code {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const UNAUTHORIZED: i32 = 13;
    pub const TYPE_MISMATCH: i32 = 14;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const CONFLICTING_UPDATE_OPERATORS: i32 = 40;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const MAX_TIME_MS_EXPIRED: i32 = 50;
    pub const DOLLAR_PREFIXED_FIELD_NAME: i32 = 52;
    pub const EMPTY_FIELD_NAME: i32 = 56;
    pub const DOTTED_FIELD_NAME: i32 = 57;
    pub const IMMUTABLE_FIELD: i32 = 66;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const EXCEEDED_TIME_LIMIT: i32 = 262;
    pub const DUPLICATE_KEY: i32 = 11000;
}

pub(crate) use code::NAMESPACE_EXISTS;

/// Maps a server error code onto a store error, keeping the server's message.
pub fn categorize_code(code: i32, message: impl Into<String>) -> StoreError {
    let message = message.into();

    match code {
        code::NAMESPACE_NOT_FOUND => StoreError::NotFound(message),
        code::MAX_TIME_MS_EXPIRED | code::EXCEEDED_TIME_LIMIT => StoreError::Timeout(message),
        code::UNAUTHORIZED | code::AUTHENTICATION_FAILED => StoreError::Connection(message),
        code::BAD_VALUE
        | code::FAILED_TO_PARSE
        | code::TYPE_MISMATCH
        | code::CONFLICTING_UPDATE_OPERATORS
        | code::DOLLAR_PREFIXED_FIELD_NAME
        | code::EMPTY_FIELD_NAME
        | code::DOTTED_FIELD_NAME
        | code::IMMUTABLE_FIELD
        | code::DOCUMENT_VALIDATION_FAILURE
        | code::DUPLICATE_KEY => StoreError::Validation(message),
        _ => StoreError::Backend(message),
    }
}

/// A rejected write is the record's fault unless its code says otherwise.
fn categorize_write(code: i32, message: String) -> StoreError {
    match categorize_code(code, message) {
        StoreError::Backend(message) => StoreError::Validation(message),
        other => other,
    }
}

/// Categorizes a driver error.
pub fn categorize(err: MongoError) -> StoreError {
    let rendered = err.to_string();

    match *err.kind {
        MongoErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
            StoreError::Timeout(rendered)
        }
        MongoErrorKind::Io(_)
        | MongoErrorKind::Authentication { .. }
        | MongoErrorKind::DnsResolve { .. }
        | MongoErrorKind::ConnectionPoolCleared { .. }
        | MongoErrorKind::ServerSelection { .. }
        | MongoErrorKind::InvalidTlsConfig { .. }
        | MongoErrorKind::Shutdown => StoreError::Connection(rendered),
        MongoErrorKind::InvalidArgument { .. }
        | MongoErrorKind::BsonSerialization(_)
        | MongoErrorKind::BsonDeserialization(_)
        | MongoErrorKind::Bson(_) => StoreError::Validation(rendered),
        MongoErrorKind::Command(ref command) => categorize_code(command.code, command.message.clone()),
        MongoErrorKind::Write(WriteFailure::WriteError(ref write)) => {
            categorize_write(write.code, write.message.clone())
        }
        MongoErrorKind::Write(WriteFailure::WriteConcernError(ref concern)) => {
            categorize_code(concern.code, concern.message.clone())
        }
        MongoErrorKind::InsertMany(ref insert) => match insert.write_errors.as_deref() {
            Some([first, ..]) => categorize_write(first.code, first.message.clone()),
            _ => StoreError::Backend(rendered),
        },
        _ => StoreError::Backend(rendered),
    }
}

/// Categorizes the failure of an ordered bulk insert of the records `ids`.
///
/// The driver stops at the first rejected record, so everything before it was
/// written. If nothing was written the first rejection is reported on its own.
pub fn categorize_insert(err: MongoError, ids: &[RecordId]) -> StoreError {
    let first = match err.kind.as_ref() {
        MongoErrorKind::InsertMany(insert) => insert
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().min_by_key(|e| e.index))
            .map(|e| (e.index, e.code, e.message.clone())),
        _ => None,
    };

    match first {
        Some((index, _, message)) if index > 0 && index < ids.len() => StoreError::PartialFailure {
            inserted: ids[..index].to_vec(),
            failed: (index..ids.len())
                .map(|position| FailedRecord {
                    index: position,
                    message: if position == index {
                        message.clone()
                    } else {
                        format!("not attempted after record #{index} was rejected")
                    },
                })
                .collect(),
        },
        Some((_, code, message)) => categorize_write(code, message),
        None => categorize(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::error::ErrorKind;
    use std::sync::Arc;

    fn io_error(kind: io::ErrorKind) -> MongoError {
        MongoErrorKind::Io(Arc::new(io::Error::from(kind))).into()
    }

    #[test]
    fn io_timeouts_are_timeouts() {
        assert_eq!(categorize(io_error(io::ErrorKind::TimedOut)).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn other_io_failures_are_connection_errors() {
        assert_eq!(categorize(io_error(io::ErrorKind::ConnectionRefused)).kind(), ErrorKind::Connection);
    }

    #[test]
    fn server_codes_map_onto_kinds() {
        assert_eq!(categorize_code(26, "ns not found").kind(), ErrorKind::NotFound);
        assert_eq!(categorize_code(50, "operation exceeded time limit").kind(), ErrorKind::Timeout);
        assert_eq!(categorize_code(18, "auth failed").kind(), ErrorKind::Connection);
        assert_eq!(categorize_code(11000, "E11000 duplicate key").kind(), ErrorKind::Validation);
        assert_eq!(categorize_code(9999, "unknown").kind(), ErrorKind::Backend);
    }

    #[test]
    fn server_message_is_preserved() {
        match categorize_code(2, "unknown operator: $foo") {
            StoreError::Validation(message) => assert_eq!(message, "unknown operator: $foo"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_bulk_insert_failures_fall_back_to_categorize() {
        let ids = vec![RecordId::new(), RecordId::new()];
        let err = categorize_insert(io_error(io::ErrorKind::TimedOut), &ids);

        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
