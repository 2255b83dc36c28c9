use crate::{
    serialize::SerializeError,
    types::{CollectionNameError, RecordId},
};
use thiserror::Error as ThisError;

///
/// FieldError
///
/// Field-access failures surfaced by documents, views, and backing records.
/// All are local, synchronous failures; nothing is retried internally.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FieldError {
    #[error("document has no field '{name}'")]
    NoSuchField { name: String },

    #[error("invalid field name: '{name}'. Field names cannot start with '_'")]
    InvalidFieldName { name: String },

    #[error("cannot declare field '{name}' via set(); use insert() to extend the schema")]
    UndeclaredFieldAssignment { name: String },

    #[error("field '{name}' is excluded from this view")]
    FieldExcluded { name: String },

    #[error("field '{name}' was not selected on this view")]
    FieldNotSelected { name: String },
}

///
/// StoreError
///
/// Persistence-layer failures from the in-memory row store.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("collection not found: '{name}'")]
    CollectionNotFound { name: String },

    #[error("collection already exists: '{name}'")]
    CollectionExists { name: String },

    #[error("record not found: {id}")]
    RecordNotFound { id: RecordId },

    #[error("record is not bound to a collection; add it to a dataset first")]
    NotPersisted,

    #[error("row exceeds max size: {len} bytes (limit {limit})")]
    RowTooLarge { len: usize, limit: usize },

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

///
/// DatasetError
///
/// Dataset attachment and lifecycle failures.
///

#[derive(Debug, ThisError)]
pub enum DatasetError {
    #[error("a dataset must be provided for records that belong to a collection")]
    MissingDatasetArgument,

    #[error("document {id} already belongs to dataset '{dataset}'")]
    AlreadyAttached { id: RecordId, dataset: String },

    #[error("document does not belong to a dataset")]
    NotAttached,

    #[error(transparent)]
    InvalidName(#[from] CollectionNameError),
}

///
/// Error
///
/// Top-level error for operations that cross component boundaries.
/// Narrow operations return their specific error type directly.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl Error {
    /// Returns true if this error is a plain missing-field failure.
    #[must_use]
    pub const fn is_no_such_field(&self) -> bool {
        matches!(self, Self::Field(FieldError::NoSuchField { .. }))
    }
}
