//! Core runtime for LensDB: the schema-flexible document model, document
//! views, the in-memory row store, and the id-keyed label merge.
#![warn(unreachable_pub)]

pub mod dataset;
pub mod db;
pub mod document;
pub mod error;
pub mod label;
pub mod record;
pub mod serialize;
pub mod types;
pub mod value;

pub(crate) mod registry;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        dataset::{Dataset, DatasetView},
        document::{Document, DocumentAccess, DocumentView, MergeOptions},
        error::Error,
        label::{Classification, Classifications, Detection, Detections, LabelList, Labeled},
        types::{RecordId, Timestamp},
        value::Value,
    };
}
