//! LensDB — a schema-flexible document model and dataset runtime for
//! computer-vision datasets.
//!
//! ## Crate layout
//! - `core`: the document/view model, the row store, and the id-keyed
//!   label merge.
//! - `openimages`: importer for the Open Images CSV metadata format.
//!
//! The `prelude` module mirrors the runtime surface used by application
//! code.

pub use lensdb_core as core;

pub mod openimages;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use lensdb_core::error::Error;

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        dataset::{Dataset, DatasetView},
        document::{Document, DocumentAccess as _, DocumentView, MergeOptions, merge_labels},
        error::Error,
        label::{
            Classification, Classifications, Detection, Detections, LabelList as _, Labeled as _,
        },
        types::{RecordId, Timestamp},
        value::Value,
    };
    pub use crate::openimages;
}
