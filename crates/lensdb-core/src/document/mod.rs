//! Documents and document views.
//!
//! Both [`Document`] and [`DocumentView`] speak the same field-access
//! contract, [`DocumentAccess`]; views additionally restrict visibility to
//! their projection. Field access is explicit method calls throughout —
//! there is no reflection-style fallback.

pub(crate) mod merge;

mod owned;
mod view;

pub use merge::{MergeOptions, merge_labels};
pub use owned::Document;
pub use view::DocumentView;

use crate::{
    dataset::Dataset,
    error::FieldError,
    record::BackingRecord,
    registry::SharedState,
    serialize::SerializeError,
    types::{RecordId, Timestamp},
    value::Value,
};
use serde_json::{Map as JsonMap, Value as JsonValue};

///
/// DocumentState
///
/// Shared mutable state behind a document handle: the backing record and
/// the dataset it belongs to, if any. Handles and the singleton registry
/// share this through `Rc<RefCell<_>>`.
///

#[derive(Debug)]
pub(crate) struct DocumentState {
    pub(crate) record: BackingRecord,
    pub(crate) dataset: Option<Dataset>,
}

mod sealed {
    use super::SharedState;

    pub trait Sealed {
        fn state(&self) -> &SharedState;
    }
}

pub(crate) use sealed::Sealed;

///
/// DocumentAccess
///
/// The field-access contract shared by documents and views.
///
/// Attribute-style sugar from the dynamic original maps onto two setters
/// with deliberate friction: [`set`](Self::set) writes only declared
/// fields, while [`insert`](Self::insert) extends the schema. This keeps
/// typos from silently drifting the schema.
///

pub trait DocumentAccess: sealed::Sealed + Sized {
    /// An ordered list of the names of the declared fields.
    #[must_use]
    fn field_names(&self) -> Vec<String> {
        self.state()
            .borrow()
            .record
            .field_names()
            .map(ToString::to_string)
            .collect()
    }

    /// Whether the document has the given field. The `id` pseudo-field is
    /// always present.
    #[must_use]
    fn has_field(&self, name: &str) -> bool {
        name == "id" || self.state().borrow().record.has_field(name)
    }

    /// Get the value of a field.
    ///
    /// `"id"` resolves to the document's identity (`Null` while the
    /// document is not in a dataset).
    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        if name == "id" {
            return Ok(self
                .id()
                .map_or(Value::Null, |id| Value::Text(id.to_string())));
        }

        self.state().borrow().record.get_field(name).cloned()
    }

    /// Set the value of a field. With `create == false` the field must
    /// already be declared.
    fn set_field(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        create: bool,
    ) -> Result<(), FieldError> {
        self.state()
            .borrow_mut()
            .record
            .set_field(name, value.into(), create)
    }

    /// Clear the value of a field, keeping its schema slot.
    fn clear_field(&mut self, name: &str) -> Result<(), FieldError> {
        self.state().borrow_mut().record.clear_field(name)
    }

    /// Assign a declared field. Fails with
    /// [`FieldError::UndeclaredFieldAssignment`] for unknown fields;
    /// use [`insert`](Self::insert) to extend the schema instead.
    fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        if !self.has_field(name) {
            return Err(FieldError::UndeclaredFieldAssignment {
                name: name.to_string(),
            });
        }

        self.set_field(name, value, false)
    }

    /// Set a field, declaring it if needed.
    fn insert(&mut self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        self.set_field(name, value, true)
    }

    /// Apply a mapping of field updates.
    ///
    /// With `expand_schema == false`, an unknown key fails with
    /// [`FieldError::NoSuchField`]; updates are applied per key, so keys
    /// before the failing one stay applied.
    fn update_fields<V: Into<Value>>(
        &mut self,
        fields: impl IntoIterator<Item = (String, V)>,
        expand_schema: bool,
    ) -> Result<(), FieldError> {
        for (name, value) in fields {
            self.set_field(&name, value, expand_schema)?;
        }

        Ok(())
    }

    /// Iterate `(name, value)` pairs in declared field order.
    ///
    /// The name list is snapshotted per call, so re-iterating observes the
    /// current schema.
    fn iter_fields(&self) -> impl Iterator<Item = (String, Value)> {
        self.field_names()
            .into_iter()
            .filter_map(|name| self.get_field(&name).ok().map(|value| (name, value)))
    }

    ///
    /// IDENTITY
    ///

    /// The document's identity, or `None` until it is added to a dataset.
    #[must_use]
    fn id(&self) -> Option<RecordId> {
        self.state().borrow().record.id()
    }

    #[must_use]
    fn ingest_time(&self) -> Option<Timestamp> {
        self.state().borrow().record.ingest_time()
    }

    #[must_use]
    fn in_dataset(&self) -> bool {
        self.dataset().is_some()
    }

    #[must_use]
    fn dataset(&self) -> Option<Dataset> {
        self.state().borrow().dataset.clone()
    }

    ///
    /// SERIALIZATION
    ///

    /// Snapshot in the raw storage form, private keys included.
    #[must_use]
    fn to_storage_dict(&self) -> JsonMap<String, JsonValue> {
        self.state().borrow().record.to_dict()
    }

    /// Snapshot excluding private (underscore-prefixed) keys.
    #[must_use]
    fn to_dict(&self) -> JsonMap<String, JsonValue> {
        let mut dict = self.to_storage_dict();
        dict.retain(|name, _| !name.starts_with('_'));
        dict
    }

    /// JSON rendering of [`to_dict`](Self::to_dict).
    fn to_json(&self, pretty: bool) -> Result<String, SerializeError> {
        let dict = JsonValue::Object(self.to_dict());

        let rendered = if pretty {
            serde_json::to_string_pretty(&dict)
        } else {
            serde_json::to_string(&dict)
        };

        rendered.map_err(|err| SerializeError::Serialize(err.to_string()))
    }

    ///
    /// COPY / MERGE
    ///

    /// Deep-copy into a new document that has not been added to a dataset.
    fn copy(&self) -> Result<Document, FieldError> {
        self.copy_with(None, None)
    }

    /// Deep-copy a subset of fields into a new unattached document.
    fn copy_with(
        &self,
        fields: Option<&[&str]>,
        omit_fields: Option<&[&str]>,
    ) -> Result<Document, FieldError> {
        let mut names: Vec<String> = fields.map_or_else(
            || self.field_names(),
            |fs| fs.iter().map(ToString::to_string).collect(),
        );
        if let Some(omit) = omit_fields {
            names.retain(|name| !omit.contains(&name.as_str()));
        }

        let copied = names
            .into_iter()
            .map(|name| self.get_field(&name).map(|value| (name, value)))
            .collect::<Result<Vec<_>, _>>()?;

        Document::from_fields(copied)
    }

    /// Merge the fields of another document or view into this one.
    fn merge(
        &mut self,
        source: &impl DocumentAccess,
        options: &MergeOptions,
    ) -> Result<(), FieldError> {
        merge::merge_into(self, source, options)
    }
}
