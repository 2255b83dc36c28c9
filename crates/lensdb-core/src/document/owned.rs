use crate::{
    dataset::Dataset,
    db,
    document::{DocumentAccess, DocumentState, Sealed},
    error::{DatasetError, Error, FieldError, StoreError},
    record::BackingRecord,
    registry::{self, SharedState},
    types::{RecordId, Timestamp},
    value::Value,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::{cell::RefCell, rc::Rc};
use tracing::debug;

///
/// Document
///
/// An owned, identity-bearing entity backed by exactly one record.
///
/// A document is a cheap-clone handle; clones share state and identity.
/// Documents start unattached and gain an id when added to a dataset;
/// in-dataset instances are singletons per record id, so loading the same
/// record twice yields handles over the same state.
///

#[derive(Clone, Debug)]
pub struct Document {
    state: SharedState,
}

impl Document {
    pub(crate) const KIND: &'static str = "document";

    #[must_use]
    pub fn new() -> Self {
        Self::wrap(BackingRecord::new(), None)
    }

    /// Build an unattached document from field values.
    pub fn from_fields<V: Into<Value>>(
        fields: impl IntoIterator<Item = (String, V)>,
    ) -> Result<Self, FieldError> {
        let record = BackingRecord::from_fields(
            fields.into_iter().map(|(name, value)| (name, value.into())),
        )?;

        Ok(Self::wrap(record, None))
    }

    fn wrap(record: BackingRecord, dataset: Option<Dataset>) -> Self {
        Self {
            state: Rc::new(RefCell::new(DocumentState { record, dataset })),
        }
    }

    pub(crate) fn from_shared(state: SharedState) -> Self {
        Self { state }
    }

    /// Create a document backed by the given record.
    ///
    /// Unattached records wrap directly. For in-database records, the
    /// singleton registry is consulted first and the existing instance is
    /// returned when present — callers must not assume a fresh handle.
    /// Otherwise `dataset` is required and the new instance is registered.
    pub fn from_record(record: BackingRecord, dataset: Option<&Dataset>) -> Result<Self, Error> {
        let Some(id) = record.id() else {
            return Ok(Self::wrap(record, None));
        };

        if let Some(state) = registry::lookup(Self::KIND, id) {
            return Ok(Self::from_shared(state));
        }

        let dataset = dataset.ok_or(DatasetError::MissingDatasetArgument)?;
        let document = Self::wrap(record, Some(dataset.clone()));
        registry::register(Self::KIND, id, &document.state);

        Ok(document)
    }

    /// Load an unattached document from a dict, ignoring private keys.
    pub fn from_dict(dict: &JsonMap<String, JsonValue>) -> Result<Self, Error> {
        let record = BackingRecord::from_dict(dict)?;
        Self::from_record(record, None)
    }

    /// Load an unattached document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let record = BackingRecord::from_json(json)?;
        Self::from_record(record, None)
    }

    ///
    /// PERSISTENCE
    ///

    /// Persist the document's fields to its dataset.
    pub fn save(&self) -> Result<(), StoreError> {
        self.state.borrow().record.save(None)
    }

    /// Reload the document from the database.
    ///
    /// A soft reload refreshes only currently-declared field values; a
    /// hard reload also re-derives the schema, which is necessary when
    /// fields may have been added by another writer.
    pub fn reload(&mut self, hard: bool) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();

        if hard {
            state.record.reload_hard()
        } else {
            state.record.reload()
        }
    }

    ///
    /// ATTACHMENT
    ///

    /// Bind this document into a dataset: assign identity, insert the row,
    /// and register the singleton. The binding is rolled back if the
    /// insert fails.
    pub(crate) fn attach_to(
        &self,
        dataset: &Dataset,
        id: RecordId,
        ingest: Timestamp,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.state.borrow_mut();
            state.record.bind(dataset.collection().clone(), id, ingest);
            state.dataset = Some(dataset.clone());
        }

        if let Err(err) = db::insert_record(&self.state.borrow().record) {
            let mut state = self.state.borrow_mut();
            state.record.clear_binding();
            state.dataset = None;
            return Err(err);
        }

        registry::register(Self::KIND, id, &self.state);
        debug!(dataset = dataset.name(), %id, "attached document");

        Ok(())
    }

    /// Detach in place: deep-copy the fields into a fresh record and drop
    /// the dataset reference, leaving the equivalent of a fresh `copy()`.
    pub fn reset_record(&mut self) {
        let mut state = self.state.borrow_mut();

        let mut record = BackingRecord::new();
        record.clone_from(&state.record);
        record.clear_binding();

        state.record = record;
        state.dataset = None;
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Sealed for Document {
    fn state(&self) -> &SharedState {
        &self.state
    }
}

impl DocumentAccess for Document {}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
            || self.state.borrow().record == other.state.borrow().record
    }
}

///
/// TESTS
///
