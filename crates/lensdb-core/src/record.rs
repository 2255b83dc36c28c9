use crate::{
    db,
    error::{FieldError, StoreError},
    serialize::SerializeError,
    types::{CollectionName, RecordId, Timestamp},
    value::Value,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeSet;

/// Private key carrying the record id in the storage-dict form.
pub const ID_FIELD: &str = "_id";

/// Private key carrying the ingest time in the storage-dict form.
pub const INGEST_TIME_FIELD: &str = "_ingest_time";

///
/// BackingRecord
///
/// The persisted field container behind a document: an ordered map from
/// field name to value, plus the collection binding assigned when the
/// record is added to a dataset.
///
/// A record is `in_db` once it carries both a collection and an id; its
/// identity is undefined before that.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BackingRecord {
    id: Option<RecordId>,
    ingest_time: Option<Timestamp>,
    fields: IndexMap<String, Value>,

    // Runtime binding only; rows are stored inside their collection.
    #[serde(skip)]
    collection: Option<CollectionName>,
}

impl BackingRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unattached record from field values, validating names.
    pub fn from_fields(
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, FieldError> {
        let mut record = Self::new();
        for (name, value) in fields {
            record.set_field(&name, value, true)?;
        }
        Ok(record)
    }

    ///
    /// IDENTITY
    ///

    #[must_use]
    pub const fn in_db(&self) -> bool {
        self.collection.is_some() && self.id.is_some()
    }

    /// The record's identity, defined only once it is in the database.
    #[must_use]
    pub const fn id(&self) -> Option<RecordId> {
        if self.in_db() { self.id } else { None }
    }

    #[must_use]
    pub const fn ingest_time(&self) -> Option<Timestamp> {
        self.ingest_time
    }

    #[must_use]
    pub const fn collection(&self) -> Option<&CollectionName> {
        self.collection.as_ref()
    }

    /// Bind this record to a collection row.
    pub(crate) fn bind(&mut self, collection: CollectionName, id: RecordId, ingest: Timestamp) {
        self.collection = Some(collection);
        self.id = Some(id);
        self.ingest_time = Some(ingest);
    }

    /// Drop the collection binding, returning the record to the unattached
    /// state.
    pub(crate) fn clear_binding(&mut self) {
        self.collection = None;
        self.id = None;
        self.ingest_time = None;
    }

    /// Restore the runtime collection binding after decoding a stored row.
    pub(crate) fn rebind_collection(&mut self, collection: CollectionName) {
        self.collection = Some(collection);
    }

    ///
    /// FIELD ACCESS
    ///

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get_field(&self, name: &str) -> Result<&Value, FieldError> {
        self.fields.get(name).ok_or_else(|| FieldError::NoSuchField {
            name: name.to_string(),
        })
    }

    /// Set a field's value. With `create == false` the field must already
    /// be declared; with `create == true` the schema is extended as needed.
    pub fn set_field(&mut self, name: &str, value: Value, create: bool) -> Result<(), FieldError> {
        validate_field_name(name)?;

        if !create && !self.fields.contains_key(name) {
            return Err(FieldError::NoSuchField {
                name: name.to_string(),
            });
        }

        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Clear a field's value, keeping its schema slot.
    pub fn clear_field(&mut self, name: &str) -> Result<(), FieldError> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = Value::Null;
                Ok(())
            }
            None => Err(FieldError::NoSuchField {
                name: name.to_string(),
            }),
        }
    }

    pub(crate) const fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub(crate) const fn fields_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.fields
    }

    ///
    /// DICT / JSON
    ///

    /// Storage-dict form: every field plus the private identity keys.
    #[must_use]
    pub fn to_dict(&self) -> JsonMap<String, JsonValue> {
        let mut dict = JsonMap::new();

        if let Some(id) = self.id {
            dict.insert(ID_FIELD.to_string(), id.to_string().into());
        }
        if let Some(ingest) = self.ingest_time {
            dict.insert(INGEST_TIME_FIELD.to_string(), ingest.as_seconds().into());
        }
        for (name, value) in &self.fields {
            dict.insert(name.clone(), value.to_json());
        }

        dict
    }

    /// Build an unattached record from a dict, ignoring private keys.
    pub fn from_dict(dict: &JsonMap<String, JsonValue>) -> Result<Self, SerializeError> {
        let fields = dict
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, json)| Value::from_json(json).map(|value| (name.clone(), value)))
            .collect::<Result<IndexMap<_, _>, _>>()?;

        Ok(Self {
            fields,
            ..Self::default()
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SerializeError> {
        let parsed: JsonValue = serde_json::from_str(json)
            .map_err(|err| SerializeError::Deserialize(err.to_string()))?;
        let dict = parsed
            .as_object()
            .ok_or_else(|| SerializeError::Deserialize("expected a JSON object".to_string()))?;

        Self::from_dict(dict)
    }

    ///
    /// PERSISTENCE
    ///

    /// Persist this record's fields into its collection row.
    ///
    /// Paths named in `filtered_fields` merge back by label id; everything
    /// else overwrites the stored field. Stored fields absent from this
    /// record are preserved.
    pub fn save(&self, filtered_fields: Option<&BTreeSet<String>>) -> Result<(), StoreError> {
        db::save_record(self, filtered_fields)
    }

    /// Refresh the values of currently-declared fields from storage.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let stored = self.load_stored()?;

        for (name, slot) in &mut self.fields {
            if let Some(value) = stored.fields.get(name) {
                *slot = value.clone();
            }
        }
        self.ingest_time = stored.ingest_time;

        Ok(())
    }

    /// Re-derive the schema from storage, picking up fields added by
    /// other writers.
    pub fn reload_hard(&mut self) -> Result<(), StoreError> {
        let stored = self.load_stored()?;

        self.fields = stored.fields;
        self.ingest_time = stored.ingest_time;

        Ok(())
    }

    fn load_stored(&self) -> Result<Self, StoreError> {
        let collection = self.collection.as_ref().ok_or(StoreError::NotPersisted)?;
        let id = self.id.ok_or(StoreError::NotPersisted)?;

        db::load_record(collection, id)
    }
}

fn validate_field_name(name: &str) -> Result<(), FieldError> {
    if name.starts_with('_') {
        return Err(FieldError::InvalidFieldName {
            name: name.to_string(),
        });
    }

    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BackingRecord {
        BackingRecord::from_fields([
            ("filepath".to_string(), Value::Text("/img/1.jpg".to_string())),
            ("frame_count".to_string(), Value::Int(30)),
        ])
        .expect("record")
    }

    #[test]
    fn unattached_record_has_no_identity() {
        let r = record();
        assert!(!r.in_db());
        assert_eq!(r.id(), None);
        assert_eq!(r.ingest_time(), None);
    }

    #[test]
    fn set_field_rejects_underscore_names() {
        let mut r = record();
        let err = r.set_field("_secret", Value::Int(1), true).unwrap_err();
        assert!(matches!(err, FieldError::InvalidFieldName { .. }));
    }

    #[test]
    fn set_field_without_create_requires_declaration() {
        let mut r = record();
        let err = r.set_field("missing", Value::Int(1), false).unwrap_err();
        assert!(matches!(err, FieldError::NoSuchField { .. }));

        r.set_field("missing", Value::Int(1), true).expect("create");
        r.set_field("missing", Value::Int(2), false).expect("update");
        assert_eq!(r.get_field("missing").expect("get"), &Value::Int(2));
    }

    #[test]
    fn clear_field_keeps_schema_slot() {
        let mut r = record();
        r.clear_field("frame_count").expect("clear");

        assert!(r.has_field("frame_count"));
        assert_eq!(r.get_field("frame_count").expect("get"), &Value::Null);

        let err = r.clear_field("nope").unwrap_err();
        assert!(matches!(err, FieldError::NoSuchField { .. }));
    }

    #[test]
    fn field_names_preserve_declared_order() {
        let names: Vec<_> = record().field_names().map(ToString::to_string).collect();
        assert_eq!(names, ["filepath", "frame_count"]);
    }

    #[test]
    fn dict_roundtrip_skips_private_keys() {
        let mut r = record();
        r.bind(
            CollectionName::new("quickstart").expect("name"),
            RecordId::generate(),
            Timestamp::from_seconds(100),
        );

        let dict = r.to_dict();
        assert!(dict.contains_key(ID_FIELD));
        assert!(dict.contains_key(INGEST_TIME_FIELD));

        let back = BackingRecord::from_dict(&dict).expect("from_dict");
        assert!(!back.in_db());
        assert_eq!(back.get_field("filepath"), r.get_field("filepath"));
        assert_eq!(back.get_field("frame_count"), r.get_field("frame_count"));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(BackingRecord::from_json("[1, 2]").is_err());
        assert!(BackingRecord::from_json("{\"a\": 1}").is_ok());
    }
}
