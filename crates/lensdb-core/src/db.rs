//! Process-wide in-memory row store.
//!
//! Rows are CBOR-encoded [`BackingRecord`]s keyed by [`RecordId`] inside
//! named collections. All access goes through [`with_database`]; the store
//! is `thread_local!` state and assumes the crate's single-threaded model.

use crate::{
    document::merge::merge_labels,
    error::StoreError,
    label::LabelList,
    record::BackingRecord,
    serialize,
    types::{CollectionName, RecordId},
    value::Value,
};
use derive_more::{Deref, DerefMut};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
};
use tracing::{debug, info};

/// Max serialized bytes for a single row to keep value loads bounded.
pub const MAX_ROW_BYTES: usize = 4 * 1024 * 1024;

///
/// RawRow
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRow(Vec<u8>);

impl RawRow {
    pub fn try_new(bytes: Vec<u8>) -> Result<Self, StoreError> {
        if bytes.len() > MAX_ROW_BYTES {
            return Err(StoreError::RowTooLarge {
                len: bytes.len(),
                limit: MAX_ROW_BYTES,
            });
        }
        Ok(Self(bytes))
    }

    pub fn encode(record: &BackingRecord) -> Result<Self, StoreError> {
        Self::try_new(serialize::serialize(record)?)
    }

    pub fn decode(&self, collection: &CollectionName) -> Result<BackingRecord, StoreError> {
        let mut record: BackingRecord = serialize::deserialize(&self.0)?;
        record.rebind_collection(collection.clone());
        Ok(record)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

///
/// Collection
///

#[derive(Debug, Default, Deref, DerefMut)]
pub struct Collection(BTreeMap<RecordId, RawRow>);

///
/// Database
///

#[derive(Debug, Default)]
pub struct Database {
    collections: BTreeMap<CollectionName, Collection>,
}

impl Database {
    pub fn create_collection(&mut self, name: &CollectionName) -> Result<(), StoreError> {
        if self.collections.contains_key(name) {
            return Err(StoreError::CollectionExists {
                name: name.to_string(),
            });
        }

        self.collections.insert(name.clone(), Collection::default());
        info!(collection = %name, "created collection");
        Ok(())
    }

    pub fn drop_collection(&mut self, name: &CollectionName) -> Result<(), StoreError> {
        match self.collections.remove(name) {
            Some(_) => {
                info!(collection = %name, "dropped collection");
                Ok(())
            }
            None => Err(StoreError::CollectionNotFound {
                name: name.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn has_collection(&self, name: &CollectionName) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection(&self, name: &CollectionName) -> Result<&Collection, StoreError> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    pub fn collection_mut(&mut self, name: &CollectionName) -> Result<&mut Collection, StoreError> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Sum of bytes used by all rows in a collection.
    pub fn memory_bytes(&self, name: &CollectionName) -> Result<usize, StoreError> {
        Ok(self.collection(name)?.values().map(RawRow::len).sum())
    }
}

thread_local! {
    static DATABASE: RefCell<Database> = RefCell::new(Database::default());
}

/// Access the process-wide database.
pub fn with_database<R>(f: impl FnOnce(&mut Database) -> R) -> R {
    DATABASE.with(|cell| f(&mut cell.borrow_mut()))
}

///
/// Record operations
///

pub(crate) fn create_collection(name: &CollectionName) -> Result<(), StoreError> {
    with_database(|db| db.create_collection(name))
}

pub(crate) fn drop_collection(name: &CollectionName) -> Result<(), StoreError> {
    with_database(|db| db.drop_collection(name))
}

pub(crate) fn has_collection(name: &CollectionName) -> bool {
    with_database(|db| db.has_collection(name))
}

pub(crate) fn collection_len(name: &CollectionName) -> Result<usize, StoreError> {
    with_database(|db| Ok(db.collection(name)?.len()))
}

pub(crate) fn record_ids(name: &CollectionName) -> Result<Vec<RecordId>, StoreError> {
    with_database(|db| Ok(db.collection(name)?.keys().copied().collect()))
}

pub(crate) fn contains_record(name: &CollectionName, id: RecordId) -> Result<bool, StoreError> {
    with_database(|db| Ok(db.collection(name)?.contains_key(&id)))
}

/// Insert a bound record as a fresh row.
pub(crate) fn insert_record(record: &BackingRecord) -> Result<(), StoreError> {
    let (collection, id) = binding(record)?;
    let raw = RawRow::encode(record)?;

    with_database(|db| {
        db.collection_mut(&collection)?.insert(id, raw);
        debug!(collection = %collection, %id, "inserted record");
        Ok(())
    })
}

pub(crate) fn load_record(
    name: &CollectionName,
    id: RecordId,
) -> Result<BackingRecord, StoreError> {
    with_database(|db| {
        db.collection(name)?
            .get(&id)
            .ok_or(StoreError::RecordNotFound { id })?
            .decode(name)
    })
}

pub(crate) fn delete_record(name: &CollectionName, id: RecordId) -> Result<(), StoreError> {
    with_database(|db| {
        db.collection_mut(name)?
            .remove(&id)
            .map(|_| debug!(collection = %name, %id, "deleted record"))
            .ok_or(StoreError::RecordNotFound { id })
    })
}

/// Persist a record with per-field upsert semantics.
///
/// Fields present on `record` overwrite the stored row, except paths named
/// in `filtered_fields`, whose label lists merge back by id. Stored fields
/// absent from `record` are preserved, so a projected view save never
/// deletes excluded fields.
pub(crate) fn save_record(
    record: &BackingRecord,
    filtered_fields: Option<&BTreeSet<String>>,
) -> Result<(), StoreError> {
    let (collection, id) = binding(record)?;

    with_database(|db| {
        let rows = db.collection_mut(&collection)?;

        let merged = match rows.get(&id) {
            Some(raw) => {
                let mut stored = raw.decode(&collection)?;
                for (name, value) in record.fields() {
                    let filtered = filtered_fields.is_some_and(|f| f.contains(name));
                    if filtered && let Some(slot) = stored.fields_mut().get_mut(name) {
                        merge_filtered_field(slot, value);
                        continue;
                    }
                    stored.fields_mut().insert(name.clone(), value.clone());
                }
                stored
            }
            None => record.clone(),
        };

        rows.insert(id, RawRow::encode(&merged)?);
        debug!(collection = %collection, %id, "saved record");
        Ok(())
    })
}

fn binding(record: &BackingRecord) -> Result<(CollectionName, RecordId), StoreError> {
    let collection = record.collection().ok_or(StoreError::NotPersisted)?.clone();
    let id = record.id().ok_or(StoreError::NotPersisted)?;
    Ok((collection, id))
}

/// Merge a filtered field back into its stored slot.
///
/// Only the elements present in the (possibly reduced) incoming list are
/// written; stored elements outside the filtered subset stay untouched.
fn merge_filtered_field(slot: &mut Value, incoming: &Value) {
    match (slot, incoming) {
        (Value::Detections(stored), Value::Detections(incoming)) => {
            merge_labels(stored.labels_mut(), incoming.labels().to_vec(), true);
        }
        (Value::Classifications(stored), Value::Classifications(incoming)) => {
            merge_labels(stored.labels_mut(), incoming.labels().to_vec(), true);
        }
        (slot, incoming) => {
            // Not a label list; a filtered path can only overwrite.
            debug!("filtered field is not a label list; overwriting stored value");
            *slot = incoming.clone();
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        label::{Detection, Detections},
        types::Timestamp,
    };

    fn bound_record(collection: &CollectionName) -> BackingRecord {
        let mut record = BackingRecord::from_fields([
            ("filepath".to_string(), Value::Text("/img/1.jpg".to_string())),
            ("width".to_string(), Value::Int(640)),
        ])
        .expect("record");
        record.bind(
            collection.clone(),
            RecordId::generate(),
            Timestamp::from_seconds(10),
        );
        record
    }

    fn setup() -> (CollectionName, BackingRecord) {
        let name = CollectionName::new("test_rows").expect("name");
        create_collection(&name).expect("create");
        let record = bound_record(&name);
        insert_record(&record).expect("insert");
        (name, record)
    }

    #[test]
    fn insert_then_load_roundtrips() {
        let (name, record) = setup();
        let id = record.id().expect("id");

        let loaded = load_record(&name, id).expect("load");
        assert_eq!(loaded, record);
        assert!(loaded.in_db());
        assert!(with_database(|db| db.memory_bytes(&name)).expect("bytes") > 0);
    }

    #[test]
    fn load_missing_record_fails() {
        let (name, _) = setup();
        let err = load_record(&name, RecordId::generate()).unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[test]
    fn collections_must_be_unique() {
        let name = CollectionName::new("dupe").expect("name");
        create_collection(&name).expect("create");
        let err = create_collection(&name).unwrap_err();
        assert!(matches!(err, StoreError::CollectionExists { .. }));
    }

    #[test]
    fn save_preserves_fields_absent_from_the_incoming_record() {
        let (name, record) = setup();
        let id = record.id().expect("id");

        // A projected save carries only some fields.
        let mut projected = BackingRecord::from_fields([(
            "width".to_string(),
            Value::Int(1280),
        )])
        .expect("record");
        projected.bind(name.clone(), id, Timestamp::from_seconds(10));

        save_record(&projected, None).expect("save");

        let stored = load_record(&name, id).expect("load");
        assert_eq!(stored.get_field("width").expect("width"), &Value::Int(1280));
        assert_eq!(
            stored.get_field("filepath").expect("filepath"),
            &Value::Text("/img/1.jpg".to_string())
        );
    }

    #[test]
    fn filtered_save_merges_labels_without_deleting_others() {
        let name = CollectionName::new("filtered_rows").expect("name");
        create_collection(&name).expect("create");

        let keep = Detection::new("cat", [0.0, 0.0, 0.5, 0.5]);
        let edit = Detection::new("dog", [0.5, 0.5, 0.5, 0.5]);

        let mut record = BackingRecord::from_fields([(
            "ground_truth".to_string(),
            Value::Detections(Detections::new(vec![keep.clone(), edit.clone()])),
        )])
        .expect("record");
        record.bind(name.clone(), RecordId::generate(), Timestamp::from_seconds(1));
        insert_record(&record).expect("insert");
        let id = record.id().expect("id");

        // The view only sees the "dog" detection and relabels it.
        let mut filtered_view = edit.clone();
        filtered_view.label = "wolf".to_string();
        let mut projected = BackingRecord::from_fields([(
            "ground_truth".to_string(),
            Value::Detections(Detections::new(vec![filtered_view])),
        )])
        .expect("record");
        projected.bind(name.clone(), id, Timestamp::from_seconds(1));

        let filtered: BTreeSet<String> = ["ground_truth".to_string()].into();
        save_record(&projected, Some(&filtered)).expect("save");

        let stored = load_record(&name, id).expect("load");
        let dets = stored
            .get_field("ground_truth")
            .expect("field")
            .as_detections()
            .expect("detections");

        assert_eq!(dets.detections.len(), 2);
        assert_eq!(dets.detections[0].id, keep.id);
        assert_eq!(dets.detections[0].label, "cat");
        assert_eq!(dets.detections[1].id, edit.id);
        assert_eq!(dets.detections[1].label, "wolf");
    }

    #[test]
    fn delete_removes_the_row() {
        let (name, record) = setup();
        let id = record.id().expect("id");

        delete_record(&name, id).expect("delete");
        assert!(!contains_record(&name, id).expect("contains"));
        assert!(matches!(
            delete_record(&name, id),
            Err(StoreError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn oversized_rows_are_rejected() {
        let err = RawRow::try_new(vec![0_u8; MAX_ROW_BYTES + 1]).unwrap_err();
        assert!(matches!(err, StoreError::RowTooLarge { .. }));
    }
}
