use crate::{
    db,
    document::{Document, DocumentAccess, DocumentView},
    error::{DatasetError, Error, StoreError},
    record::BackingRecord,
    registry,
    types::{CollectionName, RecordId, Timestamp},
    value::Value,
};
use std::{collections::BTreeSet, fmt, rc::Rc};
use tracing::info;

///
/// Dataset
///
/// A cheap-clone handle over a named collection of documents. The rows
/// live in the process-wide database; the handle carries only the name.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dataset {
    name: CollectionName,
}

impl Dataset {
    /// Create a new, empty dataset.
    pub fn create(name: &str) -> Result<Self, Error> {
        let name = CollectionName::new(name).map_err(DatasetError::from)?;
        db::create_collection(&name)?;

        info!(dataset = %name, "created dataset");
        Ok(Self { name })
    }

    /// Load an existing dataset.
    pub fn load(name: &str) -> Result<Self, Error> {
        let name = CollectionName::new(name).map_err(DatasetError::from)?;
        if !db::has_collection(&name) {
            return Err(StoreError::CollectionNotFound {
                name: name.to_string(),
            }
            .into());
        }

        Ok(Self { name })
    }

    pub fn get_or_create(name: &str) -> Result<Self, Error> {
        let collection = CollectionName::new(name).map_err(DatasetError::from)?;
        if db::has_collection(&collection) {
            Ok(Self { name: collection })
        } else {
            Self::create(name)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) const fn collection(&self) -> &CollectionName {
        &self.name
    }

    ///
    /// DOCUMENTS
    ///

    /// Add an unattached document to this dataset.
    ///
    /// The document gains an id and ingest time and becomes the canonical
    /// singleton instance for its record.
    pub fn add(&self, document: &Document) -> Result<RecordId, Error> {
        if let Some(dataset) = document.dataset() {
            return Err(DatasetError::AlreadyAttached {
                id: document.id().unwrap_or_default(),
                dataset: dataset.name().to_string(),
            }
            .into());
        }

        let id = RecordId::generate();
        document.attach_to(self, id, Timestamp::now())?;

        Ok(id)
    }

    /// Add a batch of unattached documents, in order.
    ///
    /// Documents before a failing one stay added.
    pub fn add_many<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Result<Vec<RecordId>, Error> {
        documents
            .into_iter()
            .map(|document| self.add(document))
            .collect()
    }

    /// Get the document with the given id.
    pub fn get(&self, id: RecordId) -> Result<Document, Error> {
        let record = db::load_record(&self.name, id)?;
        Document::from_record(record, Some(self))
    }

    /// All documents in the dataset, in id order.
    pub fn documents(&self) -> Result<Vec<Document>, Error> {
        db::record_ids(&self.name)?
            .into_iter()
            .map(|id| self.get(id))
            .collect()
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(db::collection_len(&self.name)?)
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, id: RecordId) -> Result<bool, Error> {
        Ok(db::contains_record(&self.name, id)?)
    }

    /// Remove a document from the dataset. A live in-memory instance is
    /// detached in place and its registry entry dropped.
    pub fn remove(&self, id: RecordId) -> Result<(), Error> {
        db::delete_record(&self.name, id)?;

        if let Some(state) = registry::lookup(Document::KIND, id) {
            Document::from_shared(state).reset_record();
        }
        registry::invalidate(Document::KIND, id);

        Ok(())
    }

    /// Delete the dataset and all of its documents.
    pub fn delete(self) -> Result<(), Error> {
        for id in db::record_ids(&self.name)? {
            if let Some(state) = registry::lookup(Document::KIND, id) {
                Document::from_shared(state).reset_record();
            }
            registry::invalidate(Document::KIND, id);
        }

        db::drop_collection(&self.name)?;
        info!(dataset = %self.name, "deleted dataset");
        Ok(())
    }

    /// Start building a view into this dataset.
    #[must_use]
    pub fn view(&self) -> DatasetView {
        DatasetView::new(self.clone())
    }
}

///
/// LabelFilter
///

#[derive(Clone)]
struct LabelFilter {
    field: String,
    predicate: Rc<dyn Fn(&Value) -> bool>,
}

///
/// DatasetView
///
/// Projection configuration over a dataset: selected/excluded fields and
/// per-field label filters. Materializing the view produces
/// [`DocumentView`]s carrying the projection.
///

#[derive(Clone)]
pub struct DatasetView {
    dataset: Dataset,
    selected_fields: Option<BTreeSet<String>>,
    excluded_fields: Option<BTreeSet<String>>,
    filters: Vec<LabelFilter>,
}

impl DatasetView {
    pub(crate) const fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            selected_fields: None,
            excluded_fields: None,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Restrict the view to the given fields.
    #[must_use]
    pub fn select_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.selected_fields
            .get_or_insert_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Hide the given fields from the view.
    #[must_use]
    pub fn exclude_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_fields
            .get_or_insert_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Reduce a label list (or plain list) field to the elements matching
    /// the predicate. The reduction applies to the materialized views
    /// only; saving merges the subset back without touching the rest.
    #[must_use]
    pub fn filter_labels(
        mut self,
        field: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + 'static,
    ) -> Self {
        self.filters.push(LabelFilter {
            field: field.into(),
            predicate: Rc::new(predicate),
        });
        self
    }

    /// Materialize the view of the document with the given id.
    pub fn get(&self, id: RecordId) -> Result<DocumentView, Error> {
        let record = db::load_record(self.dataset.collection(), id)?;
        Ok(self.materialize(record))
    }

    /// Materialize every document in the dataset.
    pub fn documents(&self) -> Result<Vec<DocumentView>, Error> {
        db::record_ids(self.dataset.collection())?
            .into_iter()
            .map(|id| self.get(id))
            .collect()
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(db::collection_len(self.dataset.collection())?)
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    fn materialize(&self, mut record: BackingRecord) -> DocumentView {
        let mut filtered_fields = BTreeSet::new();

        for filter in &self.filters {
            if let Some(slot) = record.fields_mut().get_mut(&filter.field)
                && apply_filter(slot, filter.predicate.as_ref())
            {
                filtered_fields.insert(filter.field.clone());
            }
        }

        DocumentView::new(
            record,
            self.clone(),
            self.selected_fields.clone(),
            self.excluded_fields.clone(),
            (!filtered_fields.is_empty()).then_some(filtered_fields),
        )
    }
}

impl fmt::Debug for DatasetView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetView")
            .field("dataset", &self.dataset)
            .field("selected_fields", &self.selected_fields)
            .field("excluded_fields", &self.excluded_fields)
            .field(
                "filters",
                &self
                    .filters
                    .iter()
                    .map(|filter| filter.field.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Reduce a sequence-valued field in place. Returns true if the field is
/// a supported sequence type and was filtered.
fn apply_filter(slot: &mut Value, predicate: &dyn Fn(&Value) -> bool) -> bool {
    match slot {
        Value::Detections(dets) => {
            dets.detections
                .retain(|det| predicate(&Value::Detection(Box::new(det.clone()))));
            true
        }
        Value::Classifications(cls) => {
            cls.classifications
                .retain(|c| predicate(&Value::Classification(Box::new(c.clone()))));
            true
        }
        Value::List(items) => {
            items.retain(|item| predicate(item));
            true
        }
        _ => false,
    }
}

///
/// TESTS
///
