use crate::{
    dataset::DatasetView,
    document::{Document, DocumentAccess, DocumentState, Sealed},
    error::{Error, FieldError},
    record::BackingRecord,
    registry::{self, SharedState},
    value::Value,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::{
    cell::RefCell,
    collections::BTreeSet,
    rc::Rc,
};

///
/// DocumentView
///
/// A read/write projection of a document in a dataset.
///
/// A view may carry only a subset of its source document's fields
/// (selected and/or excluded) and may carry label lists reduced to a
/// filtered subset of their elements. Hidden fields cannot be read or
/// modified; writing a field with `create == true` reveals it.
///
/// Saving a view never deletes excluded fields or elements outside the
/// filtered subsets from the source of truth.
///
/// Views are produced by [`DatasetView`], never constructed manually.
///

#[derive(Debug)]
pub struct DocumentView {
    state: SharedState,
    view: DatasetView,
    selected_fields: Option<BTreeSet<String>>,
    excluded_fields: Option<BTreeSet<String>>,
    filtered_fields: Option<BTreeSet<String>>,
}

impl DocumentView {
    pub(crate) fn new(
        record: BackingRecord,
        view: DatasetView,
        mut selected_fields: Option<BTreeSet<String>>,
        excluded_fields: Option<BTreeSet<String>>,
        filtered_fields: Option<BTreeSet<String>>,
    ) -> Self {
        // When both projections are given, exclusion folds into selection.
        let excluded_fields = match (&mut selected_fields, excluded_fields) {
            (Some(selected), Some(excluded)) => {
                selected.retain(|name| !excluded.contains(name));
                None
            }
            (_, excluded) => excluded,
        };

        let dataset = Some(view.dataset().clone());
        Self {
            state: Rc::new(RefCell::new(DocumentState {
                record,
                dataset,
            })),
            view,
            selected_fields,
            excluded_fields,
            filtered_fields,
        }
    }

    /// The dataset view this document view was produced by.
    #[must_use]
    pub const fn dataset_view(&self) -> &DatasetView {
        &self.view
    }

    /// Field names this view is restricted to, if any.
    #[must_use]
    pub const fn selected_field_names(&self) -> Option<&BTreeSet<String>> {
        self.selected_fields.as_ref()
    }

    /// Field names hidden from this view, if any.
    #[must_use]
    pub const fn excluded_field_names(&self) -> Option<&BTreeSet<String>> {
        self.excluded_fields.as_ref()
    }

    /// Field names whose label lists were reduced to a subset, if any.
    #[must_use]
    pub const fn filtered_field_names(&self) -> Option<&BTreeSet<String>> {
        self.filtered_fields.as_ref()
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_fields
            .as_ref()
            .is_some_and(|excluded| excluded.contains(name))
    }

    fn is_unselected(&self, name: &str) -> bool {
        self.selected_fields
            .as_ref()
            .is_some_and(|selected| !selected.contains(name))
    }

    const fn has_projection(&self) -> bool {
        self.selected_fields.is_some() || self.excluded_fields.is_some()
    }

    /// Persist the view's fields, merging filtered label lists back by id,
    /// then refresh the canonical singleton instance so readers observe
    /// the update.
    pub fn save(&self) -> Result<(), Error> {
        self.state
            .borrow()
            .record
            .save(self.filtered_fields.as_ref())?;

        if let Some(id) = self.id() {
            registry::refresh(Document::KIND, id)?;
        }

        Ok(())
    }
}

impl Sealed for DocumentView {
    fn state(&self) -> &SharedState {
        &self.state
    }
}

impl DocumentAccess for DocumentView {
    fn field_names(&self) -> Vec<String> {
        self.state()
            .borrow()
            .record
            .field_names()
            .filter(|name| !self.is_excluded(name) && !self.is_unselected(name))
            .map(ToString::to_string)
            .collect()
    }

    fn has_field(&self, name: &str) -> bool {
        if name == "id" {
            return true;
        }
        if self.is_excluded(name) || self.is_unselected(name) {
            return false;
        }

        self.state().borrow().record.has_field(name)
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        if name == "id" {
            return Ok(self
                .id()
                .map_or(Value::Null, |id| Value::Text(id.to_string())));
        }

        if self.is_excluded(name) {
            return Err(FieldError::FieldExcluded {
                name: name.to_string(),
            });
        }

        let value = self.state().borrow().record.get_field(name).cloned()?;

        if self.is_unselected(name) {
            return Err(FieldError::FieldNotSelected {
                name: name.to_string(),
            });
        }

        Ok(value)
    }

    fn set_field(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        create: bool,
    ) -> Result<(), FieldError> {
        if create {
            self.state()
                .borrow_mut()
                .record
                .set_field(name, value.into(), true)?;

            // Writing un-hides a field.
            if let Some(excluded) = &mut self.excluded_fields {
                excluded.remove(name);
            }
            if let Some(selected) = &mut self.selected_fields {
                selected.insert(name.to_string());
            }

            return Ok(());
        }

        // Writing to a hidden or missing field fails the way a read would.
        let _ = self.get_field(name)?;

        self.state()
            .borrow_mut()
            .record
            .set_field(name, value.into(), false)
    }

    fn clear_field(&mut self, name: &str) -> Result<(), FieldError> {
        let _ = self.get_field(name)?;

        self.state().borrow_mut().record.clear_field(name)
    }

    fn to_storage_dict(&self) -> JsonMap<String, JsonValue> {
        let mut dict = self.state().borrow().record.to_dict();

        if self.has_projection() {
            let visible: BTreeSet<String> = self.field_names().into_iter().collect();
            dict.retain(|name, _| visible.contains(name));
        }

        dict
    }
}

///
/// TESTS
///
/// View semantics are exercised end-to-end (dataset -> view -> document
/// view) in `dataset.rs`; the tests here cover the projection rules in
/// isolation.
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn fixture(name: &str) -> DocumentView {
        let dataset = Dataset::create(name).expect("dataset");
        let mut doc = Document::new();
        doc.insert("a", 1).expect("insert");
        doc.insert("b", 2).expect("insert");
        doc.insert("c", 3).expect("insert");
        dataset.add(&doc).expect("add");

        dataset
            .view()
            .get(doc.id().expect("id"))
            .expect("document view")
    }

    fn project(
        view: DocumentView,
        selected: Option<&[&str]>,
        excluded: Option<&[&str]>,
    ) -> DocumentView {
        let to_set = |names: &[&str]| {
            names
                .iter()
                .map(ToString::to_string)
                .collect::<BTreeSet<String>>()
        };

        let record = view.state.borrow().record.clone();
        DocumentView::new(
            record,
            view.view.clone(),
            selected.map(to_set),
            excluded.map(to_set),
            None,
        )
    }

    #[test]
    fn selection_hides_other_fields() {
        let view = project(fixture("sel_hides"), Some(&["a"]), None);

        assert!(view.has_field("a"));
        assert!(!view.has_field("b"));
        assert_eq!(view.field_names(), ["a"]);

        let err = view.get_field("b").unwrap_err();
        assert!(matches!(err, FieldError::FieldNotSelected { .. }));
    }

    #[test]
    fn exclusion_hides_named_fields() {
        let view = project(fixture("excl_hides"), None, Some(&["b"]));

        assert!(view.has_field("a"));
        assert!(!view.has_field("b"));

        let err = view.get_field("b").unwrap_err();
        assert!(matches!(err, FieldError::FieldExcluded { .. }));
    }

    #[test]
    fn excluded_folds_into_selected_at_construction() {
        let view = project(fixture("fold_sel"), Some(&["a", "b"]), Some(&["b"]));

        let selected: Vec<&str> = view
            .selected_field_names()
            .expect("selected")
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(selected, ["a"]);
        assert!(view.excluded_field_names().is_none());
    }

    #[test]
    fn id_is_visible_through_any_projection() {
        let view = project(fixture("id_visible"), Some(&["a"]), None);

        assert!(view.has_field("id"));
        let id = view.get_field("id").expect("id");
        assert!(matches!(id, Value::Text(_)));
    }

    #[test]
    fn missing_fields_win_over_selection_errors() {
        let view = project(fixture("missing_wins"), Some(&["a"]), None);
        let err = view.get_field("zzz").unwrap_err();
        assert!(matches!(err, FieldError::NoSuchField { .. }));
    }

    #[test]
    fn create_write_reveals_hidden_fields() {
        let mut view = project(fixture("reveal_a"), None, Some(&["c"]));
        assert!(!view.has_field("c"));

        view.set_field("c", 30, true).expect("set");
        assert!(view.has_field("c"));
        assert_eq!(view.get_field("c").expect("get"), Value::Int(30));

        let mut view = project(fixture("reveal_b"), Some(&["a"]), None);
        view.set_field("d", 4, true).expect("set");
        assert!(view.has_field("d"));
        assert!(view
            .selected_field_names()
            .expect("selected")
            .contains("d"));
    }

    #[test]
    fn non_create_writes_respect_visibility() {
        let mut view = project(fixture("non_create"), None, Some(&["c"]));

        let err = view.set_field("c", 30, false).unwrap_err();
        assert!(matches!(err, FieldError::FieldExcluded { .. }));

        let err = view.clear_field("c").unwrap_err();
        assert!(matches!(err, FieldError::FieldExcluded { .. }));
    }

    #[test]
    fn dicts_are_post_filtered_to_visible_fields() {
        let view = project(fixture("dict_filter"), Some(&["a"]), None);

        let dict = view.to_dict();
        assert!(dict.contains_key("a"));
        assert!(!dict.contains_key("b"));

        let storage = view.to_storage_dict();
        assert!(storage.contains_key("a"));
        assert!(!storage.contains_key("c"));
    }

    #[test]
    fn copy_returns_an_unattached_document_of_visible_fields() {
        let view = project(fixture("copy_visible"), Some(&["a"]), None);
        let copied = view.copy().expect("copy");

        assert!(!copied.in_dataset());
        assert_eq!(copied.field_names(), ["a"]);
    }
}
