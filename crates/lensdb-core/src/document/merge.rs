use crate::{
    document::DocumentAccess,
    error::FieldError,
    label::{LabelList, Labeled},
    types::RecordId,
    value::Value,
};
use std::collections::{BTreeSet, HashMap, HashSet};

///
/// MergeOptions
///
/// Field-level merge policy. Defaults mirror the common case: skip null
/// source fields, replace whole values, extend the schema as needed.
///

#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Restrict the merge to these fields (default: all of the target's).
    pub fields: Option<Vec<String>>,
    /// Exclude these fields from the merge.
    pub omit_fields: Option<Vec<String>>,
    /// Skip source fields whose value is null.
    pub omit_none_fields: bool,
    /// Merge top-level list fields element-wise and label list fields by
    /// label id, instead of replacing them. Supersedes `overwrite` for
    /// plain lists; for label lists, `overwrite` picks replace-vs-keep.
    pub merge_lists: bool,
    /// Overwrite existing fields. Fields whose current value is null are
    /// always overwritten, since null signals "not yet set".
    pub overwrite: bool,
    /// Declare fields the target does not have yet. If false, unknown
    /// fields fail with [`FieldError::NoSuchField`].
    pub expand_schema: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            fields: None,
            omit_fields: None,
            omit_none_fields: true,
            merge_lists: false,
            overwrite: true,
            expand_schema: true,
        }
    }
}

impl MergeOptions {
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn omit_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.omit_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn omit_none_fields(mut self, omit: bool) -> Self {
        self.omit_none_fields = omit;
        self
    }

    #[must_use]
    pub const fn merge_lists(mut self, merge: bool) -> Self {
        self.merge_lists = merge;
        self
    }

    #[must_use]
    pub const fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub const fn expand_schema(mut self, expand: bool) -> Self {
        self.expand_schema = expand;
        self
    }
}

/// Merge `source`'s fields into `target` under the given policy.
pub(crate) fn merge_into<T, S>(
    target: &mut T,
    source: &S,
    options: &MergeOptions,
) -> Result<(), FieldError>
where
    T: DocumentAccess,
    S: DocumentAccess,
{
    let existing: BTreeSet<String> = if options.overwrite {
        BTreeSet::new()
    } else {
        target.field_names().into_iter().collect()
    };

    let mut names = options
        .fields
        .clone()
        .unwrap_or_else(|| target.field_names());
    if let Some(omit) = &options.omit_fields {
        names.retain(|name| !omit.contains(name));
    }

    for name in names {
        let value = source.get_field(&name)?;

        if options.omit_none_fields && value.is_null() {
            continue;
        }

        // Hidden or missing current values count as unset.
        let current = target.get_field(&name).unwrap_or(Value::Null);

        if options.merge_lists {
            if let Value::List(cur) = &current {
                if let Value::List(src) = &value {
                    let mut merged = cur.clone();
                    for item in src {
                        if !merged.contains(item) {
                            merged.push(item.clone());
                        }
                    }
                    target.set_field(&name, Value::List(merged), false)?;
                    continue;
                }
                if value.is_null() {
                    continue;
                }
            }

            match (&current, &value) {
                (Value::Detections(cur), Value::Detections(src)) => {
                    let mut merged = cur.clone();
                    merge_labels(merged.labels_mut(), src.labels().to_vec(), options.overwrite);
                    target.set_field(&name, merged, false)?;
                    continue;
                }
                (Value::Classifications(cur), Value::Classifications(src)) => {
                    let mut merged = cur.clone();
                    merge_labels(merged.labels_mut(), src.labels().to_vec(), options.overwrite);
                    target.set_field(&name, merged, false)?;
                    continue;
                }
                (current, Value::Null) if current.is_label_list() => continue,
                _ => {}
            }
        }

        if !options.overwrite && existing.contains(&name) && !current.is_null() {
            continue;
        }

        target.set_field(&name, value, options.expand_schema)?;
    }

    Ok(())
}

/// Merge `new_labels` into `labels` by label id, in place.
///
/// With `overwrite == true`, an incoming label whose id matches an
/// existing one replaces it at its position; otherwise it is appended.
/// With `overwrite == false`, existing labels are kept and only incoming
/// labels with unseen ids are appended. Source order is preserved among
/// appended labels.
pub fn merge_labels<L: Labeled>(labels: &mut Vec<L>, new_labels: Vec<L>, overwrite: bool) {
    if overwrite {
        let positions: HashMap<RecordId, usize> = labels
            .iter()
            .enumerate()
            .map(|(index, label)| (label.id(), index))
            .collect();

        for label in new_labels {
            match positions.get(&label.id()) {
                Some(&index) => labels[index] = label,
                None => labels.push(label),
            }
        }
    } else {
        let seen: HashSet<RecordId> = labels.iter().map(Labeled::id).collect();
        labels.extend(
            new_labels
                .into_iter()
                .filter(|label| !seen.contains(&label.id())),
        );
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Detection;

    fn det(label: &str) -> Detection {
        Detection::new(label, [0.0, 0.0, 0.1, 0.1])
    }

    #[test]
    fn overwrite_replaces_in_place_and_appends() {
        let l1 = det("one");
        let l2 = det("two");
        let mut l3 = det("two-replacement");
        l3.id = l2.id;
        let l4 = det("four");

        let mut labels = vec![l1.clone(), l2];
        merge_labels(&mut labels, vec![l3.clone(), l4.clone()], true);

        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0].id, l1.id);
        assert_eq!(labels[1].label, "two-replacement");
        assert_eq!(labels[1].id, l3.id);
        assert_eq!(labels[2].id, l4.id);
    }

    #[test]
    fn keep_drops_colliding_ids_and_appends_the_rest() {
        let l1 = det("one");
        let l2 = det("two");
        let mut l3 = det("two-replacement");
        l3.id = l2.id;
        let l4 = det("four");

        let mut labels = vec![l1.clone(), l2.clone()];
        merge_labels(&mut labels, vec![l3, l4.clone()], false);

        assert_eq!(labels.len(), 3);
        assert_eq!(labels[1].label, "two");
        assert_eq!(labels[1].id, l2.id);
        assert_eq!(labels[2].id, l4.id);
    }

    #[test]
    fn merge_is_deterministic() {
        let base = vec![det("a"), det("b")];
        let incoming = vec![det("c"), det("d")];

        let mut first = base.clone();
        merge_labels(&mut first, incoming.clone(), true);
        let mut second = base;
        merge_labels(&mut second, incoming, true);

        assert_eq!(first, second);
    }

    mod properties {
        use super::*;
        use crate::label::Classification;
        use proptest::prelude::*;
        use std::collections::BTreeSet as IdSet;
        use ulid::Ulid;

        fn labels_from_ids(ids: &IdSet<u64>, tag: &str) -> Vec<Classification> {
            ids.iter()
                .map(|&n| {
                    let mut label = Classification::new(format!("{tag}-{n}"));
                    label.id = RecordId::from(Ulid::from(u128::from(n)));
                    label
                })
                .collect()
        }

        #[expect(clippy::cast_possible_truncation)]
        fn id_num(label: &Classification) -> u64 {
            u128::from(*label.id) as u64
        }

        proptest! {
            #[test]
            fn overwrite_merge_covers_the_id_union(
                existing in prop::collection::btree_set(0_u64..64, 0..8),
                incoming in prop::collection::btree_set(0_u64..64, 0..8),
            ) {
                let mut labels = labels_from_ids(&existing, "old");
                merge_labels(&mut labels, labels_from_ids(&incoming, "new"), true);

                let merged_ids: IdSet<u64> =
                    labels.iter().map(id_num).collect();
                let expected: IdSet<u64> =
                    existing.union(&incoming).copied().collect();
                prop_assert_eq!(merged_ids, expected);

                // Every incoming id carries the incoming payload.
                for label in &labels {
                    let n = id_num(label);
                    if incoming.contains(&n) {
                        prop_assert_eq!(label.label.as_str(), format!("new-{n}"));
                    }
                }
            }

            #[test]
            fn keep_merge_never_touches_existing_labels(
                existing in prop::collection::btree_set(0_u64..64, 0..8),
                incoming in prop::collection::btree_set(0_u64..64, 0..8),
            ) {
                let original = labels_from_ids(&existing, "old");
                let mut labels = original.clone();
                merge_labels(&mut labels, labels_from_ids(&incoming, "new"), false);

                prop_assert_eq!(&labels[..original.len()], &original[..]);

                let appended: IdSet<u64> =
                    labels[original.len()..].iter().map(id_num).collect();
                let expected: IdSet<u64> =
                    incoming.difference(&existing).copied().collect();
                prop_assert_eq!(appended, expected);
            }
        }
    }
}
