use crate::{types::RecordId, value::Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

///
/// Labeled
///
/// Contract for label objects that participate in id-keyed merging.
/// The id is stable for the lifetime of the label, across copies and saves.
///

pub trait Labeled {
    fn id(&self) -> RecordId;

    fn label(&self) -> &str;
}

///
/// LabelList
///
/// A label list container is a record with exactly one designated
/// list-valued field. Merge treats these containers specially: the inner
/// lists are combined element-wise by label id instead of being replaced
/// wholesale.
///

pub trait LabelList {
    type Label: Labeled + Clone + PartialEq;

    /// Name of the designated inner list field.
    const LIST_FIELD: &'static str;

    fn labels(&self) -> &[Self::Label];

    fn labels_mut(&mut self) -> &mut Vec<Self::Label>;

    fn into_labels(self) -> Vec<Self::Label>;
}

///
/// Classification
///
/// An image-level label. Arbitrary extra attributes can be attached to any
/// label; importers use this for source-specific flags.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Classification {
    pub id: RecordId,
    pub label: String,
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Value>,
}

impl Classification {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            label: label.into(),
            confidence: None,
            attributes: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }
}

impl Labeled for Classification {
    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }
}

///
/// Detection
///
/// An object detection. The bounding box is `[top-left-x, top-left-y,
/// width, height]` in relative coordinates in `[0, 1]`.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Detection {
    pub id: RecordId,
    pub label: String,
    pub bounding_box: [f64; 4],
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Value>,
}

impl Detection {
    #[must_use]
    pub fn new(label: impl Into<String>, bounding_box: [f64; 4]) -> Self {
        Self {
            id: RecordId::generate(),
            label: label.into(),
            bounding_box,
            confidence: None,
            attributes: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }
}

impl Labeled for Detection {
    fn id(&self) -> RecordId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }
}

///
/// Classifications
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Classifications {
    pub classifications: Vec<Classification>,
}

impl Classifications {
    #[must_use]
    pub const fn new(classifications: Vec<Classification>) -> Self {
        Self { classifications }
    }
}

impl LabelList for Classifications {
    type Label = Classification;

    const LIST_FIELD: &'static str = "classifications";

    fn labels(&self) -> &[Classification] {
        &self.classifications
    }

    fn labels_mut(&mut self) -> &mut Vec<Classification> {
        &mut self.classifications
    }

    fn into_labels(self) -> Vec<Classification> {
        self.classifications
    }
}

impl From<Vec<Classification>> for Classifications {
    fn from(classifications: Vec<Classification>) -> Self {
        Self::new(classifications)
    }
}

///
/// Detections
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Detections {
    pub detections: Vec<Detection>,
}

impl Detections {
    #[must_use]
    pub const fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl LabelList for Detections {
    type Label = Detection;

    const LIST_FIELD: &'static str = "detections";

    fn labels(&self) -> &[Detection] {
        &self.detections
    }

    fn labels_mut(&mut self) -> &mut Vec<Detection> {
        &mut self.detections
    }

    fn into_labels(self) -> Vec<Detection> {
        self.detections
    }
}

impl From<Vec<Detection>> for Detections {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

///
/// TESTS
///
