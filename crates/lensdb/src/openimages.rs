//! Importer for the Open Images CSV metadata format.
//!
//! Consumes already-downloaded CSV metadata only: class descriptions,
//! image-level labels, and bounding boxes. Download orchestration is out
//! of scope; callers hand in any `io::Read`.

use crate::core::{
    dataset::Dataset,
    document::{Document, DocumentAccess},
    error::Error,
    label::{Classification, Classifications, Detection, Detections},
    types::RecordId,
    value::Value,
};
use serde::Deserialize;
use std::{collections::BTreeMap, io};
use thiserror::Error as ThisError;
use tracing::info;

/// Image-level labels with confidence at or below this threshold are
/// negative assertions ("verified absent").
pub const POSITIVE_CONFIDENCE_THRESHOLD: f64 = 0.1;

///
/// ImportError
///

#[derive(Debug, ThisError)]
pub enum ImportError {
    #[error("unknown label class: '{mid}'")]
    UnknownLabelClass { mid: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Dataset(#[from] Error),
}

///
/// ImageLabels
///
/// Image-level labels for one image, split by assertion polarity.
///

#[derive(Clone, Debug, Default)]
pub struct ImageLabels {
    pub positive: Classifications,
    pub negative: Classifications,
}

/// Parse a class-descriptions CSV (`MID,DisplayName`, no header) into a
/// MID -> display-name map.
pub fn load_classes<R: io::Read>(reader: R) -> Result<BTreeMap<String, String>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(false).from_reader(reader);

    let mut classes = BTreeMap::new();
    for row in csv_reader.deserialize() {
        let (mid, display): (String, String) = row?;
        classes.insert(mid, display);
    }

    Ok(classes)
}

#[derive(Debug, Deserialize)]
struct LabelRow {
    #[serde(rename = "ImageID")]
    image_id: String,
    #[serde(rename = "LabelName")]
    label_name: String,
    #[serde(rename = "Confidence")]
    confidence: f64,
}

/// Parse an image-level labels CSV
/// (`ImageID,Source,LabelName,Confidence`) into per-image label groups.
pub fn load_classifications<R: io::Read>(
    reader: R,
    classes: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ImageLabels>, ImportError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let mut labels: BTreeMap<String, ImageLabels> = BTreeMap::new();
    for row in csv_reader.deserialize() {
        let row: LabelRow = row?;
        let label = resolve_class(classes, &row.label_name)?;

        let classification = Classification::new(label).with_confidence(row.confidence);
        let group = labels.entry(row.image_id).or_default();
        if row.confidence > POSITIVE_CONFIDENCE_THRESHOLD {
            group.positive.classifications.push(classification);
        } else {
            group.negative.classifications.push(classification);
        }
    }

    Ok(labels)
}

#[derive(Debug, Deserialize)]
struct DetectionRow {
    #[serde(rename = "ImageID")]
    image_id: String,
    #[serde(rename = "LabelName")]
    label_name: String,
    #[serde(rename = "XMin")]
    xmin: f64,
    #[serde(rename = "XMax")]
    xmax: f64,
    #[serde(rename = "YMin")]
    ymin: f64,
    #[serde(rename = "YMax")]
    ymax: f64,
    #[serde(rename = "IsOccluded")]
    is_occluded: i8,
    #[serde(rename = "IsTruncated")]
    is_truncated: i8,
    #[serde(rename = "IsGroupOf")]
    is_group_of: i8,
    #[serde(rename = "IsDepiction")]
    is_depiction: i8,
    #[serde(rename = "IsInside")]
    is_inside: i8,
}

/// Parse a bounding-box CSV into per-image detections.
///
/// Boxes arrive in corner form (`XMin,XMax,YMin,YMax`, relative) and are
/// converted to `[top-left-x, top-left-y, width, height]`. The box flags
/// become dynamic label attributes.
pub fn load_detections<R: io::Read>(
    reader: R,
    classes: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Detections>, ImportError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let mut detections: BTreeMap<String, Detections> = BTreeMap::new();
    for row in csv_reader.deserialize() {
        let row: DetectionRow = row?;
        let label = resolve_class(classes, &row.label_name)?;

        let bbox = [
            row.xmin,
            row.ymin,
            row.xmax - row.xmin,
            row.ymax - row.ymin,
        ];

        let mut detection = Detection::new(label, bbox);
        detection.set_attribute("IsOccluded", row.is_occluded != 0);
        detection.set_attribute("IsTruncated", row.is_truncated != 0);
        detection.set_attribute("IsGroupOf", row.is_group_of != 0);
        detection.set_attribute("IsDepiction", row.is_depiction != 0);
        detection.set_attribute("IsInside", row.is_inside != 0);

        detections
            .entry(row.image_id)
            .or_default()
            .detections
            .push(detection);
    }

    Ok(detections)
}

/// Import one split's metadata into a dataset: one document per image,
/// carrying the image's filepath, Open Images id, and whatever label
/// types were provided.
pub fn import_split<L: io::Read, D: io::Read>(
    dataset: &Dataset,
    images_dir: &str,
    classes: &BTreeMap<String, String>,
    labels: Option<L>,
    detections: Option<D>,
) -> Result<Vec<RecordId>, ImportError> {
    let labels = labels
        .map(|reader| load_classifications(reader, classes))
        .transpose()?
        .unwrap_or_default();
    let detections = detections
        .map(|reader| load_detections(reader, classes))
        .transpose()?
        .unwrap_or_default();

    let mut image_ids: Vec<&String> = labels.keys().chain(detections.keys()).collect();
    image_ids.sort();
    image_ids.dedup();

    let mut record_ids = Vec::with_capacity(image_ids.len());
    for image_id in image_ids {
        let mut document = Document::from_fields([
            (
                "filepath".to_string(),
                Value::Text(format!("{images_dir}/{image_id}.jpg")),
            ),
            (
                "open_images_id".to_string(),
                Value::Text(image_id.clone()),
            ),
        ])
        .map_err(Error::from)?;

        if let Some(groups) = labels.get(image_id) {
            document
                .insert("positive_labels", groups.positive.clone())
                .map_err(Error::from)?;
            document
                .insert("negative_labels", groups.negative.clone())
                .map_err(Error::from)?;
        }
        if let Some(dets) = detections.get(image_id) {
            document
                .insert("detections", dets.clone())
                .map_err(Error::from)?;
        }

        record_ids.push(dataset.add(&document)?);
    }

    info!(
        dataset = dataset.name(),
        count = record_ids.len(),
        "imported Open Images split"
    );

    Ok(record_ids)
}

fn resolve_class(
    classes: &BTreeMap<String, String>,
    mid: &str,
) -> Result<String, ImportError> {
    classes
        .get(mid)
        .cloned()
        .ok_or_else(|| ImportError::UnknownLabelClass {
            mid: mid.to_string(),
        })
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::label::Labeled as _;

    const CLASSES_CSV: &str = "\
/m/011k07,Tortoise
/m/0bt9lr,Dog
/m/01yrx,Cat
";

    const LABELS_CSV: &str = "\
ImageID,Source,LabelName,Confidence
im1,verification,/m/0bt9lr,1
im1,verification,/m/01yrx,0
im2,verification,/m/011k07,1
";

    const BOXES_CSV: &str = "\
ImageID,Source,LabelName,Confidence,XMin,XMax,YMin,YMax,IsOccluded,IsTruncated,IsGroupOf,IsDepiction,IsInside
im1,xclick,/m/0bt9lr,1,0.1,0.5,0.2,0.8,0,1,0,0,0
im2,xclick,/m/011k07,1,0.0,1.0,0.0,1.0,1,0,0,0,0
";

    fn classes() -> BTreeMap<String, String> {
        load_classes(CLASSES_CSV.as_bytes()).expect("classes")
    }

    #[test]
    fn class_descriptions_parse_without_headers() {
        let classes = classes();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes.get("/m/0bt9lr").map(String::as_str), Some("Dog"));
    }

    #[test]
    fn image_labels_split_on_the_confidence_threshold() {
        let labels =
            load_classifications(LABELS_CSV.as_bytes(), &classes()).expect("labels");

        let im1 = labels.get("im1").expect("im1");
        assert_eq!(im1.positive.classifications.len(), 1);
        assert_eq!(im1.positive.classifications[0].label, "Dog");
        assert_eq!(im1.positive.classifications[0].confidence, Some(1.0));
        assert_eq!(im1.negative.classifications.len(), 1);
        assert_eq!(im1.negative.classifications[0].label, "Cat");
    }

    #[test]
    fn boxes_convert_to_extent_form_with_flag_attributes() {
        let detections = load_detections(BOXES_CSV.as_bytes(), &classes()).expect("boxes");

        let im1 = detections.get("im1").expect("im1");
        let det = &im1.detections[0];
        assert_eq!(det.label, "Dog");
        assert_eq!(det.bounding_box, [0.1, 0.2, 0.4, 0.6000000000000001]);
        assert_eq!(det.get_attribute("IsOccluded"), Some(&Value::Bool(false)));
        assert_eq!(det.get_attribute("IsTruncated"), Some(&Value::Bool(true)));
    }

    #[test]
    fn unknown_label_classes_are_an_error() {
        let csv = "\
ImageID,Source,LabelName,Confidence
im1,verification,/m/zzzzz,1
";
        let err = load_classifications(csv.as_bytes(), &classes()).unwrap_err();
        assert!(matches!(err, ImportError::UnknownLabelClass { .. }));
    }

    #[test]
    fn malformed_rows_surface_the_csv_error() {
        let csv = "\
ImageID,Source,LabelName,Confidence
im1,verification,/m/0bt9lr,not-a-number
";
        let err = load_classifications(csv.as_bytes(), &classes()).unwrap_err();
        assert!(matches!(err, ImportError::Csv(_)));
    }

    #[test]
    fn import_split_builds_one_document_per_image() {
        let dataset = Dataset::create("open-images-test").expect("dataset");

        let ids = import_split(
            &dataset,
            "/data/open-images/train",
            &classes(),
            Some(LABELS_CSV.as_bytes()),
            Some(BOXES_CSV.as_bytes()),
        )
        .expect("import");

        assert_eq!(ids.len(), 2);
        assert_eq!(dataset.len().expect("len"), 2);

        let docs = dataset.documents().expect("documents");
        let im1 = docs
            .iter()
            .find(|doc| {
                doc.get_field("open_images_id").ok() == Some(Value::Text("im1".to_string()))
            })
            .expect("im1");

        assert_eq!(
            im1.get_field("filepath").expect("filepath"),
            Value::Text("/data/open-images/train/im1.jpg".to_string())
        );

        let dets = im1.get_field("detections").expect("detections");
        let dets = dets.as_detections().expect("detections");
        assert_eq!(dets.detections.len(), 1);
        assert!(!dets.detections[0].id().is_nil());

        let labels = im1.get_field("positive_labels").expect("labels");
        let labels = labels.as_classifications().expect("classifications");
        assert_eq!(labels.classifications[0].label, "Dog");
    }
}
