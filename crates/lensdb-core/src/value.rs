use crate::{
    label::{Classification, Classifications, Detection, Detections},
    serialize::SerializeError,
    types::{RecordId, Timestamp},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Class-marker key embedded in the JSON form of typed values, so the
/// dict/JSON round trip is lossless.
pub const CLS_KEY: &str = "_cls";

/// Identity key embedded in the JSON form of labels.
pub const ID_KEY: &str = "_id";

///
/// Value
///
/// The constrained type set for record fields: scalars, embedded records,
/// ordered sequences, and label objects.
///
/// `Null` doubles as "declared but unset"; clearing a field stores `Null`
/// in its schema slot.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    /// Ordered list of values. List order is preserved through save/reload.
    List(Vec<Self>),
    /// Embedded record with declared field order.
    Record(IndexMap<String, Self>),
    Classification(Box<Classification>),
    Classifications(Classifications),
    Detection(Box<Detection>),
    Detections(Detections),
}

impl Value {
    ///
    /// TYPES
    ///

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Returns true if the value is a label list container.
    #[must_use]
    pub const fn is_label_list(&self) -> bool {
        matches!(self, Self::Classifications(_) | Self::Detections(_))
    }

    ///
    /// CONVERSION
    ///

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(b) = self { Some(*b) } else { None }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(i) = self { Some(*i) } else { None }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[expect(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_timestamp(&self) -> Option<Timestamp> {
        if let Self::Timestamp(t) = self {
            Some(*t)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&[Self]> {
        if let Self::List(xs) = self {
            Some(xs.as_slice())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_record(&self) -> Option<&IndexMap<String, Self>> {
        if let Self::Record(map) = self {
            Some(map)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_detections(&self) -> Option<&Detections> {
        if let Self::Detections(d) = self {
            Some(d)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_classifications(&self) -> Option<&Classifications> {
        if let Self::Classifications(c) = self {
            Some(c)
        } else {
            None
        }
    }

    ///
    /// JSON MAPPING
    ///

    /// Render the user-facing extended-JSON form of this value.
    ///
    /// Typed values (labels, timestamps) embed a `"_cls"` marker so
    /// [`from_json`](Self::from_json) can reconstruct them.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, Into::into),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(t) => {
                let mut obj = JsonMap::new();
                obj.insert(CLS_KEY.to_string(), "Timestamp".into());
                obj.insert("seconds".to_string(), t.as_seconds().into());
                JsonValue::Object(obj)
            }
            Self::List(xs) => JsonValue::Array(xs.iter().map(Self::to_json).collect()),
            Self::Record(map) => {
                let obj = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>();
                JsonValue::Object(obj)
            }
            Self::Classification(c) => classification_to_json(c),
            Self::Classifications(cs) => {
                let mut obj = JsonMap::new();
                obj.insert(CLS_KEY.to_string(), "Classifications".into());
                obj.insert(
                    "classifications".to_string(),
                    JsonValue::Array(cs.classifications.iter().map(classification_to_json).collect()),
                );
                JsonValue::Object(obj)
            }
            Self::Detection(d) => detection_to_json(d),
            Self::Detections(ds) => {
                let mut obj = JsonMap::new();
                obj.insert(CLS_KEY.to_string(), "Detections".into());
                obj.insert(
                    "detections".to_string(),
                    JsonValue::Array(ds.detections.iter().map(detection_to_json).collect()),
                );
                JsonValue::Object(obj)
            }
        }
    }

    /// Reconstruct a value from its extended-JSON form.
    pub fn from_json(json: &JsonValue) -> Result<Self, SerializeError> {
        match json {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => n.as_i64().map_or_else(
                || {
                    n.as_f64().map(Self::Float).ok_or_else(|| {
                        SerializeError::Deserialize(format!("unrepresentable number: {n}"))
                    })
                },
                |i| Ok(Self::Int(i)),
            ),
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            JsonValue::Array(xs) => xs
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            JsonValue::Object(obj) => Self::from_json_object(obj),
        }
    }

    fn from_json_object(obj: &JsonMap<String, JsonValue>) -> Result<Self, SerializeError> {
        match obj.get(CLS_KEY).and_then(JsonValue::as_str) {
            Some("Timestamp") => {
                let seconds = obj.get("seconds").and_then(JsonValue::as_u64).ok_or_else(|| {
                    SerializeError::Deserialize("Timestamp is missing 'seconds'".to_string())
                })?;
                Ok(Self::Timestamp(Timestamp::from_seconds(seconds)))
            }
            Some("Classification") => {
                classification_from_json(obj).map(|c| Self::Classification(Box::new(c)))
            }
            Some("Detection") => detection_from_json(obj).map(|d| Self::Detection(Box::new(d))),
            Some("Classifications") => {
                let labels = json_label_array(obj, "classifications")?
                    .iter()
                    .map(|item| {
                        json_object(item, "Classification").and_then(classification_from_json)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Classifications(Classifications::new(labels)))
            }
            Some("Detections") => {
                let labels = json_label_array(obj, "detections")?
                    .iter()
                    .map(|item| json_object(item, "Detection").and_then(detection_from_json))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Detections(Detections::new(labels)))
            }
            _ => {
                let map = obj
                    .iter()
                    .map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                    .collect::<Result<IndexMap<_, _>, _>>()?;
                Ok(Self::Record(map))
            }
        }
    }
}

///
/// From impls
///

macro_rules! impl_value_from {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from! {
    bool            => Bool,
    i8              => Int,
    i16             => Int,
    i32             => Int,
    i64             => Int,
    f32             => Float,
    f64             => Float,
    &str            => Text,
    String          => Text,
    Timestamp       => Timestamp,
    Classifications => Classifications,
    Detections      => Detections,
}

impl From<Classification> for Value {
    fn from(c: Classification) -> Self {
        Self::Classification(Box::new(c))
    }
}

impl From<Detection> for Value {
    fn from(d: Detection) -> Self {
        Self::Detection(Box::new(d))
    }
}

impl From<Vec<Self>> for Value {
    fn from(values: Vec<Self>) -> Self {
        Self::List(values)
    }
}

impl From<IndexMap<String, Self>> for Value {
    fn from(map: IndexMap<String, Self>) -> Self {
        Self::Record(map)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

///
/// Label JSON helpers
///
/// Dynamic label attributes are flattened into the label object, the way
/// the importers write them; unknown keys parse back into attributes.
///

fn classification_to_json(c: &Classification) -> JsonValue {
    let mut obj = JsonMap::new();
    obj.insert(CLS_KEY.to_string(), "Classification".into());
    obj.insert(ID_KEY.to_string(), c.id.to_string().into());
    obj.insert("label".to_string(), c.label.clone().into());
    obj.insert("confidence".to_string(), Value::from(c.confidence).to_json());
    for (name, value) in &c.attributes {
        obj.insert(name.clone(), value.to_json());
    }
    JsonValue::Object(obj)
}

fn detection_to_json(d: &Detection) -> JsonValue {
    let mut obj = JsonMap::new();
    obj.insert(CLS_KEY.to_string(), "Detection".into());
    obj.insert(ID_KEY.to_string(), d.id.to_string().into());
    obj.insert("label".to_string(), d.label.clone().into());
    obj.insert(
        "bounding_box".to_string(),
        JsonValue::Array(d.bounding_box.iter().map(|x| Value::Float(*x).to_json()).collect()),
    );
    obj.insert("confidence".to_string(), Value::from(d.confidence).to_json());
    for (name, value) in &d.attributes {
        obj.insert(name.clone(), value.to_json());
    }
    JsonValue::Object(obj)
}

fn classification_from_json(
    obj: &JsonMap<String, JsonValue>,
) -> Result<Classification, SerializeError> {
    Ok(Classification {
        id: json_label_id(obj)?,
        label: json_label_name(obj, "Classification")?,
        confidence: json_confidence(obj),
        attributes: json_label_attributes(obj, &[CLS_KEY, ID_KEY, "label", "confidence"])?,
    })
}

fn detection_from_json(obj: &JsonMap<String, JsonValue>) -> Result<Detection, SerializeError> {
    let bbox = obj
        .get("bounding_box")
        .and_then(JsonValue::as_array)
        .filter(|xs| xs.len() == 4)
        .ok_or_else(|| {
            SerializeError::Deserialize("Detection requires a 4-element 'bounding_box'".to_string())
        })?;

    let mut bounding_box = [0.0; 4];
    for (slot, value) in bounding_box.iter_mut().zip(bbox) {
        *slot = value.as_f64().ok_or_else(|| {
            SerializeError::Deserialize("bounding_box entries must be numbers".to_string())
        })?;
    }

    Ok(Detection {
        id: json_label_id(obj)?,
        label: json_label_name(obj, "Detection")?,
        bounding_box,
        confidence: json_confidence(obj),
        attributes: json_label_attributes(
            obj,
            &[CLS_KEY, ID_KEY, "label", "bounding_box", "confidence"],
        )?,
    })
}

fn json_label_id(obj: &JsonMap<String, JsonValue>) -> Result<RecordId, SerializeError> {
    match obj.get(ID_KEY).and_then(JsonValue::as_str) {
        Some(encoded) => RecordId::parse(encoded)
            .map_err(|err| SerializeError::Deserialize(err.to_string())),
        // Labels authored by hand carry no id yet; mint one on ingest.
        None => Ok(RecordId::generate()),
    }
}

fn json_label_name(
    obj: &JsonMap<String, JsonValue>,
    cls: &str,
) -> Result<String, SerializeError> {
    obj.get("label")
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| SerializeError::Deserialize(format!("{cls} requires a 'label' string")))
}

fn json_confidence(obj: &JsonMap<String, JsonValue>) -> Option<f64> {
    obj.get("confidence").and_then(JsonValue::as_f64)
}

fn json_label_attributes(
    obj: &JsonMap<String, JsonValue>,
    known: &[&str],
) -> Result<IndexMap<String, Value>, SerializeError> {
    obj.iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| Value::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}

fn json_label_array<'a>(
    obj: &'a JsonMap<String, JsonValue>,
    field: &str,
) -> Result<&'a Vec<JsonValue>, SerializeError> {
    obj.get(field)
        .and_then(JsonValue::as_array)
        .ok_or_else(|| SerializeError::Deserialize(format!("missing label array '{field}'")))
}

fn json_object<'a>(
    value: &'a JsonValue,
    cls: &str,
) -> Result<&'a JsonMap<String, JsonValue>, SerializeError> {
    value
        .as_object()
        .ok_or_else(|| SerializeError::Deserialize(format!("{cls} entries must be objects")))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Labeled;

    #[test]
    fn scalars_roundtrip_through_json() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-7),
            Value::Float(0.25),
            Value::Text("hello".to_string()),
            Value::Timestamp(Timestamp::from_seconds(1_600_000_000)),
            Value::List(vec![Value::Int(1), Value::Text("two".to_string())]),
        ] {
            let json = value.to_json();
            assert_eq!(Value::from_json(&json).expect("roundtrip"), value);
        }
    }

    #[test]
    fn records_preserve_key_order() {
        let mut map = IndexMap::new();
        map.insert("zebra".to_string(), Value::Int(1));
        map.insert("apple".to_string(), Value::Int(2));
        let value = Value::Record(map);

        let back = Value::from_json(&value.to_json()).expect("roundtrip");
        let keys: Vec<_> = back.as_record().expect("record").keys().cloned().collect();
        assert_eq!(keys, ["zebra", "apple"]);
    }

    #[test]
    fn detections_roundtrip_with_attributes() {
        let mut det = Detection::new("cat", [0.1, 0.2, 0.3, 0.4]).with_confidence(0.8);
        det.set_attribute("IsGroupOf", false);
        let value = Value::Detections(Detections::new(vec![det.clone()]));

        let back = Value::from_json(&value.to_json()).expect("roundtrip");
        let parsed = back.as_detections().expect("detections");
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].id(), det.id);
        assert_eq!(parsed.detections[0].bounding_box, det.bounding_box);
        assert_eq!(
            parsed.detections[0].get_attribute("IsGroupOf"),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn labels_without_ids_are_minted_on_ingest() {
        let json = serde_json::json!({
            "_cls": "Classification",
            "label": "dog",
            "confidence": 0.5,
        });
        let value = Value::from_json(&json).expect("parse");
        let Value::Classification(c) = value else {
            panic!("expected a classification");
        };
        assert!(!c.id.is_nil());
        assert_eq!(c.label, "dog");
    }

    #[test]
    fn malformed_detection_is_rejected() {
        let json = serde_json::json!({
            "_cls": "Detection",
            "label": "dog",
            "bounding_box": [0.1, 0.2],
        });
        assert!(Value::from_json(&json).is_err());
    }

    #[test]
    fn unknown_objects_parse_as_records() {
        let json = serde_json::json!({"width": 640, "height": 480});
        let value = Value::from_json(&json).expect("parse");
        assert!(value.as_record().is_some());
    }

    #[test]
    fn nan_floats_render_as_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), JsonValue::Null);
    }
}
