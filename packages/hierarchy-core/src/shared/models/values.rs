//! Label and property values as read from query rows

use serde::{Deserialize, Serialize};

/// Typed primitive value, formatted for display by a `ValueFormatter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PrimitiveValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Id(String),
    /// ISO-8601 date-time text
    DateTime(String),
    Point2d { x: f64, y: f64 },
    Point3d { x: f64, y: f64, z: f64 },
    /// Navigation (foreign-key) value: the target instance and its label
    Navigation {
        class_name: String,
        id: String,
        label: String,
    },
}

impl PrimitiveValue {
    /// Numeric view used by range grouping
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PrimitiveValue::Integer(v) => Some(*v as f64),
            PrimitiveValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Absent-equivalent values go to the "unspecified" bucket
    pub fn is_empty(&self) -> bool {
        match self {
            PrimitiveValue::String(s) | PrimitiveValue::Id(s) | PrimitiveValue::DateTime(s) => {
                s.is_empty()
            }
            _ => false,
        }
    }
}

/// One part of a structured ("concatenated") label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConcatenatedValuePart {
    Text(String),
    Property {
        class_name: String,
        property_name: String,
        value: PrimitiveValue,
    },
    Primitive(PrimitiveValue),
}

/// Raw node label, pending formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeLabel {
    Text(String),
    Concatenated(Vec<ConcatenatedValuePart>),
}

impl NodeLabel {
    /// Labels read from a row are concatenated values when the text is a JSON array
    pub fn parse(raw: &str) -> Self {
        if raw.trim_start().starts_with('[') {
            if let Ok(parts) = serde_json::from_str::<Vec<ConcatenatedValuePart>>(raw) {
                return NodeLabel::Concatenated(parts);
            }
        }
        NodeLabel::Text(raw.to_string())
    }
}

impl From<&str> for NodeLabel {
    fn from(value: &str) -> Self {
        NodeLabel::Text(value.to_string())
    }
}

impl From<String> for NodeLabel {
    fn from(value: String) -> Self {
        NodeLabel::Text(value)
    }
}
