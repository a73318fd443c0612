//! Node identity keys
//!
//! A node key says what a node represents: a generic (caller-defined) node,
//! a set of data-source instances, or one of the grouping kinds. Keys are
//! immutable once a node is emitted and double as cache-key components, so
//! every key type is `Eq + Hash`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Instance identity: class + id, optionally tagged with the data source
/// that produced it (used when providers are merged)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub class_name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl InstanceKey {
    pub fn new(class_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            id: id.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Class + id equality; the source tag only participates when both sides carry one
    pub fn matches(&self, other: &InstanceKey) -> bool {
        self.class_name == other.class_name
            && self.id == other.id
            && match (&self.source, &other.source) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => true,
            }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}@{}", self.class_name, self.id, source),
            None => write!(f, "{}:{}", self.class_name, self.id),
        }
    }
}

/// Caller-defined node identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericNodeKey {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl GenericNodeKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
        }
    }
}

/// Range boundary usable in a hashed key (compared by bit pattern)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeBound(pub f64);

impl PartialEq for RangeBound {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for RangeBound {}

impl Hash for RangeBound {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (class, property) pair a property grouping node was built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyIdentifier {
    pub class_name: String,
    pub property_name: String,
}

/// Grouping kind, without the grouping criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingKind {
    Class,
    Label,
    PropertyValue,
    PropertyRange,
    PropertyOther,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GroupingNodeKey {
    #[serde(rename = "class-grouping")]
    Class { class_name: String },

    #[serde(rename = "label-grouping")]
    Label {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },

    /// Also used for the "unspecified" bucket, with an empty formatted value
    #[serde(rename = "property-grouping:value")]
    PropertyValue {
        property_class_name: String,
        property_name: String,
        formatted_value: String,
    },

    #[serde(rename = "property-grouping:range")]
    PropertyRange {
        property_class_name: String,
        property_name: String,
        from: RangeBound,
        to: RangeBound,
    },

    #[serde(rename = "property-grouping:other")]
    PropertyOther { properties: Vec<PropertyIdentifier> },
}

impl GroupingNodeKey {
    pub fn kind(&self) -> GroupingKind {
        match self {
            GroupingNodeKey::Class { .. } => GroupingKind::Class,
            GroupingNodeKey::Label { .. } => GroupingKind::Label,
            GroupingNodeKey::PropertyValue { .. } => GroupingKind::PropertyValue,
            GroupingNodeKey::PropertyRange { .. } => GroupingKind::PropertyRange,
            GroupingNodeKey::PropertyOther { .. } => GroupingKind::PropertyOther,
        }
    }
}

impl fmt::Display for GroupingNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingNodeKey::Class { class_name } => write!(f, "class-grouping:{}", class_name),
            GroupingNodeKey::Label { label, .. } => write!(f, "label-grouping:{}", label),
            GroupingNodeKey::PropertyValue {
                property_name,
                formatted_value,
                ..
            } => write!(f, "property-grouping:{}={}", property_name, formatted_value),
            GroupingNodeKey::PropertyRange {
                property_name,
                from,
                to,
                ..
            } => write!(f, "property-grouping:{}=[{}, {}]", property_name, from, to),
            GroupingNodeKey::PropertyOther { .. } => write!(f, "property-grouping:other"),
        }
    }
}

/// Node identity key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyNodeKey {
    Generic(GenericNodeKey),
    /// Non-empty set of instance keys
    Instances(Vec<InstanceKey>),
    Grouping(GroupingNodeKey),
}

impl HierarchyNodeKey {
    pub fn generic(id: impl Into<String>) -> Self {
        Self::Generic(GenericNodeKey::new(id))
    }

    pub fn instances(keys: Vec<InstanceKey>) -> Self {
        debug_assert!(!keys.is_empty(), "instances node key without instance keys");
        Self::Instances(keys)
    }

    pub fn is_grouping(&self) -> bool {
        matches!(self, Self::Grouping(_))
    }

    pub fn instance_keys(&self) -> Option<&[InstanceKey]> {
        match self {
            Self::Instances(keys) => Some(keys),
            _ => None,
        }
    }

    pub fn as_grouping(&self) -> Option<&GroupingNodeKey> {
        match self {
            Self::Grouping(key) => Some(key),
            _ => None,
        }
    }

    /// Data-source tag carried by the key, if any
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Generic(key) => key.source.as_deref(),
            Self::Instances(keys) => keys.iter().find_map(|k| k.source.as_deref()),
            Self::Grouping(_) => None,
        }
    }

    /// Stamp untagged generic and instance keys with a data-source identity
    pub fn stamp_source(&mut self, source: &str) {
        match self {
            Self::Generic(key) => {
                if key.source.is_none() {
                    key.source = Some(source.to_string());
                }
            }
            Self::Instances(keys) => {
                for key in keys.iter_mut().filter(|k| k.source.is_none()) {
                    key.source = Some(source.to_string());
                }
            }
            Self::Grouping(_) => {}
        }
    }
}

impl fmt::Display for HierarchyNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(key) => write!(f, "generic:{}", key.id),
            Self::Instances(keys) => {
                write!(f, "instances:[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "]")
            }
            Self::Grouping(key) => write!(f, "{}", key),
        }
    }
}
