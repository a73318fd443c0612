//! Default row -> source node parser
//!
//! Instance queries project the well-known columns below, in this order and
//! under these names. Rows carrying column names are read by name, other rows
//! by position.

use serde_json::{Map, Value};

use super::ports::Row;
use crate::errors::{HierarchyError, Result};
use crate::shared::models::{
    GroupingParams, HierarchyNodeKey, InstanceKey, NodeLabel, NodeProcessingParams, SourceNode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelectColumn {
    FullClassName,
    ECInstanceId,
    HideNodeInHierarchy,
    HideIfNoChildren,
    AutoExpand,
    Grouping,
    HasChildren,
    DisplayLabel,
    ExtendedData,
    SupportsFiltering,
}

impl NodeSelectColumn {
    pub const ALL: [NodeSelectColumn; 10] = [
        NodeSelectColumn::FullClassName,
        NodeSelectColumn::ECInstanceId,
        NodeSelectColumn::HideNodeInHierarchy,
        NodeSelectColumn::HideIfNoChildren,
        NodeSelectColumn::AutoExpand,
        NodeSelectColumn::Grouping,
        NodeSelectColumn::HasChildren,
        NodeSelectColumn::DisplayLabel,
        NodeSelectColumn::ExtendedData,
        NodeSelectColumn::SupportsFiltering,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeSelectColumn::FullClassName => "FullClassName",
            NodeSelectColumn::ECInstanceId => "ECInstanceId",
            NodeSelectColumn::HideNodeInHierarchy => "HideNodeInHierarchy",
            NodeSelectColumn::HideIfNoChildren => "HideIfNoChildren",
            NodeSelectColumn::AutoExpand => "AutoExpand",
            NodeSelectColumn::Grouping => "Grouping",
            NodeSelectColumn::HasChildren => "HasChildren",
            NodeSelectColumn::DisplayLabel => "DisplayLabel",
            NodeSelectColumn::ExtendedData => "ExtendedData",
            NodeSelectColumn::SupportsFiltering => "SupportsFiltering",
        }
    }
}

/// Comma-separated projection of all well-known columns, aliased by name
pub fn node_select_clause(expressions: &[(NodeSelectColumn, &str)]) -> String {
    NodeSelectColumn::ALL
        .iter()
        .map(|column| {
            let expr = expressions
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, e)| *e)
                .unwrap_or("NULL");
            format!("{} AS {}", expr, column.name())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn column<'a>(row: &'a Row, column: NodeSelectColumn) -> Option<&'a Value> {
    let value = if row.has_column_names() {
        row.get_by_name(column.name())
    } else {
        row.get(column.index())
    };
    value.filter(|v| !v.is_null())
}

fn flag(row: &Row, col: NodeSelectColumn) -> Result<Option<bool>> {
    match column(row, col) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().map(|v| v != 0.0).unwrap_or(false))),
        Some(other) => Err(HierarchyError::parse(format!(
            "column {} is not a flag: {}",
            col.name(),
            other
        ))),
    }
}

fn text(row: &Row, col: NodeSelectColumn) -> Result<String> {
    match column(row, col) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(HierarchyError::parse(format!(
            "column {} is not text: {}",
            col.name(),
            other
        ))),
        None => Err(HierarchyError::parse(format!(
            "missing value in column {}",
            col.name()
        ))),
    }
}

/// JSON columns come either as serialized text or as an already-parsed value
fn json(row: &Row, col: NodeSelectColumn) -> Result<Option<Value>> {
    match column(row, col) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(s).map(Some).map_err(|e| {
            HierarchyError::parse(format!("column {} is not valid JSON: {}", col.name(), e))
        }),
        Some(other) => Ok(Some(other.clone())),
    }
}

/// Default parser of a well-known-columns row
pub fn parse_node_row(row: &Row) -> Result<SourceNode> {
    let class_name = text(row, NodeSelectColumn::FullClassName)?;
    let id = text(row, NodeSelectColumn::ECInstanceId)?;

    let label = match column(row, NodeSelectColumn::DisplayLabel) {
        Some(Value::String(s)) => NodeLabel::parse(s),
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())?,
        Some(other) => NodeLabel::Text(other.to_string()),
        None => NodeLabel::Text(String::new()),
    };

    let grouping = match json(row, NodeSelectColumn::Grouping)? {
        Some(value) => Some(serde_json::from_value::<GroupingParams>(value)?),
        None => None,
    };

    let extended_data = match json(row, NodeSelectColumn::ExtendedData)? {
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Some(map)
        }
        None => None,
    };

    Ok(SourceNode {
        key: HierarchyNodeKey::instances(vec![InstanceKey::new(class_name, id)]),
        label,
        children: flag(row, NodeSelectColumn::HasChildren)?,
        auto_expand: flag(row, NodeSelectColumn::AutoExpand)?.unwrap_or(false),
        supports_filtering: flag(row, NodeSelectColumn::SupportsFiltering)?.unwrap_or(false),
        extended_data,
        processing: NodeProcessingParams {
            hide_in_hierarchy: flag(row, NodeSelectColumn::HideNodeInHierarchy)?.unwrap_or(false),
            hide_if_no_children: flag(row, NodeSelectColumn::HideIfNoChildren)?.unwrap_or(false),
            grouping: grouping.filter(|g| !g.is_empty()),
        },
        filtering: None,
    })
}
