//! Node processing parameters: hide rules and grouping requests
//!
//! These travel with source and processed nodes and are stripped before a
//! node is returned to the consumer.

use serde::{Deserialize, Serialize};

use super::values::PrimitiveValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeProcessingParams {
    /// Replace the node with its children
    pub hide_in_hierarchy: bool,
    /// Drop the node when it turns out to have no children
    pub hide_if_no_children: bool,
    /// Grouping requests; only honored for instance nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingAutoExpand {
    Always,
    SingleChild,
}

/// Options shared by every grouping kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingOptions {
    /// Don't create the grouping node when it would be the only node in the level
    pub hide_if_no_siblings: bool,
    /// Don't create the grouping node when it would group a single node
    pub hide_if_one_grouped_node: bool,
    pub auto_expand: Option<GroupingAutoExpand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassGroupingParams {
    #[serde(flatten)]
    pub options: GroupingOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseClassGroupingParams {
    /// Base classes to group by, most general first
    pub full_class_names: Vec<String>,
    #[serde(flatten)]
    pub options: GroupingOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelGroupingAction {
    /// Put same-label nodes under a label grouping node
    #[default]
    Group,
    /// Collapse same-label nodes into one instances node
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelGroupingParams {
    pub action: LabelGroupingAction,
    /// Only nodes with equal group ids are grouped together
    pub group_id: Option<String>,
    /// Group only when at least `label_grouping_threshold` nodes share the label
    pub only_if_shared: bool,
    #[serde(flatten)]
    pub options: GroupingOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRange {
    pub from: f64,
    pub to: f64,
    /// Overrides the computed "`from` - `to`" label
    #[serde(default)]
    pub label: Option<String>,
}

impl PropertyRange {
    pub fn contains(&self, value: f64) -> bool {
        self.from <= value && value <= self.to
    }
}

/// One property grouping level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyGroup {
    pub property_name: String,
    #[serde(default)]
    pub value: Option<PrimitiveValue>,
    #[serde(default)]
    pub ranges: Vec<PropertyRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertiesGroupingParams {
    pub property_class_name: String,
    /// Grouping levels, outermost first
    pub property_groups: Vec<PropertyGroup>,
    pub create_group_for_unspecified_values: bool,
    pub create_group_for_out_of_range_values: bool,
    #[serde(flatten)]
    pub options: GroupingOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_base_classes: Option<BaseClassGroupingParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_class: Option<ClassGroupingParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_label: Option<LabelGroupingParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_properties: Option<PropertiesGroupingParams>,
}

impl GroupingParams {
    pub fn is_empty(&self) -> bool {
        self.by_base_classes.is_none()
            && self.by_class.is_none()
            && self.by_label.is_none()
            && self.by_properties.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_blob_deserialization() {
        let blob = r#"{
            "by_class": { "hide_if_one_grouped_node": true },
            "by_properties": {
                "property_class_name": "Bis.Element",
                "create_group_for_out_of_range_values": true,
                "property_groups": [
                    { "property_name": "Size", "value": { "type": "Double", "value": 4.0 },
                      "ranges": [ { "from": 0, "to": 5 } ] }
                ]
            }
        }"#;
        let params: GroupingParams = serde_json::from_str(blob).unwrap();

        assert!(params.by_class.unwrap().options.hide_if_one_grouped_node);
        let props = params.by_properties.unwrap();
        assert!(props.create_group_for_out_of_range_values);
        assert!(!props.create_group_for_unspecified_values);
        assert_eq!(props.property_groups[0].ranges[0].to, 5.0);
        assert!(props.property_groups[0].ranges[0].contains(4.0));
    }
}
