//! Grouping engine
//!
//! Turns one pre-processed hierarchy level into a grouped tree fragment.
//! Grouping steps run in a fixed order (base classes, class, label, then one
//! step per requested property) and each step only touches the nodes that
//! request it. Nodes a step leaves alone continue to the next step at the
//! same tree level; grouped nodes continue inside their new grouping node.
//!
//! The engine is synchronous and pure: everything that needs I/O (base-class
//! resolution, property value formatting) is done beforehand and stored on
//! the processed nodes.

use std::collections::{HashMap, HashSet};

use crate::config::LocalizedStrings;
use crate::features::formatting::DefaultValueFormatter;
use crate::shared::models::{
    GroupingAutoExpand, GroupingKind, GroupingNodeKey, GroupingOptions, HierarchyNode,
    HierarchyNodeKey, InstanceKey, LabelGroupingAction, NodeFilteringInfo, PrimitiveValue,
    ProcessedGroupingNode, ProcessedHierarchyNode, ProcessedNonGroupingNode, PropertyIdentifier,
    RangeBound,
};

/// Inputs shared by every grouping step of one level
pub struct GroupingContext<'a> {
    /// Ancestor keys of the level's nodes
    pub parent_keys: &'a [HierarchyNodeKey],
    /// Closest non-grouping ancestor, `None` at the root
    pub non_grouping_ancestor: Option<&'a HierarchyNode>,
    pub localized_strings: &'a LocalizedStrings,
    /// Minimum shared-label count for `only_if_shared` label grouping
    pub label_grouping_threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    BaseClass(usize),
    Class,
    Label,
    Property(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Key(GroupingNodeKey),
    /// One per level regardless of the contributing class or property
    Unspecified,
    /// One per level regardless of the contributing class or property
    Other,
}

struct Criterion {
    slot: Slot,
    label: String,
    options: GroupingOptions,
    property: Option<PropertyIdentifier>,
    only_if_shared: bool,
}

struct PendingGroup {
    slot: Slot,
    label: String,
    options: GroupingOptions,
    only_if_shared: bool,
    properties: Vec<PropertyIdentifier>,
    members: Vec<ProcessedHierarchyNode>,
}

impl PendingGroup {
    fn absorb(&mut self, criterion: Criterion, node: ProcessedHierarchyNode) {
        self.options.hide_if_no_siblings |= criterion.options.hide_if_no_siblings;
        self.options.hide_if_one_grouped_node |= criterion.options.hide_if_one_grouped_node;
        if self.options.auto_expand.is_none() {
            self.options.auto_expand = criterion.options.auto_expand;
        }
        self.only_if_shared |= criterion.only_if_shared;
        if let Some(property) = criterion.property {
            if !self.properties.contains(&property) {
                self.properties.push(property);
            }
        }
        self.members.push(node);
    }

    fn key(&self) -> GroupingNodeKey {
        match &self.slot {
            Slot::Key(key) => key.clone(),
            Slot::Unspecified => {
                let first = self.properties.first();
                GroupingNodeKey::PropertyValue {
                    property_class_name: first.map(|p| p.class_name.clone()).unwrap_or_default(),
                    property_name: first.map(|p| p.property_name.clone()).unwrap_or_default(),
                    formatted_value: String::new(),
                }
            }
            Slot::Other => GroupingNodeKey::PropertyOther {
                properties: self.properties.clone(),
            },
        }
    }
}

/// Display label of a class grouping node: the class name without its schema
pub fn class_label(full_class_name: &str) -> String {
    full_class_name
        .rsplit(|c| c == '.' || c == ':')
        .next()
        .unwrap_or(full_class_name)
        .to_string()
}

fn format_bound(value: f64) -> String {
    DefaultValueFormatter::format_sync(&PrimitiveValue::Double(value))
}

fn plan(nodes: &[ProcessedHierarchyNode]) -> Vec<Step> {
    let (mut base_classes, mut by_class, mut by_label, mut properties) = (0, false, false, 0);
    for params in nodes
        .iter()
        .filter_map(|n| n.as_non_grouping())
        .filter_map(|n| n.grouping())
    {
        if let Some(p) = &params.by_base_classes {
            base_classes = base_classes.max(p.full_class_names.len());
        }
        by_class |= params.by_class.is_some();
        by_label |= params.by_label.is_some();
        if let Some(p) = &params.by_properties {
            properties = properties.max(p.property_groups.len());
        }
    }

    let mut steps: Vec<Step> = (0..base_classes).map(Step::BaseClass).collect();
    if by_class {
        steps.push(Step::Class);
    }
    if by_label {
        steps.push(Step::Label);
    }
    steps.extend((0..properties).map(Step::Property));
    steps
}

fn criterion(node: &ProcessedNonGroupingNode, step: Step, ctx: &GroupingContext) -> Option<Criterion> {
    let params = node.grouping()?;
    match step {
        Step::BaseClass(i) => {
            let p = params.by_base_classes.as_ref()?;
            let base = p.full_class_names.get(i)?;
            if !node.base_classes.contains(base) {
                return None;
            }
            Some(Criterion {
                slot: Slot::Key(GroupingNodeKey::Class {
                    class_name: base.clone(),
                }),
                label: class_label(base),
                options: p.options.clone(),
                property: None,
                only_if_shared: false,
            })
        }
        Step::Class => {
            let p = params.by_class.as_ref()?;
            let class_name = node.class_name()?;
            Some(Criterion {
                slot: Slot::Key(GroupingNodeKey::Class {
                    class_name: class_name.to_string(),
                }),
                label: class_label(class_name),
                options: p.options.clone(),
                property: None,
                only_if_shared: false,
            })
        }
        Step::Label => {
            let p = params.by_label.as_ref()?;
            if p.action == LabelGroupingAction::Merge {
                return None;
            }
            Some(Criterion {
                slot: Slot::Key(GroupingNodeKey::Label {
                    label: node.label.clone(),
                    group_id: p.group_id.clone(),
                }),
                label: node.label.clone(),
                options: p.options.clone(),
                property: None,
                only_if_shared: p.only_if_shared,
            })
        }
        Step::Property(i) => {
            let p = params.by_properties.as_ref()?;
            let group = p.property_groups.get(i)?;
            let property = PropertyIdentifier {
                class_name: p.property_class_name.clone(),
                property_name: group.property_name.clone(),
            };
            let options = p.options.clone();
            let bucket = |slot: Slot, label: &str| Criterion {
                slot,
                label: label.to_string(),
                options: options.clone(),
                property: Some(property.clone()),
                only_if_shared: false,
            };

            let Some(value) = group.value.as_ref().filter(|v| !v.is_empty()) else {
                return p
                    .create_group_for_unspecified_values
                    .then(|| bucket(Slot::Unspecified, &ctx.localized_strings.unspecified));
            };

            if !group.ranges.is_empty() {
                let range = value
                    .as_f64()
                    .and_then(|v| group.ranges.iter().find(|r| r.contains(v)));
                return match range {
                    Some(range) => {
                        let label = range.label.clone().unwrap_or_else(|| {
                            format!("{} - {}", format_bound(range.from), format_bound(range.to))
                        });
                        Some(bucket(
                            Slot::Key(GroupingNodeKey::PropertyRange {
                                property_class_name: property.class_name.clone(),
                                property_name: property.property_name.clone(),
                                from: RangeBound(range.from),
                                to: RangeBound(range.to),
                            }),
                            &label,
                        ))
                    }
                    None => p
                        .create_group_for_out_of_range_values
                        .then(|| bucket(Slot::Other, &ctx.localized_strings.other)),
                };
            }

            let formatted = node
                .formatted_property_values
                .get(i)
                .cloned()
                .flatten()
                .unwrap_or_else(|| DefaultValueFormatter::format_sync(value));
            Some(bucket(
                Slot::Key(GroupingNodeKey::PropertyValue {
                    property_class_name: property.class_name.clone(),
                    property_name: property.property_name.clone(),
                    formatted_value: formatted.clone(),
                }),
                &formatted,
            ))
        }
    }
}

fn push_unique(keys: &mut Vec<InstanceKey>, seen: &mut HashSet<InstanceKey>, new: Vec<InstanceKey>) {
    for key in new {
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
}

fn merge_children_flags(lhs: Option<bool>, rhs: Option<bool>) -> Option<bool> {
    match (lhs, rhs) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Collapse same-label nodes requesting `LabelGroupingAction::Merge` into
/// single instances nodes
fn merge_same_labels(
    nodes: Vec<ProcessedHierarchyNode>,
    ctx: &GroupingContext,
) -> Vec<ProcessedHierarchyNode> {
    let merge_key = |node: &ProcessedHierarchyNode| {
        let node = node.as_non_grouping()?;
        let p = node.grouping()?.by_label.as_ref()?;
        (p.action == LabelGroupingAction::Merge)
            .then(|| (node.label.clone(), p.group_id.clone(), p.only_if_shared))
    };

    let mut counts: HashMap<(String, Option<String>), usize> = HashMap::new();
    for (label, group_id, _) in nodes.iter().filter_map(|n| merge_key(n)) {
        *counts.entry((label, group_id)).or_default() += 1;
    }

    let mut out: Vec<ProcessedHierarchyNode> = Vec::with_capacity(nodes.len());
    let mut merged_at: HashMap<(String, Option<String>), usize> = HashMap::new();
    for node in nodes {
        let Some((label, group_id, only_if_shared)) = merge_key(&node) else {
            out.push(node);
            continue;
        };
        let bucket = (label, group_id);
        let count = counts.get(&bucket).copied().unwrap_or(0);
        let required = if only_if_shared {
            ctx.label_grouping_threshold.max(2)
        } else {
            2
        };
        if count < required {
            out.push(node);
            continue;
        }

        let ProcessedHierarchyNode::NonGrouping(node) = node else {
            continue;
        };
        match merged_at.get(&bucket) {
            Some(&index) => {
                if let ProcessedHierarchyNode::NonGrouping(target) = &mut out[index] {
                    let mut keys = target.key.instance_keys().map(|k| k.to_vec()).unwrap_or_default();
                    let mut seen: HashSet<InstanceKey> = keys.iter().cloned().collect();
                    push_unique(
                        &mut keys,
                        &mut seen,
                        node.key.instance_keys().map(|k| k.to_vec()).unwrap_or_default(),
                    );
                    target.key = HierarchyNodeKey::Instances(keys);
                    target.auto_expand |= node.auto_expand;
                    target.children = merge_children_flags(target.children, node.children);
                    target.order = target.order.clone().min(node.order.clone());
                    if let Some(rhs) = &node.filtering {
                        match target.filtering.as_mut() {
                            Some(lhs) => lhs.merge(rhs),
                            None => target.filtering = Some(rhs.clone()),
                        }
                    }
                }
            }
            None => {
                merged_at.insert(bucket, out.len());
                out.push(ProcessedHierarchyNode::NonGrouping(node));
            }
        }
    }
    out
}

fn collect_filtering<'a>(nodes: &'a [ProcessedHierarchyNode], out: &mut Vec<&'a NodeFilteringInfo>) {
    for node in nodes {
        match node {
            ProcessedHierarchyNode::NonGrouping(n) => out.extend(n.filtering.as_ref()),
            ProcessedHierarchyNode::Grouping(g) => collect_filtering(&g.children, out),
        }
    }
}

fn apply_steps(
    nodes: Vec<ProcessedHierarchyNode>,
    steps: &[Step],
    ctx: &GroupingContext,
    parent_keys: &[HierarchyNodeKey],
    chain: &[GroupingKind],
) -> Vec<ProcessedHierarchyNode> {
    let Some((&step, rest)) = steps.split_first() else {
        let mut nodes = nodes;
        for node in nodes.iter_mut() {
            node.set_parent_keys(parent_keys.to_vec());
        }
        return nodes;
    };

    let nodes = if step == Step::Label {
        merge_same_labels(nodes, ctx)
    } else {
        nodes
    };

    let mut passthrough = Vec::new();
    let mut groups: Vec<PendingGroup> = Vec::new();
    let mut group_index: HashMap<Slot, usize> = HashMap::new();
    for node in nodes {
        let found = match &node {
            ProcessedHierarchyNode::NonGrouping(n) => criterion(n, step, ctx),
            ProcessedHierarchyNode::Grouping(_) => None,
        };
        let Some(found) = found else {
            passthrough.push(node);
            continue;
        };
        match group_index.get(&found.slot) {
            Some(&index) => groups[index].absorb(found, node),
            None => {
                group_index.insert(found.slot.clone(), groups.len());
                let mut group = PendingGroup {
                    slot: found.slot.clone(),
                    label: found.label.clone(),
                    options: GroupingOptions::default(),
                    only_if_shared: false,
                    properties: Vec::new(),
                    members: Vec::new(),
                };
                group.absorb(found, node);
                groups.push(group);
            }
        }
    }

    let threshold = ctx.label_grouping_threshold.max(1);
    let (groups, unshared): (Vec<_>, Vec<_>) = groups
        .into_iter()
        .partition(|g| !g.only_if_shared || g.members.len() >= threshold);
    for group in unshared {
        passthrough.extend(group.members);
    }

    let lone = groups.len() == 1 && passthrough.is_empty();
    let mut out = Vec::with_capacity(groups.len() + passthrough.len());
    for group in groups {
        let hide = (group.options.hide_if_one_grouped_node && group.members.len() == 1)
            || (group.options.hide_if_no_siblings && lone);
        if hide {
            passthrough.extend(group.members);
            continue;
        }

        let key = group.key();
        let mut child_parent_keys = parent_keys.to_vec();
        child_parent_keys.push(HierarchyNodeKey::Grouping(key.clone()));
        let mut child_chain = chain.to_vec();
        child_chain.push(key.kind());
        let children = apply_steps(group.members, rest, ctx, &child_parent_keys, &child_chain);

        let mut grouped_instance_keys = Vec::new();
        let mut seen = HashSet::new();
        for child in &children {
            push_unique(&mut grouped_instance_keys, &mut seen, child.instance_keys());
        }
        let order = children
            .iter()
            .map(|c| c.order().clone())
            .min()
            .unwrap_or_default();

        let mut filtering = Vec::new();
        collect_filtering(&children, &mut filtering);
        let auto_expand = match group.options.auto_expand {
            Some(GroupingAutoExpand::Always) => true,
            Some(GroupingAutoExpand::SingleChild) => children.len() == 1,
            None => false,
        } || filtering.iter().any(|f| f.expands_grouping(&child_chain));

        out.push(ProcessedHierarchyNode::Grouping(ProcessedGroupingNode {
            key,
            label: group.label,
            parent_keys: parent_keys.to_vec(),
            grouped_instance_keys,
            children,
            non_grouping_ancestor: ctx.non_grouping_ancestor.cloned().map(Box::new),
            auto_expand,
            order,
        }));
    }

    out.extend(apply_steps(passthrough, rest, ctx, parent_keys, chain));
    out
}

/// Group one level. Output order is first-appearance order; callers sort.
pub fn group_nodes(
    nodes: Vec<ProcessedHierarchyNode>,
    ctx: &GroupingContext,
) -> Vec<ProcessedHierarchyNode> {
    let steps = plan(&nodes);
    if steps.is_empty() {
        return nodes;
    }
    apply_steps(nodes, &steps, ctx, ctx.parent_keys, &[])
}

/// Walk a grouped level down a chain of grouping keys
pub fn find_grouping_node(
    nodes: Vec<ProcessedHierarchyNode>,
    path: &[GroupingNodeKey],
) -> Option<ProcessedGroupingNode> {
    let (first, rest) = path.split_first()?;
    let found = nodes.into_iter().find_map(|node| match node {
        ProcessedHierarchyNode::Grouping(g) if &g.key == first => Some(g),
        _ => None,
    })?;
    if rest.is_empty() {
        Some(found)
    } else {
        find_grouping_node(found.children, rest)
    }
}

/// Grouping nodes anywhere in a grouped level, outermost first
pub fn grouping_nodes(nodes: &[ProcessedHierarchyNode]) -> Vec<&ProcessedGroupingNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&ProcessedHierarchyNode> = nodes.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if let ProcessedHierarchyNode::Grouping(g) = node {
            out.push(g);
            stack.extend(g.children.iter().rev());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{
        BaseClassGroupingParams, ClassGroupingParams, GroupingParams, LabelGroupingParams,
        NodeOrder, NodeProcessingParams, PropertiesGroupingParams, PropertyGroup, PropertyRange,
        RevealMode, TargetReveal,
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn instance(class: &str, id: &str, label: &str, grouping: GroupingParams) -> ProcessedHierarchyNode {
        ProcessedHierarchyNode::NonGrouping(ProcessedNonGroupingNode {
            key: HierarchyNodeKey::instances(vec![InstanceKey::new(class, id)]),
            label: label.to_string(),
            parent_keys: vec![HierarchyNodeKey::generic("root")],
            children: None,
            auto_expand: false,
            supports_filtering: false,
            extended_data: None,
            processing: NodeProcessingParams {
                grouping: Some(grouping),
                ..Default::default()
            },
            filtering: None,
            base_classes: vec![],
            formatted_property_values: vec![],
            order: NodeOrder::new(0, id.parse().unwrap_or(0)),
        })
    }

    fn by_class() -> GroupingParams {
        GroupingParams {
            by_class: Some(ClassGroupingParams::default()),
            ..Default::default()
        }
    }

    fn by_size(value: Option<PrimitiveValue>, ranges: Vec<PropertyRange>) -> GroupingParams {
        GroupingParams {
            by_properties: Some(PropertiesGroupingParams {
                property_class_name: "Bis.Element".into(),
                property_groups: vec![PropertyGroup {
                    property_name: "Size".into(),
                    value,
                    ranges,
                }],
                create_group_for_unspecified_values: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn ranges() -> Vec<PropertyRange> {
        vec![
            PropertyRange {
                from: 0.0,
                to: 5.0,
                label: None,
            },
            PropertyRange {
                from: 6.0,
                to: 10.0,
                label: None,
            },
        ]
    }

    fn group(nodes: Vec<ProcessedHierarchyNode>, strings: &LocalizedStrings) -> Vec<ProcessedHierarchyNode> {
        let parent_keys = vec![HierarchyNodeKey::generic("root")];
        let ctx = GroupingContext {
            parent_keys: &parent_keys,
            non_grouping_ancestor: None,
            localized_strings: strings,
            label_grouping_threshold: 2,
        };
        group_nodes(nodes, &ctx)
    }

    fn as_group(node: &ProcessedHierarchyNode) -> &ProcessedGroupingNode {
        match node {
            ProcessedHierarchyNode::Grouping(g) => g,
            other => panic!("expected grouping node, got {:?}", other.key()),
        }
    }

    #[test]
    fn test_class_grouping_collects_instance_keys() {
        let nodes = vec![
            instance("Bis.Door", "1", "a", by_class()),
            instance("Bis.Wall", "2", "b", by_class()),
            instance("Bis.Door", "3", "c", by_class()),
        ];
        let out = group(nodes, &LocalizedStrings::default());

        assert_eq!(out.len(), 2);
        let doors = as_group(&out[0]);
        assert_eq!(doors.label, "Door");
        assert_eq!(
            doors.grouped_instance_keys,
            vec![InstanceKey::new("Bis.Door", "1"), InstanceKey::new("Bis.Door", "3")]
        );
        assert_eq!(
            doors.children[0].parent_keys(),
            &[
                HierarchyNodeKey::generic("root"),
                HierarchyNodeKey::Grouping(doors.key.clone())
            ]
        );
    }

    #[test]
    fn test_range_grouping_without_leftovers() {
        let nodes = vec![
            instance("Bis.Element", "1", "a", by_size(Some(PrimitiveValue::Integer(1)), ranges())),
            instance("Bis.Element", "2", "b", by_size(Some(PrimitiveValue::Integer(4)), ranges())),
            instance("Bis.Element", "3", "c", by_size(Some(PrimitiveValue::Integer(7)), ranges())),
        ];
        let out = group(nodes, &LocalizedStrings::default());

        assert_eq!(out.len(), 2);
        let low = as_group(&out[0]);
        let high = as_group(&out[1]);
        assert_eq!(low.label, "0 - 5");
        assert_eq!(low.children.len(), 2);
        assert_eq!(high.label, "6 - 10");
        assert_eq!(high.children.len(), 1);
    }

    #[test]
    fn test_out_of_range_values_stay_ungrouped_unless_requested() {
        let mut other = by_size(Some(PrimitiveValue::Integer(42)), ranges());
        let out = group(
            vec![instance("Bis.Element", "1", "a", other.clone())],
            &LocalizedStrings::default(),
        );
        assert!(matches!(out[0], ProcessedHierarchyNode::NonGrouping(_)));

        other.by_properties.as_mut().unwrap().create_group_for_out_of_range_values = true;
        let out = group(
            vec![instance("Bis.Element", "1", "a", other)],
            &LocalizedStrings::default(),
        );
        assert_eq!(as_group(&out[0]).label, "Other");
    }

    #[test]
    fn test_single_unspecified_bucket_with_localized_label() {
        let strings = LocalizedStrings {
            other: "Other".into(),
            unspecified: "N/A".into(),
        };
        let nodes = vec![
            instance("Bis.Element", "1", "a", by_size(Some(PrimitiveValue::String("red".into())), vec![])),
            instance("Bis.Element", "2", "b", by_size(None, vec![])),
            instance("Bis.Element", "3", "c", by_size(Some(PrimitiveValue::String("blue".into())), vec![])),
        ];
        let out = group(nodes, &strings);

        let labels: Vec<_> = out.iter().map(|n| n.label().to_string()).collect();
        assert_eq!(labels, vec!["red", "N/A", "blue"]);
        let unspecified = as_group(&out[1]);
        assert_eq!(unspecified.grouped_instance_keys, vec![InstanceKey::new("Bis.Element", "2")]);
    }

    #[test]
    fn test_unspecified_merged_across_classes() {
        let mut door = by_size(None, vec![]);
        door.by_properties.as_mut().unwrap().property_class_name = "Bis.Door".into();
        let mut wall = by_size(None, vec![]);
        wall.by_properties.as_mut().unwrap().property_class_name = "Bis.Wall".into();

        let out = group(
            vec![
                instance("Bis.Door", "1", "a", door),
                instance("Bis.Wall", "2", "b", wall),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(as_group(&out[0]).children.len(), 2);
    }

    #[test]
    fn test_navigation_values_group_by_target_label_within_class() {
        let nav = |id: &str| {
            Some(PrimitiveValue::Navigation {
                class_name: "Bis.Model".into(),
                id: id.into(),
                label: "Model".into(),
            })
        };
        let mut other_class = by_size(Some(PrimitiveValue::String("Model".into())), vec![]);
        other_class.by_properties.as_mut().unwrap().property_class_name = "Bis.Other".into();

        let out = group(
            vec![
                instance("Bis.Element", "1", "a", by_size(nav("0x1"), vec![])),
                instance("Bis.Element", "2", "b", by_size(nav("0x2"), vec![])),
                instance("Bis.Other", "3", "c", other_class),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(as_group(&out[0]).children.len(), 2);
        assert_eq!(as_group(&out[1]).children.len(), 1);
    }

    #[test]
    fn test_label_grouping_threshold() {
        let shared_only = GroupingParams {
            by_label: Some(LabelGroupingParams {
                only_if_shared: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let always = GroupingParams {
            by_label: Some(LabelGroupingParams::default()),
            ..Default::default()
        };

        let out = group(
            vec![
                instance("Bis.Element", "1", "x", shared_only.clone()),
                instance("Bis.Element", "2", "x", shared_only.clone()),
                instance("Bis.Element", "3", "y", shared_only),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(as_group(&out[0]).children.len(), 2);
        assert!(matches!(out[1], ProcessedHierarchyNode::NonGrouping(_)));

        let out = group(
            vec![instance("Bis.Element", "1", "y", always)],
            &LocalizedStrings::default(),
        );
        assert_eq!(as_group(&out[0]).label, "y");
    }

    #[test]
    fn test_label_merge() {
        let merge = GroupingParams {
            by_label: Some(LabelGroupingParams {
                action: LabelGroupingAction::Merge,
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = group(
            vec![
                instance("Bis.Element", "1", "x", merge.clone()),
                instance("Bis.Element", "2", "x", merge.clone()),
                instance("Bis.Element", "3", "y", merge),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].instance_keys(),
            vec![InstanceKey::new("Bis.Element", "1"), InstanceKey::new("Bis.Element", "2")]
        );
    }

    #[test]
    fn test_hide_if_one_grouped_node_and_no_siblings() {
        let mut params = by_class();
        params.by_class.as_mut().unwrap().options.hide_if_one_grouped_node = true;
        let out = group(
            vec![
                instance("Bis.Door", "1", "a", params.clone()),
                instance("Bis.Wall", "2", "b", params.clone()),
                instance("Bis.Wall", "3", "c", params),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], ProcessedHierarchyNode::Grouping(_)));
        assert_eq!(out[1].parent_keys(), &[HierarchyNodeKey::generic("root")]);

        let mut params = by_class();
        params.by_class.as_mut().unwrap().options.hide_if_no_siblings = true;
        let out = group(
            vec![
                instance("Bis.Door", "1", "a", params.clone()),
                instance("Bis.Door", "2", "b", params),
            ],
            &LocalizedStrings::default(),
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| matches!(n, ProcessedHierarchyNode::NonGrouping(_))));
    }

    #[test]
    fn test_base_class_then_class_nesting() {
        let params = GroupingParams {
            by_base_classes: Some(BaseClassGroupingParams {
                full_class_names: vec!["Bis.Element".into()],
                ..Default::default()
            }),
            by_class: Some(ClassGroupingParams::default()),
            ..Default::default()
        };
        let mut door = instance("Bis.Door", "1", "a", params.clone());
        if let ProcessedHierarchyNode::NonGrouping(n) = &mut door {
            n.base_classes = vec!["Bis.Element".into()];
        }
        let out = group(vec![door], &LocalizedStrings::default());

        let base = as_group(&out[0]);
        assert_eq!(base.label, "Element");
        let class = as_group(&base.children[0]);
        assert_eq!(class.label, "Door");
        assert_eq!(class.parent_keys.len(), 2);
        assert_eq!(grouping_nodes(&out).len(), 2);
        let found = find_grouping_node(out.clone(), &[base.key.clone(), class.key.clone()]);
        assert_eq!(found.map(|g| g.children.len()), Some(1));
    }

    #[test]
    fn test_grouping_nodes_auto_expand_towards_filter_target() {
        let mut node = instance("Bis.Door", "1", "a", by_class());
        if let ProcessedHierarchyNode::NonGrouping(n) = &mut node {
            n.filtering = Some(NodeFilteringInfo {
                is_filter_target: true,
                target_reveals: vec![TargetReveal {
                    mode: RevealMode::Full,
                    depth: 0,
                }],
                ..Default::default()
            });
        }
        let out = group(
            vec![node, instance("Bis.Wall", "2", "b", by_class())],
            &LocalizedStrings::default(),
        );
        assert!(as_group(&out[0]).auto_expand);
        assert!(!as_group(&out[1]).auto_expand);
    }

    proptest! {
        #[test]
        fn prop_grouping_is_idempotent(sizes in proptest::collection::vec(proptest::option::of(0i64..12), 5)) {
            let make = || -> Vec<ProcessedHierarchyNode> {
                sizes
                    .iter()
                    .enumerate()
                    .map(|(i, size)| {
                        instance(
                            "Bis.Element",
                            &i.to_string(),
                            &format!("n{}", i),
                            by_size(size.map(PrimitiveValue::Integer), ranges()),
                        )
                    })
                    .collect()
            };
            let first = group(make(), &LocalizedStrings::default());
            let second = group(make(), &LocalizedStrings::default());

            let keys = |nodes: &[ProcessedHierarchyNode]| -> Vec<(HierarchyNodeKey, Vec<InstanceKey>)> {
                nodes.iter().map(|n| (n.key(), n.instance_keys())).collect()
            };
            prop_assert_eq!(keys(&first), keys(&second));
            let total: usize = first.iter().map(|n| n.instance_keys().len()).sum();
            prop_assert_eq!(total, 5);
        }
    }
}
