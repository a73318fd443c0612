//! Hierarchy filtering and merged providers

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::*;
use hierarchy_core::config::HierarchyProviderConfig;
use hierarchy_core::features::definition::{HierarchyDefinitionRef, HierarchyLevelDefinition};
use hierarchy_core::features::query::QueryExecutor;
use hierarchy_core::shared::models::{FilteringPath, NodeIdentifier, RevealMode, SourceNode};
use hierarchy_orchestration::{
    GetNodesProps, HierarchyOrchestrator, HierarchyProvider, HierarchyProviderProps,
    MergedHierarchyProvider,
};

fn props(
    executor: &Arc<InMemoryExecutor>,
    definition: &Arc<TableDefinition>,
) -> HierarchyProviderProps {
    HierarchyProviderProps::new(
        Arc::clone(executor) as Arc<dyn QueryExecutor>,
        Arc::clone(definition) as HierarchyDefinitionRef,
    )
}

/// A → { B, C, doors 1..3 }, X
fn tree() -> (Arc<InMemoryExecutor>, Arc<TableDefinition>) {
    let executor = InMemoryExecutor::new();
    executor.set(
        "doors",
        vec![
            row("Bis.Door", "1", "Door 1").has_children(false).build(),
            row("Bis.Door", "2", "Door 2").has_children(false).build(),
            row("Bis.Door", "3", "Door 3").has_children(false).build(),
        ],
    );
    let definition = TableDefinition::new();
    definition
        .level("root", vec![generic("A", "A"), generic("X", "X")])
        .level(
            "generic:A",
            vec![generic("B", "B"), generic("C", "C"), instances("Bis.Door", "doors")],
        );
    (executor, definition)
}

fn generic_path(ids: &[&str]) -> FilteringPath {
    FilteringPath::new(ids.iter().map(|id| NodeIdentifier::generic(*id)).collect())
        .with_reveal(RevealMode::Full)
}

#[tokio::test]
async fn test_two_paths_through_a_common_parent() {
    init_tracing();
    let (executor, definition) = tree();
    let provider = HierarchyOrchestrator::new(
        props(&executor, &definition)
            .with_filter(vec![generic_path(&["A", "B"]), generic_path(&["A", "C"])]),
    )
    .unwrap();

    let root = root(&provider).await;
    assert_eq!(labels(&root), vec!["A"]);
    assert!(root[0].auto_expand);
    assert!(!root[0].is_filter_target());

    let children = children(&provider, &root[0]).await;
    assert_eq!(labels(&children), vec!["B", "C"]);
    assert!(children.iter().all(|n| n.is_filter_target() && !n.auto_expand));
    assert_eq!(executor.executions("doors"), 0);
}

#[tokio::test]
async fn test_instance_paths_restrict_queries() {
    let (executor, definition) = tree();
    let provider = HierarchyOrchestrator::new(props(&executor, &definition)).unwrap();
    assert_eq!(labels(&root(&provider).await), vec!["A", "X"]);

    provider.set_hierarchy_filter(Some(vec![FilteringPath::new(vec![
        NodeIdentifier::generic("A"),
        NodeIdentifier::instance("Bis.Door", "2"),
    ])]));
    let root = root(&provider).await;
    assert_eq!(labels(&root), vec!["A"]);

    let children = children(&provider, &root[0]).await;
    assert_eq!(labels(&children), vec!["Door 2"]);
    assert!(children[0].is_filter_target());

    provider.set_hierarchy_filter(None);
    let unfiltered = nodes(&provider, GetNodesProps::root()).await;
    assert_eq!(labels(&unfiltered), vec!["A", "X"]);
}

#[tokio::test]
async fn test_hidden_target_passes_target_status_down() {
    let executor = InMemoryExecutor::new();
    executor.set("doors", vec![row("Bis.Door", "1", "Door").has_children(false).build()]);
    let definition = TableDefinition::new();
    definition
        .level(
            "root",
            vec![
                HierarchyLevelDefinition::generic(SourceNode::generic("H", "Hidden").hidden()),
                generic("X", "X"),
            ],
        )
        .level("generic:H", vec![instances("Bis.Door", "doors")]);
    let provider = HierarchyOrchestrator::new(
        props(&executor, &definition).with_filter(vec![generic_path(&["H"])]),
    )
    .unwrap();

    let root = root(&provider).await;
    assert_eq!(labels(&root), vec!["Door"]);
    assert!(root[0].is_filter_target());
}

fn sourced(
    name: &str,
    definition: &Arc<TableDefinition>,
    executor: &Arc<InMemoryExecutor>,
) -> HierarchyOrchestrator {
    HierarchyOrchestrator::new(
        props(executor, definition)
            .with_config(HierarchyProviderConfig::default().with_source_key(name)),
    )
    .unwrap()
}

/// Two data sources with the same root generic node "shared"; its children
/// are a door in the first source and a window in the second
fn shared_roots() -> [(Arc<InMemoryExecutor>, Arc<TableDefinition>); 2] {
    [("Bis.Door", "Door"), ("Bis.Window", "Window")].map(|(class_name, label)| {
        let executor = InMemoryExecutor::new();
        executor.set("doors", vec![row(class_name, "1", label).has_children(false).build()]);
        let definition = TableDefinition::new();
        definition
            .level("root", vec![generic("shared", "Shared")])
            .level("generic:shared", vec![instances(class_name, "doors")]);
        (executor, definition)
    })
}

async fn assert_children_routed_to_owner(
    merged: &MergedHierarchyProvider,
    first_executor: &InMemoryExecutor,
    second_executor: &InMemoryExecutor,
) {
    let root = nodes(merged, GetNodesProps::root()).await;
    assert_eq!(labels(&root), vec!["Shared", "Shared"]);
    assert_ne!(root[0].key, root[1].key, "keys carry their source");

    // root-level children checks already ran once per provider
    let first_before = first_executor.executions("doors");
    let from_second = nodes(merged, GetNodesProps::children_of(root[1].clone())).await;
    assert_eq!(labels(&from_second), vec!["Window"]);
    assert_eq!(first_executor.executions("doors"), first_before);

    let second_before = second_executor.executions("doors");
    let from_first = nodes(merged, GetNodesProps::children_of(root[0].clone())).await;
    assert_eq!(labels(&from_first), vec!["Door"]);
    assert_eq!(second_executor.executions("doors"), second_before);
}

#[tokio::test]
async fn test_merged_children_are_routed_to_the_owner() {
    init_tracing();
    let [(first_executor, first_definition), (second_executor, second_definition)] = shared_roots();
    let merged = MergedHierarchyProvider::new(vec![
        Arc::new(sourced("first", &first_definition, &first_executor)) as Arc<dyn HierarchyProvider>,
        Arc::new(sourced("second", &second_definition, &second_executor)),
    ]);
    assert_children_routed_to_owner(&merged, &first_executor, &second_executor).await;
}

#[tokio::test]
async fn test_merged_providers_without_source_keys_keep_owners_apart() {
    let [(first_executor, first_definition), (second_executor, second_definition)] = shared_roots();
    let merged = MergedHierarchyProvider::new(vec![
        Arc::new(HierarchyOrchestrator::new(props(&first_executor, &first_definition)).unwrap())
            as Arc<dyn HierarchyProvider>,
        Arc::new(HierarchyOrchestrator::new(props(&second_executor, &second_definition)).unwrap()),
    ]);
    assert_children_routed_to_owner(&merged, &first_executor, &second_executor).await;

    // asking again in the other order still reaches each owner
    let root = nodes(&merged, GetNodesProps::root()).await;
    let from_first = nodes(&merged, GetNodesProps::children_of(root[0].clone())).await;
    assert_eq!(labels(&from_first), vec!["Door"]);
}

#[tokio::test]
async fn test_merged_filter_reaches_every_provider() {
    let (first_executor, first_definition) = tree();
    let (second_executor, second_definition) = tree();
    let merged = MergedHierarchyProvider::new(vec![
        Arc::new(sourced("first", &first_definition, &first_executor)) as Arc<dyn HierarchyProvider>,
        Arc::new(sourced("second", &second_definition, &second_executor)),
    ]);
    assert_eq!(nodes(&merged, GetNodesProps::root()).await.len(), 4);

    merged.set_hierarchy_filter(Some(vec![generic_path(&["X"])]));
    let root = nodes(&merged, GetNodesProps::root()).await;
    assert_eq!(labels(&root), vec!["X", "X"]);
    assert!(root.iter().all(|n| n.is_filter_target()));
}
