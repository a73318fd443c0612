//! Shared fixtures: an in-memory executor, a table-driven hierarchy
//! definition and row builders
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hierarchy_core::errors::{HierarchyError, Result};
use hierarchy_core::features::definition::{
    DefineHierarchyLevelProps, HierarchyDefinition, HierarchyLevelDefinition,
};
use hierarchy_core::features::query::{
    HierarchyQuery, NodeSelectColumn, QueryBinding, QueryExecutor, QueryReaderOptions, Row,
    RowStream,
};
use hierarchy_core::shared::models::{HierarchyNode, SourceNode};
use hierarchy_orchestration::{HierarchyOrchestrator, HierarchyProvider, GetNodesProps};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const RESTRICTED_PREFIX: &str = "SELECT * FROM (";
const RESTRICTED_SUFFIX: &str = ") WHERE InVirtualSet(?, ECInstanceId)";

/// Answers queries by their text; understands the id-set restriction
/// wrapper added by hierarchy filtering
#[derive(Default)]
pub struct InMemoryExecutor {
    results: Arc<Mutex<HashMap<String, Result<Vec<Row>>>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl InMemoryExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, query: &str, rows: Vec<Row>) {
        self.results.lock().insert(query.to_string(), Ok(rows));
    }

    pub fn fail(&self, query: &str, error: HierarchyError) {
        self.results.lock().insert(query.to_string(), Err(error));
    }

    pub fn executions(&self, query: &str) -> usize {
        self.executed.lock().iter().filter(|q| *q == query).count()
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get_by_name(NodeSelectColumn::ECInstanceId.name()) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}

impl QueryExecutor for InMemoryExecutor {
    fn create_query_reader(&self, query: &HierarchyQuery, _: QueryReaderOptions) -> RowStream {
        let (text, restriction) = match query
            .text
            .strip_prefix(RESTRICTED_PREFIX)
            .and_then(|t| t.strip_suffix(RESTRICTED_SUFFIX))
        {
            Some(inner) => {
                let ids = match query.bindings.last() {
                    Some(QueryBinding::IdSet(ids)) => Some(ids.clone()),
                    _ => None,
                };
                (inner.to_string(), ids)
            }
            None => (query.text.clone(), None),
        };
        let results = Arc::clone(&self.results);
        let executed = Arc::clone(&self.executed);

        stream::once(async move {
            executed.lock().push(text.clone());
            let rows = results
                .lock()
                .get(&text)
                .cloned()
                .unwrap_or_else(|| Err(HierarchyError::execution(format!("unknown query {}", text))))?;
            let rows = rows.into_iter().filter(move |row| match &restriction {
                Some(ids) => row_id(row).is_some_and(|id| ids.contains(&id)),
                None => true,
            });
            Ok::<_, HierarchyError>(stream::iter(rows.map(Ok)))
        })
        .try_flatten()
        .boxed()
    }
}

/// Row with well-known named columns
pub struct RowBuilder {
    values: Map<String, Value>,
}

pub fn row(class_name: &str, id: &str, label: &str) -> RowBuilder {
    let mut values = Map::new();
    values.insert("FullClassName".into(), Value::from(class_name));
    values.insert("ECInstanceId".into(), Value::from(id));
    values.insert("DisplayLabel".into(), Value::from(label));
    RowBuilder { values }
}

impl RowBuilder {
    pub fn has_children(mut self, children: bool) -> Self {
        self.values.insert("HasChildren".into(), Value::from(children));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.values.insert("HideNodeInHierarchy".into(), Value::from(true));
        self
    }

    pub fn grouping(mut self, grouping: Value) -> Self {
        self.values.insert("Grouping".into(), Value::from(grouping.to_string()));
        self
    }

    pub fn build(self) -> Row {
        let (columns, values): (Vec<String>, Vec<Value>) = self.values.into_iter().unzip();
        Row::new(columns.into(), values)
    }
}

/// Definition driven by a table of parent key (`"root"` for the root
/// level) to level definitions
#[derive(Default)]
pub struct TableDefinition {
    levels: Mutex<HashMap<String, Vec<HierarchyLevelDefinition>>>,
    calls: AtomicUsize,
}

impl TableDefinition {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn level(&self, parent: &str, definitions: Vec<HierarchyLevelDefinition>) -> &Self {
        self.levels.lock().insert(parent.to_string(), definitions);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HierarchyDefinition for TableDefinition {
    async fn define_hierarchy_level(
        &self,
        props: DefineHierarchyLevelProps,
    ) -> Result<Vec<HierarchyLevelDefinition>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let parent = props
            .parent_node
            .map(|p| p.key.to_string())
            .unwrap_or_else(|| "root".to_string());
        Ok(self.levels.lock().get(&parent).cloned().unwrap_or_default())
    }
}

pub fn generic(id: &str, label: &str) -> HierarchyLevelDefinition {
    HierarchyLevelDefinition::generic(SourceNode::generic(id, label))
}

pub fn instances(class_name: &str, query: &str) -> HierarchyLevelDefinition {
    HierarchyLevelDefinition::instances(class_name, HierarchyQuery::new(query))
}

pub async fn nodes(provider: &dyn HierarchyProvider, props: GetNodesProps) -> Vec<HierarchyNode> {
    provider
        .get_nodes(props)
        .try_collect()
        .await
        .expect("level should load")
}

pub async fn root(provider: &HierarchyOrchestrator) -> Vec<HierarchyNode> {
    nodes(provider, GetNodesProps::root()).await
}

pub async fn children(provider: &HierarchyOrchestrator, parent: &HierarchyNode) -> Vec<HierarchyNode> {
    nodes(provider, GetNodesProps::children_of(parent.clone())).await
}

pub fn labels(nodes: &[HierarchyNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.label.as_str()).collect()
}
