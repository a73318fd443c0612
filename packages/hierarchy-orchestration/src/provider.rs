//! Hierarchy provider
//!
//! [`HierarchyOrchestrator`] owns the only mutable state of the pipeline:
//! the active definition (possibly wrapped for filtering), the formatter and
//! the level cache. Setters swap that state atomically; every request
//! captures a [`PipelineContext`] snapshot when it is issued.

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hierarchy_core::config::HierarchyProviderConfig;
use hierarchy_core::errors::Result;
use hierarchy_core::features::cache::{LevelCache, LevelVariation};
use hierarchy_core::features::definition::{HierarchyDefinitionRef, InstanceFilter};
use hierarchy_core::features::filtering::FilteringHierarchyDefinition;
use hierarchy_core::features::formatting::{
    ClassHierarchyInspector, DefaultValueFormatter, ExactClassInspector, ValueFormatter,
};
use hierarchy_core::features::query::{LimitingQueryExecutor, QueryExecutor, QueryScheduler};
use hierarchy_core::shared::models::{FilteringPath, HierarchyNode, InstanceKey};

use crate::metrics::ProviderMetrics;
use crate::pipeline::{level_instance_keys, preprocessed_level, check_children, PipelineContext};
use crate::request::{LevelRequest, LevelRequestStateMachine, StageId};
use crate::stages;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Signal from the data source that its content changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSourceChanged;

/// Why previously returned nodes may be stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyChangedEvent {
    FormatterChanged,
    FilterChanged,
    DataSourceChanged,
}

#[derive(Debug, Clone, Default)]
pub struct GetNodesProps {
    /// `None` requests the root level
    pub parent_node: Option<HierarchyNode>,
    pub instance_filter: Option<InstanceFilter>,
    /// Fail the level with `RowsLimitExceeded` above this many rows
    pub hierarchy_level_size_limit: Option<usize>,
    /// Don't read from the level cache
    pub ignore_cache: bool,
}

impl GetNodesProps {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn children_of(parent: HierarchyNode) -> Self {
        Self {
            parent_node: Some(parent),
            ..Self::default()
        }
    }

    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.hierarchy_level_size_limit = Some(limit);
        self
    }

    pub fn with_instance_filter(mut self, filter: InstanceFilter) -> Self {
        self.instance_filter = Some(filter);
        self
    }

    pub fn ignoring_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    fn variation(&self) -> LevelVariation {
        LevelVariation {
            instance_filter: self.instance_filter.clone().map(|f| f.0),
            size_limit: self.hierarchy_level_size_limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetNodeInstanceKeysProps {
    pub parent_node: Option<HierarchyNode>,
    pub instance_filter: Option<InstanceFilter>,
    pub hierarchy_level_size_limit: Option<usize>,
}

/// Node retrieval contract shared by single and merged providers
pub trait HierarchyProvider: Send + Sync {
    /// Finalized, sorted children of a parent (or the root)
    fn get_nodes(&self, props: GetNodesProps) -> BoxStream<'static, Result<HierarchyNode>>;

    /// Instance keys represented by a level, descending through generic and
    /// hidden nodes
    fn get_node_instance_keys(
        &self,
        props: GetNodeInstanceKeysProps,
    ) -> BoxStream<'static, Result<InstanceKey>>;

    /// `None` restores the default formatter
    fn set_formatter(&self, formatter: Option<Arc<dyn ValueFormatter>>);

    /// `None` clears filtering
    fn set_hierarchy_filter(&self, paths: Option<Vec<FilteringPath>>);

    fn notify_data_source_changed(&self);

    /// Whether `node` was produced by this provider
    fn owns_node(&self, node: &HierarchyNode) -> bool;

    fn subscribe_hierarchy_changed(&self) -> broadcast::Receiver<HierarchyChangedEvent>;
}

pub struct HierarchyProviderProps {
    pub executor: Arc<dyn QueryExecutor>,
    pub definition: HierarchyDefinitionRef,
    pub formatter: Option<Arc<dyn ValueFormatter>>,
    pub class_hierarchy: Option<Arc<dyn ClassHierarchyInspector>>,
    pub config: HierarchyProviderConfig,
    pub filter: Option<Vec<FilteringPath>>,
    pub metrics: Option<Arc<ProviderMetrics>>,
    pub data_source_changed: Option<broadcast::Receiver<DataSourceChanged>>,
}

impl HierarchyProviderProps {
    pub fn new(executor: Arc<dyn QueryExecutor>, definition: HierarchyDefinitionRef) -> Self {
        Self {
            executor,
            definition,
            formatter: None,
            class_hierarchy: None,
            config: HierarchyProviderConfig::default(),
            filter: None,
            metrics: None,
            data_source_changed: None,
        }
    }

    pub fn with_config(mut self, config: HierarchyProviderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_class_hierarchy(mut self, inspector: Arc<dyn ClassHierarchyInspector>) -> Self {
        self.class_hierarchy = Some(inspector);
        self
    }

    pub fn with_filter(mut self, paths: Vec<FilteringPath>) -> Self {
        self.filter = Some(paths);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ProviderMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_data_source_changed(
        mut self,
        changes: broadcast::Receiver<DataSourceChanged>,
    ) -> Self {
        self.data_source_changed = Some(changes);
        self
    }
}

/// State swapped by the provider's setters
#[derive(Clone)]
struct ActiveState {
    definition: HierarchyDefinitionRef,
    formatter: Arc<dyn ValueFormatter>,
    cache: Arc<LevelCache>,
}

struct ProviderInner {
    source_definition: HierarchyDefinitionRef,
    active: RwLock<ActiveState>,
    scheduler: QueryScheduler,
    inspector: Arc<dyn ClassHierarchyInspector>,
    config: Arc<HierarchyProviderConfig>,
    metrics: Arc<ProviderMetrics>,
    events: broadcast::Sender<HierarchyChangedEvent>,
}

impl ProviderInner {
    fn context(&self, ignore_cache: bool) -> PipelineContext {
        let active = self.active.read().clone();
        PipelineContext {
            request_id: Uuid::new_v4(),
            definition: active.definition,
            formatter: active.formatter,
            inspector: Arc::clone(&self.inspector),
            scheduler: self.scheduler.clone(),
            cache: active.cache,
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
            ignore_cache,
        }
    }

    fn fresh_cache(&self) -> Arc<LevelCache> {
        Arc::new(LevelCache::new(self.config.cache_size))
    }

    fn filtered_definition(&self, paths: Option<Vec<FilteringPath>>) -> HierarchyDefinitionRef {
        match paths {
            Some(paths) => Arc::new(FilteringHierarchyDefinition::new(
                Arc::clone(&self.source_definition),
                paths,
            )) as HierarchyDefinitionRef,
            None => Arc::clone(&self.source_definition),
        }
    }

    /// Replace the cache; requests in flight keep writing to the old one
    fn invalidate(&self, event: HierarchyChangedEvent) {
        self.replace(event, |_| {});
    }

    /// Apply `update` and swap in a fresh cache under one write lock, so no
    /// snapshot pairs the new state with levels cached for the old one
    fn replace(&self, event: HierarchyChangedEvent, update: impl FnOnce(&mut ActiveState)) {
        let cache = self.fresh_cache();
        {
            let mut active = self.active.write();
            update(&mut active);
            active.cache = cache;
        }
        info!(event = ?event, "hierarchy level cache invalidated");
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn listen_for_changes(
        inner: Weak<ProviderInner>,
        mut changes: broadcast::Receiver<DataSourceChanged>,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, data source change notifications are ignored");
            return;
        };
        runtime.spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(DataSourceChanged) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        inner.invalidate(HierarchyChangedEvent::DataSourceChanged);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("data source change listener stopped");
        });
    }
}

/// Provider over one data source
#[derive(Clone)]
pub struct HierarchyOrchestrator {
    inner: Arc<ProviderInner>,
}

impl HierarchyOrchestrator {
    pub fn new(props: HierarchyProviderProps) -> Result<Self> {
        props.config.validate()?;
        let config = Arc::new(props.config);

        let executor: Arc<dyn QueryExecutor> = Arc::new(LimitingQueryExecutor::new(props.executor));
        let scheduler = QueryScheduler::new(executor, config.query_concurrency);
        let formatter = props
            .formatter
            .unwrap_or_else(|| Arc::new(DefaultValueFormatter) as Arc<dyn ValueFormatter>);
        let inspector = props
            .class_hierarchy
            .unwrap_or_else(|| Arc::new(ExactClassInspector) as Arc<dyn ClassHierarchyInspector>);

        let definition = match &props.filter {
            Some(paths) => Arc::new(FilteringHierarchyDefinition::new(
                Arc::clone(&props.definition),
                paths.clone(),
            )) as HierarchyDefinitionRef,
            None => Arc::clone(&props.definition),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = Arc::new(ProviderInner {
            source_definition: props.definition,
            active: RwLock::new(ActiveState {
                definition,
                formatter,
                cache: Arc::new(LevelCache::new(config.cache_size)),
            }),
            scheduler,
            inspector,
            config: Arc::clone(&config),
            metrics: props.metrics.unwrap_or_default(),
            events,
        });
        if let Some(changes) = props.data_source_changed {
            ProviderInner::listen_for_changes(Arc::downgrade(&inner), changes);
        }

        info!(
            query_concurrency = config.query_concurrency,
            cache_size = config.cache_size,
            source = ?config.source_key,
            "hierarchy provider created"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &HierarchyProviderConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Arc<ProviderMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Number of cached levels in the active cache
    pub fn cached_levels(&self) -> usize {
        self.inner.active.read().cache.len()
    }

    /// Whether any children exist below `parent`, without finalizing them
    pub async fn has_children(&self, parent: HierarchyNode) -> Result<bool> {
        check_children(&self.inner.context(false), parent).await
    }
}

async fn load_level(
    ctx: PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> Result<Vec<HierarchyNode>> {
    let mut request = LevelRequestStateMachine::new(LevelRequest::new_queued(
        ctx.request_id,
        parent.as_ref().map(|p| p.key.to_string()),
    ));
    request.start(StageId::Source)?;
    debug!(request = %ctx.request_id, parent = ?request.request().parent, "loading hierarchy level");

    match run_stages(&ctx, parent, variation, &mut request).await {
        Ok(nodes) => {
            request.complete(nodes.len())?;
            debug!(request = %ctx.request_id, nodes = nodes.len(), "hierarchy level loaded");
            Ok(nodes)
        }
        Err(e) => {
            let stage = request.current_stage();
            request.fail(&e)?;
            warn!(
                request = %ctx.request_id,
                stage = ?stage,
                category = %e.category(),
                error = %e,
                "hierarchy level failed"
            );
            Err(e)
        }
    }
}

async fn run_stages(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
    request: &mut LevelRequestStateMachine,
) -> Result<Vec<HierarchyNode>> {
    let nodes = preprocessed_level(ctx, parent.clone(), variation.clone())
        .subscribe()
        .try_collect::<Vec<_>>()
        .await?;

    request.update_stage(StageId::Grouping)?;
    let nodes = match &parent {
        Some(parent) if parent.is_grouping_node() => nodes,
        parent => stages::group(ctx, nodes, parent.as_ref(), &variation),
    };

    request.update_stage(StageId::Finalize)?;
    stages::finalize(ctx, nodes).await
}

impl HierarchyProvider for HierarchyOrchestrator {
    fn get_nodes(&self, props: GetNodesProps) -> BoxStream<'static, Result<HierarchyNode>> {
        self.inner.metrics.record_level_request();
        let ctx = self.inner.context(props.ignore_cache);
        let variation = props.variation();
        stream::once(load_level(ctx, props.parent_node, variation))
            .map_ok(|nodes| stream::iter(nodes.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    fn get_node_instance_keys(
        &self,
        props: GetNodeInstanceKeysProps,
    ) -> BoxStream<'static, Result<InstanceKey>> {
        let ctx = self.inner.context(false);
        let variation = LevelVariation {
            instance_filter: props.instance_filter.map(|f| f.0),
            size_limit: props.hierarchy_level_size_limit,
        };
        level_instance_keys(&ctx, props.parent_node, variation)
    }

    fn set_formatter(&self, formatter: Option<Arc<dyn ValueFormatter>>) {
        let formatter =
            formatter.unwrap_or_else(|| Arc::new(DefaultValueFormatter) as Arc<dyn ValueFormatter>);
        self.inner
            .replace(HierarchyChangedEvent::FormatterChanged, |active| {
                active.formatter = formatter;
            });
    }

    fn set_hierarchy_filter(&self, paths: Option<Vec<FilteringPath>>) {
        let paths_count = paths.as_ref().map(|p| p.len());
        let definition = self.inner.filtered_definition(paths);
        debug!(paths = ?paths_count, "replacing hierarchy filter");
        self.inner
            .replace(HierarchyChangedEvent::FilterChanged, |active| {
                active.definition = definition;
            });
    }

    fn notify_data_source_changed(&self) {
        self.inner.invalidate(HierarchyChangedEvent::DataSourceChanged);
    }

    fn owns_node(&self, node: &HierarchyNode) -> bool {
        let sources: Vec<Option<&str>> = match &node.grouping {
            Some(info) => info
                .grouped_instance_keys
                .iter()
                .map(|k| k.source.as_deref())
                .chain(info.non_grouping_ancestor.iter().map(|a| a.key.source()))
                .collect(),
            None => vec![node.key.source()],
        };
        // without a source key only untagged nodes are ours
        match self.inner.config.source_key.as_deref() {
            Some(source) => sources.contains(&Some(source)),
            None => sources.iter().all(Option::is_none),
        }
    }

    fn subscribe_hierarchy_changed(&self) -> broadcast::Receiver<HierarchyChangedEvent> {
        self.inner.events.subscribe()
    }
}
