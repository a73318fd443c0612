//! Provider merge
//!
//! [`MergedHierarchyProvider`] presents several providers as one. Root
//! levels are concatenated in provider order; child levels are routed back
//! to the provider that produced the parent node.
//!
//! Every node coming out of a constituent gets its untagged keys stamped
//! with a tag naming that constituent, so routing never depends on which
//! provider happened to emit an equal key last. Tags are stripped again
//! before a parent is handed back to its constituent.

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use hierarchy_core::errors::{HierarchyError, Result};
use hierarchy_core::features::formatting::ValueFormatter;
use hierarchy_core::shared::models::{FilteringPath, HierarchyNode, HierarchyNodeKey, InstanceKey};

use crate::provider::{
    GetNodeInstanceKeysProps, GetNodesProps, HierarchyChangedEvent, HierarchyProvider,
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

struct MergedInner {
    providers: Vec<Arc<dyn HierarchyProvider>>,
    /// Unique per merge so nested merges don't read each other's tags
    tag_prefix: String,
    events: broadcast::Sender<HierarchyChangedEvent>,
}

impl MergedInner {
    fn tag(&self, owner: usize) -> String {
        format!("{}{}", self.tag_prefix, owner)
    }

    fn owner_of_tag(&self, source: &str) -> Option<usize> {
        source
            .strip_prefix(&self.tag_prefix)?
            .parse()
            .ok()
            .filter(|owner| *owner < self.providers.len())
    }

    fn owner_of(&self, node: &HierarchyNode) -> Result<usize> {
        let grouped = node
            .grouping
            .iter()
            .flat_map(|info| info.grouped_instance_keys.iter().filter_map(|k| k.source.as_deref()));
        let tagged = std::iter::once(&node.key)
            .chain(&node.parent_keys)
            .flat_map(key_sources)
            .chain(grouped)
            .find_map(|source| self.owner_of_tag(source));
        if let Some(owner) = tagged {
            return Ok(owner);
        }

        // not produced through this merge; ask the constituents
        let claims: Vec<usize> = self
            .providers
            .iter()
            .enumerate()
            .filter(|(_, provider)| provider.owns_node(node))
            .map(|(index, _)| index)
            .collect();
        match claims.as_slice() {
            [owner] => Ok(*owner),
            [] => Err(unknown_parent(node)),
            _ => Err(HierarchyError::AmbiguousParent(node.key.to_string())),
        }
    }

    fn stamp(&self, owner: usize, node: &mut HierarchyNode) {
        let tag = self.tag(owner);
        for_each_source(node, &mut |source| {
            if source.is_none() {
                *source = Some(tag.clone());
            }
        });
    }

    fn strip(&self, owner: usize, node: &mut HierarchyNode) {
        let tag = self.tag(owner);
        for_each_source(node, &mut |source| {
            if source.as_deref() == Some(tag.as_str()) {
                *source = None;
            }
        });
    }
}

fn key_sources(key: &HierarchyNodeKey) -> Vec<&str> {
    match key {
        HierarchyNodeKey::Generic(key) => key.source.as_deref().into_iter().collect(),
        HierarchyNodeKey::Instances(keys) => keys.iter().filter_map(|k| k.source.as_deref()).collect(),
        HierarchyNodeKey::Grouping(_) => Vec::new(),
    }
}

fn for_each_key_source(key: &mut HierarchyNodeKey, visit: &mut impl FnMut(&mut Option<String>)) {
    match key {
        HierarchyNodeKey::Generic(key) => visit(&mut key.source),
        HierarchyNodeKey::Instances(keys) => keys.iter_mut().for_each(|k| visit(&mut k.source)),
        HierarchyNodeKey::Grouping(_) => {}
    }
}

/// Visit the source tag of every key a node carries, ancestors included
fn for_each_source(node: &mut HierarchyNode, visit: &mut impl FnMut(&mut Option<String>)) {
    for_each_key_source(&mut node.key, visit);
    for key in &mut node.parent_keys {
        for_each_key_source(key, visit);
    }
    if let Some(info) = node.grouping.as_mut() {
        for key in &mut info.grouped_instance_keys {
            visit(&mut key.source);
        }
        if let Some(ancestor) = info.non_grouping_ancestor.as_mut() {
            for_each_source(ancestor, visit);
        }
    }
}

pub struct MergedHierarchyProvider {
    inner: Arc<MergedInner>,
}

impl MergedHierarchyProvider {
    pub fn new(providers: Vec<Arc<dyn HierarchyProvider>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(MergedInner {
            providers,
            tag_prefix: format!("merged-{}#", Uuid::new_v4().simple()),
            events,
        });
        Self::forward_events(&inner);
        debug!(providers = inner.providers.len(), "merged hierarchy provider created");
        Self { inner }
    }

    pub fn providers(&self) -> &[Arc<dyn HierarchyProvider>] {
        &self.inner.providers
    }

    /// Re-publish every constituent's change events. Missed events are
    /// reported as a data source change, which invalidates everything.
    fn forward_events(inner: &Arc<MergedInner>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, constituent change events are not forwarded");
            return;
        };
        for provider in &inner.providers {
            let mut events = provider.subscribe_hierarchy_changed();
            let weak = Arc::downgrade(inner);
            runtime.spawn(async move {
                loop {
                    let event = match events.recv().await {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "constituent change events lagged");
                            HierarchyChangedEvent::DataSourceChanged
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    let _ = inner.events.send(event);
                }
                debug!("constituent change forwarder stopped");
            });
        }
    }

    fn root_nodes(&self, props: GetNodesProps) -> BoxStream<'static, Result<HierarchyNode>> {
        let inner = Arc::clone(&self.inner);
        let levels = self
            .inner
            .providers
            .iter()
            .map(|provider| provider.get_nodes(props.clone()).try_collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let concurrency = levels.len().max(1);

        stream::iter(levels)
            .buffered(concurrency)
            .enumerate()
            .map(move |(owner, level)| {
                let mut nodes = level?;
                for node in &mut nodes {
                    inner.stamp(owner, node);
                }
                trace!(provider = owner, nodes = nodes.len(), "root level merged");
                Ok::<_, HierarchyError>(stream::iter(nodes.into_iter().map(Ok)))
            })
            .try_flatten()
            .boxed()
    }
}

/// Error for a parent node no constituent provider produced
pub fn unknown_parent(parent: &HierarchyNode) -> HierarchyError {
    HierarchyError::UnknownParent(parent.key.to_string())
}

fn failed<T: Send + 'static>(error: HierarchyError) -> BoxStream<'static, Result<T>> {
    stream::once(futures::future::ready(Err(error))).boxed()
}

impl HierarchyProvider for MergedHierarchyProvider {
    fn get_nodes(&self, mut props: GetNodesProps) -> BoxStream<'static, Result<HierarchyNode>> {
        let Some(parent) = props.parent_node.as_mut() else {
            return self.root_nodes(props);
        };
        let owner = match self.inner.owner_of(parent) {
            Ok(owner) => owner,
            Err(error) => {
                warn!(parent = %parent.key, %error, "cannot route child level");
                return failed(error);
            }
        };
        trace!(parent = %parent.key, provider = owner, "routing child level");
        self.inner.strip(owner, parent);

        let inner = Arc::clone(&self.inner);
        self.inner.providers[owner]
            .get_nodes(props)
            .map_ok(move |mut node| {
                inner.stamp(owner, &mut node);
                node
            })
            .boxed()
    }

    fn get_node_instance_keys(
        &self,
        mut props: GetNodeInstanceKeysProps,
    ) -> BoxStream<'static, Result<InstanceKey>> {
        let Some(parent) = props.parent_node.as_mut() else {
            let streams = self
                .inner
                .providers
                .iter()
                .map(|provider| provider.get_node_instance_keys(props.clone()))
                .collect::<Vec<_>>();
            return stream::iter(streams).flatten().boxed();
        };
        match self.inner.owner_of(parent) {
            Ok(owner) => {
                self.inner.strip(owner, parent);
                self.inner.providers[owner].get_node_instance_keys(props)
            }
            Err(error) => failed(error),
        }
    }

    fn set_formatter(&self, formatter: Option<Arc<dyn ValueFormatter>>) {
        for provider in &self.inner.providers {
            provider.set_formatter(formatter.clone());
        }
    }

    fn set_hierarchy_filter(&self, paths: Option<Vec<FilteringPath>>) {
        for provider in &self.inner.providers {
            provider.set_hierarchy_filter(paths.clone());
        }
    }

    fn notify_data_source_changed(&self) {
        for provider in &self.inner.providers {
            provider.notify_data_source_changed();
        }
    }

    fn owns_node(&self, node: &HierarchyNode) -> bool {
        self.inner.owner_of(node).is_ok()
    }

    fn subscribe_hierarchy_changed(&self) -> broadcast::Receiver<HierarchyChangedEvent> {
        self.inner.events.subscribe()
    }
}
