use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use relink_graphs::module_path::last_segment;

use crate::types::{
    FetchRow, LookupQuery, NodeLabel, NodeRecord, NodeRef, PendingCall, ProjectRecord, Properties,
    RelType, Relationship, StoreStats,
};

use super::GraphBackend;

type RelKey = (NodeRef, RelType, NodeRef);

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeRef, Properties>,
    /// Last segment → nodes, mirrors the `name` index of the `SQLite` schema.
    by_last_segment: BTreeMap<String, BTreeSet<NodeRef>>,
    relationships: BTreeMap<RelKey, Properties>,
    buffered_nodes: Vec<(NodeRef, Properties)>,
    buffered_relationships: Vec<(RelKey, Properties)>,
    pending: Vec<PendingCall>,
    projects: BTreeMap<String, ProjectRecord>,
    fetch_log: Vec<LookupQuery>,
}

impl MemoryState {
    fn apply_buffers(&mut self) {
        for (node, properties) in std::mem::take(&mut self.buffered_nodes) {
            self.by_last_segment
                .entry(last_segment(&node.qualified_name).to_string())
                .or_default()
                .insert(node.clone());
            merge_properties(self.nodes.entry(node).or_default(), properties);
        }
        for (key, properties) in std::mem::take(&mut self.buffered_relationships) {
            if !self.nodes.contains_key(&key.0) || !self.nodes.contains_key(&key.2) {
                continue;
            }
            merge_properties(self.relationships.entry(key).or_default(), properties);
        }
    }

    fn lookup(&self, query: &LookupQuery) -> Vec<FetchRow> {
        let mut hits: BTreeMap<String, BTreeSet<NodeLabel>> = BTreeMap::new();
        match query {
            LookupQuery::Exact {
                qualified_names,
                allowed_labels,
            } => {
                for name in qualified_names {
                    for label in allowed_labels {
                        let key = NodeRef::new(*label, name.clone());
                        if self.nodes.contains_key(&key) {
                            hits.entry(name.clone()).or_default().insert(*label);
                        }
                    }
                }
            }
            LookupQuery::Suffix {
                suffixes,
                allowed_labels,
            } => {
                for suffix in suffixes {
                    let Some(nodes) = self.by_last_segment.get(last_segment(suffix)) else {
                        continue;
                    };
                    for node in nodes {
                        if allowed_labels.contains(&node.label)
                            && node.qualified_name.ends_with(suffix.as_str())
                        {
                            hits.entry(node.qualified_name.clone())
                                .or_default()
                                .insert(node.label);
                        }
                    }
                }
            }
        }
        hits.into_iter()
            .map(|(qualified_name, labels)| FetchRow {
                qualified_name,
                labels: labels.into_iter().collect(),
            })
            .collect()
    }
}

fn merge_properties(target: &mut Properties, properties: Properties) {
    for (key, value) in properties {
        target.insert(key, value);
    }
}

/// In-process backend. Buffers writes like the `SQLite` backend and records
/// every fetch so tests can assert on query batching.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query passed to [`GraphBackend::fetch`], oldest first.
    pub fn fetch_log(&self) -> Vec<LookupQuery> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        state.fetch_log.clone()
    }

    pub fn clear_fetch_log(&self) {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state.fetch_log.clear();
    }

    /// Flushed properties of one node.
    pub fn node_properties(&self, label: NodeLabel, qualified_name: &str) -> Option<Properties> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        state
            .nodes
            .get(&NodeRef::new(label, qualified_name))
            .cloned()
    }
}

#[async_trait::async_trait]
impl GraphBackend for MemoryBackend {
    async fn ensure_node(
        &self,
        label: NodeLabel,
        qualified_name: &str,
        properties: Properties,
    ) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state
            .buffered_nodes
            .push((NodeRef::new(label, qualified_name), properties));
        Ok(())
    }

    async fn ensure_relationship(
        &self,
        from: &NodeRef,
        rel_type: RelType,
        to: &NodeRef,
        properties: Properties,
    ) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state
            .buffered_relationships
            .push(((from.clone(), rel_type, to.clone()), properties));
        Ok(())
    }

    async fn flush(&self) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state.apply_buffers();
        Ok(())
    }

    async fn fetch(&self, query: &LookupQuery) -> crate::error::Result<Vec<FetchRow>> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state.fetch_log.push(query.clone());
        Ok(state.lookup(query))
    }

    async fn relationships(&self, rel_type: RelType) -> crate::error::Result<Vec<Relationship>> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        Ok(state
            .relationships
            .iter()
            .filter(|((_, rel, _), _)| *rel == rel_type)
            .map(|((from, rel, to), properties)| Relationship {
                from: from.clone(),
                rel_type: *rel,
                to: to.clone(),
                properties: properties.clone(),
            })
            .collect())
    }

    async fn nodes(&self, label: NodeLabel) -> crate::error::Result<Vec<NodeRecord>> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        Ok(state
            .nodes
            .iter()
            .filter(|(node, _)| node.label == label)
            .map(|(node, properties)| NodeRecord {
                label: node.label,
                qualified_name: node.qualified_name.clone(),
                properties: properties.clone(),
            })
            .collect())
    }

    async fn record_pending(&self, call: &PendingCall) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        if !state.pending.contains(call) {
            state.pending.push(call.clone());
        }
        Ok(())
    }

    async fn get_pending(&self) -> crate::error::Result<Vec<PendingCall>> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        Ok(state.pending.clone())
    }

    async fn replace_pending(&self, calls: &[PendingCall]) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        let mut replacement: Vec<PendingCall> = Vec::with_capacity(calls.len());
        for call in calls {
            if !replacement.contains(call) {
                replacement.push(call.clone());
            }
        }
        state.pending = replacement;
        Ok(())
    }

    async fn record_project(&self, record: &ProjectRecord) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("relink memory backend mutex poisoned");
        state.projects.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn projects(&self) -> crate::error::Result<Vec<ProjectRecord>> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        Ok(state.projects.values().cloned().collect())
    }

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let state = self.state.lock().expect("relink memory backend mutex poisoned");
        let mut stats = StoreStats::default();
        for node in state.nodes.keys() {
            *stats
                .nodes_by_label
                .entry(node.label.as_str().to_string())
                .or_default() += 1;
        }
        for (_, rel, _) in state.relationships.keys() {
            *stats
                .relationships_by_type
                .entry(rel.as_str().to_string())
                .or_default() += 1;
        }
        stats.pending_calls = state.pending.len() as u64;
        stats.unparsed_pending = state
            .pending
            .iter()
            .filter(|c| !c.caller_was_parsed)
            .count() as u64;
        stats.projects = state.projects.len() as u64;
        Ok(stats)
    }
}
