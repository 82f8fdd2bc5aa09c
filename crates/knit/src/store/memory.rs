//! In-memory graph store backed by petgraph.
//!
//! Nodes live in a `DiGraph<StoredNode, StoredEdge>` with a `HashMap` from
//! canonical id to `NodeIndex`. Nodes are never removed, so indices stay
//! valid. The whole graph sits behind `Arc<tokio::sync::Mutex<_>>`; every
//! upsert holds the lock for its full read-merge-write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tokio::sync::{Mutex, MutexGuard};

use super::{GraphSnapshot, GraphStats, GraphStore, StoredNode, merge_edge_properties};
use crate::directive::{NodeUpsert, RelationshipDirective, UpsertPlan};
use crate::error::Result;
use crate::identity::CanonicalId;
use crate::types::{Properties, RelationshipKind};

#[derive(Debug, Clone)]
struct StoredEdge {
    kind: RelationshipKind,
    properties: Properties,
}

#[derive(Debug, Default)]
struct Inner {
    graph: DiGraph<StoredNode, StoredEdge>,
    node_map: HashMap<CanonicalId, NodeIndex>,
}

impl Inner {
    fn ensure(&mut self, id: &CanonicalId) -> NodeIndex {
        if let Some(&ix) = self.node_map.get(id) {
            return ix;
        }
        let ix = self.graph.add_node(StoredNode::stub(id.clone()));
        self.node_map.insert(id.clone(), ix);
        ix
    }

    fn upsert_node(&mut self, node: &NodeUpsert) {
        let ix = self.ensure(&node.id);
        self.graph[ix].absorb(node);
    }

    fn upsert_relationship(&mut self, rel: &RelationshipDirective) {
        let source = self.ensure(&rel.source_id);
        let target = self.ensure(&rel.target_id);

        let existing = self
            .graph
            .edges_connecting(source, target)
            .find(|e| e.weight().kind == rel.kind)
            .map(|e| e.id());
        match existing {
            Some(edge) => merge_edge_properties(&mut self.graph[edge].properties, &rel.properties),
            None => {
                self.graph.add_edge(
                    source,
                    target,
                    StoredEdge {
                        kind: rel.kind,
                        properties: rel.properties.clone(),
                    },
                );
            }
        }
    }

    fn outgoing(&self, ix: NodeIndex) -> Vec<RelationshipDirective> {
        let mut out: Vec<RelationshipDirective> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .map(|e| {
                RelationshipDirective::new(
                    e.weight().kind,
                    self.graph[e.source()].id.clone(),
                    self.graph[e.target()].id.clone(),
                )
                .with_properties(e.weight().properties.clone())
            })
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }
}

/// Ephemeral graph store; clones share the same graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().await
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()> {
        self.lock().await.upsert_node(node);
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &RelationshipDirective) -> Result<()> {
        self.lock().await.upsert_relationship(relationship);
        Ok(())
    }

    async fn apply(&self, plan: &UpsertPlan) -> Result<()> {
        let mut inner = self.lock().await;
        for node in plan.nodes() {
            inner.upsert_node(node);
        }
        for relationship in plan.relationships() {
            inner.upsert_relationship(relationship);
        }
        Ok(())
    }

    async fn node(&self, id: &CanonicalId) -> Result<Option<StoredNode>> {
        let inner = self.lock().await;
        Ok(inner.node_map.get(id).map(|&ix| inner.graph[ix].clone()))
    }

    async fn relationships_from(&self, id: &CanonicalId) -> Result<Vec<RelationshipDirective>> {
        let inner = self.lock().await;
        Ok(inner
            .node_map
            .get(id)
            .map(|&ix| inner.outgoing(ix))
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let inner = self.lock().await;
        let mut stats = GraphStats {
            nodes: inner.graph.node_count(),
            stubs: inner.graph.node_weights().filter(|n| n.stub).count(),
            ..GraphStats::default()
        };
        for edge in inner.graph.edge_weights() {
            *stats
                .edges_by_type
                .entry(edge.kind.as_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }

    async fn snapshot(&self) -> Result<GraphSnapshot> {
        let inner = self.lock().await;
        let mut nodes: Vec<StoredNode> = inner.graph.node_weights().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut relationships: Vec<RelationshipDirective> = inner
            .graph
            .node_indices()
            .flat_map(|ix| inner.outgoing(ix))
            .collect();
        relationships.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(GraphSnapshot {
            nodes,
            relationships,
        })
    }
}
