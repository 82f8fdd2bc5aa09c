//! Graph stores: where upsert plans land.
//!
//! A store holds nodes keyed by canonical id and edges keyed by
//! `(type, source, target)`. Both upserts are idempotent and commute:
//!
//! - A node upsert adds labels (set union) and sets properties (incoming
//!   value wins). It turns a stub into a full node.
//! - A relationship upsert creates missing endpoints as stubs, then adds the
//!   edge or merges its properties (incoming value wins).
//!
//! Applying the same plan twice, or the plans of several files in any order
//! or from concurrent tasks, leaves the store in the same state.
//!
//! Two implementations are provided:
//!
//! | Store | Backing | Use |
//! |-------|---------|-----|
//! | [`MemoryGraph`] | petgraph behind `Arc<tokio::sync::Mutex>` | tests, one-shot runs |
//! | [`SqliteGraph`] | rusqlite, WAL | the `knit apply` database |

mod memory;
mod sqlite;

pub use memory::MemoryGraph;
pub use sqlite::SqliteGraph;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::directive::{NodeUpsert, RelationshipDirective, STUB_LABEL, UpsertPlan};
use crate::error::Result;
use crate::identity::CanonicalId;
use crate::types::Properties;

/// A node as a store holds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNode {
    /// Node key
    pub id: CanonicalId,
    /// Labels, sorted and unique
    pub labels: Vec<String>,
    /// Properties
    pub properties: Properties,
    /// `true` until a node upsert for this id arrives
    pub stub: bool,
}

impl StoredNode {
    /// A placeholder for an id only known as an edge endpoint.
    #[must_use]
    pub fn stub(id: CanonicalId) -> Self {
        Self {
            id,
            labels: vec![STUB_LABEL.to_string()],
            properties: Properties::new(),
            stub: true,
        }
    }

    /// Apply a node upsert.
    pub fn absorb(&mut self, upsert: &NodeUpsert) {
        self.labels.retain(|l| l != STUB_LABEL);
        for label in &upsert.labels {
            if let Err(pos) = self.labels.binary_search(label) {
                self.labels.insert(pos, label.clone());
            }
        }
        for (k, v) in &upsert.properties {
            self.properties.insert(k.clone(), v.clone());
        }
        self.stub = false;
    }

    /// Returns `true` if the node has `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).is_ok()
    }
}

/// Merge incoming edge properties into stored ones.
pub(crate) fn merge_edge_properties(stored: &mut Properties, incoming: &Properties) {
    for (k, v) in incoming {
        stored.insert(k.clone(), v.clone());
    }
}

/// Counts describing a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// All nodes, stubs included
    pub nodes: usize,
    /// Nodes never enriched by a node upsert
    pub stubs: usize,
    /// Edge counts keyed by edge type
    pub edges_by_type: BTreeMap<String, usize>,
}

impl GraphStats {
    /// Total edge count.
    #[must_use]
    pub fn edges(&self) -> usize {
        self.edges_by_type.values().sum()
    }
}

/// The full contents of a store in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    /// Nodes sorted by id
    pub nodes: Vec<StoredNode>,
    /// Edges sorted by `(type, source, target)`
    pub relationships: Vec<RelationshipDirective>,
}

/// A graph store accepting idempotent upserts.
///
/// Methods take `&self` so one store can be shared between concurrent
/// producers (wrap it in an `Arc`).
///
/// # Errors
///
/// Backends report transient failures (a locked database) as
/// [`crate::Error::CollaboratorUnavailable`]; retrying the same upsert is
/// always safe.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create or enrich a node.
    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()>;

    /// Create or merge an edge, creating stub endpoints as needed.
    async fn upsert_relationship(&self, relationship: &RelationshipDirective) -> Result<()>;

    /// Apply a whole plan: nodes first, then relationships.
    async fn apply(&self, plan: &UpsertPlan) -> Result<()> {
        for node in plan.nodes() {
            self.upsert_node(node).await?;
        }
        for relationship in plan.relationships() {
            self.upsert_relationship(relationship).await?;
        }
        Ok(())
    }

    /// Get a node by id.
    async fn node(&self, id: &CanonicalId) -> Result<Option<StoredNode>>;

    /// Outgoing edges of a node, sorted by key.
    async fn relationships_from(&self, id: &CanonicalId) -> Result<Vec<RelationshipDirective>>;

    /// Node, stub and edge counts.
    async fn stats(&self) -> Result<GraphStats>;

    /// Everything in the store, in canonical order.
    async fn snapshot(&self) -> Result<GraphSnapshot>;
}
