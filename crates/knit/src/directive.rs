//! Resolver output and the idempotent upsert stream.
//!
//! A resolution run produces [`RelationshipDirective`]s. Together with one
//! [`NodeUpsert`] per element they form an [`UpsertPlan`]: the complete,
//! order-insensitive description of what a graph store must contain.
//!
//! Every directive is keyed by canonical ids only, so applying a plan twice,
//! applying two plans in either order, or applying them from concurrent
//! producers converges on the same graph.
//!
//! On the wire a plan is JSONL, one [`UpsertDirective`] per line:
//!
//! ```json
//! {"op":"node","id":"knit://shop/function:a.ts:load(#0)","labels":["Element","Function"],"properties":{...}}
//! {"op":"relationship","type":"Calls","sourceId":"knit://...","targetId":"knit://...","properties":{}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::heuristics::guess_role;
use crate::identity::{CanonicalId, GidHasher, IdentityLedger};
use crate::ir::Element;
use crate::types::{Language, Properties, RelationshipKind};

/// Label carried by every node created from an element.
pub const ELEMENT_LABEL: &str = "Element";

/// Label carried by placeholder nodes created by relationship upserts.
pub const STUB_LABEL: &str = "Stub";

// ============================================================================
// Directives
// ============================================================================

/// A fully resolved edge, ready for an idempotent write.
///
/// Identity is `(kind, source_id, target_id)`; properties are payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDirective {
    /// Edge type
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// Start node
    pub source_id: CanonicalId,
    /// End node
    pub target_id: CanonicalId,
    /// Edge payload
    #[serde(default)]
    pub properties: Properties,
}

impl RelationshipDirective {
    /// Create a directive with no properties.
    #[must_use]
    pub fn new(kind: RelationshipKind, source_id: CanonicalId, target_id: CanonicalId) -> Self {
        Self {
            kind,
            source_id,
            target_id,
            properties: Properties::new(),
        }
    }

    /// Replace the properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// The identity of the edge.
    #[must_use]
    pub fn key(&self) -> (RelationshipKind, &CanonicalId, &CanonicalId) {
        (self.kind, &self.source_id, &self.target_id)
    }
}

/// Collapse directives with equal keys into one, in canonical key order.
///
/// Properties are merged; on conflicting keys the directive that came first
/// in `directives` wins.
#[must_use]
pub fn merge_directives(mut directives: Vec<RelationshipDirective>) -> Vec<RelationshipDirective> {
    // Stable sort keeps input order within equal keys.
    directives.sort_by(|a, b| a.key().cmp(&b.key()));

    let mut merged: Vec<RelationshipDirective> = Vec::with_capacity(directives.len());
    for directive in directives {
        match merged.last_mut() {
            Some(last) if last.key() == directive.key() => {
                for (k, v) in directive.properties {
                    last.properties.entry(k).or_insert(v);
                }
            }
            _ => merged.push(directive),
        }
    }
    merged
}

/// "Ensure this node exists and carries at least these labels and
/// properties."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpsert {
    /// Node key
    pub id: CanonicalId,
    /// Labels to add, sorted
    #[serde(default)]
    pub labels: Vec<String>,
    /// Properties to set
    #[serde(default)]
    pub properties: Properties,
}

impl NodeUpsert {
    /// A node with no labels or properties.
    #[must_use]
    pub fn new(id: CanonicalId) -> Self {
        Self {
            id,
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Add a label, keeping labels sorted and unique.
    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        if let Err(pos) = self.labels.binary_search_by(|l| l.as_str().cmp(label)) {
            self.labels.insert(pos, label.to_string());
        }
        self
    }

    /// Set a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// The node upsert describing an element.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the location cannot be encoded.
    pub fn for_element(
        element: &Element,
        language: Option<Language>,
        hasher: &GidHasher,
    ) -> Result<Self> {
        let mut node = Self::new(element.id.clone())
            .with_label(ELEMENT_LABEL)
            .with_label(element.kind.label());
        if let Some(language) = language {
            node = node
                .with_label(language.label())
                .with_property("language", language.as_str());
        }

        let gid = hasher.gid(language, &element.id);
        node = node
            .with_property("name", element.name.as_str())
            .with_property("kind", element.kind.label())
            .with_property("filePath", element.file_path.as_str())
            .with_property("location", serde_json::to_value(element.location)?)
            .with_property("gid", gid.as_str());
        if let Some(role) = guess_role(element.kind, &element.name) {
            node = node.with_property("roleHint", role.as_str());
        }

        for (k, v) in &element.properties {
            node.properties.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Ok(node)
    }

    fn absorb(&mut self, other: Self) {
        for label in other.labels {
            if let Err(pos) = self.labels.binary_search(&label) {
                self.labels.insert(pos, label);
            }
        }
        for (k, v) in other.properties {
            self.properties.entry(k).or_insert(v);
        }
    }
}

/// One line of the upsert stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum UpsertDirective {
    /// Node upsert
    Node(NodeUpsert),
    /// Relationship upsert
    Relationship(RelationshipDirective),
}

// ============================================================================
// Plan
// ============================================================================

/// Everything one resolution run wants written to the graph.
///
/// Nodes are sorted by id and relationships by key, so equal inputs always
/// serialize to byte-identical plans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertPlan {
    nodes: Vec<NodeUpsert>,
    relationships: Vec<RelationshipDirective>,
}

impl UpsertPlan {
    /// Build a plan from identified elements and resolved directives.
    ///
    /// Elements with the same id are merged into one node. On property
    /// conflicts the copy with the earliest location wins (see the index's
    /// duplicate rule), so the plan does not depend on input order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IdentityCollision`] if one id names two
    /// different entities or two ids hash to one GID.
    pub fn build<'a, I>(
        elements: I,
        relationships: Vec<RelationshipDirective>,
        hasher: &GidHasher,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a Element, Option<Language>)>,
    {
        let mut elements: Vec<(&Element, Option<Language>)> = elements.into_iter().collect();
        elements.sort_by(|(a, la), (b, lb)| {
            a.id.cmp(&b.id)
                .then_with(|| a.duplicate_order(b))
                .then_with(|| la.cmp(lb))
        });

        let mut ledger = IdentityLedger::new();
        let mut nodes: BTreeMap<CanonicalId, NodeUpsert> = BTreeMap::new();

        for (element, language) in elements {
            let language = language.or_else(|| element.language());
            ledger.record_entity(&element.id, element.kind, &element.file_path, &element.name)?;
            ledger.record_gid(&hasher.gid(language, &element.id), &element.id)?;

            let node = NodeUpsert::for_element(element, language, hasher)?;
            match nodes.get_mut(&element.id) {
                Some(existing) => existing.absorb(node),
                None => {
                    nodes.insert(element.id.clone(), node);
                }
            }
        }

        let plan = Self {
            nodes: nodes.into_values().collect(),
            relationships: merge_directives(relationships),
        };
        debug!(
            nodes = plan.nodes.len(),
            relationships = plan.relationships.len(),
            "Built upsert plan"
        );
        Ok(plan)
    }

    /// Rebuild a plan from a directive stream, merging duplicates.
    #[must_use]
    pub fn from_directives<I: IntoIterator<Item = UpsertDirective>>(directives: I) -> Self {
        let mut nodes: BTreeMap<CanonicalId, NodeUpsert> = BTreeMap::new();
        let mut relationships = Vec::new();
        for directive in directives {
            match directive {
                UpsertDirective::Node(node) => match nodes.get_mut(&node.id) {
                    Some(existing) => existing.absorb(node),
                    None => {
                        nodes.insert(node.id.clone(), node);
                    }
                },
                UpsertDirective::Relationship(rel) => relationships.push(rel),
            }
        }
        Self {
            nodes: nodes.into_values().collect(),
            relationships: merge_directives(relationships),
        }
    }

    /// Node upserts, sorted by id.
    #[must_use]
    pub fn nodes(&self) -> &[NodeUpsert] {
        &self.nodes
    }

    /// Relationship upserts, sorted by key.
    #[must_use]
    pub fn relationships(&self) -> &[RelationshipDirective] {
        &self.relationships
    }

    /// Total number of directives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.relationships.len()
    }

    /// Returns `true` if the plan writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The plan as a directive stream: nodes first, then relationships.
    pub fn directives(&self) -> impl Iterator<Item = UpsertDirective> + '_ {
        self.nodes
            .iter()
            .cloned()
            .map(UpsertDirective::Node)
            .chain(
                self.relationships
                    .iter()
                    .cloned()
                    .map(UpsertDirective::Relationship),
            )
    }

    /// Write the plan to `path` as JSONL, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Jsonl`] if the file cannot be written.
    pub async fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        knit_jsonl::write_jsonl_atomic_iter(path, self.directives()).await?;
        Ok(())
    }

    /// Read a plan written by [`write_jsonl`](Self::write_jsonl).
    ///
    /// Malformed lines are skipped and returned as warnings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Jsonl`] if the file cannot be read.
    pub async fn read_jsonl(path: impl AsRef<Path>) -> Result<(Self, Vec<knit_jsonl::Warning>)> {
        let (directives, warnings) =
            knit_jsonl::read_jsonl_resilient::<UpsertDirective, _>(path).await?;
        Ok((Self::from_directives(directives), warnings))
    }
}
