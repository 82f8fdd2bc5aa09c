//! Relationship resolution.
//!
//! Turns a batch's [`PotentialRelationship`]s and element properties into
//! concrete [`RelationshipDirective`]s:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          resolve()                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  1. ResolutionIndex::build   validate, dedupe, order         │
//! │  2. per proposal (rayon above parallel_threshold)            │
//! │       Symbolic      same file, then global   (symbolic.rs)   │
//! │       RoutePattern  URL vs route patterns    (routes.rs)     │
//! │       Database      table/column names       (database.rs)   │
//! │  3. element properties  parentId, handlerId  (implicit.rs)   │
//! │  4. sort, merge duplicates, log diagnostics                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The result is a pure function of the input multiset: input order, thread
//! count and repetition do not change it.

mod database;
mod implicit;
pub mod index;
mod routes;
mod symbolic;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, ResolutionScope};
use crate::directive::{RelationshipDirective, merge_directives};
use crate::error::Result;
use crate::identity::CanonicalId;
use crate::ir::{Element, PotentialRelationship};
use crate::types::{Location, Properties, RelationshipKind, ResolutionStrategy};

pub use index::{ResolutionIndex, Scope, SymbolKey};
pub use routes::{normalize_url, route_matches};

/// Directives and diagnostics produced by one resolution run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Resolved relationships, merged and sorted by key
    pub directives: Vec<RelationshipDirective>,
    /// Non-fatal outcomes, sorted
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    /// Number of dropped proposals (or proposal targets).
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.count(DiagnosticKind::UnresolvableRelationship)
    }

    /// Number of proposals resolved by tie-break.
    #[must_use]
    pub fn ambiguous_count(&self) -> usize {
        self.count(DiagnosticKind::AmbiguousRelationship)
    }

    fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    /// Directives of one kind.
    pub fn directives_of(
        &self,
        kind: RelationshipKind,
    ) -> impl Iterator<Item = &RelationshipDirective> + '_ {
        self.directives.iter().filter(move |d| d.kind == kind)
    }
}

/// A directive before merging, remembering where it was proposed.
#[derive(Debug, Clone)]
struct Proposed {
    location: Location,
    directive: RelationshipDirective,
}

/// What resolving part of a batch produced.
#[derive(Debug, Default)]
struct Outcome {
    proposed: Vec<Proposed>,
    diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    fn emit(
        &mut self,
        relationship: &PotentialRelationship,
        kind: RelationshipKind,
        target_id: &CanonicalId,
        properties: Properties,
    ) {
        self.proposed.push(Proposed {
            location: relationship.location,
            directive: RelationshipDirective::new(
                kind,
                relationship.source_id.clone(),
                target_id.clone(),
            )
            .with_properties(properties),
        });
    }

    /// Emit a `kind` directive to the first of `hits`, flagging ties.
    fn choose(
        &mut self,
        relationship: &PotentialRelationship,
        kind: RelationshipKind,
        hits: &[&Element],
        scope: ResolutionScope,
        target: &str,
    ) {
        let Some(first) = hits.first() else {
            self.diagnostics
                .push(Diagnostic::unresolvable(relationship, scope, target));
            return;
        };
        self.emit(relationship, kind, &first.id, carried_properties(relationship));
        if hits.len() > 1 {
            self.diagnostics.push(Diagnostic::ambiguous(
                relationship,
                scope,
                target,
                hits.iter().map(|e| e.id.clone()).collect(),
            ));
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.proposed.extend(other.proposed);
        self.diagnostics.extend(other.diagnostics);
        self
    }
}

/// Resolves proposals against one immutable index.
pub struct Resolver<'a> {
    index: ResolutionIndex<'a>,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    /// Index `elements` for resolution.
    ///
    /// # Errors
    ///
    /// See [`ResolutionIndex::build`].
    pub fn new<I>(elements: I, config: &ResolverConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Element>,
    {
        Ok(Self {
            index: ResolutionIndex::build(elements)?,
            config: config.clone(),
        })
    }

    /// The index resolution runs against.
    #[must_use]
    pub fn index(&self) -> &ResolutionIndex<'a> {
        &self.index
    }

    /// Resolve `relationships` plus the implicit links carried by element
    /// properties.
    #[must_use]
    pub fn resolve<'r, I>(&self, relationships: I) -> Resolution
    where
        I: IntoIterator<Item = &'r PotentialRelationship>,
    {
        let relationships: Vec<&PotentialRelationship> = relationships.into_iter().collect();
        let threshold = self.config.parallel_threshold;
        let parallel = threshold > 0 && relationships.len() >= threshold;

        let explicit = if parallel {
            debug!(candidates = relationships.len(), "Resolving in parallel");
            relationships
                .par_iter()
                .map(|rel| self.resolve_one(rel))
                .reduce(Outcome::default, Outcome::merge)
        } else {
            relationships
                .iter()
                .map(|rel| self.resolve_one(rel))
                .fold(Outcome::default(), Outcome::merge)
        };

        let outcome = explicit.merge(implicit::derive(&self.index));
        let resolution = finish(outcome);

        info!(
            proposals = relationships.len(),
            directives = resolution.directives.len(),
            unresolved = resolution.unresolved_count(),
            ambiguous = resolution.ambiguous_count(),
            "Resolution complete"
        );
        resolution
    }

    fn resolve_one(&self, relationship: &PotentialRelationship) -> Outcome {
        let mut out = Outcome::default();
        match relationship.kind.strategy() {
            ResolutionStrategy::Symbolic => {
                symbolic::resolve(&self.index, relationship, &mut out);
            }
            ResolutionStrategy::RoutePattern => {
                routes::resolve(&self.index, relationship, &mut out);
            }
            ResolutionStrategy::Database => {
                database::resolve(&self.index, relationship, &self.config, &mut out);
            }
            ResolutionStrategy::Derived => {
                // Only parentId/handlerId produce these kinds.
                out.diagnostics.push(Diagnostic::unresolvable(
                    relationship,
                    ResolutionScope::Global,
                    &relationship.target_pattern,
                ));
            }
        }
        out
    }
}

/// Resolve one batch: index `elements`, then resolve `relationships`.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedElement`] or
/// [`crate::Error::IdentityCollision`] if the elements cannot be indexed.
/// Individual proposals never fail the run.
pub fn resolve(
    elements: &[Element],
    relationships: &[PotentialRelationship],
    config: &ResolverConfig,
) -> Result<Resolution> {
    Ok(Resolver::new(elements, config)?.resolve(relationships))
}

/// Proposal properties carried onto the resolved edge, plus the line the
/// proposal came from.
fn carried_properties(relationship: &PotentialRelationship) -> Properties {
    let mut props = relationship.properties.clone();
    props.remove(crate::types::TARGET_TABLES);
    props.remove(crate::types::TARGET_COLUMNS);
    if relationship.location.start.line > 0 {
        props.insert(
            "line".to_string(),
            serde_json::Value::from(relationship.location.start.line),
        );
    }
    props
}

/// Put an outcome into canonical form.
fn finish(outcome: Outcome) -> Resolution {
    let Outcome {
        mut proposed,
        mut diagnostics,
    } = outcome;

    // Earliest proposal first within each key, so merging keeps its
    // properties; the serialized payload breaks exact position ties.
    let mut keyed: Vec<(String, Proposed)> = proposed
        .drain(..)
        .map(|p| (serde_json::Value::Object(p.directive.properties.clone()).to_string(), p))
        .collect();
    keyed.sort_by(|(pa, a), (pb, b)| {
        a.directive
            .key()
            .cmp(&b.directive.key())
            .then_with(|| a.location.cmp(&b.location))
            .then_with(|| pa.cmp(pb))
    });
    let directives = merge_directives(keyed.into_iter().map(|(_, p)| p.directive).collect());

    diagnostics.sort_by(Diagnostic::canonical_cmp);
    diagnostics.dedup();
    for diagnostic in &diagnostics {
        diagnostic.log();
    }

    Resolution {
        directives,
        diagnostics,
    }
}
