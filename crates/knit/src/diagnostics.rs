//! Non-fatal resolution outcomes.
//!
//! A proposal that cannot be resolved, or resolves to more than one
//! candidate, never fails a run. It produces a [`Diagnostic`] that is logged
//! through `tracing` and collected on the
//! [`Resolution`](crate::resolver::Resolution) so callers can report it.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::identity::CanonicalId;
use crate::ir::{PotentialRelationship, properties_text};
use crate::types::{Location, RelationshipKind};

/// Category of a resolution diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagnosticKind {
    /// No candidate matched; the proposal produced no directive.
    UnresolvableRelationship,
    /// Several candidates tied; the first in tie-break order was used.
    AmbiguousRelationship,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvableRelationship => write!(f, "unresolvable"),
            Self::AmbiguousRelationship => write!(f, "ambiguous"),
        }
    }
}

/// Where the resolver was looking when the diagnostic arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResolutionScope {
    /// Elements declared in the proposal's own file
    SameFile,
    /// Elements declared anywhere in the batch
    Global,
    /// Route definitions
    Routes,
    /// Table definitions
    Tables,
    /// Column definitions
    Columns,
    /// A `parentId` or `handlerId` element property
    ElementProperty,
}

impl std::fmt::Display for ResolutionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameFile => write!(f, "same file"),
            Self::Global => write!(f, "global"),
            Self::Routes => write!(f, "routes"),
            Self::Tables => write!(f, "tables"),
            Self::Columns => write!(f, "columns"),
            Self::ElementProperty => write!(f, "element property"),
        }
    }
}

/// A non-fatal resolution outcome with enough context to act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// The proposal that was being resolved. Implicit links are reported as
    /// a synthesized proposal whose target pattern is the referenced id.
    pub relationship: PotentialRelationship,
    /// Scope in which the outcome was decided
    pub scope: ResolutionScope,
    /// The specific name that failed, when a proposal names several
    pub target: String,
    /// Tied candidates in tie-break order (ambiguity only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CanonicalId>,
}

impl Diagnostic {
    /// Nothing matched `target`.
    #[must_use]
    pub fn unresolvable(
        relationship: &PotentialRelationship,
        scope: ResolutionScope,
        target: &str,
    ) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvableRelationship,
            relationship: relationship.clone(),
            scope,
            target: target.to_string(),
            candidates: Vec::new(),
        }
    }

    /// Several candidates tied for `target`; `candidates[0]` was chosen.
    #[must_use]
    pub fn ambiguous(
        relationship: &PotentialRelationship,
        scope: ResolutionScope,
        target: &str,
        candidates: Vec<CanonicalId>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::AmbiguousRelationship,
            relationship: relationship.clone(),
            scope,
            target: target.to_string(),
            candidates,
        }
    }

    /// Emit this diagnostic through `tracing`.
    ///
    /// Misses are routine (calls into libraries outside the batch) and log at
    /// debug; ambiguity means a possibly wrong edge and logs at warn.
    pub fn log(&self) {
        let source = &self.relationship.source_id;
        let kind = self.relationship.kind;
        match self.kind {
            DiagnosticKind::UnresolvableRelationship => debug!(
                source = %source,
                relationship = %kind,
                target = %self.target,
                scope = %self.scope,
                "Dropped unresolvable relationship"
            ),
            DiagnosticKind::AmbiguousRelationship => warn!(
                source = %source,
                relationship = %kind,
                target = %self.target,
                scope = %self.scope,
                candidates = self.candidates.len(),
                chosen = %self.candidates.first().map_or("", CanonicalId::as_str),
                "Ambiguous relationship resolved by tie-break"
            ),
        }
    }

    /// Canonical order: every field takes part, so equal diagnostics are
    /// adjacent and distinct ones never depend on input order.
    pub(crate) fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key()).then_with(|| {
            properties_text(&self.relationship.properties)
                .cmp(&properties_text(&other.relationship.properties))
        })
    }

    #[allow(clippy::type_complexity)]
    fn sort_key(
        &self,
    ) -> (
        DiagnosticKind,
        &str,
        RelationshipKind,
        Location,
        &str,
        &str,
        ResolutionScope,
        &[CanonicalId],
    ) {
        (
            self.kind,
            self.relationship.source_id.as_str(),
            self.relationship.kind,
            self.relationship.location,
            self.relationship.target_pattern.as_str(),
            self.target.as_str(),
            self.scope,
            self.candidates.as_slice(),
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {} -> {:?} ({} scope)",
            self.kind,
            self.relationship.kind,
            self.relationship.source_id,
            self.target,
            self.scope
        )?;
        if let Some(chosen) = self.candidates.first() {
            write!(f, ", chose {chosen} of {}", self.candidates.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> PotentialRelationship {
        let source = CanonicalId::parse("knit://p/function:a.ts:main(#0)").unwrap();
        PotentialRelationship::new(source, RelationshipKind::Calls, "helper")
    }

    #[test]
    fn display_mentions_choice_for_ambiguity() {
        let candidates = vec![
            CanonicalId::parse("knit://p/function:b.ts:helper(#0)").unwrap(),
            CanonicalId::parse("knit://p/function:c.ts:helper(#0)").unwrap(),
        ];
        let diag = Diagnostic::ambiguous(&proposal(), ResolutionScope::Global, "helper", candidates);
        let text = diag.to_string();
        assert!(text.starts_with("ambiguous: Calls"));
        assert!(text.contains("chose knit://p/function:b.ts:helper(#0) of 2"));
    }

    #[test]
    fn canonical_order_covers_scope_and_properties() {
        let plain = proposal();
        let tagged = proposal().with_property("receiver", "self");
        let diagnostics = vec![
            Diagnostic::unresolvable(&plain, ResolutionScope::SameFile, "helper"),
            Diagnostic::unresolvable(&plain, ResolutionScope::Global, "helper"),
            Diagnostic::unresolvable(&tagged, ResolutionScope::Global, "helper"),
        ];
        let sorted = |mut list: Vec<Diagnostic>| {
            list.sort_by(Diagnostic::canonical_cmp);
            list
        };

        let forward = sorted(diagnostics.clone());
        let backward = sorted(diagnostics.into_iter().rev().collect());

        assert_eq!(forward, backward);
        assert_eq!(forward[0].scope, ResolutionScope::SameFile);
        assert!(forward[1].relationship.properties.contains_key("receiver"));
    }

    #[test]
    fn unresolvable_serializes_without_candidates() {
        let diag = Diagnostic::unresolvable(&proposal(), ResolutionScope::Global, "helper");
        let value = serde_json::to_value(&diag).unwrap();
        assert_eq!(value["kind"], "UnresolvableRelationship");
        assert_eq!(value["relationship"]["targetPattern"], "helper");
        assert!(value.get("candidates").is_none());
    }
}
