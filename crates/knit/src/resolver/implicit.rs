//! Directives derived from element properties.
//!
//! `parentId` becomes a containment edge from parent to child (`HasColumn`
//! for a table's columns, `Contains` otherwise); `handlerId` becomes a
//! `HandledBy` edge from route to handler. Both need the referenced element
//! to be in the batch; a dangling reference is reported, not guessed.

use super::Outcome;
use super::index::ResolutionIndex;
use crate::diagnostics::{Diagnostic, ResolutionScope};
use crate::ir::{Element, PotentialRelationship};
use crate::types::{ElementKind, Properties, RelationshipKind};

fn containment_kind(parent: ElementKind, child: ElementKind) -> RelationshipKind {
    match (parent, child) {
        (ElementKind::DatabaseTable, ElementKind::DatabaseColumn) => RelationshipKind::HasColumn,
        _ => RelationshipKind::Contains,
    }
}

/// The proposal a property link stands for, used in diagnostics.
fn as_proposal(element: &Element, kind: RelationshipKind, target: &str) -> PotentialRelationship {
    PotentialRelationship::new(element.id.clone(), kind, target).at(element.location)
}

pub(super) fn derive(index: &ResolutionIndex<'_>) -> Outcome {
    let mut out = Outcome::default();

    for &element in index.elements() {
        if let Some(parent_id) = element.parent_id() {
            match index.get(parent_id) {
                Some(parent) => {
                    let kind = containment_kind(parent.kind, element.kind);
                    let origin = PotentialRelationship::new(parent.id.clone(), kind, element.id.as_str())
                        .at(element.location);
                    out.emit(&origin, kind, &element.id, Properties::new());
                }
                None => out.diagnostics.push(Diagnostic::unresolvable(
                    &as_proposal(element, RelationshipKind::Contains, parent_id),
                    ResolutionScope::ElementProperty,
                    parent_id,
                )),
            }
        }

        if let Some(handler_id) = element.handler_id() {
            let origin = as_proposal(element, RelationshipKind::HandledBy, handler_id);
            match index.get(handler_id) {
                Some(handler) => {
                    out.emit(&origin, RelationshipKind::HandledBy, &handler.id, Properties::new());
                }
                None => out.diagnostics.push(Diagnostic::unresolvable(
                    &origin,
                    ResolutionScope::ElementProperty,
                    handler_id,
                )),
            }
        }
    }
    out
}
