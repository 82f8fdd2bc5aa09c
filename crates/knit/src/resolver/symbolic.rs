//! By-name resolution: calls, reads, writes, uses, inheritance and imports.
//!
//! A target pattern is reduced to a simple name (plus an optional
//! qualifier), looked up in the proposal's own file and then globally. The
//! narrowest scope with any candidate decides; a qualifier that names the
//! candidate's parent (or its file) narrows further.

use super::index::{ResolutionIndex, Scope};
use super::Outcome;
use crate::diagnostics::{Diagnostic, ResolutionScope};
use crate::identity::normalize_path;
use crate::ir::{Element, PotentialRelationship};
use crate::types::{ElementKind, RelationshipKind};

/// Qualifiers that refer to the enclosing type.
const SELF_QUALIFIERS: &[&str] = &["this", "$this", "self", "Self", "cls"];

/// Separators between a qualifier and a member name, across languages.
const SEPARATORS: &[&str] = &["::", "->", ".", "#"];

/// A target pattern split into qualifier and simple name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SymbolPattern<'p> {
    qualifier: Option<&'p str>,
    name: &'p str,
}

fn split_last(s: &str) -> (Option<&str>, &str) {
    let last = SEPARATORS
        .iter()
        .filter_map(|sep| s.rfind(sep).map(|pos| (pos, sep.len())))
        .max_by_key(|&(pos, _)| pos);
    match last {
        Some((pos, len)) => (Some(&s[..pos]), &s[pos + len..]),
        None => (None, s),
    }
}

fn parse_pattern(raw: &str) -> Option<SymbolPattern<'_>> {
    let mut s = raw.trim();
    s = s.strip_prefix("new ").map_or(s, str::trim);
    if let Some(end) = s.find(['(', '<']) {
        s = &s[..end];
    }
    s = s.trim_end_matches(['?', '!']).trim();

    let (qualifier, name) = split_last(s);
    // Only the innermost qualifier segment is compared: `a.b.Cart.add`
    // is qualified by `Cart`.
    let qualifier = qualifier
        .map(|q| split_last(q).1.trim())
        .filter(|q| !q.is_empty());
    let name = name.trim();
    (!name.is_empty()).then_some(SymbolPattern { qualifier, name })
}

fn is_path_like(pattern: &str) -> bool {
    let p = pattern.trim().trim_matches(['"', '\'', '`']);
    p.contains('/') || p.starts_with("./") || p.starts_with("../")
}

/// Resolve an import specifier to a path relative to the project root.
fn resolve_import_path(from_file: Option<&str>, pattern: &str) -> Option<String> {
    let spec = pattern.trim().trim_matches(['"', '\'', '`']);
    let mut parts: Vec<&str> = Vec::new();
    if spec.starts_with('.') {
        let dir = from_file?.rsplit_once('/').map_or("", |(d, _)| d);
        parts.extend(dir.split('/').filter(|s| !s.is_empty()));
    }
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

/// Candidates whose parent, or declaring file, is named by `qualifier`.
fn qualified<'a>(
    index: &ResolutionIndex<'a>,
    hits: &[&'a Element],
    qualifier: &str,
) -> Vec<&'a Element> {
    hits.iter()
        .copied()
        .filter(|e| {
            index.parent_of(e).is_some_and(|p| p.name == qualifier)
                || file_stem(&e.file_path) == qualifier
        })
        .collect()
}

pub(super) fn resolve(
    index: &ResolutionIndex<'_>,
    relationship: &PotentialRelationship,
    out: &mut Outcome,
) {
    let source = index.get(relationship.source_id.as_str());
    let source_file: Option<String> = source
        .map(|e| normalize_path(&e.file_path))
        .or_else(|| relationship.source_id.file_path().map(str::to_string));

    if relationship.kind == RelationshipKind::Imports && is_path_like(&relationship.target_pattern)
    {
        if let Some(path) = resolve_import_path(source_file.as_deref(), &relationship.target_pattern) {
            let hits = index.lookup(Scope::Global, &[ElementKind::File], &path);
            if !hits.is_empty() {
                out.choose(relationship, relationship.kind, &hits, ResolutionScope::Global, &path);
                return;
            }
        }
    }

    let Some(pattern) = parse_pattern(&relationship.target_pattern) else {
        out.diagnostics.push(Diagnostic::unresolvable(
            relationship,
            ResolutionScope::Global,
            &relationship.target_pattern,
        ));
        return;
    };

    let own_type = source.and_then(|s| index.parent_of(s));
    let qualifier = match pattern.qualifier {
        Some(q) if SELF_QUALIFIERS.contains(&q) => own_type.map(|t| t.name.as_str()),
        other => other,
    };

    let kinds = relationship.kind.target_kinds();
    let scopes = source_file
        .as_deref()
        .map(|f| (Scope::File(f), ResolutionScope::SameFile))
        .into_iter()
        .chain([(Scope::Global, ResolutionScope::Global)]);

    let mut fallback: Option<(Vec<&Element>, ResolutionScope)> = None;
    for (scope, diagnostic_scope) in scopes {
        let hits = index.lookup(scope, kinds, pattern.name);
        if hits.is_empty() {
            continue;
        }
        if let Some(q) = qualifier {
            let narrowed = qualified(index, &hits, q);
            if !narrowed.is_empty() {
                out.choose(relationship, relationship.kind, &narrowed, diagnostic_scope, pattern.name);
                return;
            }
            // A qualifier that matches nothing here may match in a wider
            // scope; remember the unqualified hits in case it never does.
            fallback.get_or_insert((hits, diagnostic_scope));
            continue;
        }
        out.choose(relationship, relationship.kind, &hits, diagnostic_scope, pattern.name);
        return;
    }

    match fallback {
        Some((hits, scope)) => out.choose(relationship, relationship.kind, &hits, scope, pattern.name),
        None => out.diagnostics.push(Diagnostic::unresolvable(
            relationship,
            ResolutionScope::Global,
            pattern.name,
        )),
    }
}
