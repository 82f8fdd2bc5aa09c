//! Resolution of SQL references to table and column definitions.
//!
//! A `DatabaseQuery` proposal lists the tables and columns its statement
//! touches in `targetTables` and `targetColumns`. Tables may be written
//! `schema.table`; columns `table.column`, `schema.table.column` or bare.
//! A bare column is looked for first among the query's own resolved tables,
//! then among all tables.

use std::collections::BTreeSet;

use super::Outcome;
use super::index::ResolutionIndex;
use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostic, ResolutionScope};
use crate::identity::CanonicalId;
use crate::ir::{Element, PotentialRelationship};
use crate::types::{RelationshipKind, SCHEMA_NAME, TARGET_COLUMNS, TARGET_TABLES};

/// Strip SQL identifier quoting: `"users"`, `` `users` ``, `[users]`.
fn unquote(ident: &str) -> &str {
    ident
        .trim()
        .trim_matches(['"', '`'])
        .trim_start_matches('[')
        .trim_end_matches(']')
}

/// Split a dotted SQL name into its unquoted parts.
fn parts(name: &str) -> Vec<&str> {
    name.split('.').map(unquote).filter(|p| !p.is_empty()).collect()
}

struct NameMatcher {
    case_insensitive: bool,
}

impl NameMatcher {
    fn eq(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    fn table_matches(&self, table: &Element, schema: Option<&str>, name: &str) -> bool {
        self.eq(&table.name, name)
            && schema.is_none_or(|s| self.eq(table.property_str(SCHEMA_NAME).unwrap_or(""), s))
    }
}

fn resolve_tables<'a>(
    index: &ResolutionIndex<'a>,
    relationship: &PotentialRelationship,
    matcher: &NameMatcher,
    out: &mut Outcome,
) -> BTreeSet<CanonicalId> {
    let mut resolved = BTreeSet::new();
    let mut names = relationship.property_list(TARGET_TABLES);
    if names.is_empty() && !relationship.target_pattern.trim().is_empty() {
        names = vec![relationship.target_pattern.trim().to_string()];
    }

    for raw in &names {
        let (schema, name) = match parts(raw).as_slice() {
            [name] => (None, *name),
            [.., schema, name] => (Some(*schema), *name),
            [] => continue,
        };
        let hits: Vec<&Element> = index
            .tables()
            .filter(|t| matcher.table_matches(t, schema, name))
            .collect();
        if let Some(first) = hits.first() {
            resolved.insert(first.id.clone());
        }
        out.choose(
            relationship,
            RelationshipKind::ReferencesTable,
            &hits,
            ResolutionScope::Tables,
            raw,
        );
    }
    resolved
}

fn resolve_columns(
    index: &ResolutionIndex<'_>,
    relationship: &PotentialRelationship,
    matcher: &NameMatcher,
    query_tables: &BTreeSet<CanonicalId>,
    out: &mut Outcome,
) {
    for raw in relationship.property_list(TARGET_COLUMNS) {
        let segments = parts(&raw);
        let Some((&name, qualifier)) = segments.split_last() else {
            continue;
        };
        let (schema, table) = match qualifier {
            [] => (None, None),
            [table] => (None, Some(*table)),
            [.., schema, table] => (Some(*schema), Some(*table)),
        };

        let named: Vec<&Element> = index
            .columns()
            .filter(|c| matcher.eq(&c.name, name))
            .collect();

        let hits: Vec<&Element> = if let Some(table) = table {
            named
                .into_iter()
                .filter(|c| {
                    index
                        .parent_of(c)
                        .is_some_and(|t| matcher.table_matches(t, schema, table))
                })
                .collect()
        } else {
            let in_query: Vec<&Element> = named
                .iter()
                .copied()
                .filter(|c| c.parent_id().is_some_and(|p| query_tables.iter().any(|t| t.as_str() == p)))
                .collect();
            if in_query.is_empty() { named } else { in_query }
        };

        out.choose(
            relationship,
            RelationshipKind::ReferencesColumn,
            &hits,
            ResolutionScope::Columns,
            &raw,
        );
    }
}

pub(super) fn resolve(
    index: &ResolutionIndex<'_>,
    relationship: &PotentialRelationship,
    config: &ResolverConfig,
    out: &mut Outcome,
) {
    let matcher = NameMatcher {
        case_insensitive: config.case_insensitive_sql,
    };
    let tables = resolve_tables(index, relationship, &matcher, out);
    resolve_columns(index, relationship, &matcher, &tables, out);
}
