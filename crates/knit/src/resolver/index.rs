//! Run-scoped, read-only lookup structure over a batch's elements.
//!
//! The index borrows the elements it was built from and is dropped at the end
//! of the run. Lookups are keyed by [`SymbolKey`] (kind plus simple name),
//! never by a formatted string, so a variable and a function that share a
//! name can never shadow each other.
//!
//! Elements are stored once, in tie-break order: ascending file path, start
//! line, start column, then canonical id. Every candidate list handed out is
//! in that order, so "first candidate" is the same on every run.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::identity::{CanonicalId, IdentityLedger, normalize_path};
use crate::ir::Element;
use crate::types::ElementKind;

/// Typed lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    /// Element kind
    pub kind: ElementKind,
    /// Simple name (or, for files, a path form)
    pub name: String,
}

impl SymbolKey {
    /// Create a key.
    #[must_use]
    pub fn new(kind: ElementKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

/// Where a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope<'s> {
    /// Elements declared in one file
    File(&'s str),
    /// Every element in the batch
    Global,
}

type Postings = HashMap<SymbolKey, Vec<usize>>;

/// Read-only index over one resolution unit's elements.
#[derive(Debug, Default)]
pub struct ResolutionIndex<'a> {
    elements: Vec<&'a Element>,
    by_id: HashMap<&'a str, usize>,
    by_file: HashMap<String, Postings>,
    global: Postings,
    routes: Vec<usize>,
    tables: Vec<usize>,
    columns: Vec<usize>,
}

/// The path forms a file element is indexed under: full path, path without
/// extension, file name and stem.
fn file_keys(path: &str) -> Vec<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let without_ext = path.rsplit_once('.').map_or(path, |(p, _)| p);
    let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);
    let mut keys = vec![path, without_ext, file_name, stem];
    keys.sort_unstable();
    keys.dedup();
    keys
}

impl<'a> ResolutionIndex<'a> {
    /// Index `elements`.
    ///
    /// Elements repeated with the same id and the same identity are indexed
    /// once, keeping the copy that sorts first by location, file, name and
    /// properties.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedElement`] for an element without a
    /// usable id and [`crate::Error::IdentityCollision`] when one id names
    /// two different entities.
    pub fn build<I>(elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Element>,
    {
        let mut ledger = IdentityLedger::new();
        let mut unique: HashMap<&'a str, &'a Element> = HashMap::new();

        for element in elements {
            element.validate()?;
            ledger.record_entity(&element.id, element.kind, &element.file_path, &element.name)?;
            unique
                .entry(element.id.as_str())
                .and_modify(|kept| {
                    if element.duplicate_order(kept).is_lt() {
                        *kept = element;
                    }
                })
                .or_insert(element);
        }

        let mut ordered: Vec<&'a Element> = unique.into_values().collect();
        ordered.sort_by(|a, b| {
            (a.file_path.as_str(), a.location.start, &a.id).cmp(&(
                b.file_path.as_str(),
                b.location.start,
                &b.id,
            ))
        });

        let mut index = Self::default();
        for (pos, element) in ordered.iter().copied().enumerate() {
            index.insert(pos, element);
        }
        index.elements = ordered;

        debug!(
            elements = index.elements.len(),
            files = index.by_file.len(),
            routes = index.routes.len(),
            tables = index.tables.len(),
            "Built resolution index"
        );
        Ok(index)
    }

    fn insert(&mut self, pos: usize, element: &'a Element) {
        self.by_id.insert(element.id.as_str(), pos);

        let path = normalize_path(&element.file_path);
        let names: Vec<&str> = if element.kind == ElementKind::File {
            file_keys(&path)
        } else {
            vec![element.name.as_str()]
        };
        let file = self.by_file.entry(path.clone()).or_default();
        for name in names {
            let key = SymbolKey::new(element.kind, name);
            file.entry(key.clone()).or_default().push(pos);
            self.global.entry(key).or_default().push(pos);
        }

        match element.kind {
            ElementKind::ApiRouteDefinition => self.routes.push(pos),
            ElementKind::DatabaseTable => self.tables.push(pos),
            ElementKind::DatabaseColumn => self.columns.push(pos),
            _ => {}
        }
    }

    /// Number of distinct elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the index holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Every distinct element, in tie-break order.
    #[must_use]
    pub fn elements(&self) -> &[&'a Element] {
        &self.elements
    }

    /// Look an element up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'a Element> {
        self.by_id.get(id).map(|&pos| self.elements[pos])
    }

    /// Returns `true` if `id` names an indexed element.
    #[must_use]
    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.by_id.contains_key(id.as_str())
    }

    /// Name of an element's `parentId` target, when it is indexed.
    #[must_use]
    pub fn parent_of(&self, element: &Element) -> Option<&'a Element> {
        element.parent_id().and_then(|id| self.get(id))
    }

    /// Elements of any of `kinds` named `name` in `scope`, in tie-break
    /// order. File scopes match on the normalized path.
    #[must_use]
    pub fn lookup(&self, scope: Scope<'_>, kinds: &[ElementKind], name: &str) -> Vec<&'a Element> {
        let postings = match scope {
            Scope::File(path) => match self.by_file.get(&normalize_path(path)) {
                Some(p) => p,
                None => return Vec::new(),
            },
            Scope::Global => &self.global,
        };

        let mut hits: Vec<usize> = kinds
            .iter()
            .filter_map(|&kind| postings.get(&SymbolKey::new(kind, name)))
            .flatten()
            .copied()
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter().map(|pos| self.elements[pos]).collect()
    }

    /// Route definitions, in tie-break order.
    pub fn routes(&self) -> impl Iterator<Item = &'a Element> + '_ {
        self.routes.iter().map(|&pos| self.elements[pos])
    }

    /// Table definitions, in tie-break order.
    pub fn tables(&self) -> impl Iterator<Item = &'a Element> + '_ {
        self.tables.iter().map(|&pos| self.elements[pos])
    }

    /// Column definitions, in tie-break order.
    pub fn columns(&self) -> impl Iterator<Item = &'a Element> + '_ {
        self.columns.iter().map(|&pos| self.elements[pos])
    }
}
