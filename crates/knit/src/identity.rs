//! Deterministic identity for graph entities.
//!
//! Every node in the graph is keyed by a [`CanonicalId`]: a readable string
//! computed purely from what the entity *is* (project, kind, scope path,
//! name, arity), never from when or where it was extracted. Two extractor
//! processes that see the same function therefore mint the same id without
//! talking to each other, which is what lets a relationship written early
//! (as a stub) and a node written later converge on one graph node.
//!
//! # Format
//!
//! ```text
//! knit://{projectId}/{kindTag}:{scopePath}
//!
//! knit://shop/file:src/api/client.ts
//! knit://shop/function:src/api/client.ts:fetchData(#1)
//! knit://shop/method:src/cart.ts:Cart.add(#2)
//! knit://shop/databasetable:public.users
//! knit://shop/databasecolumn:public.users.id
//! knit://shop/apiroutedefinition:GET:/api/data
//! ```
//!
//! A [`Gid`] is the compact, language-tagged SHA-256 form of a canonical id.
//! It is derived, never assigned.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::{ElementKind, Language, Position};

/// URI scheme of every canonical id.
pub const SCHEME: &str = "knit";

/// Characters removed from file paths before they enter an id.
const DISALLOWED_PATH_CHARS: &[char] = &[':', '*', '?', '<', '>', '"', '|'];

/// Route method used when a route declares none.
const ANY_METHOD: &str = "ANY";

// ============================================================================
// CanonicalId
// ============================================================================

/// Deterministic, human-auditable identity of one logical entity.
///
/// Deserializes from any string so that a record with a missing or broken id
/// reaches the resolver, which rejects it as `MalformedElement` with context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

/// The three components of a well-formed canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts<'a> {
    /// Project the entity belongs to
    pub project: &'a str,
    /// Entity kind
    pub kind: ElementKind,
    /// Kind-specific scope path
    pub scope_path: &'a str,
}

impl CanonicalId {
    fn from_parts(project: &str, kind: ElementKind, scope_path: &str) -> Self {
        Self(format!("{SCHEME}://{project}/{}:{scope_path}", kind.as_tag()))
    }

    /// Parse and validate an id string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedElement`] if the string is not of the form
    /// `knit://{project}/{kind}:{scope}`.
    pub fn parse(s: &str) -> Result<Self> {
        let id = Self(s.to_string());
        id.validate()?;
        Ok(id)
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty id (what a missing `id` field decodes to).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into components, or `None` if malformed.
    #[must_use]
    pub fn parts(&self) -> Option<IdParts<'_>> {
        let rest = self.0.strip_prefix(SCHEME)?.strip_prefix("://")?;
        let (project, rest) = rest.split_once('/')?;
        let (tag, scope_path) = rest.split_once(':')?;
        let kind = ElementKind::parse(tag).filter(|k| k.as_tag() == tag)?;
        if project.is_empty() || scope_path.is_empty() {
            return None;
        }
        Some(IdParts {
            project,
            kind,
            scope_path,
        })
    }

    /// Check the id is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedElement`] describing the problem.
    pub fn validate(&self) -> Result<IdParts<'_>> {
        if self.0.is_empty() {
            return Err(Error::malformed(None, "element has no id"));
        }
        self.parts().ok_or_else(|| {
            Error::malformed(
                Some(&self.0),
                format!("id is not of the form {SCHEME}://{{project}}/{{kind}}:{{scope}}"),
            )
        })
    }

    /// Kind encoded in the id.
    #[must_use]
    pub fn kind(&self) -> Option<ElementKind> {
        self.parts().map(|p| p.kind)
    }

    /// Scope path encoded in the id.
    #[must_use]
    pub fn scope_path(&self) -> Option<&str> {
        self.parts().map(|p| p.scope_path)
    }

    /// Declaring file encoded in the id, for file-scoped kinds.
    ///
    /// Tables, columns and routes are not file scoped and yield `None`.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        let parts = self.parts()?;
        match parts.kind {
            ElementKind::File => Some(parts.scope_path),
            ElementKind::DatabaseTable
            | ElementKind::DatabaseColumn
            | ElementKind::ApiRouteDefinition => None,
            _ => parts.scope_path.split_once(':').map(|(path, _)| path),
        }
    }
}

impl std::fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CanonicalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for CanonicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Everything identity generation needs to know about an entity.
///
/// Which fields are required depends on `kind`:
///
/// | Kind | Required | Scope path |
/// |------|----------|------------|
/// | File | `file_path` | `path` |
/// | Function | `file_path`, `name`* | `path:name(#N)` |
/// | Class, Interface, Enum, Module, Variable, Import | `file_path`, `name`* | `path:name` |
/// | Method | `parent_id`, `name` | `parentScope.name(#N)` |
/// | Property, DatabaseColumn, AnnotationMember | `parent_id`, `name` | `parentScope.name` |
/// | DatabaseTable | `name` | `schema.name` |
/// | ApiRouteDefinition | `path_pattern` | `METHOD:pattern` |
///
/// \* Functions and classes may omit `name` if `position` is given; they are
/// then identified as `anon@line:col`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityDescriptor {
    /// Entity kind
    pub kind: Option<ElementKind>,
    /// Path of the declaring file, as the extractor saw it
    pub file_path: Option<String>,
    /// Simple name
    pub name: Option<String>,
    /// Containing element, for member kinds
    pub parent_id: Option<CanonicalId>,
    /// Number of declared parameters, for functions and methods
    pub parameter_count: Option<usize>,
    /// SQL schema, for tables
    pub schema_name: Option<String>,
    /// HTTP method, for routes
    pub http_method: Option<String>,
    /// URL path pattern, for routes
    pub path_pattern: Option<String>,
    /// Start position, used to name anonymous entities
    pub position: Option<Position>,
    /// Source language, used for the GID prefix
    pub language: Option<Language>,
}

impl EntityDescriptor {
    fn of(kind: ElementKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// A source file.
    #[must_use]
    pub fn file(path: &str) -> Self {
        Self {
            file_path: Some(path.to_string()),
            ..Self::of(ElementKind::File)
        }
    }

    /// A file-scoped named entity (class, interface, variable, ...).
    #[must_use]
    pub fn named(kind: ElementKind, path: &str, name: &str) -> Self {
        Self {
            file_path: Some(path.to_string()),
            name: Some(name.to_string()),
            ..Self::of(kind)
        }
    }

    /// A free function with `arity` parameters.
    #[must_use]
    pub fn function(path: &str, name: &str, arity: usize) -> Self {
        Self {
            parameter_count: Some(arity),
            ..Self::named(ElementKind::Function, path, name)
        }
    }

    /// An unnamed function expression starting at `position`.
    #[must_use]
    pub fn anonymous_function(path: &str, position: Position, arity: usize) -> Self {
        Self {
            file_path: Some(path.to_string()),
            parameter_count: Some(arity),
            position: Some(position),
            ..Self::of(ElementKind::Function)
        }
    }

    /// A member (property, column, annotation member) of `parent`.
    #[must_use]
    pub fn member(kind: ElementKind, parent: &CanonicalId, name: &str) -> Self {
        Self {
            parent_id: Some(parent.clone()),
            name: Some(name.to_string()),
            ..Self::of(kind)
        }
    }

    /// A method of `parent` with `arity` parameters.
    #[must_use]
    pub fn method(parent: &CanonicalId, name: &str, arity: usize) -> Self {
        Self {
            parameter_count: Some(arity),
            ..Self::member(ElementKind::Method, parent, name)
        }
    }

    /// A SQL table, optionally schema qualified.
    #[must_use]
    pub fn table(schema: Option<&str>, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            schema_name: schema.map(str::to_string),
            ..Self::of(ElementKind::DatabaseTable)
        }
    }

    /// A column of `table`.
    #[must_use]
    pub fn column(table: &CanonicalId, name: &str) -> Self {
        Self::member(ElementKind::DatabaseColumn, table, name)
    }

    /// An HTTP route.
    #[must_use]
    pub fn route(method: &str, path_pattern: &str) -> Self {
        Self {
            http_method: Some(method.to_string()),
            path_pattern: Some(path_pattern.to_string()),
            ..Self::of(ElementKind::ApiRouteDefinition)
        }
    }

    /// Set the declaring file.
    #[must_use]
    pub fn in_file(mut self, path: &str) -> Self {
        self.file_path = Some(path.to_string());
        self
    }

    /// Set the start position.
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the source language.
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// The simple name the entity is known by: its declared name, the
    /// position-derived name for anonymous functions and classes, or the
    /// table/route specific fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedElement`] if no name can be derived.
    pub fn effective_name(&self) -> Result<String> {
        let kind = self.require_kind()?;
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }
        if kind == ElementKind::File {
            let path = self.require_path()?;
            return Ok(path.rsplit('/').next().unwrap_or(&path).to_string());
        }
        if kind == ElementKind::ApiRouteDefinition {
            return Ok(format!("{} {}", self.route_method(), self.require_pattern()?));
        }
        match self.position {
            Some(pos) if kind.allows_anonymous() => Ok(format!("anon@{}:{}", pos.line, pos.column)),
            _ => Err(Error::malformed(None, format!("{kind} descriptor has no name"))),
        }
    }

    fn require_kind(&self) -> Result<ElementKind> {
        self.kind
            .ok_or_else(|| Error::malformed(self.name.as_deref(), "descriptor has no kind"))
    }

    fn require_path(&self) -> Result<String> {
        self.file_path
            .as_deref()
            .map(normalize_path)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::malformed(self.name.as_deref(), "descriptor has no file path"))
    }

    fn require_pattern(&self) -> Result<&str> {
        self.path_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::malformed(None, "route descriptor has no path pattern"))
    }

    fn route_method(&self) -> String {
        self.http_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map_or_else(|| ANY_METHOD.to_string(), str::to_ascii_uppercase)
    }

    fn arity_suffix(&self, kind: ElementKind) -> String {
        if kind.has_arity() {
            format!("(#{})", self.parameter_count.unwrap_or(0))
        } else {
            String::new()
        }
    }

    fn scope_path(&self, kind: ElementKind) -> Result<String> {
        match kind {
            ElementKind::File => self.require_path(),
            ElementKind::DatabaseTable => {
                let schema = self.schema_name.as_deref().unwrap_or("").trim();
                Ok(format!("{schema}.{}", self.effective_name()?))
            }
            ElementKind::ApiRouteDefinition => {
                Ok(format!("{}:{}", self.route_method(), self.require_pattern()?))
            }
            k if k.is_member() => {
                let parent = self.parent_id.as_ref().ok_or_else(|| {
                    Error::malformed(self.name.as_deref(), format!("{k} descriptor has no parent"))
                })?;
                let parent_scope = parent.validate()?.scope_path;
                Ok(format!(
                    "{parent_scope}.{}{}",
                    self.effective_name()?,
                    self.arity_suffix(k)
                ))
            }
            k => Ok(format!(
                "{}:{}{}",
                self.require_path()?,
                self.effective_name()?,
                self.arity_suffix(k)
            )),
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Normalize a file path for use inside an id.
///
/// Backslashes become forward slashes, the characters `:*?<>"|` are removed,
/// duplicate slashes collapse and a leading `./` is dropped. Case is kept:
/// folding it would merge distinct files on case-sensitive filesystems.
///
/// ```
/// use knit::identity::normalize_path;
///
/// assert_eq!(normalize_path(r".\src\api\client.ts"), "src/api/client.ts");
/// assert_eq!(normalize_path("C:\\Repo\\Main.java"), "C/Repo/Main.java");
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if DISALLOWED_PATH_CHARS.contains(&c) || (c == '/' && out.ends_with('/')) {
            continue;
        }
        out.push(c);
    }
    while let Some(rest) = out.strip_prefix("./") {
        out = rest.to_string();
    }
    out
}

fn validate_project(project_id: &str) -> Result<&str> {
    let project = project_id.trim();
    if project.is_empty() || project.contains('/') || project.contains(':') {
        return Err(Error::malformed(
            None,
            format!("invalid project id {project_id:?}"),
        ));
    }
    Ok(project)
}

/// Compute the canonical id of an entity.
///
/// Pure: the same descriptor and project always yield the same id, in any
/// process, in any order.
///
/// # Errors
///
/// Returns [`Error::MalformedElement`] if the project id is empty or contains
/// `/` or `:`, or the descriptor lacks a field its kind requires.
///
/// ```
/// use knit::identity::{EntityDescriptor, generate_canonical_id};
///
/// let id = generate_canonical_id(&EntityDescriptor::function("src/a.ts", "load", 2), "shop")?;
/// assert_eq!(id.as_str(), "knit://shop/function:src/a.ts:load(#2)");
/// # Ok::<(), knit::Error>(())
/// ```
pub fn generate_canonical_id(descriptor: &EntityDescriptor, project_id: &str) -> Result<CanonicalId> {
    let project = validate_project(project_id)?;
    let kind = descriptor.require_kind()?;
    let scope_path = descriptor.scope_path(kind)?;
    Ok(CanonicalId::from_parts(project, kind, &scope_path))
}

// ============================================================================
// GID
// ============================================================================

/// Compact, language-tagged hash of a canonical id: `{prefix}_{hex}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// The GID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix used when an entity's language is unknown.
pub const UNKNOWN_LANGUAGE_PREFIX: &str = "unk";

/// Derives GIDs from canonical ids.
///
/// The digest is SHA-256 rendered as lowercase hex. Width is the number of
/// hex characters kept; the default keeps all 64 (256 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GidHasher {
    width: usize,
}

impl Default for GidHasher {
    fn default() -> Self {
        Self::full()
    }
}

impl GidHasher {
    /// Hex characters in a full SHA-256 digest.
    pub const FULL_WIDTH: usize = 64;

    /// Narrowest width accepted (64 bits).
    pub const MIN_WIDTH: usize = 16;

    /// A hasher keeping the full digest.
    #[must_use]
    pub fn full() -> Self {
        Self {
            width: Self::FULL_WIDTH,
        }
    }

    /// A hasher keeping `width` hex characters, or the full digest for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `width` is outside
    /// `MIN_WIDTH..=FULL_WIDTH`.
    pub fn with_width(width: Option<usize>) -> Result<Self> {
        match width {
            None => Ok(Self::full()),
            Some(w) if (Self::MIN_WIDTH..=Self::FULL_WIDTH).contains(&w) => Ok(Self { width: w }),
            Some(w) => Err(Error::Config(format!(
                "GID width {w} outside {}..={}",
                Self::MIN_WIDTH,
                Self::FULL_WIDTH
            ))),
        }
    }

    /// Configured width in hex characters.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Derive the GID of `id`.
    #[must_use]
    pub fn gid(&self, language: Option<Language>, id: &CanonicalId) -> Gid {
        let digest = Sha256::digest(id.as_str().as_bytes());
        let prefix = language.map_or(UNKNOWN_LANGUAGE_PREFIX, |l| l.gid_prefix());

        let mut out = String::with_capacity(prefix.len() + 1 + self.width);
        out.push_str(prefix);
        out.push('_');
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out.truncate(prefix.len() + 1 + self.width);
        Gid(out)
    }
}

// ============================================================================
// Collision tracking
// ============================================================================

/// The identity-relevant facts behind an id, for collision checks.
///
/// The declaring file only counts for file-scoped kinds: a table altered in
/// a second migration, or one route served by two services, is still one
/// entity.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    kind: ElementKind,
    file_path: Option<String>,
    name: String,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.kind, self.name)?;
        if let Some(path) = &self.file_path {
            write!(f, " in {path:?}")?;
        }
        Ok(())
    }
}

/// Run-scoped record of every identity seen, used to detect collisions.
///
/// A collision means the identity scheme mapped two different entities onto
/// one key; the run cannot produce a convergent graph and must stop.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    entities: HashMap<CanonicalId, Fingerprint>,
    gids: HashMap<Gid, CanonicalId>,
}

impl IdentityLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` names the entity `(kind, file_path, name)`.
    ///
    /// Recording the same entity twice is fine. `file_path` is ignored for
    /// kinds whose ids carry no file (tables, columns, routes).
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityCollision`] if `id` was already recorded for
    /// a different entity.
    pub fn record_entity(
        &mut self,
        id: &CanonicalId,
        kind: ElementKind,
        file_path: &str,
        name: &str,
    ) -> Result<()> {
        let fingerprint = Fingerprint {
            kind,
            file_path: id.file_path().map(|_| normalize_path(file_path)),
            name: name.to_string(),
        };
        match self.entities.get(id) {
            Some(existing) if *existing != fingerprint => Err(Error::IdentityCollision {
                id: id.to_string(),
                first: existing.to_string(),
                second: fingerprint.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.entities.insert(id.clone(), fingerprint);
                Ok(())
            }
        }
    }

    /// Record that `gid` was derived from `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityCollision`] if `gid` was already derived from
    /// a different canonical id.
    pub fn record_gid(&mut self, gid: &Gid, id: &CanonicalId) -> Result<()> {
        match self.gids.get(gid) {
            Some(existing) if existing != id => Err(Error::IdentityCollision {
                id: gid.to_string(),
                first: existing.to_string(),
                second: id.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.gids.insert(gid.clone(), id.clone());
                Ok(())
            }
        }
    }

    /// Number of distinct entities recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn id(d: &EntityDescriptor) -> String {
        generate_canonical_id(d, "shop").unwrap().to_string()
    }

    #[rstest]
    #[case::backslashes(r"src\api\client.ts", "src/api/client.ts")]
    #[case::leading_dot(r"./src/a.ts", "src/a.ts")]
    #[case::drive_letter(r"C:\repo\Main.java", "C/repo/Main.java")]
    #[case::disallowed(r#"we?ird<na>me|"x"*.py"#, "weirdname.py")]
    #[case::double_slash("src//lib///mod.rs", "src/lib/mod.rs")]
    #[case::case_kept("Src/Models/User.cs", "Src/Models/User.cs")]
    fn normalizes_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn scope_paths_by_kind() {
        let file = EntityDescriptor::file(r"src\cart.ts");
        assert_eq!(id(&file), "knit://shop/file:src/cart.ts");

        let func = EntityDescriptor::function("src/cart.ts", "total", 1);
        assert_eq!(id(&func), "knit://shop/function:src/cart.ts:total(#1)");

        let class = EntityDescriptor::named(ElementKind::Class, "src/cart.ts", "Cart");
        let class_id = generate_canonical_id(&class, "shop").unwrap();
        assert_eq!(class_id.as_str(), "knit://shop/class:src/cart.ts:Cart");

        let method = EntityDescriptor::method(&class_id, "add", 2);
        assert_eq!(id(&method), "knit://shop/method:src/cart.ts:Cart.add(#2)");

        let prop = EntityDescriptor::member(ElementKind::Property, &class_id, "items");
        assert_eq!(id(&prop), "knit://shop/property:src/cart.ts:Cart.items");

        let table = EntityDescriptor::table(Some("public"), "users");
        let table_id = generate_canonical_id(&table, "shop").unwrap();
        assert_eq!(table_id.as_str(), "knit://shop/databasetable:public.users");

        let column = EntityDescriptor::column(&table_id, "id");
        assert_eq!(id(&column), "knit://shop/databasecolumn:public.users.id");

        let route = EntityDescriptor::route("get", "/api/data/:id");
        assert_eq!(id(&route), "knit://shop/apiroutedefinition:GET:/api/data/:id");
    }

    #[test]
    fn table_without_schema_uses_empty_schema() {
        let table = EntityDescriptor::table(None, "orders");
        assert_eq!(id(&table), "knit://shop/databasetable:.orders");
    }

    #[test]
    fn arity_distinguishes_overloads() {
        let one = EntityDescriptor::function("A.java", "run", 1);
        let two = EntityDescriptor::function("A.java", "run", 2);
        assert_ne!(id(&one), id(&two));
    }

    #[test]
    fn kind_tag_distinguishes_same_named_entities() {
        let var = EntityDescriptor::named(ElementKind::Variable, "a.py", "config");
        let func = EntityDescriptor::function("a.py", "config", 0);
        assert_ne!(id(&var), id(&func));
    }

    #[test]
    fn anonymous_entities_are_named_by_position() {
        let first = EntityDescriptor::anonymous_function("a.js", Position::new(3, 5), 0);
        let second = EntityDescriptor::anonymous_function("a.js", Position::new(9, 1), 0);
        assert_eq!(id(&first), "knit://shop/function:a.js:anon@3:5(#0)");
        assert_ne!(id(&first), id(&second));
    }

    #[rstest]
    #[case::no_kind(EntityDescriptor { name: Some("f".into()), ..Default::default() })]
    #[case::no_name(EntityDescriptor { kind: Some(ElementKind::Variable), file_path: Some("a.ts".into()), ..Default::default() })]
    #[case::no_path(EntityDescriptor { kind: Some(ElementKind::Class), name: Some("C".into()), ..Default::default() })]
    #[case::member_without_parent(EntityDescriptor { kind: Some(ElementKind::Method), name: Some("m".into()), ..Default::default() })]
    #[case::route_without_pattern(EntityDescriptor { kind: Some(ElementKind::ApiRouteDefinition), http_method: Some("GET".into()), ..Default::default() })]
    #[case::anonymous_variable(EntityDescriptor { kind: Some(ElementKind::Variable), file_path: Some("a.ts".into()), position: Some(Position::new(1, 1)), ..Default::default() })]
    fn refuses_to_mint_ids_for_malformed_descriptors(#[case] descriptor: EntityDescriptor) {
        let err = generate_canonical_id(&descriptor, "shop").unwrap_err();
        assert!(matches!(err, Error::MalformedElement { .. }), "{err}");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("org/shop")]
    #[case("shop:v2")]
    fn rejects_invalid_project_ids(#[case] project: &str) {
        let d = EntityDescriptor::file("a.ts");
        assert!(generate_canonical_id(&d, project).is_err());
    }

    #[test]
    fn parse_round_trips_generated_ids() {
        let method_parent =
            generate_canonical_id(&EntityDescriptor::named(ElementKind::Class, "m.py", "M"), "p")
                .unwrap();
        let generated = generate_canonical_id(&EntityDescriptor::method(&method_parent, "go", 0), "p")
            .unwrap();
        let parsed = CanonicalId::parse(generated.as_str()).unwrap();
        assert_eq!(parsed, generated);

        assert_eq!(parsed.file_path(), Some("m.py"));
        let parts = parsed.parts().unwrap();
        assert_eq!(parts.project, "p");
        assert_eq!(parts.kind, ElementKind::Method);
        assert_eq!(parts.scope_path, "m.py:M.go(#0)");
    }

    #[rstest]
    #[case("")]
    #[case("function:a.ts:f")]
    #[case("knit://p/nosuchkind:x")]
    #[case("knit://p/Function:a.ts:f")]
    #[case("knit:///function:a.ts:f")]
    #[case("knit://p/function:")]
    fn parse_rejects_malformed_ids(#[case] raw: &str) {
        assert!(CanonicalId::parse(raw).is_err());
    }

    #[test]
    fn gid_is_prefixed_full_width_hex_by_default() {
        let id = CanonicalId::parse("knit://shop/file:src/a.ts").unwrap();
        let gid = GidHasher::default().gid(Some(Language::TypeScript), &id);
        let (prefix, hex) = gid.as_str().split_once('_').unwrap();
        assert_eq!(prefix, "ts");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn truncated_gid_is_prefix_of_full_gid() {
        let id = CanonicalId::parse("knit://shop/file:src/a.ts").unwrap();
        let full = GidHasher::full().gid(None, &id);
        let short = GidHasher::with_width(Some(16)).unwrap().gid(None, &id);
        assert!(full.as_str().starts_with(short.as_str()));
        assert_eq!(short.as_str().len(), "unk_".len() + 16);
    }

    #[rstest]
    #[case(Some(8))]
    #[case(Some(65))]
    fn gid_width_out_of_range_is_config_error(#[case] width: Option<usize>) {
        assert!(matches!(GidHasher::with_width(width), Err(Error::Config(_))));
    }

    #[test]
    fn ledger_accepts_repeats_and_rejects_collisions() {
        let id = CanonicalId::parse("knit://p/function:a.ts:f(#0)").unwrap();
        let mut ledger = IdentityLedger::new();
        ledger.record_entity(&id, ElementKind::Function, "a.ts", "f").unwrap();
        ledger.record_entity(&id, ElementKind::Function, "./a.ts", "f").unwrap();
        assert_eq!(ledger.len(), 1);

        let err = ledger
            .record_entity(&id, ElementKind::Function, "b.ts", "f")
            .unwrap_err();
        assert!(matches!(err, Error::IdentityCollision { .. }));

        let gid = GidHasher::full().gid(None, &id);
        let other = CanonicalId::parse("knit://p/function:a.ts:g(#0)").unwrap();
        ledger.record_gid(&gid, &id).unwrap();
        ledger.record_gid(&gid, &id).unwrap();
        assert!(ledger.record_gid(&gid, &other).is_err());
    }

    #[rstest]
    #[case("knit://p/databasetable:.users", ElementKind::DatabaseTable, "users")]
    #[case("knit://p/databasecolumn:.users.id", ElementKind::DatabaseColumn, "id")]
    #[case("knit://p/apiroutedefinition:GET:/health", ElementKind::ApiRouteDefinition, "GET /health")]
    fn ledger_ignores_file_for_unscoped_kinds(
        #[case] raw: &str,
        #[case] kind: ElementKind,
        #[case] name: &str,
    ) {
        let id = CanonicalId::parse(raw).unwrap();
        let mut ledger = IdentityLedger::new();
        ledger.record_entity(&id, kind, "db/001_init.sql", name).unwrap();
        ledger.record_entity(&id, kind, "db/002_alter.sql", name).unwrap();
        assert_eq!(ledger.len(), 1);

        let err = ledger.record_entity(&id, kind, "db/001_init.sql", "other").unwrap_err();
        assert!(matches!(err, Error::IdentityCollision { .. }));
    }

    proptest! {
        #[test]
        fn canonical_id_is_deterministic(
            path in "[a-zA-Z0-9_./\\\\-]{1,40}",
            name in "[a-zA-Z_][a-zA-Z0-9_]{0,20}",
            arity in 0usize..8,
        ) {
            prop_assume!(!normalize_path(&path).is_empty());
            let d = EntityDescriptor::function(&path, &name, arity);
            let first = generate_canonical_id(&d, "proj").unwrap();
            let second = generate_canonical_id(&d.clone(), "proj").unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(first.validate().is_ok());
            prop_assert_eq!(
                GidHasher::full().gid(None, &first),
                GidHasher::full().gid(None, &second)
            );
        }
    }
}
