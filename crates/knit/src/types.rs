//! Shared vocabulary for the knit graph.
//!
//! These types are the closed sets every extractor, the resolver and the
//! stores agree on:
//! - **`ElementKind`**: what an identified node is
//! - **`RelationshipKind`**: what an edge (or edge proposal) means
//! - **`Language`**: which extractor produced a file, and the GID prefix
//! - **`Location`**: where in a file an element or proposal sits
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Kinds | Enums, not strings | A typo in an extractor fails to decode instead of minting a new kind |
//! | Properties | `serde_json::Map` | Extractor-specific facts pass through untouched; key order is sorted |
//! | Location | Ordered | The resolver's tie-break sorts by position |

use serde::{Deserialize, Serialize};

/// Free-form element and relationship properties.
///
/// Backed by a sorted map so serialized output is stable.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Property key linking a child element to its containing element.
pub const PARENT_ID: &str = "parentId";

/// Property key linking a route definition to its handler.
pub const HANDLER_ID: &str = "handlerId";

/// Property key holding a route's or fetch's HTTP method.
pub const HTTP_METHOD: &str = "httpMethod";

/// Property key holding a route's path pattern.
pub const PATH_PATTERN: &str = "pathPattern";

/// Property key holding a table's schema name.
pub const SCHEMA_NAME: &str = "schemaName";

/// Property key listing the tables a query references.
pub const TARGET_TABLES: &str = "targetTables";

/// Property key listing the columns a query references.
pub const TARGET_COLUMNS: &str = "targetColumns";

// ============================================================================
// Element kinds
// ============================================================================

/// Kinds of identified entities.
///
/// Parameters are deliberately absent: they live in the owning element's
/// properties, never as nodes of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    /// A source file
    File,
    /// A module, namespace or package declared inside a file
    Module,
    /// Free function, including anonymous function expressions
    Function,
    /// Function owned by a class or interface
    Method,
    /// Class, struct or record type
    Class,
    /// Interface, protocol or trait
    Interface,
    /// Enumeration type
    Enum,
    /// Variable or constant
    Variable,
    /// Field or property owned by a type
    Property,
    /// Import or use statement
    Import,
    /// Member of an annotation type
    AnnotationMember,
    /// SQL table
    DatabaseTable,
    /// SQL column, owned by a table
    DatabaseColumn,
    /// HTTP route served by the codebase
    ApiRouteDefinition,
}

impl ElementKind {
    /// Every kind, in declaration order.
    pub const ALL: [ElementKind; 14] = [
        Self::File,
        Self::Module,
        Self::Function,
        Self::Method,
        Self::Class,
        Self::Interface,
        Self::Enum,
        Self::Variable,
        Self::Property,
        Self::Import,
        Self::AnnotationMember,
        Self::DatabaseTable,
        Self::DatabaseColumn,
        Self::ApiRouteDefinition,
    ];

    /// Lower-case tag used inside canonical ids.
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Variable => "variable",
            Self::Property => "property",
            Self::Import => "import",
            Self::AnnotationMember => "annotationmember",
            Self::DatabaseTable => "databasetable",
            Self::DatabaseColumn => "databasecolumn",
            Self::ApiRouteDefinition => "apiroutedefinition",
        }
    }

    /// Node label used by graph stores.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Module => "Module",
            Self::Function => "Function",
            Self::Method => "Method",
            Self::Class => "Class",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::Variable => "Variable",
            Self::Property => "Property",
            Self::Import => "Import",
            Self::AnnotationMember => "AnnotationMember",
            Self::DatabaseTable => "DatabaseTable",
            Self::DatabaseColumn => "DatabaseColumn",
            Self::ApiRouteDefinition => "ApiRouteDefinition",
        }
    }

    /// Parse a kind from its id tag or label, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.to_ascii_lowercase().replace(['_', '-'], "");
        Self::ALL.into_iter().find(|k| k.as_tag() == wanted)
    }

    /// Kinds whose identity is scoped under a parent element.
    #[must_use]
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            Self::Method | Self::Property | Self::DatabaseColumn | Self::AnnotationMember
        )
    }

    /// Kinds whose identity includes an arity marker.
    #[must_use]
    pub fn has_arity(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    /// Kinds that may be unnamed in source (function and class expressions).
    #[must_use]
    pub fn allows_anonymous(&self) -> bool {
        matches!(self, Self::Function | Self::Class)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Relationship kinds
// ============================================================================

/// How a relationship kind is turned into directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Look the target pattern up by name, same file first.
    Symbolic,
    /// Match a URL against route definitions.
    RoutePattern,
    /// Match table and column names listed in properties.
    Database,
    /// Only ever produced by the resolver itself.
    Derived,
}

/// Kinds of relationships, both proposed (by extractors) and resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Invocation of a function, method or constructor
    Calls,
    /// Read of a variable or property
    Reads,
    /// Write to a variable or property
    Writes,
    /// Any other by-name use
    Uses,
    /// Inheritance
    Extends,
    /// Interface implementation
    Implements,
    /// Import of a file, module or exported symbol
    Imports,
    /// Proposal: an HTTP request to a URL
    ApiFetch,
    /// Proposal: a SQL query naming tables and columns
    DatabaseQuery,
    /// Resolved `ApiFetch`
    Fetches,
    /// Resolved table reference of a `DatabaseQuery`
    ReferencesTable,
    /// Resolved column reference of a `DatabaseQuery`
    ReferencesColumn,
    /// Structural containment derived from `parentId`
    Contains,
    /// Table to column containment derived from `parentId`
    HasColumn,
    /// Route to handler link derived from `handlerId`
    HandledBy,
}

impl RelationshipKind {
    /// Every kind, in declaration order.
    pub const ALL: [RelationshipKind; 15] = [
        Self::Calls,
        Self::Reads,
        Self::Writes,
        Self::Uses,
        Self::Extends,
        Self::Implements,
        Self::Imports,
        Self::ApiFetch,
        Self::DatabaseQuery,
        Self::Fetches,
        Self::ReferencesTable,
        Self::ReferencesColumn,
        Self::Contains,
        Self::HasColumn,
        Self::HandledBy,
    ];

    /// Parse a kind from its wire name, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(s))
    }

    /// Name used on the wire and as the edge type in stores.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "Calls",
            Self::Reads => "Reads",
            Self::Writes => "Writes",
            Self::Uses => "Uses",
            Self::Extends => "Extends",
            Self::Implements => "Implements",
            Self::Imports => "Imports",
            Self::ApiFetch => "ApiFetch",
            Self::DatabaseQuery => "DatabaseQuery",
            Self::Fetches => "Fetches",
            Self::ReferencesTable => "ReferencesTable",
            Self::ReferencesColumn => "ReferencesColumn",
            Self::Contains => "Contains",
            Self::HasColumn => "HasColumn",
            Self::HandledBy => "HandledBy",
        }
    }

    /// How proposals of this kind are resolved.
    #[must_use]
    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            Self::Calls
            | Self::Reads
            | Self::Writes
            | Self::Uses
            | Self::Extends
            | Self::Implements
            | Self::Imports => ResolutionStrategy::Symbolic,
            Self::ApiFetch => ResolutionStrategy::RoutePattern,
            Self::DatabaseQuery => ResolutionStrategy::Database,
            Self::Fetches
            | Self::ReferencesTable
            | Self::ReferencesColumn
            | Self::Contains
            | Self::HasColumn
            | Self::HandledBy => ResolutionStrategy::Derived,
        }
    }

    /// Element kinds a symbolic proposal of this kind may resolve to.
    ///
    /// Empty for non-symbolic kinds.
    #[must_use]
    pub fn target_kinds(&self) -> &'static [ElementKind] {
        use ElementKind as K;
        match self {
            Self::Calls => &[K::Function, K::Method, K::Class],
            Self::Reads | Self::Writes => &[K::Variable, K::Property],
            Self::Uses => &[
                K::Variable,
                K::Property,
                K::Function,
                K::Method,
                K::Class,
                K::Interface,
                K::Enum,
                K::Module,
            ],
            Self::Extends => &[K::Class, K::Interface],
            Self::Implements => &[K::Interface, K::Class],
            Self::Imports => &[
                K::File,
                K::Module,
                K::Class,
                K::Interface,
                K::Enum,
                K::Function,
                K::Variable,
            ],
            _ => &[],
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Languages
// ============================================================================

/// Source languages with extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// TypeScript (`.ts`, `.tsx`)
    TypeScript,
    /// JavaScript (`.js`, `.jsx`, `.mjs`, `.cjs`)
    JavaScript,
    /// Python (`.py`)
    Python,
    /// Java (`.java`)
    Java,
    /// Go (`.go`)
    Go,
    /// Rust (`.rs`)
    Rust,
    /// C# (`.cs`)
    CSharp,
    /// SQL scripts and migrations (`.sql`)
    Sql,
}

impl Language {
    /// Short tag prefixed to GIDs.
    #[must_use]
    pub fn gid_prefix(&self) -> &'static str {
        match self {
            Self::TypeScript => "ts",
            Self::JavaScript => "js",
            Self::Python => "py",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rs",
            Self::CSharp => "cs",
            Self::Sql => "sql",
        }
    }

    /// Node label used by graph stores.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::TypeScript => "TypeScript",
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::CSharp => "CSharp",
            Self::Sql => "Sql",
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::CSharp => "csharp",
            Self::Sql => "sql",
        }
    }

    /// Parse a wire name or GID prefix, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        [
            Self::TypeScript,
            Self::JavaScript,
            Self::Python,
            Self::Java,
            Self::Go,
            Self::Rust,
            Self::CSharp,
            Self::Sql,
        ]
        .into_iter()
        .find(|l| l.as_str() == lower || l.gid_prefix() == lower)
    }

    /// Detect language from file extension.
    ///
    /// # Returns
    ///
    /// `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" | "pyi" => Some(Self::Python),
            "java" => Some(Self::Java),
            "go" => Some(Self::Go),
            "rs" => Some(Self::Rust),
            "cs" => Some(Self::CSharp),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Locations
// ============================================================================

/// A line/column position (both 1-based as reported by extractors).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A source range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Location {
    /// First position covered
    pub start: Position,
    /// Last position covered
    pub end: Position,
}

impl Location {
    /// Create a location from start and end line/column pairs.
    #[must_use]
    pub const fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: Position::new(start_line, start_column),
            end: Position::new(end_line, end_column),
        }
    }

    /// A zero-width location at a single position.
    #[must_use]
    pub const fn at(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_kind_parse_accepts_tag_and_label() {
        assert_eq!(ElementKind::parse("function"), Some(ElementKind::Function));
        assert_eq!(ElementKind::parse("DatabaseTable"), Some(ElementKind::DatabaseTable));
        assert_eq!(ElementKind::parse("database_column"), Some(ElementKind::DatabaseColumn));
        assert_eq!(ElementKind::parse("parameter"), None);
    }

    #[test]
    fn every_kind_tag_is_lowercase_and_unique() {
        let mut tags: Vec<_> = ElementKind::ALL.iter().map(ElementKind::as_tag).collect();
        assert!(tags.iter().all(|t| t.chars().all(|c| c.is_ascii_lowercase())));
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), ElementKind::ALL.len());
    }

    #[test]
    fn element_kind_serializes_as_label() {
        let json = serde_json::to_string(&ElementKind::ApiRouteDefinition).unwrap();
        assert_eq!(json, "\"ApiRouteDefinition\"");
    }

    #[test]
    fn derived_kinds_have_no_symbolic_targets() {
        for kind in [
            RelationshipKind::Contains,
            RelationshipKind::HasColumn,
            RelationshipKind::HandledBy,
            RelationshipKind::Fetches,
        ] {
            assert_eq!(kind.strategy(), ResolutionStrategy::Derived);
            assert!(kind.target_kinds().is_empty());
        }
    }

    #[test]
    fn relationship_kind_parse_matches_wire_names() {
        for kind in RelationshipKind::ALL {
            assert_eq!(RelationshipKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RelationshipKind::parse("hascolumn"), Some(RelationshipKind::HasColumn));
        assert_eq!(RelationshipKind::parse("Owns"), None);
    }

    #[test]
    fn language_parse_round_trips_names_and_prefixes() {
        assert_eq!(Language::parse("typescript"), Some(Language::TypeScript));
        assert_eq!(Language::parse("py"), Some(Language::Python));
        assert_eq!(Language::parse("CSharp"), Some(Language::CSharp));
        assert_eq!(Language::from_extension("TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn locations_order_by_start_then_end() {
        let a = Location::new(3, 1, 9, 1);
        let b = Location::new(3, 5, 4, 1);
        let c = Location::new(10, 1, 10, 2);
        let mut v = vec![c, b, a];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }
}
