//! Intermediate representation exchanged between extractors and the resolver.
//!
//! An extractor turns one source file into one [`FileIr`]: the [`Element`]s
//! it declares (each already carrying its [`CanonicalId`]) and the
//! [`PotentialRelationship`]s it proposes. Proposals name their targets
//! symbolically; only the resolver ever turns a name into an id.
//!
//! Structural facts an extractor knows locally (a column's table, a route's
//! handler) travel as element properties (`parentId`, `handlerId`), not as
//! proposals.
//!
//! The wire format is camelCase JSON, one `FileIr` per JSONL line:
//!
//! ```json
//! {"schemaVersion":1,"projectId":"shop","fileId":"knit://shop/file:src/a.ts",
//!  "filePath":"src/a.ts","language":"typescript",
//!  "elements":[{"id":"knit://shop/function:src/a.ts:load(#0)","filePath":"src/a.ts",
//!               "type":"Function","name":"load","location":{...},"properties":{}}],
//!  "potentialRelationships":[{"sourceId":"knit://shop/function:src/a.ts:load(#0)",
//!               "type":"Calls","targetPattern":"parse","location":{...},"properties":{}}]}
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identity::{CanonicalId, EntityDescriptor, generate_canonical_id, normalize_path};
use crate::types::{
    ElementKind, HANDLER_ID, HTTP_METHOD, Language, Location, PARENT_ID, PATH_PATTERN,
    Properties, RelationshipKind, SCHEMA_NAME,
};

// ============================================================================
// Element
// ============================================================================

/// An identified entity extracted from a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Canonical id; empty if the extractor omitted it
    #[serde(default)]
    pub id: CanonicalId,
    /// Declaring file
    #[serde(default)]
    pub file_path: String,
    /// Entity kind
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Simple name
    #[serde(default)]
    pub name: String,
    /// Source range
    #[serde(default)]
    pub location: Location,
    /// Extractor-specific facts, including `parentId` and `handlerId`
    #[serde(default)]
    pub properties: Properties,
}

impl Element {
    /// String property, if present and a string.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Containing element, from the `parentId` property.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.property_str(PARENT_ID).filter(|s| !s.is_empty())
    }

    /// Handler of a route, from the `handlerId` property.
    #[must_use]
    pub fn handler_id(&self) -> Option<&str> {
        self.property_str(HANDLER_ID).filter(|s| !s.is_empty())
    }

    /// Language implied by the file extension.
    #[must_use]
    pub fn language(&self) -> Option<Language> {
        let (_, ext) = self.file_path.rsplit_once('.')?;
        Language::from_extension(ext)
    }

    /// Precedence among copies of one element (same id): earliest location,
    /// then file, name and properties. The copy that sorts first is the one
    /// kept, whatever order the copies arrived in.
    pub(crate) fn duplicate_order(&self, other: &Self) -> Ordering {
        self.location
            .cmp(&other.location)
            .then_with(|| self.file_path.cmp(&other.file_path))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| properties_text(&self.properties).cmp(&properties_text(&other.properties)))
    }

    /// Check the element is identifiable: a well-formed id whose kind tag
    /// matches the element's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedElement`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let parts = self.id.validate().map_err(|_| {
            Error::malformed(
                Some(self.label().as_str()),
                format!("element has invalid id {:?}", self.id.as_str()),
            )
        })?;
        if parts.kind != self.kind {
            return Err(Error::malformed(
                Some(self.id.as_str()),
                format!("id names a {} but element is a {}", parts.kind, self.kind),
            ));
        }
        if self.name.trim().is_empty() && self.kind != ElementKind::File {
            return Err(Error::malformed(Some(self.id.as_str()), "element has no name"));
        }
        Ok(())
    }

    fn label(&self) -> String {
        if self.id.is_empty() {
            format!("{} {:?} in {:?}", self.kind, self.name, self.file_path)
        } else {
            self.id.to_string()
        }
    }
}

/// Canonical text of a property map, for total ordering.
pub(crate) fn properties_text(properties: &Properties) -> String {
    serde_json::to_string(properties).unwrap_or_default()
}

// ============================================================================
// Construction
// ============================================================================

/// An element before identification: the descriptor that determines its id
/// plus the non-identifying data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementDraft {
    /// Identity-relevant facts
    pub descriptor: EntityDescriptor,
    /// Source range
    pub location: Location,
    /// Extra properties
    pub properties: Properties,
}

impl ElementDraft {
    /// Start a draft from a descriptor.
    #[must_use]
    pub fn new(descriptor: EntityDescriptor) -> Self {
        Self {
            descriptor,
            ..Self::default()
        }
    }

    /// Set the source range.
    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Identify a draft, producing an [`Element`].
///
/// Referentially transparent: equal drafts and project ids give equal
/// elements. Identity facts that the resolver later needs (`parentId`,
/// `schemaName`, `httpMethod`, `pathPattern`) are copied into the element's
/// properties.
///
/// # Errors
///
/// Returns [`Error::MalformedElement`] if the descriptor cannot be
/// identified.
///
/// ```
/// use knit::identity::EntityDescriptor;
/// use knit::ir::{ElementDraft, add_id_to_element};
///
/// let draft = ElementDraft::new(EntityDescriptor::function("src/a.ts", "load", 0));
/// let element = add_id_to_element(draft, "shop")?;
/// assert_eq!(element.name, "load");
/// assert_eq!(element.id.as_str(), "knit://shop/function:src/a.ts:load(#0)");
/// # Ok::<(), knit::Error>(())
/// ```
pub fn add_id_to_element(draft: ElementDraft, project_id: &str) -> Result<Element> {
    let ElementDraft {
        descriptor,
        mut location,
        mut properties,
    } = draft;

    let id = generate_canonical_id(&descriptor, project_id)?;
    let name = descriptor.effective_name()?;
    let kind = id
        .kind()
        .ok_or_else(|| Error::malformed(Some(id.as_str()), "generated id has no kind"))?;

    if let Some(pos) = descriptor.position.filter(|_| location == Location::default()) {
        location = Location::at(pos.line, pos.column);
    }

    if let Some(parent) = &descriptor.parent_id {
        properties.insert(PARENT_ID.to_string(), Value::from(parent.as_str()));
    }
    if kind == ElementKind::DatabaseTable {
        let schema = descriptor.schema_name.clone().unwrap_or_default();
        properties.insert(SCHEMA_NAME.to_string(), Value::from(schema));
    }
    if kind == ElementKind::ApiRouteDefinition {
        let method = descriptor
            .http_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map_or_else(|| "ANY".to_string(), str::to_ascii_uppercase);
        properties.insert(HTTP_METHOD.to_string(), Value::from(method));
        if let Some(pattern) = &descriptor.path_pattern {
            properties.insert(PATH_PATTERN.to_string(), Value::from(pattern.trim()));
        }
    }

    let file_path = descriptor.file_path.as_deref().map_or_else(
        || id.file_path().unwrap_or_default().to_string(),
        normalize_path,
    );

    Ok(Element {
        id,
        file_path,
        kind,
        name,
        location,
        properties,
    })
}

// ============================================================================
// PotentialRelationship
// ============================================================================

/// An unresolved edge proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialRelationship {
    /// Element the edge starts from
    pub source_id: CanonicalId,
    /// Proposed relationship kind
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// Symbolic target: a name, URL path or table name
    #[serde(default)]
    pub target_pattern: String,
    /// Where the reference occurs
    #[serde(default)]
    pub location: Location,
    /// Extra facts (`httpMethod`, `targetTables`, ...)
    #[serde(default)]
    pub properties: Properties,
}

impl PotentialRelationship {
    /// Propose a relationship from `source_id` to whatever `target_pattern`
    /// names.
    #[must_use]
    pub fn new(source_id: CanonicalId, kind: RelationshipKind, target_pattern: &str) -> Self {
        Self {
            source_id,
            kind,
            target_pattern: target_pattern.to_string(),
            location: Location::default(),
            properties: Properties::new(),
        }
    }

    /// Set the reference location.
    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// String property, if present and a string.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// A list property. Accepts a JSON array of strings or a single
    /// comma-separated string; blanks are dropped.
    #[must_use]
    pub fn property_list(&self, key: &str) -> Vec<String> {
        match self.properties.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// FileIr
// ============================================================================

/// Everything one extractor run produced for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIr {
    /// IR format version
    pub schema_version: u32,
    /// Project every id in this record belongs to
    pub project_id: String,
    /// Canonical id of the file element
    #[serde(default)]
    pub file_id: CanonicalId,
    /// Path of the analyzed file
    pub file_path: String,
    /// Language of the analyzed file
    pub language: Language,
    /// Identified entities
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Edge proposals
    #[serde(default)]
    pub potential_relationships: Vec<PotentialRelationship>,
}

impl FileIr {
    /// IR format version this build reads and writes.
    pub const SCHEMA_VERSION: u32 = 1;

    /// An empty record for `file_path`, with its file id filled in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedElement`] if the project id or path cannot
    /// be identified.
    pub fn new(project_id: &str, file_path: &str, language: Language) -> Result<Self> {
        let file_id = generate_canonical_id(&EntityDescriptor::file(file_path), project_id)?;
        Ok(Self {
            schema_version: Self::SCHEMA_VERSION,
            project_id: project_id.to_string(),
            file_id,
            file_path: normalize_path(file_path),
            language,
            elements: Vec::new(),
            potential_relationships: Vec::new(),
        })
    }

    /// Identify a draft and add it to this record.
    ///
    /// # Errors
    ///
    /// Propagates [`add_id_to_element`] failures.
    pub fn push_draft(&mut self, draft: ElementDraft) -> Result<CanonicalId> {
        let element = add_id_to_element(draft, &self.project_id)?;
        let id = element.id.clone();
        self.elements.push(element);
        Ok(id)
    }

    /// Add a relationship proposal.
    pub fn propose(&mut self, relationship: PotentialRelationship) {
        self.potential_relationships.push(relationship);
    }

    /// Check the record can be resolved: supported schema version,
    /// identifiable elements, well-formed relationship sources.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSchema`] or [`Error::MalformedElement`].
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != Self::SCHEMA_VERSION {
            return Err(Error::UnsupportedSchema {
                file_path: self.file_path.clone(),
                found: self.schema_version,
                supported: Self::SCHEMA_VERSION,
            });
        }
        for element in &self.elements {
            element.validate()?;
        }
        for relationship in &self.potential_relationships {
            relationship.source_id.validate().map_err(|_| {
                Error::malformed(
                    Some(relationship.source_id.as_str()),
                    format!(
                        "{} proposal for {:?} in {} has an invalid source id",
                        relationship.kind, relationship.target_pattern, self.file_path
                    ),
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, TARGET_TABLES};
    use serde_json::json;

    #[test]
    fn add_id_to_element_is_referentially_transparent() {
        let draft = ElementDraft::new(EntityDescriptor::function(r"src\util.ts", "parse", 1))
            .at(Location::new(4, 1, 9, 2))
            .with_property("exported", true);

        let a = add_id_to_element(draft.clone(), "shop").unwrap();
        let b = add_id_to_element(draft, "shop").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.file_path, "src/util.ts");
        assert_eq!(a.kind, ElementKind::Function);
        assert_eq!(a.properties["exported"], json!(true));
    }

    #[test]
    fn structural_facts_become_properties() {
        let table = add_id_to_element(
            ElementDraft::new(EntityDescriptor::table(Some("public"), "users").in_file("db/schema.sql")),
            "shop",
        )
        .unwrap();
        assert_eq!(table.property_str(SCHEMA_NAME), Some("public"));
        assert_eq!(table.file_path, "db/schema.sql");

        let column =
            add_id_to_element(ElementDraft::new(EntityDescriptor::column(&table.id, "id")), "shop")
                .unwrap();
        assert_eq!(column.parent_id(), Some(table.id.as_str()));

        let route = add_id_to_element(
            ElementDraft::new(EntityDescriptor::route("post", "/api/users").in_file("server.js")),
            "shop",
        )
        .unwrap();
        assert_eq!(route.property_str(HTTP_METHOD), Some("POST"));
        assert_eq!(route.property_str(PATH_PATTERN), Some("/api/users"));
        assert_eq!(route.name, "POST /api/users");
    }

    #[test]
    fn anonymous_draft_takes_location_from_position() {
        let draft = ElementDraft::new(EntityDescriptor::anonymous_function("a.js", Position::new(7, 3), 0));
        let element = add_id_to_element(draft, "p").unwrap();
        assert_eq!(element.name, "anon@7:3");
        assert_eq!(element.location, Location::at(7, 3));
    }

    #[test]
    fn element_wire_format_uses_type_and_camel_case() {
        let element = add_id_to_element(
            ElementDraft::new(EntityDescriptor::named(ElementKind::Class, "a.py", "Cart")),
            "p",
        )
        .unwrap();
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["type"], json!("Class"));
        assert_eq!(value["filePath"], json!("a.py"));
        assert_eq!(value["id"], json!("knit://p/class:a.py:Cart"));
    }

    #[test]
    fn element_without_id_decodes_and_fails_validation() {
        let element: Element =
            serde_json::from_value(json!({"filePath": "a.ts", "type": "Function", "name": "f"}))
                .unwrap();
        let err = element.validate().unwrap_err();
        assert!(matches!(err, Error::MalformedElement { .. }));
        assert!(err.to_string().contains("Function \"f\""));
    }

    #[test]
    fn element_whose_id_kind_disagrees_is_malformed() {
        let mut element = add_id_to_element(
            ElementDraft::new(EntityDescriptor::named(ElementKind::Class, "a.py", "Cart")),
            "p",
        )
        .unwrap();
        element.kind = ElementKind::Interface;
        assert!(element.validate().is_err());
    }

    #[test]
    fn property_list_accepts_arrays_and_comma_strings() {
        let source = CanonicalId::parse("knit://p/function:q.py:run(#0)").unwrap();
        let rel = PotentialRelationship::new(source.clone(), RelationshipKind::DatabaseQuery, "")
            .with_property(TARGET_TABLES, json!(["users", " ", "orders"]));
        assert_eq!(rel.property_list(TARGET_TABLES), vec!["users", "orders"]);

        let rel = PotentialRelationship::new(source, RelationshipKind::DatabaseQuery, "")
            .with_property(TARGET_TABLES, "users, orders");
        assert_eq!(rel.property_list(TARGET_TABLES), vec!["users", "orders"]);
        assert!(rel.property_list("missing").is_empty());
    }

    #[test]
    fn file_ir_validation() {
        let mut ir = FileIr::new("shop", "src/a.ts", Language::TypeScript).unwrap();
        let f = ir
            .push_draft(ElementDraft::new(EntityDescriptor::function("src/a.ts", "f", 0)))
            .unwrap();
        ir.propose(PotentialRelationship::new(f, RelationshipKind::Calls, "g"));
        assert!(ir.validate().is_ok());
        assert_eq!(ir.file_id.as_str(), "knit://shop/file:src/a.ts");

        let mut future = ir.clone();
        future.schema_version = 2;
        assert!(matches!(future.validate(), Err(Error::UnsupportedSchema { found: 2, .. })));

        let mut broken = ir;
        broken.potential_relationships[0].source_id = CanonicalId::default();
        assert!(matches!(broken.validate(), Err(Error::MalformedElement { .. })));
    }

    #[test]
    fn file_ir_round_trips_through_json() {
        let mut ir = FileIr::new("shop", "src/a.ts", Language::TypeScript).unwrap();
        ir.push_draft(ElementDraft::new(EntityDescriptor::file("src/a.ts")))
            .unwrap();
        let json = serde_json::to_string(&ir).unwrap();
        assert!(json.contains("\"schemaVersion\":1"));
        assert!(json.contains("\"potentialRelationships\":[]"));
        let back: FileIr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ir);
    }
}
