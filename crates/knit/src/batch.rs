//! Accumulating extractor output into one resolution unit.
//!
//! A [`ResolutionBatch`] holds the latest [`FileIr`] of every file in a
//! project. Re-adding a path replaces that file's elements and proposals, so
//! feeding a new version of a file and resolving again yields the directives
//! for the project as it is now.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::directive::UpsertPlan;
use crate::error::{Error, Result};
use crate::identity::normalize_path;
use crate::ir::{Element, FileIr, PotentialRelationship};
use crate::resolver::{Resolution, Resolver};
use crate::types::Language;

/// The files of one project awaiting resolution.
#[derive(Debug, Clone)]
pub struct ResolutionBatch {
    project_id: String,
    files: BTreeMap<String, FileIr>,
}

impl ResolutionBatch {
    /// An empty batch for `project_id`.
    #[must_use]
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            files: BTreeMap::new(),
        }
    }

    /// The project every file must belong to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Add a file, replacing any earlier version of the same path.
    ///
    /// Returns `true` if an earlier version was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectMismatch`] for a record of another project,
    /// or the error [`FileIr::validate`] reports.
    pub fn add_file(&mut self, file: FileIr) -> Result<bool> {
        if file.project_id != self.project_id {
            return Err(Error::ProjectMismatch {
                file_path: file.file_path,
                expected: self.project_id.clone(),
                found: file.project_id,
            });
        }
        file.validate()?;

        let key = normalize_path(&file.file_path);
        let elements = file.elements.len();
        let proposals = file.potential_relationships.len();
        let replaced = self.files.insert(key.clone(), file).is_some();
        debug!(
            file = %key,
            elements,
            proposals,
            replaced,
            "Added file to batch"
        );
        Ok(replaced)
    }

    /// Remove a file, as when it was deleted from the project.
    pub fn remove_file(&mut self, file_path: &str) -> Option<FileIr> {
        self.files.remove(&normalize_path(file_path))
    }

    /// Load every `FileIr` record in a JSONL file.
    ///
    /// Lines that are not valid records are skipped and returned as
    /// warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a record fails
    /// [`add_file`](Self::add_file).
    pub async fn extend_from_jsonl(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<knit_jsonl::Warning>> {
        let path = path.as_ref();
        let (records, warnings) = knit_jsonl::read_jsonl_resilient::<FileIr, _>(path).await?;
        let count = records.len();
        for record in records {
            self.add_file(record)?;
        }
        info!(
            path = %path.display(),
            records = count,
            skipped = warnings.len(),
            "Loaded IR"
        );
        Ok(warnings)
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = &FileIr> + '_ {
        self.files.values()
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the batch has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every element with the language of the file that declared it.
    pub fn elements_with_languages(&self) -> impl Iterator<Item = (&Element, Option<Language>)> + '_ {
        self.files
            .values()
            .flat_map(|f| f.elements.iter().map(move |e| (e, Some(f.language))))
    }

    /// Every element.
    pub fn elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.files.values().flat_map(|f| f.elements.iter())
    }

    /// Every relationship proposal.
    pub fn relationships(&self) -> impl Iterator<Item = &PotentialRelationship> + '_ {
        self.files
            .values()
            .flat_map(|f| f.potential_relationships.iter())
    }

    /// Resolve the batch.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if the elements cannot be indexed.
    pub fn resolve(&self, config: &Config) -> Result<Resolution> {
        let resolver = Resolver::new(self.elements(), &config.resolver)?;
        Ok(resolver.resolve(self.relationships()))
    }

    /// Build the upsert plan for an already computed resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid GID width or
    /// [`Error::IdentityCollision`] from the plan's identity checks.
    pub fn plan_with(&self, resolution: &Resolution, config: &Config) -> Result<UpsertPlan> {
        UpsertPlan::build(
            self.elements_with_languages(),
            resolution.directives.clone(),
            &config.identity.hasher()?,
        )
    }

    /// Resolve the batch and build its upsert plan.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve) and [`plan_with`](Self::plan_with).
    pub fn plan(&self, config: &Config) -> Result<UpsertPlan> {
        let resolution = self.resolve(config)?;
        self.plan_with(&resolution, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityDescriptor;
    use crate::ir::ElementDraft;
    use crate::types::RelationshipKind;

    fn file(project: &str, path: &str, functions: &[&str], calls: &[(&str, &str)]) -> FileIr {
        let mut ir = FileIr::new(project, path, Language::Python).unwrap();
        let mut ids = BTreeMap::new();
        for name in functions {
            let id = ir
                .push_draft(ElementDraft::new(EntityDescriptor::function(path, name, 0)))
                .unwrap();
            ids.insert(*name, id);
        }
        for (from, to) in calls {
            ir.propose(PotentialRelationship::new(ids[from].clone(), RelationshipKind::Calls, to));
        }
        ir
    }

    #[test]
    fn foreign_project_is_rejected() {
        let mut batch = ResolutionBatch::new("shop");
        let err = batch.add_file(file("blog", "a.py", &["f"], &[])).unwrap_err();
        assert!(matches!(err, Error::ProjectMismatch { .. }));
        assert!(batch.is_empty());
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let mut batch = ResolutionBatch::new("shop");
        let mut ir = file("shop", "a.py", &["f"], &[]);
        ir.schema_version = 99;
        assert!(matches!(batch.add_file(ir), Err(Error::UnsupportedSchema { found: 99, .. })));
    }

    #[test]
    fn re_adding_a_file_replaces_its_contents() {
        let config = Config::default();
        let mut batch = ResolutionBatch::new("shop");
        assert!(!batch.add_file(file("shop", "a.py", &["main"], &[("main", "helper")])).unwrap());
        assert!(!batch.add_file(file("shop", "b.py", &["helper"], &[])).unwrap());

        let before = batch.resolve(&config).unwrap();
        assert_eq!(before.directives_of(RelationshipKind::Calls).count(), 1);

        // New version of a.py no longer calls helper.
        assert!(batch.add_file(file("shop", "./a.py", &["main"], &[])).unwrap());
        assert_eq!(batch.len(), 2);
        let after = batch.resolve(&config).unwrap();
        assert_eq!(after.directives_of(RelationshipKind::Calls).count(), 0);

        assert!(batch.remove_file("b.py").is_some());
        assert_eq!(batch.elements().count(), 1);
    }

    #[test]
    fn plan_tags_nodes_with_file_language() {
        let mut batch = ResolutionBatch::new("shop");
        batch.add_file(file("shop", "a.py", &["main", "helper"], &[("main", "helper")])).unwrap();

        let plan = batch.plan(&Config::default()).unwrap();
        assert_eq!(plan.nodes().len(), 2);
        assert!(plan.nodes().iter().all(|n| n.labels.iter().any(|l| l == "Python")));
        assert_eq!(plan.relationships().len(), 1);
    }

    #[tokio::test]
    async fn loads_jsonl_skipping_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.jsonl");
        let good = serde_json::to_string(&file("shop", "a.py", &["f"], &[])).unwrap();
        tokio::fs::write(&path, format!("{good}\nnot json\n")).await.unwrap();

        let mut batch = ResolutionBatch::new("shop");
        let warnings = batch.extend_from_jsonl(&path).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(warnings.len(), 1);
    }
}
