//! # knit: identity and resolution for a cross-language code graph
//!
//! Extractors (one per language, out of tree) describe each source file as
//! a [`FileIr`]: identified [`Element`]s plus unresolved
//! [`PotentialRelationship`]s. knit turns a batch of those into an
//! [`UpsertPlan`] that any number of producers can apply to a graph store,
//! in any order, and converge on one graph.
//!
//! ## Design Philosophy
//!
//! - **Identity is a pure function** - the same entity always gets the same
//!   [`CanonicalId`], across runs, machines and languages
//! - **Resolution is a pure function** - same batch in, byte-identical
//!   directives out, whatever the input order or thread count
//! - **Drop, don't guess** - a reference that matches nothing is reported
//!   as a [`Diagnostic`] and never becomes an edge
//! - **Idempotent writes** - every directive is keyed by canonical ids only
//!
//! ## Quick Start
//!
//! ```
//! use knit::{
//!     Config, ElementDraft, EntityDescriptor, FileIr, Language, PotentialRelationship,
//!     RelationshipKind, ResolutionBatch,
//! };
//!
//! let mut api = FileIr::new("shop", "src/api.ts", Language::TypeScript)?;
//! let load = api.push_draft(ElementDraft::new(EntityDescriptor::function("src/api.ts", "load", 0)))?;
//! api.push_draft(ElementDraft::new(EntityDescriptor::function("src/api.ts", "parse", 1)))?;
//! api.propose(PotentialRelationship::new(load, RelationshipKind::Calls, "parse"));
//!
//! let mut batch = ResolutionBatch::new("shop");
//! batch.add_file(api)?;
//!
//! let resolution = batch.resolve(&Config::default())?;
//! assert_eq!(resolution.directives.len(), 1);
//! assert_eq!(
//!     resolution.directives[0].target_id.as_str(),
//!     "knit://shop/function:src/api.ts:parse(#1)"
//! );
//! # Ok::<(), knit::Error>(())
//! ```

pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod directive;
mod error;
pub mod heuristics;
pub mod id_service;
pub mod identity;
pub mod ir;
pub mod resolver;
pub mod store;
pub mod types;

pub use batch::ResolutionBatch;
pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticKind, ResolutionScope};
pub use directive::{NodeUpsert, RelationshipDirective, UpsertDirective, UpsertPlan};
pub use error::{Error, Result};
pub use id_service::{IdRequest, IdResponse, IdService, LocalIdService};
pub use identity::{CanonicalId, EntityDescriptor, Gid, GidHasher, generate_canonical_id};
pub use ir::{Element, ElementDraft, FileIr, PotentialRelationship, add_id_to_element};
pub use resolver::{Resolution, Resolver, resolve};
pub use store::{GraphStats, GraphStore, MemoryGraph, SqliteGraph, StoredNode};
pub use types::{ElementKind, Language, Location, Position, Properties, RelationshipKind};
