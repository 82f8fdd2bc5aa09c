//! Shared fixtures for knit integration tests.

#![allow(dead_code)]

use knit::identity::EntityDescriptor;
use knit::ir::{ElementDraft, FileIr, PotentialRelationship};
use knit::types::{HANDLER_ID, HTTP_METHOD, Location, TARGET_COLUMNS, TARGET_TABLES};
use knit::{Config, Language, RelationshipKind, ResolutionBatch, UpsertPlan};
use serde_json::json;

pub const PROJECT: &str = "shop";

/// A small full-stack project: a TypeScript client calling a JavaScript
/// route whose handler queries a SQL schema from Python.
pub fn shop_files() -> Vec<FileIr> {
    vec![client(), util(), routes(), schema(), repo()]
}

fn client() -> FileIr {
    let mut ir = FileIr::new(PROJECT, "web/client.ts", Language::TypeScript).expect("client ir");
    let fetch_users = ir
        .push_draft(
            ElementDraft::new(EntityDescriptor::function("web/client.ts", "fetchUser", 1))
                .at(Location::at(3, 1)),
        )
        .expect("fetchUser");
    ir.propose(
        PotentialRelationship::new(
            fetch_users.clone(),
            RelationshipKind::ApiFetch,
            "/api/users/${id}",
        )
        .with_property(HTTP_METHOD, "GET")
        .at(Location::at(4, 10)),
    );
    ir.propose(
        PotentialRelationship::new(fetch_users, RelationshipKind::Calls, "formatUser")
            .at(Location::at(5, 12)),
    );
    ir
}

fn util() -> FileIr {
    let mut ir = FileIr::new(PROJECT, "web/util.ts", Language::TypeScript).expect("util ir");
    ir.push_draft(
        ElementDraft::new(EntityDescriptor::function("web/util.ts", "formatUser", 1))
            .at(Location::at(1, 1)),
    )
    .expect("formatUser");
    ir
}

fn routes() -> FileIr {
    let mut ir = FileIr::new(PROJECT, "server/routes.js", Language::JavaScript).expect("routes ir");
    let handler = ir
        .push_draft(
            ElementDraft::new(EntityDescriptor::function("server/routes.js", "getUser", 2))
                .at(Location::at(10, 1)),
        )
        .expect("getUser");
    ir.push_draft(
        ElementDraft::new(
            EntityDescriptor::route("GET", "/api/users/:id").in_file("server/routes.js"),
        )
        .at(Location::at(20, 1))
        .with_property(HANDLER_ID, handler.as_str()),
    )
    .expect("route");
    ir.propose(
        PotentialRelationship::new(handler, RelationshipKind::Calls, "findUser")
            .at(Location::at(11, 5)),
    );
    ir
}

fn schema() -> FileIr {
    let mut ir = FileIr::new(PROJECT, "db/schema.sql", Language::Sql).expect("schema ir");
    let users = ir
        .push_draft(
            ElementDraft::new(EntityDescriptor::table(None, "users").in_file("db/schema.sql"))
                .at(Location::at(1, 1)),
        )
        .expect("users");
    for (line, column) in [(2, "id"), (3, "email")] {
        ir.push_draft(
            ElementDraft::new(EntityDescriptor::column(&users, column).in_file("db/schema.sql"))
                .at(Location::at(line, 3)),
        )
        .expect("column");
    }
    ir
}

fn repo() -> FileIr {
    let mut ir = FileIr::new(PROJECT, "server/repo.py", Language::Python).expect("repo ir");
    let find_user = ir
        .push_draft(
            ElementDraft::new(EntityDescriptor::function("server/repo.py", "findUser", 1))
                .at(Location::at(1, 1)),
        )
        .expect("findUser");
    ir.propose(
        PotentialRelationship::new(find_user.clone(), RelationshipKind::DatabaseQuery, "")
            .with_property(TARGET_TABLES, json!(["users"]))
            .with_property(TARGET_COLUMNS, json!(["users.email"]))
            .at(Location::at(2, 5)),
    );
    ir.propose(
        PotentialRelationship::new(find_user, RelationshipKind::Calls, "auditLog")
            .at(Location::at(3, 5)),
    );
    ir
}

/// A batch holding `files`.
pub fn batch_of(files: impl IntoIterator<Item = FileIr>) -> ResolutionBatch {
    let mut batch = ResolutionBatch::new(PROJECT);
    for file in files {
        batch.add_file(file).expect("file should be accepted");
    }
    batch
}

/// One plan for the whole project.
pub fn shop_plan() -> UpsertPlan {
    batch_of(shop_files())
        .plan(&Config::default())
        .expect("plan should build")
}

/// One plan per file, as independent producers would write them: each file's
/// nodes plus the resolved edges whose source it declares.
pub fn per_file_plans() -> Vec<UpsertPlan> {
    let config = Config::default();
    let batch = batch_of(shop_files());
    let resolution = batch.resolve(&config).expect("resolution");
    let hasher = config.identity.hasher().expect("hasher");

    batch
        .files()
        .map(|file| {
            let directives = resolution
                .directives
                .iter()
                .filter(|d| file.elements.iter().any(|e| e.id == d.source_id))
                .cloned()
                .collect();
            let elements = file.elements.iter().map(|e| (e, Some(file.language)));
            UpsertPlan::build(elements, directives, &hasher).expect("file plan")
        })
        .collect()
}
