//! Graph store upsert protocol tests.
//!
//! Verifies, for both the in-memory and the SQLite store:
//! - an edge to an unknown node creates a stub that a later node upsert
//!   enriches in place
//! - applying a plan twice, or plans in any order, converges on one graph
//! - concurrent producers sharing a store converge on the same graph as a
//!   single sequential producer
//! - both stores hold identical contents for identical plans

mod common;

use std::sync::Arc;

use common::{per_file_plans, shop_plan};
use knit::directive::{ELEMENT_LABEL, STUB_LABEL};
use knit::store::GraphSnapshot;
use knit::{
    CanonicalId, GraphStore, MemoryGraph, NodeUpsert, RelationshipDirective, RelationshipKind,
    SqliteGraph, UpsertPlan,
};
use serde_json::json;
use tempfile::TempDir;

fn id(s: &str) -> CanonicalId {
    CanonicalId::parse(s).expect("valid id")
}

fn sqlite() -> (TempDir, SqliteGraph) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let graph = SqliteGraph::open(&dir.path().join("graph.db")).expect("should open database");
    (dir, graph)
}

async fn snapshot(store: &dyn GraphStore) -> GraphSnapshot {
    store.snapshot().await.expect("snapshot should succeed")
}

// === Stub convergence ===

async fn stub_then_enrich(store: &dyn GraphStore) {
    let a = id("knit://shop/function:a.ts:main(#0)");
    let b = id("knit://shop/function:b.ts:helper(#0)");

    store
        .upsert_relationship(&RelationshipDirective::new(
            RelationshipKind::Calls,
            a.clone(),
            b.clone(),
        ))
        .await
        .unwrap();

    let stub = store.node(&b).await.unwrap().expect("endpoint should exist");
    assert!(stub.stub);
    assert_eq!(stub.labels, vec![STUB_LABEL]);
    assert_eq!(store.stats().await.unwrap().stubs, 2);

    store
        .upsert_node(
            &NodeUpsert::new(b.clone())
                .with_label(ELEMENT_LABEL)
                .with_label("Function")
                .with_property("name", "helper"),
        )
        .await
        .unwrap();

    let node = store.node(&b).await.unwrap().expect("node should exist");
    assert!(!node.stub);
    assert!(!node.has_label(STUB_LABEL));
    assert!(node.has_label("Function"));
    assert_eq!(node.properties["name"], json!("helper"));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.nodes, 2, "the stub was enriched, not duplicated");
    assert_eq!(stats.stubs, 1);
    assert_eq!(stats.edges(), 1);
    assert_eq!(store.relationships_from(&a).await.unwrap().len(), 1);
}

#[tokio::test]
async fn memory_stub_converges() {
    stub_then_enrich(&MemoryGraph::new()).await;
}

#[tokio::test]
async fn sqlite_stub_converges() {
    let (_dir, graph) = sqlite();
    stub_then_enrich(&graph).await;
}

async fn edge_properties_merge(store: &dyn GraphStore) {
    let a = id("knit://shop/function:a.ts:main(#0)");
    let b = id("knit://shop/function:b.ts:helper(#0)");
    let first = RelationshipDirective::new(RelationshipKind::Calls, a.clone(), b.clone())
        .with_properties(json!({"line": 3, "async": false}).as_object().cloned().unwrap());
    let second = RelationshipDirective::new(RelationshipKind::Calls, a.clone(), b.clone())
        .with_properties(json!({"line": 9}).as_object().cloned().unwrap());

    store.upsert_relationship(&first).await.unwrap();
    store.upsert_relationship(&second).await.unwrap();

    let edges = store.relationships_from(&a).await.unwrap();
    assert_eq!(edges.len(), 1, "one edge per (type, source, target)");
    assert_eq!(edges[0].properties["line"], json!(9));
    assert_eq!(edges[0].properties["async"], json!(false));
}

#[tokio::test]
async fn memory_merges_edge_properties() {
    edge_properties_merge(&MemoryGraph::new()).await;
}

#[tokio::test]
async fn sqlite_merges_edge_properties() {
    let (_dir, graph) = sqlite();
    edge_properties_merge(&graph).await;
}

// === Plan application ===

#[tokio::test]
async fn applying_a_plan_twice_changes_nothing() {
    let plan = shop_plan();
    let graph = MemoryGraph::new();

    graph.apply(&plan).await.unwrap();
    let once = snapshot(&graph).await;
    graph.apply(&plan).await.unwrap();

    assert_eq!(snapshot(&graph).await, once);
    assert_eq!(once.nodes.len(), plan.nodes().len());
    assert_eq!(once.relationships.len(), plan.relationships().len());
}

#[tokio::test]
async fn directive_order_does_not_matter() {
    let plan = shop_plan();
    let mut reversed: Vec<_> = plan.directives().collect();
    reversed.reverse();

    let forward = MemoryGraph::new();
    forward.apply(&plan).await.unwrap();

    // Edges first, so every endpoint starts life as a stub.
    let backward = MemoryGraph::new();
    for directive in reversed {
        match directive {
            knit::UpsertDirective::Node(node) => backward.upsert_node(&node).await.unwrap(),
            knit::UpsertDirective::Relationship(rel) => {
                backward.upsert_relationship(&rel).await.unwrap();
            }
        }
    }

    assert_eq!(snapshot(&forward).await, snapshot(&backward).await);
    assert_eq!(backward.stats().await.unwrap().stubs, 0);
}

#[tokio::test]
async fn file_plans_in_any_order_match_the_whole_plan() {
    let whole = MemoryGraph::new();
    whole.apply(&shop_plan()).await.unwrap();

    let mut plans = per_file_plans();
    let in_order = MemoryGraph::new();
    for plan in &plans {
        in_order.apply(plan).await.unwrap();
    }
    plans.reverse();
    let reversed = MemoryGraph::new();
    for plan in &plans {
        reversed.apply(plan).await.unwrap();
    }

    let expected = snapshot(&whole).await;
    assert_eq!(snapshot(&in_order).await, expected);
    assert_eq!(snapshot(&reversed).await, expected);
}

#[tokio::test]
async fn plan_survives_jsonl_transport() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.jsonl");
    let plan = shop_plan();

    plan.write_jsonl(&path).await.unwrap();
    let (read, warnings) = UpsertPlan::read_jsonl(&path).await.unwrap();

    assert!(warnings.is_empty());
    assert_eq!(read, plan);
}

// === Concurrency ===

async fn concurrent_producers(store: Arc<dyn GraphStore>) -> GraphSnapshot {
    let handles: Vec<_> = per_file_plans()
        .into_iter()
        .map(|plan| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.apply(&plan).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task should not panic").expect("apply should succeed");
    }
    snapshot(store.as_ref()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_converge_in_memory() {
    let sequential = MemoryGraph::new();
    sequential.apply(&shop_plan()).await.unwrap();

    let concurrent = concurrent_producers(Arc::new(MemoryGraph::new())).await;

    assert_eq!(concurrent, snapshot(&sequential).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_converge_in_sqlite() {
    let (_dir, graph) = sqlite();
    let sequential = MemoryGraph::new();
    sequential.apply(&shop_plan()).await.unwrap();

    let concurrent = concurrent_producers(Arc::new(graph)).await;

    assert_eq!(concurrent, snapshot(&sequential).await);
}

// === Backend agreement ===

#[tokio::test]
async fn memory_and_sqlite_hold_the_same_graph() {
    let plans = per_file_plans();
    let memory = MemoryGraph::new();
    let (_dir, sqlite) = sqlite();
    for plan in plans.iter().rev() {
        memory.apply(plan).await.unwrap();
        sqlite.apply(plan).await.unwrap();
    }

    assert_eq!(snapshot(&memory).await, snapshot(&sqlite).await);
    assert_eq!(memory.stats().await.unwrap(), sqlite.stats().await.unwrap());
}

#[tokio::test]
async fn sqlite_graph_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let plan = shop_plan();

    let before = {
        let graph = SqliteGraph::open(&path).unwrap();
        graph.apply(&plan).await.unwrap();
        snapshot(&graph).await
    };
    let reopened = SqliteGraph::open(&path).unwrap();

    assert_eq!(snapshot(&reopened).await, before);
}
