//! `SQLite` graph store.
//!
//! Nodes and edges are rows keyed exactly like the upsert protocol keys
//! them; labels and properties are stored as JSON text. Every upsert (and
//! every [`apply`](GraphStore::apply)) runs in one `IMMEDIATE` transaction,
//! so concurrent writers serialize on the database lock instead of
//! interleaving a read-merge-write.
//!
//! Blocking rusqlite calls run on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, warn};

use super::{GraphSnapshot, GraphStats, GraphStore, StoredNode, merge_edge_properties};
use crate::directive::{NodeUpsert, RelationshipDirective, UpsertPlan};
use crate::error::{Error, Result};
use crate::identity::CanonicalId;
use crate::types::{Properties, RelationshipKind};

const COLLABORATOR: &str = "graph-store";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
-- Graph nodes; stub = 1 until a node upsert arrives
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    labels TEXT NOT NULL,
    properties TEXT NOT NULL,
    stub INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_stub ON nodes(stub) WHERE stub = 1;

-- Graph edges, one per (type, source, target)
CREATE TABLE IF NOT EXISTS edges (
    type TEXT NOT NULL,
    source TEXT NOT NULL REFERENCES nodes(id),
    target TEXT NOT NULL REFERENCES nodes(id),
    properties TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (type, source, target)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
";

/// Map rusqlite failures, treating lock contention as retryable.
fn db_error(e: rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            Error::CollaboratorUnavailable {
                collaborator: COLLABORATOR,
                message: e.to_string(),
            }
        }
        _ => Error::Database(e),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_id(raw: &str) -> Result<CanonicalId> {
    CanonicalId::parse(raw)
        .inspect_err(|e| warn!(id = %raw, error = %e, "Malformed id in graph database"))
}

fn row_to_node(id: &str, labels: &str, properties: &str, stub: bool) -> Result<StoredNode> {
    Ok(StoredNode {
        id: parse_id(id)?,
        labels: serde_json::from_str(labels)?,
        properties: serde_json::from_str(properties)?,
        stub,
    })
}

fn row_to_edge(kind: &str, source: &str, target: &str, properties: &str) -> Result<RelationshipDirective> {
    let kind = RelationshipKind::parse(kind)
        .ok_or_else(|| Error::malformed(Some(source), format!("unknown edge type {kind:?}")))?;
    Ok(RelationshipDirective::new(kind, parse_id(source)?, parse_id(target)?)
        .with_properties(serde_json::from_str(properties)?))
}

type RawNode = (String, String, String, bool);
type RawEdge = (String, String, String, String);

fn load_node(tx: &Transaction<'_>, id: &CanonicalId) -> Result<Option<StoredNode>> {
    let raw: Option<RawNode> = tx
        .query_row(
            "SELECT id, labels, properties, stub FROM nodes WHERE id = ?1",
            [id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(db_error)?;
    raw.map(|(id, labels, props, stub)| row_to_node(&id, &labels, &props, stub))
        .transpose()
}

fn upsert_node_tx(tx: &Transaction<'_>, node: &NodeUpsert, at: &str) -> Result<()> {
    let mut stored = load_node(tx, &node.id)?.unwrap_or_else(|| StoredNode::stub(node.id.clone()));
    stored.absorb(node);
    tx.execute(
        "INSERT INTO nodes (id, labels, properties, stub, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            labels = excluded.labels,
            properties = excluded.properties,
            stub = excluded.stub,
            updated_at = excluded.updated_at",
        params![
            stored.id.as_str(),
            serde_json::to_string(&stored.labels)?,
            serde_json::to_string(&stored.properties)?,
            stored.stub,
            at,
        ],
    )
    .map_err(db_error)?;
    Ok(())
}

fn ensure_stub(tx: &Transaction<'_>, id: &CanonicalId, at: &str) -> Result<()> {
    let stub = StoredNode::stub(id.clone());
    tx.execute(
        "INSERT OR IGNORE INTO nodes (id, labels, properties, stub, updated_at)
         VALUES (?1, ?2, '{}', 1, ?3)",
        params![id.as_str(), serde_json::to_string(&stub.labels)?, at],
    )
    .map_err(db_error)?;
    Ok(())
}

fn upsert_relationship_tx(tx: &Transaction<'_>, rel: &RelationshipDirective, at: &str) -> Result<()> {
    ensure_stub(tx, &rel.source_id, at)?;
    ensure_stub(tx, &rel.target_id, at)?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT properties FROM edges WHERE type = ?1 AND source = ?2 AND target = ?3",
            params![rel.kind.as_str(), rel.source_id.as_str(), rel.target_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    let mut properties: Properties = match existing {
        Some(json) => serde_json::from_str(&json)?,
        None => Properties::new(),
    };
    merge_edge_properties(&mut properties, &rel.properties);

    tx.execute(
        "INSERT INTO edges (type, source, target, properties, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(type, source, target) DO UPDATE SET
            properties = excluded.properties,
            updated_at = excluded.updated_at",
        params![
            rel.kind.as_str(),
            rel.source_id.as_str(),
            rel.target_id.as_str(),
            serde_json::to_string(&properties)?,
            at,
        ],
    )
    .map_err(db_error)?;
    Ok(())
}

fn query_edges(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<RelationshipDirective>> {
    let mut stmt = conn.prepare(sql).map_err(db_error)?;
    let rows = stmt
        .query_map(args, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .map_err(db_error)?;
    let mut edges = Vec::new();
    for row in rows {
        let (kind, source, target, props): RawEdge = row.map_err(db_error)?;
        edges.push(row_to_edge(&kind, &source, &target, &props)?);
    }
    Ok(edges)
}

/// Persistent graph store; clones share one connection.
#[derive(Debug, Clone)]
pub struct SqliteGraph {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteGraph {
    /// Open or create the graph database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_error)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_error)?;
        debug!(path = %path.display(), "Opened graph database");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_error)?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_error)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_error)?;
        conn.execute_batch(SCHEMA).map_err(db_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| Error::CollaboratorUnavailable {
                collaborator: COLLABORATOR,
                message: format!("connection mutex poisoned: {e}"),
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::CollaboratorUnavailable {
            collaborator: COLLABORATOR,
            message: format!("blocking task failed: {e}"),
        })?
    }

    /// Run `f` in one `IMMEDIATE` transaction.
    async fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Transaction<'_>, &str) -> Result<()> + Send + 'static,
    {
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            f(&tx, &now())?;
            tx.commit().map_err(db_error)
        })
        .await
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()> {
        let node = node.clone();
        self.write(move |tx, at| upsert_node_tx(tx, &node, at)).await
    }

    async fn upsert_relationship(&self, relationship: &RelationshipDirective) -> Result<()> {
        let rel = relationship.clone();
        self.write(move |tx, at| upsert_relationship_tx(tx, &rel, at)).await
    }

    async fn apply(&self, plan: &UpsertPlan) -> Result<()> {
        let plan = plan.clone();
        self.write(move |tx, at| {
            for node in plan.nodes() {
                upsert_node_tx(tx, node, at)?;
            }
            for rel in plan.relationships() {
                upsert_relationship_tx(tx, rel, at)?;
            }
            debug!(
                nodes = plan.nodes().len(),
                relationships = plan.relationships().len(),
                "Applied plan"
            );
            Ok(())
        })
        .await
    }

    async fn node(&self, id: &CanonicalId) -> Result<Option<StoredNode>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let raw: Option<RawNode> = conn
                .query_row(
                    "SELECT id, labels, properties, stub FROM nodes WHERE id = ?1",
                    [id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()
                .map_err(db_error)?;
            raw.map(|(id, labels, props, stub)| row_to_node(&id, &labels, &props, stub))
                .transpose()
        })
        .await
    }

    async fn relationships_from(&self, id: &CanonicalId) -> Result<Vec<RelationshipDirective>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let mut edges = query_edges(
                conn,
                "SELECT type, source, target, properties FROM edges WHERE source = ?1",
                &[&id.as_str()],
            )?;
            edges.sort_by(|a, b| a.key().cmp(&b.key()));
            Ok(edges)
        })
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.with_conn(|conn| {
            let (nodes, stubs): (usize, usize) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(stub), 0) FROM nodes",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(db_error)?;

            let mut stats = GraphStats {
                nodes,
                stubs,
                ..GraphStats::default()
            };
            let mut stmt = conn
                .prepare("SELECT type, COUNT(*) FROM edges GROUP BY type")
                .map_err(db_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))
                .map_err(db_error)?;
            for row in rows {
                let (kind, count) = row.map_err(db_error)?;
                stats.edges_by_type.insert(kind, count);
            }
            Ok(stats)
        })
        .await
    }

    async fn snapshot(&self) -> Result<GraphSnapshot> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, labels, properties, stub FROM nodes ORDER BY id")
                .map_err(db_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
                .map_err(db_error)?;
            let mut nodes = Vec::new();
            for row in rows {
                let (id, labels, props, stub): RawNode = row.map_err(db_error)?;
                nodes.push(row_to_node(&id, &labels, &props, stub)?);
            }

            let mut relationships = query_edges(
                conn,
                "SELECT type, source, target, properties FROM edges",
                &[],
            )?;
            relationships.sort_by(|a, b| a.key().cmp(&b.key()));
            Ok(GraphSnapshot {
                nodes,
                relationships,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> CanonicalId {
        CanonicalId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn open_creates_schema_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let a = id("knit://p/file:a.ts");

        {
            let graph = SqliteGraph::open(&path).unwrap();
            assert_eq!(graph.path(), Some(path.as_path()));
            graph
                .upsert_node(&NodeUpsert::new(a.clone()).with_label("File"))
                .await
                .unwrap();
        }

        let reopened = SqliteGraph::open(&path).unwrap();
        let node = reopened.node(&a).await.unwrap().unwrap();
        assert_eq!(node.labels, vec!["File"]);
        assert!(!node.stub);
    }

    #[tokio::test]
    async fn stub_then_node_then_edge_merge() {
        let graph = SqliteGraph::open_in_memory().unwrap();
        let a = id("knit://p/function:a.ts:a(#0)");
        let b = id("knit://p/function:b.ts:b(#0)");

        let mut first = Properties::new();
        first.insert("line".into(), json!(1));
        let mut second = Properties::new();
        second.insert("line".into(), json!(2));
        second.insert("async".into(), json!(true));

        let rel = RelationshipDirective::new(RelationshipKind::Calls, a.clone(), b.clone());
        graph.upsert_relationship(&rel.clone().with_properties(first)).await.unwrap();
        assert!(graph.node(&b).await.unwrap().unwrap().stub);

        graph.upsert_relationship(&rel.with_properties(second)).await.unwrap();
        graph
            .upsert_node(&NodeUpsert::new(b.clone()).with_label("Function"))
            .await
            .unwrap();

        let edges = graph.relationships_from(&a).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties["line"], json!(2));
        assert_eq!(edges[0].properties["async"], json!(true));

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.stubs, 1);
        assert_eq!(stats.edges(), 1);
    }

    #[test]
    fn busy_errors_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(db_error(busy).is_retryable());

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(!db_error(other).is_retryable());
    }
}
