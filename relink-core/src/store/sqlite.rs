use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use relink_graphs::module_path::last_segment;

use crate::error::StoreError;
use crate::types::{
    FetchRow, LookupQuery, NodeLabel, NodeRecord, NodeRef, PendingCall, ProjectRecord, Properties,
    RelType, Relationship, StoreStats,
};

use super::GraphBackend;
use super::schema;

/// Bound parameters per `IN (...)` chunk, below `SQLite`'s variable limit.
const LOOKUP_CHUNK: usize = 500;

#[derive(Debug, Default)]
struct WriteBuffer {
    nodes: Vec<(NodeRef, Properties)>,
    relationships: Vec<(NodeRef, RelType, NodeRef, Properties)>,
}

/// SQLite-backed implementation of `GraphBackend`.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    buffer: Mutex<WriteBuffer>,
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let backend = Self {
            conn: Mutex::new(conn),
            buffer: Mutex::new(WriteBuffer::default()),
            db_path: Some(path.to_path_buf()),
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let backend = Self {
            conn: Mutex::new(conn),
            buffer: Mutex::new(WriteBuffer::default()),
            db_path: None,
        };
        backend.initialize()?;
        Ok(backend)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;

        // Silently ignored for in-memory databases.
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO relink_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM relink_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        if version.as_deref() != Some(schema::SCHEMA_VERSION) {
            return Err(StoreError::Migration(format!(
                "unsupported schema version {version:?}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }

        Ok(())
    }

    fn label_placeholders(labels: &[NodeLabel], offset: usize) -> String {
        (0..labels.len())
            .map(|i| format!("?{}", offset + i + 1))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Rows `(qualified_name, label)` where `column IN chunk AND label IN labels`.
    fn select_in(
        conn: &Connection,
        column: &str,
        values: &[String],
        labels: &[NodeLabel],
    ) -> Result<Vec<(String, String)>, StoreError> {
        let mut rows = Vec::new();
        for chunk in values.chunks(LOOKUP_CHUNK) {
            let value_slots = (1..=chunk.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let label_slots = Self::label_placeholders(labels, chunk.len());
            let sql = format!(
                "SELECT qualified_name, label FROM nodes
                 WHERE {column} IN ({value_slots}) AND label IN ({label_slots})"
            );
            let bound: Vec<&str> = chunk
                .iter()
                .map(String::as_str)
                .chain(labels.iter().map(|l| l.as_str()))
                .collect();

            let mut stmt = conn.prepare_cached(&sql)?;
            let mapped = stmt.query_map(params_from_iter(bound), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
        Ok(rows)
    }

    fn group_rows(rows: Vec<(String, String)>) -> Result<Vec<FetchRow>, StoreError> {
        let mut grouped: BTreeMap<String, BTreeSet<NodeLabel>> = BTreeMap::new();
        for (qualified_name, label) in rows {
            grouped
                .entry(qualified_name)
                .or_default()
                .insert(label.parse::<NodeLabel>()?);
        }
        Ok(grouped
            .into_iter()
            .map(|(qualified_name, labels)| FetchRow {
                qualified_name,
                labels: labels.into_iter().collect(),
            })
            .collect())
    }

    fn parse_properties(text: &str) -> Result<Properties, StoreError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[async_trait::async_trait]
impl GraphBackend for SqliteBackend {
    async fn ensure_node(
        &self,
        label: NodeLabel,
        qualified_name: &str,
        properties: Properties,
    ) -> crate::error::Result<()> {
        let mut buffer = self.buffer.lock().expect("relink store buffer mutex poisoned");
        buffer
            .nodes
            .push((NodeRef::new(label, qualified_name), properties));
        Ok(())
    }

    async fn ensure_relationship(
        &self,
        from: &NodeRef,
        rel_type: RelType,
        to: &NodeRef,
        properties: Properties,
    ) -> crate::error::Result<()> {
        let mut buffer = self.buffer.lock().expect("relink store buffer mutex poisoned");
        buffer
            .relationships
            .push((from.clone(), rel_type, to.clone(), properties));
        Ok(())
    }

    async fn flush(&self) -> crate::error::Result<()> {
        let pending = {
            let mut buffer = self.buffer.lock().expect("relink store buffer mutex poisoned");
            std::mem::take(&mut *buffer)
        };
        if pending.nodes.is_empty() && pending.relationships.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().expect("relink store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        {
            let mut node_stmt = tx
                .prepare_cached(
                    "INSERT INTO nodes (label, qualified_name, name, properties)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(label, qualified_name) DO UPDATE SET
                        properties = json_patch(nodes.properties, excluded.properties)",
                )
                .map_err(StoreError::Sqlite)?;
            for (node, properties) in &pending.nodes {
                let json = serde_json::to_string(properties).map_err(StoreError::Serialization)?;
                node_stmt
                    .execute(params![
                        node.label.as_str(),
                        node.qualified_name,
                        last_segment(&node.qualified_name),
                        json,
                    ])
                    .map_err(StoreError::Sqlite)?;
            }

            // Edges whose endpoints are unknown are skipped by the join.
            let mut rel_stmt = tx
                .prepare_cached(
                    "INSERT INTO relationships (from_id, rel_type, to_id, properties)
                     SELECT f.id, ?3, t.id, ?6 FROM nodes f, nodes t
                     WHERE f.label = ?1 AND f.qualified_name = ?2
                       AND t.label = ?4 AND t.qualified_name = ?5
                     ON CONFLICT(from_id, rel_type, to_id) DO UPDATE SET
                        properties = json_patch(relationships.properties, excluded.properties)",
                )
                .map_err(StoreError::Sqlite)?;
            for (from, rel_type, to, properties) in &pending.relationships {
                let json = serde_json::to_string(properties).map_err(StoreError::Serialization)?;
                rel_stmt
                    .execute(params![
                        from.label.as_str(),
                        from.qualified_name,
                        rel_type.as_str(),
                        to.label.as_str(),
                        to.qualified_name,
                        json,
                    ])
                    .map_err(StoreError::Sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;

        debug!(
            nodes = pending.nodes.len(),
            relationships = pending.relationships.len(),
            "Flushed buffered writes"
        );
        Ok(())
    }

    async fn fetch(&self, query: &LookupQuery) -> crate::error::Result<Vec<FetchRow>> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let labels = query.allowed_labels();
        if labels.is_empty() || query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = match query {
            LookupQuery::Exact {
                qualified_names, ..
            } => Self::select_in(&conn, "qualified_name", qualified_names, labels)?,
            LookupQuery::Suffix { suffixes, .. } => {
                // Narrow by the indexed last segment, then check the full suffix.
                let mut by_last: HashMap<&str, Vec<&str>> = HashMap::new();
                for suffix in suffixes {
                    by_last
                        .entry(last_segment(suffix))
                        .or_default()
                        .push(suffix.as_str());
                }
                let mut names: Vec<String> = by_last.keys().map(|s| (*s).to_string()).collect();
                names.sort_unstable();

                Self::select_in(&conn, "name", &names, labels)?
                    .into_iter()
                    .filter(|(qn, _)| {
                        by_last
                            .get(last_segment(qn))
                            .is_some_and(|sfx| sfx.iter().any(|s| qn.ends_with(s)))
                    })
                    .collect()
            }
        };

        Ok(Self::group_rows(rows)?)
    }

    async fn relationships(&self, rel_type: RelType) -> crate::error::Result<Vec<Relationship>> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let mut stmt = conn
            .prepare_cached(
                "SELECT f.label, f.qualified_name, t.label, t.qualified_name, r.properties
                 FROM relationships r
                 JOIN nodes f ON f.id = r.from_id
                 JOIN nodes t ON t.id = r.to_id
                 WHERE r.rel_type = ?1
                 ORDER BY f.qualified_name, t.qualified_name",
            )
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![rel_type.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(StoreError::Sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let (from_label, from_qn, to_label, to_qn, props) = row.map_err(StoreError::Sqlite)?;
            out.push(Relationship {
                from: NodeRef::new(from_label.parse::<NodeLabel>()?, from_qn),
                rel_type,
                to: NodeRef::new(to_label.parse::<NodeLabel>()?, to_qn),
                properties: Self::parse_properties(&props)?,
            });
        }
        Ok(out)
    }

    async fn nodes(&self, label: NodeLabel) -> crate::error::Result<Vec<NodeRecord>> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let mut stmt = conn
            .prepare_cached(
                "SELECT qualified_name, properties FROM nodes
                 WHERE label = ?1 ORDER BY qualified_name",
            )
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![label.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(StoreError::Sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let (qualified_name, props) = row.map_err(StoreError::Sqlite)?;
            out.push(NodeRecord {
                label,
                qualified_name,
                properties: Self::parse_properties(&props)?,
            });
        }
        Ok(out)
    }

    async fn record_pending(&self, call: &PendingCall) -> crate::error::Result<()> {
        let identity = call.identity()?;
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO pending_calls (identity, record, caller_was_parsed)
             VALUES (?1, ?1, ?2)",
            params![identity, call.caller_was_parsed],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn get_pending(&self) -> crate::error::Result<Vec<PendingCall>> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let mut stmt = conn
            .prepare_cached("SELECT record FROM pending_calls ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::Sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let record = row.map_err(StoreError::Sqlite)?;
            out.push(serde_json::from_str(&record).map_err(StoreError::Serialization)?);
        }
        Ok(out)
    }

    async fn replace_pending(&self, calls: &[PendingCall]) -> crate::error::Result<()> {
        let identities = calls
            .iter()
            .map(|c| Ok((c.identity()?, c.caller_was_parsed)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut conn = self.conn.lock().expect("relink store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        tx.execute("DELETE FROM pending_calls", [])
            .map_err(StoreError::Sqlite)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO pending_calls (identity, record, caller_was_parsed)
                     VALUES (?1, ?1, ?2)",
                )
                .map_err(StoreError::Sqlite)?;
            for (identity, parsed) in &identities {
                stmt.execute(params![identity, parsed])
                    .map_err(StoreError::Sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn record_project(&self, record: &ProjectRecord) -> crate::error::Result<()> {
        let namespaces =
            serde_json::to_string(&record.namespaces).map_err(StoreError::Serialization)?;
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        conn.execute(
            "INSERT INTO projects (name, namespaces, ingested_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                namespaces = excluded.namespaces,
                ingested_at = excluded.ingested_at",
            params![record.name, namespaces, record.ingested_at.to_rfc3339()],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn projects(&self) -> crate::error::Result<Vec<ProjectRecord>> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let mut stmt = conn
            .prepare_cached("SELECT name, namespaces, ingested_at FROM projects ORDER BY name")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(StoreError::Sqlite)?;

        let mut out = Vec::new();
        for row in rows {
            let (name, namespaces, ingested_at) = row.map_err(StoreError::Sqlite)?;
            let ingested_at = DateTime::parse_from_rfc3339(&ingested_at)
                .map_err(|_| StoreError::Unknown {
                    what: "timestamp",
                    value: ingested_at.clone(),
                })?
                .with_timezone(&Utc);
            out.push(ProjectRecord {
                name,
                namespaces: serde_json::from_str(&namespaces)
                    .map_err(StoreError::Serialization)?,
                ingested_at,
            });
        }
        Ok(out)
    }

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let conn = self.conn.lock().expect("relink store mutex poisoned");
        let mut stats = StoreStats::default();

        let mut stmt = conn
            .prepare_cached("SELECT label, COUNT(*) FROM nodes GROUP BY label")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::Sqlite)?;
        for row in rows {
            let (label, count) = row.map_err(StoreError::Sqlite)?;
            stats
                .nodes_by_label
                .insert(label, u64::try_from(count).unwrap_or(0));
        }

        let mut stmt = conn
            .prepare_cached("SELECT rel_type, COUNT(*) FROM relationships GROUP BY rel_type")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::Sqlite)?;
        for row in rows {
            let (rel_type, count) = row.map_err(StoreError::Sqlite)?;
            stats
                .relationships_by_type
                .insert(rel_type, u64::try_from(count).unwrap_or(0));
        }

        let count = |sql: &str| -> Result<u64, StoreError> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        };
        stats.pending_calls = count("SELECT COUNT(*) FROM pending_calls")?;
        stats.unparsed_pending =
            count("SELECT COUNT(*) FROM pending_calls WHERE caller_was_parsed = 0")?;
        stats.projects = count("SELECT COUNT(*) FROM projects")?;

        Ok(stats)
    }
}
