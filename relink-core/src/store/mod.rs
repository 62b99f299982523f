pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::types::{
    FetchRow, LookupQuery, NodeLabel, NodeRecord, NodeRef, PendingCall, ProjectRecord, Properties,
    RelType, Relationship, StoreStats,
};

/// The graph storage abstraction. Ingestion and resolution read and write
/// only through this trait.
///
/// Writes are buffered until [`GraphBackend::flush`]; nodes are always
/// applied before relationships so an edge never precedes its endpoints.
#[async_trait::async_trait]
pub trait GraphBackend: Send + Sync {
    // ── Writes ─────────────────────────────────────────────────────

    /// Upsert a node keyed by `(label, qualified_name)`. Later properties win.
    async fn ensure_node(
        &self,
        label: NodeLabel,
        qualified_name: &str,
        properties: Properties,
    ) -> crate::error::Result<()>;

    /// Upsert a relationship keyed by `(from, rel_type, to)`.
    async fn ensure_relationship(
        &self,
        from: &NodeRef,
        rel_type: RelType,
        to: &NodeRef,
        properties: Properties,
    ) -> crate::error::Result<()>;

    /// Apply buffered writes.
    async fn flush(&self) -> crate::error::Result<()>;

    // ── Reads ──────────────────────────────────────────────────────

    /// Run one batched lookup over flushed nodes.
    async fn fetch(&self, query: &LookupQuery) -> crate::error::Result<Vec<FetchRow>>;

    /// All flushed relationships of one type, sorted by endpoints.
    async fn relationships(&self, rel_type: RelType) -> crate::error::Result<Vec<Relationship>>;

    /// All flushed nodes of one label, sorted by qualified name.
    async fn nodes(&self, label: NodeLabel) -> crate::error::Result<Vec<NodeRecord>>;

    // ── Pending calls ──────────────────────────────────────────────

    /// Append a pending call. Identical records are stored once.
    async fn record_pending(&self, call: &PendingCall) -> crate::error::Result<()>;

    /// Every stored pending call, in insertion order.
    async fn get_pending(&self) -> crate::error::Result<Vec<PendingCall>>;

    /// Atomically replace the whole pending set.
    async fn replace_pending(&self, calls: &[PendingCall]) -> crate::error::Result<()>;

    // ── Projects ───────────────────────────────────────────────────

    /// Insert or replace the record for `record.name`.
    async fn record_project(&self, record: &ProjectRecord) -> crate::error::Result<()>;

    /// All project records, sorted by name.
    async fn projects(&self) -> crate::error::Result<Vec<ProjectRecord>>;

    // ── Statistics ─────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats>;
}
