/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for relink's `SQLite` database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS relink_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Entity nodes; qualified names are unique per label
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    name TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE(label, qualified_name)
);
CREATE INDEX IF NOT EXISTS idx_nodes_qn ON nodes(qualified_name);
-- Last qualified-name segment, narrows suffix lookups
CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);

-- Directed typed relationships between nodes
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    to_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE(from_id, rel_type, to_id)
);
CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(rel_type);
CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_id);

-- Unresolved call sites awaiting a later pass
CREATE TABLE IF NOT EXISTS pending_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL UNIQUE,
    record TEXT NOT NULL,
    caller_was_parsed INTEGER NOT NULL
);

-- Ingested projects and the namespaces they declare
CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,
    namespaces TEXT NOT NULL DEFAULT '[]',
    ingested_at TEXT NOT NULL
);
";
