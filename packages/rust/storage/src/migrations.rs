//! SQL migration definitions for the SiteScribe content-store database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: content_stores, index_units, FTS5",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named content stores (one per index build)
CREATE TABLE IF NOT EXISTS content_stores (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    unit_count INTEGER NOT NULL DEFAULT 0
);

-- Discrete indexed units (one per retained page)
CREATE TABLE IF NOT EXISTS index_units (
    id           TEXT PRIMARY KEY,
    store_id     TEXT NOT NULL REFERENCES content_stores(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    content      TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    content_len  INTEGER NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE(store_id, url)
);

CREATE INDEX IF NOT EXISTS idx_units_store_id ON index_units(store_id);

-- Full-text search over unit content
CREATE VIRTUAL TABLE IF NOT EXISTS units_fts USING fts5(
    content,
    content=index_units,
    content_rowid=rowid
);

-- Triggers to keep FTS in sync with index_units
CREATE TRIGGER IF NOT EXISTS units_fts_insert AFTER INSERT ON index_units BEGIN
    INSERT INTO units_fts(rowid, content)
    VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS units_fts_delete AFTER DELETE ON index_units BEGIN
    INSERT INTO units_fts(units_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS units_fts_update AFTER UPDATE ON index_units BEGIN
    INSERT INTO units_fts(units_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
    INSERT INTO units_fts(rowid, content)
    VALUES (new.rowid, new.content);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
