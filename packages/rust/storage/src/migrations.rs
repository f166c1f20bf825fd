//! SQL migration definitions for the stacharvest collection index.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

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
        description: "Initial schema: collections index, pipeline runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Source collections index: one row per (service, collection id), carrying
-- the per-stage pipeline status.
CREATE TABLE IF NOT EXISTS collections (
    collection_id        TEXT PRIMARY KEY,
    service_json         TEXT NOT NULL,
    source_schema        TEXT NOT NULL,
    target               TEXT,
    n_items              INTEGER,
    targets_json         TEXT NOT NULL,
    extracted            INTEGER NOT NULL DEFAULT 0,
    extracted_files_json TEXT NOT NULL,
    transformed          INTEGER NOT NULL DEFAULT 0,
    stac_dir             TEXT,
    ingested             INTEGER NOT NULL DEFAULT 0,
    stac_url             TEXT,
    updated_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_schema ON collections(source_schema);
CREATE INDEX IF NOT EXISTS idx_collections_target ON collections(target);

-- Pipeline run history, one row per stage invocation.
CREATE TABLE IF NOT EXISTS runs (
    id            TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    stage         TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    stats_json    TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_collection ON runs(collection_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
