//! SQL migration definitions for the knowledge database.
//!
//! Migrations are applied in order on database open. Version 1 is the
//! first `knowledge` table, so a database created by an older tool is
//! picked up as-is and only gains the later columns and tables.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: knowledge",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only knowledge items
CREATE TABLE IF NOT EXISTS knowledge (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    title         TEXT,
    url           TEXT,
    raw_text      TEXT,
    summary       TEXT,
    cluster_label INTEGER,
    depth         INTEGER
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Insertion timestamps and research run history",
            sql: r#"
ALTER TABLE knowledge ADD COLUMN created_at TEXT;

CREATE INDEX IF NOT EXISTS idx_knowledge_depth ON knowledge(depth);

-- One row per research loop invocation
CREATE TABLE IF NOT EXISTS research_runs (
    id          TEXT PRIMARY KEY,
    topic       TEXT NOT NULL,
    max_depth   INTEGER NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

/// Highest version in [`all_migrations`].
pub(crate) fn latest_version() -> u32 {
    all_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
