//! SQLite schema for the entity store.
//!
//! - `canvases` holds one row per canvas; elements and app state are JSON text
//! - `projects` holds one row per project; `canvas_ids_json` is the ordered
//!   membership list mirrored from `canvases.project_id`
//! - `settings` is a scalar key/value table (JSON values)
//! - `store_meta` tracks the schema version alongside `PRAGMA user_version`

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    canvas_ids_json TEXT NOT NULL DEFAULT '[]',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS canvases (
    canvas_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    project_id TEXT REFERENCES projects(project_id) ON DELETE SET NULL,
    elements_json TEXT NOT NULL DEFAULT '[]',
    app_state_json TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);
";

/// Migration v2: listing indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_canvases_project ON canvases(project_id);
CREATE INDEX IF NOT EXISTS idx_canvases_updated ON canvases(updated_at_us DESC);
";

/// Indexes that must exist after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &["idx_canvases_project", "idx_canvases_updated"];
