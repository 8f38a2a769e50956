//! SQLite-backed [`EntityStore`].
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so the CLI can read while a watcher writes
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON` so a canvas never points at a missing project

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::debug;

use super::{EntityStore, StoreError, migrations};
use crate::model::{AppState, Canvas, CanvasId, Element, Project, ProjectId};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CANVAS_COLUMNS: &str = "canvas_id, name, project_id, elements_json, app_state_json, \
                              created_at_us, updated_at_us";
const PROJECT_COLUMNS: &str = "project_id, name, canvas_ids_json, created_at_us, updated_at_us";

/// Durable store over a single SQLite connection.
///
/// Statements are short and run inline; the connection mutex is never held
/// across an await point.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store database, apply runtime pragmas, and migrate
    /// the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;

        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database with the full schema, for tests and previews.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct CanvasRow {
    id: String,
    name: String,
    project_id: Option<String>,
    elements_json: String,
    app_state_json: String,
    created_at_us: i64,
    updated_at_us: i64,
}

impl CanvasRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            project_id: row.get(2)?,
            elements_json: row.get(3)?,
            app_state_json: row.get(4)?,
            created_at_us: row.get(5)?,
            updated_at_us: row.get(6)?,
        })
    }

    fn into_canvas(self) -> Result<Canvas, StoreError> {
        let elements: Vec<Element> =
            serde_json::from_str(&self.elements_json).map_err(|source| StoreError::Corrupt {
                id: self.id.clone(),
                column: "elements_json",
                source,
            })?;
        let app_state: AppState =
            serde_json::from_str(&self.app_state_json).map_err(|source| StoreError::Corrupt {
                id: self.id.clone(),
                column: "app_state_json",
                source,
            })?;
        Ok(Canvas {
            created_at: from_micros(&self.id, self.created_at_us)?,
            updated_at: from_micros(&self.id, self.updated_at_us)?,
            id: CanvasId::new_unchecked(self.id),
            name: self.name,
            project_id: self.project_id.map(ProjectId::new_unchecked),
            elements,
            app_state,
        })
    }
}

struct ProjectRow {
    id: String,
    name: String,
    canvas_ids_json: String,
    created_at_us: i64,
    updated_at_us: i64,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            canvas_ids_json: row.get(2)?,
            created_at_us: row.get(3)?,
            updated_at_us: row.get(4)?,
        })
    }

    fn into_project(self) -> Result<Project, StoreError> {
        let canvas_ids: Vec<CanvasId> =
            serde_json::from_str(&self.canvas_ids_json).map_err(|source| StoreError::Corrupt {
                id: self.id.clone(),
                column: "canvas_ids_json",
                source,
            })?;
        Ok(Project {
            created_at: from_micros(&self.id, self.created_at_us)?,
            updated_at: from_micros(&self.id, self.updated_at_us)?,
            id: ProjectId::new_unchecked(self.id),
            name: self.name,
            canvas_ids,
        })
    }
}

fn from_micros(id: &str, value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(value).ok_or_else(|| StoreError::InvalidTimestamp {
        id: id.to_owned(),
        value,
    })
}

fn encode<T: serde::Serialize>(
    id: &str,
    column: &'static str,
    value: &T,
) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Corrupt {
        id: id.to_owned(),
        column,
        source,
    })
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_canvas(&self, id: &CanvasId) -> Result<Option<Canvas>, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {CANVAS_COLUMNS} FROM canvases WHERE canvas_id = ?1"),
                [id.as_str()],
                CanvasRow::from_row,
            )
            .optional()?;
        row.map(CanvasRow::into_canvas).transpose()
    }

    async fn list_canvases(&self) -> Result<Vec<Canvas>, StoreError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {CANVAS_COLUMNS} FROM canvases ORDER BY updated_at_us DESC, canvas_id ASC"
            ))?;
            let rows = stmt
                .query_map([], CanvasRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(CanvasRow::into_canvas).collect()
    }

    async fn put_canvas(&self, canvas: &Canvas) -> Result<(), StoreError> {
        let id = canvas.id.as_str();
        let elements_json = encode(id, "elements_json", &canvas.elements)?;
        let app_state_json = encode(id, "app_state_json", &canvas.app_state)?;
        self.conn().execute(
            "INSERT INTO canvases (
                canvas_id, name, project_id, elements_json, app_state_json,
                created_at_us, updated_at_us
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(canvas_id) DO UPDATE SET
                name = excluded.name,
                project_id = excluded.project_id,
                elements_json = excluded.elements_json,
                app_state_json = excluded.app_state_json,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us",
            params![
                id,
                canvas.name,
                canvas.project_id.as_ref().map(ProjectId::as_str),
                elements_json,
                app_state_json,
                canvas.created_at.timestamp_micros(),
                canvas.updated_at.timestamp_micros(),
            ],
        )?;
        debug!(canvas_id = id, elements = canvas.elements.len(), "canvas stored");
        Ok(())
    }

    async fn delete_canvas(&self, id: &CanvasId) -> Result<bool, StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM canvases WHERE canvas_id = ?1", [id.as_str()])?;
        Ok(removed > 0)
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
                [id.as_str()],
                ProjectRow::from_row,
            )
            .optional()?;
        row.map(ProjectRow::into_project).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name COLLATE NOCASE ASC, project_id ASC"
            ))?;
            let rows = stmt
                .query_map([], ProjectRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    async fn put_project(&self, project: &Project) -> Result<(), StoreError> {
        let id = project.id.as_str();
        let canvas_ids_json = encode(id, "canvas_ids_json", &project.canvas_ids)?;
        self.conn().execute(
            "INSERT INTO projects (project_id, name, canvas_ids_json, created_at_us, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(project_id) DO UPDATE SET
                name = excluded.name,
                canvas_ids_json = excluded.canvas_ids_json,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us",
            params![
                id,
                project.name,
                canvas_ids_json,
                project.created_at.timestamp_micros(),
                project.updated_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<bool, StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM projects WHERE project_id = ?1", [id.as_str()])?;
        Ok(removed > 0)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                id: key.to_owned(),
                column: "value_json",
                source,
            })
        })
        .transpose()
    }

    async fn set_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw = encode(key, "value_json", value)?;
        self.conn().execute(
            "INSERT INTO settings (key, value_json) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
            params![key, raw],
        )?;
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    async fn probe(&self) -> bool {
        let conn = self.conn();
        let readable = conn
            .query_row("SELECT COUNT(*) FROM canvases", [], |row| row.get::<_, i64>(0))
            .map_err(|e| debug!(error = %e, "store read probe failed"))
            .is_ok();
        let writable = conn
            .execute(
                "UPDATE store_meta SET schema_version = schema_version WHERE id = 1",
                [],
            )
            .map_err(|e| debug!(error = %e, "store write probe failed"))
            .is_ok();
        debug!(readable, writable, "store probe");
        readable && writable
    }
}
