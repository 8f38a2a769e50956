//! Durable persistence for canvases, projects, and scalar settings.
//!
//! [`EntityStore`] is the boundary the rest of the crate programs against.
//! Two implementations ship:
//! - [`SqliteStore`]: the durable store, one SQLite file per user
//! - [`MemoryStore`]: used when the durable store is unavailable at startup
//!   (degraded mode) and by tests

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Canvas, CanvasId, Project, ProjectId};

/// Settings key holding the working selection.
pub const CURRENT_CANVAS_SETTING: &str = "currentWorkingCanvasId";

/// Entity store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database reported an error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored JSON column could not be encoded or decoded.
    #[error("corrupt {column} for {id}: {source}")]
    Corrupt {
        id: String,
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A stored timestamp is outside the representable range.
    #[error("invalid timestamp {value} for {id}")]
    InvalidTimestamp { id: String, value: i64 },

    /// A write would break referential integrity.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The store was opened but cannot be used.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// CRUD per entity kind plus a key/value settings table.
///
/// Every method is a potential suspension point: callers must assume other
/// tasks (including selection changes) run between a call and its result.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_canvas(&self, id: &CanvasId) -> Result<Option<Canvas>, StoreError>;
    async fn list_canvases(&self) -> Result<Vec<Canvas>, StoreError>;
    async fn put_canvas(&self, canvas: &Canvas) -> Result<(), StoreError>;
    /// Returns whether a row was removed.
    async fn delete_canvas(&self, id: &CanvasId) -> Result<bool, StoreError>;

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError>;
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn put_project(&self, project: &Project) -> Result<(), StoreError>;
    /// Returns whether a row was removed.
    async fn delete_project(&self, id: &ProjectId) -> Result<bool, StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set_setting(&self, key: &str, value: &Value) -> Result<(), StoreError>;
    async fn remove_setting(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap accessibility probe used at startup. Never errors; an
    /// inaccessible store reports `false`.
    async fn probe(&self) -> bool;
}
