//! In-memory [`EntityStore`].
//!
//! Backs degraded mode when the SQLite store cannot be opened, and gives tests
//! control over the store round-trip: every call yields to the scheduler once
//! (so other tasks may run, exactly as they could during real I/O), writes can
//! be made to fail, and durable writes are counted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{EntityStore, StoreError};
use crate::model::{Canvas, CanvasId, Project, ProjectId};

#[derive(Debug, Default)]
struct Tables {
    canvases: BTreeMap<CanvasId, Canvas>,
    projects: BTreeMap<ProjectId, Project>,
    settings: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    canvas_writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `put_canvas` calls so far.
    #[must_use]
    pub fn canvas_writes(&self) -> usize {
        self.canvas_writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_owned()));
        }
        Ok(())
    }
}

async fn round_trip() {
    tokio::task::yield_now().await;
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_canvas(&self, id: &CanvasId) -> Result<Option<Canvas>, StoreError> {
        round_trip().await;
        Ok(self.tables().canvases.get(id).cloned())
    }

    async fn list_canvases(&self) -> Result<Vec<Canvas>, StoreError> {
        round_trip().await;
        let mut canvases: Vec<Canvas> = self.tables().canvases.values().cloned().collect();
        canvases.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(canvases)
    }

    async fn put_canvas(&self, canvas: &Canvas) -> Result<(), StoreError> {
        round_trip().await;
        self.check_writable()?;
        let mut tables = self.tables();
        if let Some(project_id) = &canvas.project_id
            && !tables.projects.contains_key(project_id)
        {
            return Err(StoreError::Constraint(format!(
                "canvas {} references missing project {project_id}",
                canvas.id
            )));
        }
        tables.canvases.insert(canvas.id.clone(), canvas.clone());
        self.canvas_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_canvas(&self, id: &CanvasId) -> Result<bool, StoreError> {
        round_trip().await;
        self.check_writable()?;
        Ok(self.tables().canvases.remove(id).is_some())
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        round_trip().await;
        Ok(self.tables().projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        round_trip().await;
        let mut projects: Vec<Project> = self.tables().projects.values().cloned().collect();
        projects.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(projects)
    }

    async fn put_project(&self, project: &Project) -> Result<(), StoreError> {
        round_trip().await;
        self.check_writable()?;
        self.tables()
            .projects
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<bool, StoreError> {
        round_trip().await;
        self.check_writable()?;
        let mut tables = self.tables();
        let removed = tables.projects.remove(id).is_some();
        for canvas in tables.canvases.values_mut() {
            if canvas.project_id.as_ref() == Some(id) {
                canvas.project_id = None;
            }
        }
        Ok(removed)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        round_trip().await;
        Ok(self.tables().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        round_trip().await;
        self.check_writable()?;
        self.tables().settings.insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<(), StoreError> {
        round_trip().await;
        self.check_writable()?;
        self.tables().settings.remove(key);
        Ok(())
    }

    async fn probe(&self) -> bool {
        !self.fail_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_writes_are_reported_and_not_counted() {
        let store = MemoryStore::new();
        let canvas = Canvas::new("a", None);
        store.put_canvas(&canvas).await.expect("first write");
        store.set_fail_writes(true);
        assert!(store.put_canvas(&canvas).await.is_err());
        assert!(!store.probe().await);
        assert_eq!(store.canvas_writes(), 1);
    }

    #[tokio::test]
    async fn mirrors_project_foreign_key() {
        let store = MemoryStore::new();
        let project = Project::new("p");
        let mut canvas = Canvas::new("a", Some(project.id.clone()));
        assert!(matches!(
            store.put_canvas(&canvas).await,
            Err(StoreError::Constraint(_))
        ));

        store.put_project(&project).await.expect("project");
        store.put_canvas(&canvas).await.expect("canvas");
        store.delete_project(&project.id).await.expect("delete");

        canvas = store.get_canvas(&canvas.id).await.expect("get").expect("exists");
        assert_eq!(canvas.project_id, None);
    }
}
