//! Orchestration: one entity store, one library, one working selection.
//!
//! A [`Session`] owns everything the sync engine and the commit handler read
//! as injected dependencies, and runs the user-facing workflows (create,
//! rename, move, delete, select, save) against the store and the in-memory
//! library in step.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{DrawerEvent, EventBus, SubscriptionId, SyncPayload};
use crate::config::{DrawerConfig, StoreConfig};
use crate::error::{ErrorCode, SyncError};
use crate::host::HostAdapter;
use crate::library::{Library, LibraryHandle, LookupError};
use crate::model::element::normalize_elements;
use crate::model::{Canvas, CanvasId, Project, ProjectId};
use crate::selection::SelectionTracker;
use crate::store::{EntityStore, MemoryStore, SqliteStore, StoreError};
use crate::sync::{CommitHandler, CommitOutcome, SkipReason, SyncEngine};
use crate::transfer::{self, TransferError};

/// What happens to member canvases when their project is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectDeletePolicy {
    /// Keep the canvases and make them unorganized.
    #[default]
    DetachMembers,
    /// Delete the canvases with the project.
    DeleteMembers,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("canvas {0} not found")]
    CanvasNotFound(CanvasId),

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("invalid import: {0}")]
    Import(#[from] TransferError),
}

impl SessionError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Store(_) => ErrorCode::StoreWriteFailed,
            Self::Sync(e) => e.code(),
            Self::Lookup(LookupError::Ambiguous { .. }) => ErrorCode::AmbiguousId,
            Self::Lookup(LookupError::NotFound { kind: "project", .. }) => {
                ErrorCode::ProjectNotFound
            }
            Self::Lookup(LookupError::NotFound { .. }) => ErrorCode::CanvasNotFound,
            Self::CanvasNotFound(_) => ErrorCode::CanvasNotFound,
            Self::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            Self::Import(_) => ErrorCode::InvalidImport,
        }
    }
}

pub struct Session {
    config: DrawerConfig,
    store: Arc<dyn EntityStore>,
    degraded: Option<String>,
    bus: EventBus,
    library: LibraryHandle,
    selection: SelectionTracker,
    commits: CommitHandler,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("degraded", &self.degraded)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

async fn open_durable(config: &StoreConfig) -> Result<Arc<dyn EntityStore>, String> {
    let Some(path) = config.resolved_path() else {
        return Err("no data directory to place the store in".to_owned());
    };
    let store = SqliteStore::open(&path).map_err(|e| format!("{e:#}"))?;
    if !store.probe().await {
        return Err(format!("{} is not writable", path.display()));
    }
    debug!(path = %path.display(), "store opened");
    Ok(Arc::new(store))
}

impl Session {
    /// Open the configured SQLite store, falling back to an in-memory store
    /// (degraded mode) when it cannot be opened or fails its probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded from the store that
    /// ended up being used.
    pub async fn open(config: DrawerConfig) -> Result<Self> {
        let (store, degraded): (Arc<dyn EntityStore>, _) = match open_durable(&config.store).await {
            Ok(store) => (store, None),
            Err(reason) => {
                warn!(reason = %reason, "entity store unavailable, keeping changes in memory");
                (Arc::new(MemoryStore::new()), Some(reason))
            }
        };
        Self::with_store(config, store, degraded)
            .await
            .context("failed to load the canvas library")
    }

    /// Build a session over an already opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if canvases or projects cannot be listed.
    pub async fn with_store(
        config: DrawerConfig,
        store: Arc<dyn EntityStore>,
        degraded: Option<String>,
    ) -> Result<Self, SessionError> {
        let canvases = store.list_canvases().await?;
        let projects = store.list_projects().await?;
        let mut library = Library::new(canvases, projects);

        let report = library.reconcile_memberships();
        if !report.is_empty() {
            info!(
                projects = report.projects.len(),
                orphans = report.orphaned_canvases.len(),
                "repairing project memberships"
            );
            let canvases: Vec<Canvas> = report
                .orphaned_canvases
                .iter()
                .filter_map(|id| library.canvas(id).cloned())
                .collect();
            let projects: Vec<Project> = report
                .projects
                .iter()
                .filter_map(|id| library.project(id).cloned())
                .collect();
            for canvas in &canvases {
                if let Err(error) = store.put_canvas(canvas).await {
                    warn!(canvas_id = %canvas.id, error = %error, "could not persist repaired canvas");
                }
            }
            for project in &projects {
                if let Err(error) = store.put_project(project).await {
                    warn!(project_id = %project.id, error = %error, "could not persist repaired project");
                }
            }
        }

        let library = LibraryHandle::new(library);
        let selection = SelectionTracker::new(Arc::clone(&store));
        let known = library.clone();
        if let Some(id) = selection.restore(move |id| known.read().contains_canvas(id)).await {
            debug!(canvas_id = %id, "restored working selection");
        }

        let bus = EventBus::new();
        let commits = CommitHandler::new(
            Arc::clone(&store),
            library.clone(),
            selection.handle(),
            bus.clone(),
        );

        Ok(Self {
            config,
            store,
            degraded,
            bus,
            library,
            selection,
            commits,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DrawerConfig {
        &self.config
    }

    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn library(&self) -> &LibraryHandle {
        &self.library
    }

    #[must_use]
    pub const fn commit_handler(&self) -> &CommitHandler {
        &self.commits
    }

    /// Whether the session fell back to an in-memory store.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    #[must_use]
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    #[must_use]
    pub fn current_canvas_id(&self) -> Option<CanvasId> {
        self.selection.get()
    }

    #[must_use]
    pub fn current_canvas(&self) -> Option<Canvas> {
        let id = self.selection.get()?;
        self.library.read().canvas(&id).cloned()
    }

    /// # Errors
    ///
    /// Returns an error if no canvas matches, or the query is ambiguous.
    pub fn find_canvas(&self, query: &str) -> Result<Canvas, SessionError> {
        Ok(self.library.read().find_canvas(query)?.clone())
    }

    /// # Errors
    ///
    /// Returns an error if no project matches, or the query is ambiguous.
    pub fn find_project(&self, query: &str) -> Result<Project, SessionError> {
        Ok(self.library.read().find_project(query)?.clone())
    }

    fn canvas(&self, id: &CanvasId) -> Result<Canvas, SessionError> {
        self.library
            .read()
            .canvas(id)
            .cloned()
            .ok_or_else(|| SessionError::CanvasNotFound(id.clone()))
    }

    fn project(&self, id: &ProjectId) -> Result<Project, SessionError> {
        self.library
            .read()
            .project(id)
            .cloned()
            .ok_or_else(|| SessionError::ProjectNotFound(id.clone()))
    }

    /// Latest stored version, which may be newer than the library's copy if a
    /// commit is between its write and its library update.
    async fn stored_canvas(&self, id: &CanvasId) -> Result<Canvas, SessionError> {
        self.store
            .get_canvas(id)
            .await?
            .ok_or_else(|| SessionError::CanvasNotFound(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Canvas workflows
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if `project_id` is unknown or the store rejects a
    /// write.
    pub async fn create_canvas(
        &self,
        name: impl Into<String>,
        project_id: Option<ProjectId>,
    ) -> Result<Canvas, SessionError> {
        self.insert_canvas(Canvas::new(name, project_id)).await
    }

    /// # Errors
    ///
    /// Returns an error if the source canvas is unknown or a write fails.
    pub async fn duplicate_canvas(
        &self,
        id: &CanvasId,
        name: Option<String>,
    ) -> Result<Canvas, SessionError> {
        let source = self.stored_canvas(id).await?;
        let name = name.unwrap_or_else(|| format!("{} (copy)", source.name));
        self.insert_canvas(source.duplicate(name)).await
    }

    /// Create a canvas from an exported document or a bare element array.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a drawing, `project_id` is unknown,
    /// or a write fails.
    pub async fn import_canvas(
        &self,
        text: &str,
        name: impl Into<String>,
        project_id: Option<ProjectId>,
    ) -> Result<Canvas, SessionError> {
        let doc = transfer::parse_import(text)?;
        let mut canvas = Canvas::new(name, project_id);
        canvas.elements = normalize_elements(canvas.id.as_str(), &doc.elements);
        if let Some(app_state) = doc.app_state {
            canvas.app_state = app_state;
        }
        self.insert_canvas(canvas).await
    }

    /// # Errors
    ///
    /// Returns an error if the canvas is unknown or cannot be read.
    pub async fn export_canvas(&self, id: &CanvasId) -> Result<Value, SessionError> {
        Ok(transfer::export_canvas(&self.stored_canvas(id).await?))
    }

    async fn insert_canvas(&self, canvas: Canvas) -> Result<Canvas, SessionError> {
        let project = canvas
            .project_id
            .as_ref()
            .map(|pid| self.project(pid))
            .transpose()?;

        self.store.put_canvas(&canvas).await?;
        self.library.write().upsert_canvas(canvas.clone());

        if let Some(mut project) = project {
            project.add_canvas(&canvas.id);
            self.store.put_project(&project).await?;
            self.library.write().upsert_project(project);
            self.bus.emit(&DrawerEvent::ProjectsChanged);
        }

        info!(canvas_id = %canvas.id, name = %canvas.name, "canvas created");
        self.bus.emit(&DrawerEvent::CanvasSaved(canvas.clone()));
        Ok(canvas)
    }

    /// # Errors
    ///
    /// Returns an error if the canvas is unknown or the write fails.
    pub async fn rename_canvas(
        &self,
        id: &CanvasId,
        name: impl Into<String>,
    ) -> Result<Canvas, SessionError> {
        let _commits = self.commits.exclusive().await;
        let mut canvas = self.stored_canvas(id).await?;
        canvas.name = name.into();
        canvas.touch();
        self.store.put_canvas(&canvas).await?;
        self.library.write().upsert_canvas(canvas.clone());
        info!(canvas_id = %canvas.id, name = %canvas.name, "canvas renamed");
        self.bus.emit(&DrawerEvent::CanvasSaved(canvas.clone()));
        Ok(canvas)
    }

    /// Move a canvas into `target`, or out of any project for `None`.
    ///
    /// Both membership lists and the canvas are written; the new project is
    /// written first so the canvas never references a project that does not
    /// list it.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas or target project is unknown, or a
    /// write fails.
    pub async fn move_canvas(
        &self,
        id: &CanvasId,
        target: Option<ProjectId>,
    ) -> Result<Canvas, SessionError> {
        let _commits = self.commits.exclusive().await;
        let mut canvas = self.stored_canvas(id).await?;
        if canvas.project_id == target {
            return Ok(canvas);
        }

        let new_project = target.as_ref().map(|pid| self.project(pid)).transpose()?;
        let old_project = canvas
            .project_id
            .as_ref()
            .and_then(|pid| self.library.read().project(pid).cloned());

        if let Some(mut project) = new_project {
            project.add_canvas(&canvas.id);
            self.store.put_project(&project).await?;
            self.library.write().upsert_project(project);
        }

        canvas.project_id = target;
        canvas.touch();
        self.store.put_canvas(&canvas).await?;
        self.library.write().upsert_canvas(canvas.clone());

        if let Some(mut project) = old_project
            && project.remove_canvas(&canvas.id)
        {
            self.store.put_project(&project).await?;
            self.library.write().upsert_project(project);
        }

        info!(
            canvas_id = %canvas.id,
            project_id = canvas.project_id.as_ref().map(ProjectId::as_str),
            "canvas moved"
        );
        self.bus.emit(&DrawerEvent::CanvasSaved(canvas.clone()));
        self.bus.emit(&DrawerEvent::ProjectsChanged);
        Ok(canvas)
    }

    /// Delete a canvas, drop it from its project, and clear the working
    /// selection if it was open. Waits for an in-flight commit to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas is unknown or a write fails.
    pub async fn delete_canvas(&self, id: &CanvasId) -> Result<(), SessionError> {
        let _commits = self.commits.exclusive().await;
        let canvas = self.canvas(id)?;
        self.store.delete_canvas(id).await?;
        self.library.write().remove_canvas(id);
        self.forget_canvas(id).await;

        let owner = canvas
            .project_id
            .as_ref()
            .and_then(|pid| self.library.read().project(pid).cloned());
        if let Some(mut project) = owner
            && project.remove_canvas(id)
        {
            self.store.put_project(&project).await?;
            self.library.write().upsert_project(project);
            self.bus.emit(&DrawerEvent::ProjectsChanged);
        }

        info!(canvas_id = %id, "canvas deleted");
        Ok(())
    }

    /// Clear the selection if it points at a removed canvas and announce the
    /// removal.
    async fn forget_canvas(&self, id: &CanvasId) {
        if self.selection.get().as_ref() == Some(id)
            && let Err(error) = self.selection.set(None).await
        {
            warn!(error = %error, "could not persist cleared selection");
        }
        self.bus.emit(&DrawerEvent::CanvasDeleted(id.clone()));
    }

    // -----------------------------------------------------------------------
    // Project workflows
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn create_project(&self, name: impl Into<String>) -> Result<Project, SessionError> {
        let project = Project::new(name);
        self.store.put_project(&project).await?;
        self.library.write().upsert_project(project.clone());
        info!(project_id = %project.id, name = %project.name, "project created");
        self.bus.emit(&DrawerEvent::ProjectsChanged);
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns an error if the project is unknown or the write fails.
    pub async fn rename_project(
        &self,
        id: &ProjectId,
        name: impl Into<String>,
    ) -> Result<Project, SessionError> {
        let mut project = self.project(id)?;
        project.name = name.into();
        project.touch();
        self.store.put_project(&project).await?;
        self.library.write().upsert_project(project.clone());
        self.bus.emit(&DrawerEvent::ProjectsChanged);
        Ok(project)
    }

    /// Delete a project. Returns the member canvases that were detached or
    /// deleted, according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown or a write fails.
    pub async fn delete_project(
        &self,
        id: &ProjectId,
        policy: ProjectDeletePolicy,
    ) -> Result<Vec<CanvasId>, SessionError> {
        let _commits = self.commits.exclusive().await;
        self.project(id)?;
        let members: Vec<CanvasId> = self
            .library
            .read()
            .canvases_in(Some(id))
            .iter()
            .map(|c| c.id.clone())
            .collect();

        if policy == ProjectDeletePolicy::DeleteMembers {
            for member in &members {
                self.store.delete_canvas(member).await?;
                self.library.write().remove_canvas(member);
                self.forget_canvas(member).await;
            }
        }

        // The store clears `project_id` on remaining members itself.
        self.store.delete_project(id).await?;
        {
            let mut library = self.library.write();
            library.remove_project(id);
            if policy == ProjectDeletePolicy::DetachMembers {
                for member in &members {
                    if let Some(mut canvas) = library.canvas(member).cloned() {
                        canvas.project_id = None;
                        library.upsert_canvas(canvas);
                    }
                }
            }
        }

        info!(project_id = %id, members = members.len(), ?policy, "project deleted");
        self.bus.emit(&DrawerEvent::ProjectsChanged);
        Ok(members)
    }

    // -----------------------------------------------------------------------
    // Sync workflows
    // -----------------------------------------------------------------------

    /// An engine bound to this session's bus, selection and sync settings.
    #[must_use]
    pub fn engine(&self, host: HostAdapter) -> SyncEngine {
        SyncEngine::new(
            host,
            self.bus.clone(),
            self.selection.handle(),
            self.config.sync.clone(),
        )
    }

    /// Make `id` the working selection and load it into the host with a
    /// forced reload.
    ///
    /// Failing to persist the selection is logged; the selection still
    /// changes for this process.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas is unknown or the host write fails.
    pub async fn select_canvas(
        &self,
        engine: &SyncEngine,
        id: &CanvasId,
    ) -> Result<Canvas, SessionError> {
        let canvas = self.canvas(id)?;
        if let Err(error) = self.selection.set(Some(id.clone())).await {
            warn!(canvas_id = %id, error = %error, "could not persist working selection");
        }
        self.bus.emit(&DrawerEvent::CanvasSelected(canvas.clone()));
        engine.load_canvas_to_host(&canvas, true)?;
        Ok(canvas)
    }

    /// Commit the host document to the open canvas now, through the same
    /// checks as a debounced sync.
    ///
    /// # Errors
    ///
    /// Returns an error if no canvas is open or the store write fails.
    pub async fn save_now(&self, engine: &SyncEngine) -> Result<CommitOutcome, SessionError> {
        let Some(current) = self.selection.get() else {
            return Err(SyncError::NoCanvasOpen.into());
        };
        let Some(doc) = engine.get_host_document() else {
            debug!(canvas_id = %current, "nothing in host storage to save");
            return Ok(CommitOutcome::Skipped(SkipReason::NoHostDocument));
        };
        let payload = SyncPayload {
            elements: doc.elements,
            app_state: doc.app_state,
            origin_canvas_id: Some(current),
        };
        Ok(self.commits.commit(&payload).await?)
    }

    /// Run the engine driver and the commit loop until
    /// [`SyncRuntime::shutdown`].
    #[must_use]
    pub fn start(&self, host: HostAdapter) -> SyncRuntime {
        let engine = self.engine(host);
        let (subscription, events) = self.bus.subscribe_channel();
        let cancel = CancellationToken::new();
        let commits = tokio::spawn(self.commits.clone().run(events, cancel.clone()));
        let driver = engine.spawn();
        info!("sync started");
        SyncRuntime {
            engine,
            bus: self.bus.clone(),
            subscription,
            cancel,
            driver: Some(driver),
            commits: Some(commits),
        }
    }
}

/// Running engine driver plus commit loop.
///
/// Dropping it stops both tasks without waiting; [`SyncRuntime::shutdown`]
/// stops the engine first and lets already requested syncs commit.
#[derive(Debug)]
pub struct SyncRuntime {
    engine: SyncEngine,
    bus: EventBus,
    subscription: SubscriptionId,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
    commits: Option<JoinHandle<()>>,
}

impl SyncRuntime {
    #[must_use]
    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Stop observing the host, drain queued syncs, and wait for both tasks.
    pub async fn shutdown(mut self) {
        self.engine.shutdown();
        if let Some(driver) = self.driver.take()
            && let Err(error) = driver.await
        {
            warn!(error = %error, "sync driver ended abnormally");
        }
        // Closing the channel lets the commit loop finish what is queued.
        self.bus.unsubscribe(self.subscription);
        if let Some(commits) = self.commits.take()
            && let Err(error) = commits.await
        {
            warn!(error = %error, "commit loop ended abnormally");
        }
        info!("sync stopped");
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.engine.shutdown();
        self.cancel.cancel();
        self.bus.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::host::MemoryHost;
    use crate::model::{AppState, Element};
    use crate::store::CURRENT_CANVAS_SETTING;
    use serde_json::json;

    async fn memory_session() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::with_store(DrawerConfig::default(), store.clone(), None)
            .await
            .expect("session");
        (store, session)
    }

    fn memory_engine(session: &Session) -> (Arc<MemoryHost>, SyncEngine) {
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        (host, session.engine(adapter))
    }

    #[tokio::test]
    async fn create_in_project_records_membership_both_ways() {
        let (store, session) = memory_session().await;
        let project = session.create_project("Work").await.expect("project");
        let canvas = session
            .create_canvas("Plan", Some(project.id.clone()))
            .await
            .expect("canvas");

        let stored = store.get_project(&project.id).await.expect("get").expect("exists");
        assert_eq!(stored.canvas_ids, vec![canvas.id.clone()]);
        assert_eq!(
            session.library().read().canvases_in(Some(&project.id)).len(),
            1
        );
    }

    #[tokio::test]
    async fn create_in_unknown_project_fails_without_writing() {
        let (store, session) = memory_session().await;
        let err = session
            .create_canvas("Plan", Some(ProjectId::new_unchecked("ghost")))
            .await
            .expect_err("unknown project");
        assert_eq!(err.code(), ErrorCode::ProjectNotFound);
        assert_eq!(store.canvas_writes(), 0);
    }

    #[tokio::test]
    async fn move_updates_both_projects_and_the_canvas() {
        let (store, session) = memory_session().await;
        let a = session.create_project("A").await.expect("a");
        let b = session.create_project("B").await.expect("b");
        let canvas = session
            .create_canvas("Plan", Some(a.id.clone()))
            .await
            .expect("canvas");

        let moved = session
            .move_canvas(&canvas.id, Some(b.id.clone()))
            .await
            .expect("move");
        assert_eq!(moved.project_id.as_ref(), Some(&b.id));
        assert!(moved.updated_at > canvas.updated_at);

        let a = store.get_project(&a.id).await.expect("get").expect("a");
        let b = store.get_project(&b.id).await.expect("get").expect("b");
        assert!(a.canvas_ids.is_empty());
        assert_eq!(b.canvas_ids, vec![canvas.id.clone()]);

        let unorganized = session.move_canvas(&canvas.id, None).await.expect("detach");
        assert_eq!(unorganized.project_id, None);
        let b = store.get_project(&b.id).await.expect("get").expect("b");
        assert!(b.canvas_ids.is_empty());
    }

    #[tokio::test]
    async fn deleting_the_open_canvas_clears_selection() {
        let (store, session) = memory_session().await;
        let (_host, engine) = memory_engine(&session);
        let canvas = session.create_canvas("Plan", None).await.expect("canvas");
        session.select_canvas(&engine, &canvas.id).await.expect("select");
        assert_eq!(session.current_canvas_id(), Some(canvas.id.clone()));

        session.delete_canvas(&canvas.id).await.expect("delete");

        assert_eq!(session.current_canvas_id(), None);
        assert_eq!(
            store.get_setting(CURRENT_CANVAS_SETTING).await.expect("get"),
            None
        );
        assert!(!session.library().read().contains_canvas(&canvas.id));
        engine.shutdown();
    }

    #[tokio::test]
    async fn delete_waits_for_an_in_flight_commit() {
        let (store, session) = memory_session().await;
        let (_host, engine) = memory_engine(&session);
        let project = session.create_project("Work").await.expect("project");
        let canvas = session
            .create_canvas("Plan", Some(project.id.clone()))
            .await
            .expect("canvas");
        session.select_canvas(&engine, &canvas.id).await.expect("select");

        let handler = session.commit_handler().clone();
        let payload = SyncPayload {
            elements: vec![Element::from_value(json!({"id": "e1"})).expect("object")],
            app_state: AppState::default(),
            origin_canvas_id: Some(canvas.id.clone()),
        };
        let commit = tokio::spawn(async move { handler.commit(&payload).await });
        // The commit is now parked on its first store round-trip.
        tokio::task::yield_now().await;
        session.delete_canvas(&canvas.id).await.expect("delete");
        commit.await.expect("join").expect("commit");

        assert!(store.get_canvas(&canvas.id).await.expect("get").is_none());
        assert!(!session.library().read().contains_canvas(&canvas.id));
        let project = store.get_project(&project.id).await.expect("get").expect("project");
        assert!(project.canvas_ids.is_empty());
        engine.shutdown();
    }

    #[tokio::test]
    async fn delete_project_detaches_or_deletes_members() {
        let (store, session) = memory_session().await;
        let keep = session.create_project("Keep").await.expect("project");
        let kept = session
            .create_canvas("Kept", Some(keep.id.clone()))
            .await
            .expect("canvas");
        let detached = session
            .delete_project(&keep.id, ProjectDeletePolicy::DetachMembers)
            .await
            .expect("delete");
        assert_eq!(detached, vec![kept.id.clone()]);
        let stored = store.get_canvas(&kept.id).await.expect("get").expect("kept");
        assert_eq!(stored.project_id, None);
        assert_eq!(
            session.library().read().canvas(&kept.id).map(|c| c.project_id.clone()),
            Some(None)
        );

        let drop = session.create_project("Drop").await.expect("project");
        let gone = session
            .create_canvas("Gone", Some(drop.id.clone()))
            .await
            .expect("canvas");
        session
            .delete_project(&drop.id, ProjectDeletePolicy::DeleteMembers)
            .await
            .expect("delete");
        assert_eq!(store.get_canvas(&gone.id).await.expect("get"), None);
    }

    #[tokio::test]
    async fn open_repairs_memberships_and_restores_selection() {
        let store = Arc::new(MemoryStore::new());
        let mut project = Project::new("P");
        store.put_project(&project).await.expect("project");
        let canvas = Canvas::new("C", Some(project.id.clone()));
        store.put_canvas(&canvas).await.expect("canvas");
        // Membership list claims a canvas that does not exist, and misses the real one.
        project.canvas_ids = vec![CanvasId::new_unchecked("ghost")];
        store.put_project(&project).await.expect("project");
        store
            .set_setting(CURRENT_CANVAS_SETTING, &json!(canvas.id.as_str()))
            .await
            .expect("setting");

        let session = Session::with_store(DrawerConfig::default(), store.clone(), None)
            .await
            .expect("session");

        let repaired = store.get_project(&project.id).await.expect("get").expect("p");
        assert_eq!(repaired.canvas_ids, vec![canvas.id.clone()]);
        assert_eq!(session.current_canvas().map(|c| c.id), Some(canvas.id));
    }

    #[tokio::test]
    async fn stale_persisted_selection_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_setting(CURRENT_CANVAS_SETTING, &json!("missing"))
            .await
            .expect("setting");
        let session = Session::with_store(DrawerConfig::default(), store, None)
            .await
            .expect("session");
        assert_eq!(session.current_canvas_id(), None);
    }

    #[tokio::test]
    async fn unusable_store_path_falls_back_to_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").expect("write");
        let mut config = DrawerConfig::default();
        config.store.path = Some(blocker.join("drawer.sqlite3"));

        let session = Session::open(config).await.expect("session");

        assert!(session.is_degraded());
        assert!(session.degraded_reason().is_some());
        session.create_canvas("Scratch", None).await.expect("memory write");
    }

    #[tokio::test]
    async fn save_now_requires_an_open_canvas() {
        let (_store, session) = memory_session().await;
        let (_host, engine) = memory_engine(&session);
        let err = session.save_now(&engine).await.expect_err("nothing open");
        assert_eq!(err.code(), ErrorCode::NoCanvasOpen);
    }

    #[tokio::test]
    async fn save_now_commits_host_edits() {
        let (store, session) = memory_session().await;
        let (host, engine) = memory_engine(&session);
        let canvas = session.create_canvas("Plan", None).await.expect("canvas");
        session.select_canvas(&engine, &canvas.id).await.expect("select");

        host.host_write("excalidraw", r#"[{"id":"drawn","type":"rectangle"}]"#);
        let outcome = session.save_now(&engine).await.expect("save");

        assert!(outcome.is_committed());
        let stored = store.get_canvas(&canvas.id).await.expect("get").expect("c");
        assert_eq!(stored.elements.len(), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn import_then_export_keeps_the_drawing() {
        let (_store, session) = memory_session().await;
        let canvas = session
            .import_canvas(r#"[{"id":"a","type":"ellipse"}]"#, "Imported", None)
            .await
            .expect("import");
        assert_eq!(canvas.elements.len(), 1);

        let exported = session.export_canvas(&canvas.id).await.expect("export");
        assert_eq!(exported["elements"][0]["id"], json!("a"));

        let err = session
            .import_canvas("true", "Bad", None)
            .await
            .expect_err("not a drawing");
        assert_eq!(err.code(), ErrorCode::InvalidImport);
    }

    #[tokio::test]
    async fn duplicate_copies_elements_under_a_new_id() {
        let (_store, session) = memory_session().await;
        let source = session
            .import_canvas(r#"[{"id":"a"}]"#, "Plan", None)
            .await
            .expect("import");
        let copy = session
            .duplicate_canvas(&source.id, None)
            .await
            .expect("duplicate");
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.name, "Plan (copy)");
        assert_eq!(copy.elements, source.elements);
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_commits_debounced_host_edits() {
        let (store, session) = memory_session().await;
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        let runtime = session.start(adapter);
        let canvas = session.create_canvas("Plan", None).await.expect("canvas");
        session
            .select_canvas(runtime.engine(), &canvas.id)
            .await
            .expect("select");
        runtime.engine().settled().await;

        host.host_write("excalidraw", r#"[{"id":"drawn"}]"#);
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        runtime.shutdown().await;

        let stored = store.get_canvas(&canvas.id).await.expect("get").expect("c");
        assert_eq!(stored.elements.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_an_open_debounce_window() {
        let (store, session) = memory_session().await;
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        let runtime = session.start(adapter);
        let canvas = session.create_canvas("Plan", None).await.expect("canvas");
        session
            .select_canvas(runtime.engine(), &canvas.id)
            .await
            .expect("select");
        runtime.engine().settled().await;

        host.host_write("excalidraw", r#"[{"id":"drawn"}]"#);
        tokio::task::yield_now().await;
        runtime.shutdown().await;

        let stored = store.get_canvas(&canvas.id).await.expect("get").expect("c");
        assert!(stored.elements.is_empty());
    }
}
