//! The only path by which a host sync reaches the entity store.
//!
//! A payload is written to the canvas it was observed for, and only while
//! that canvas is still the working selection. The selection is checked when
//! the payload arrives and again after the stored version has been fetched,
//! since the selection may move during that round-trip. The second check also
//! consults the persisted selection, which another process sharing the store
//! and the host directory may have moved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{DrawerEvent, EventBus, SyncPayload};
use crate::error::SyncError;
use crate::library::LibraryHandle;
use crate::model::{CanvasId, canvas::advance_timestamp, now};
use crate::selection::{SelectionHandle, persisted_selection};
use crate::store::EntityStore;

/// Why a payload was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither an origin nor a working selection names a canvas.
    NoTarget,
    /// The target is not in the in-memory library.
    UnknownCanvas,
    /// The working selection is no longer the payload's canvas.
    SelectionChanged,
    /// Payload and stored canvas are both empty.
    NothingToPersist,
    /// The target vanished from the store before the write.
    MissingInStore,
    /// The host holds no readable document.
    NoHostDocument,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoTarget => "no_target",
            Self::UnknownCanvas => "unknown_canvas",
            Self::SelectionChanged => "selection_changed",
            Self::NothingToPersist => "nothing_to_persist",
            Self::MissingInStore => "missing_in_store",
            Self::NoHostDocument => "no_host_document",
        }
    }
}

/// Result of handling one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        canvas_id: CanvasId,
        updated_at: DateTime<Utc>,
    },
    Skipped(SkipReason),
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

#[derive(Clone)]
pub struct CommitHandler {
    store: Arc<dyn EntityStore>,
    library: LibraryHandle,
    selection: SelectionHandle,
    bus: EventBus,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CommitHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitHandler")
            .field("selection", &self.selection.get())
            .finish_non_exhaustive()
    }
}

fn skip(reason: SkipReason, target: Option<&CanvasId>) -> Result<CommitOutcome, SyncError> {
    debug!(
        reason = reason.as_str(),
        canvas_id = target.map(CanvasId::as_str),
        "sync not committed"
    );
    Ok(CommitOutcome::Skipped(reason))
}

impl CommitHandler {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        library: LibraryHandle,
        selection: SelectionHandle,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            library,
            selection,
            bus,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Validate `payload` and, if it still belongs to the open canvas, persist
    /// it as that canvas's new version.
    ///
    /// Commits are serialized: at most one is between its first check and its
    /// durable write at any time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when the store fails, after emitting
    /// [`DrawerEvent::ErrorOccurred`]. Races and missing targets are not
    /// errors; they come back as [`CommitOutcome::Skipped`].
    pub async fn commit(&self, payload: &SyncPayload) -> Result<CommitOutcome, SyncError> {
        let _serial = self.write_lock.lock().await;

        let current = self.selection.get();
        let Some(target) = payload.origin_canvas_id.clone().or_else(|| current.clone()) else {
            return skip(SkipReason::NoTarget, None);
        };
        let Some(existing_empty) = self
            .library
            .read()
            .canvas(&target)
            .map(|c| c.elements.is_empty())
        else {
            return skip(SkipReason::UnknownCanvas, Some(&target));
        };
        if payload.origin_canvas_id.is_some() && current.as_ref() != Some(&target) {
            return skip(SkipReason::SelectionChanged, Some(&target));
        }
        if payload.elements.is_empty() && existing_empty {
            return skip(SkipReason::NothingToPersist, Some(&target));
        }

        let stored = match self.store.get_canvas(&target).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return skip(SkipReason::MissingInStore, Some(&target)),
            Err(source) => return Err(self.persistence_failure(target, source)),
        };

        match persisted_selection(self.store.as_ref()).await {
            Ok(Some(persisted)) if persisted != target => {
                debug!(persisted = %persisted, "working selection moved in another process");
                return skip(SkipReason::SelectionChanged, Some(&target));
            }
            Ok(_) => {}
            Err(error) => warn!(error = %error, "could not read persisted selection"),
        }
        if !self.selection.is(&target) {
            return skip(SkipReason::SelectionChanged, Some(&target));
        }
        if !self.library.read().contains_canvas(&target) {
            return skip(SkipReason::UnknownCanvas, Some(&target));
        }

        let previous = self
            .library
            .read()
            .canvas(&target)
            .map_or(stored.updated_at, |c| c.updated_at.max(stored.updated_at));
        let mut next = stored;
        next.elements.clone_from(&payload.elements);
        next.app_state.clone_from(&payload.app_state);
        next.updated_at = advance_timestamp(previous, now());

        if let Err(source) = self.store.put_canvas(&next).await {
            return Err(self.persistence_failure(target, source));
        }

        info!(
            canvas_id = %next.id,
            elements = next.elements.len(),
            live = next.live_element_count(),
            "canvas saved"
        );
        let outcome = CommitOutcome::Committed {
            canvas_id: next.id.clone(),
            updated_at: next.updated_at,
        };
        self.library.write().upsert_canvas(next.clone());
        self.bus.emit(&DrawerEvent::CanvasSaved(next));
        Ok(outcome)
    }

    /// Hold off commits until the guard drops.
    ///
    /// Workflows that rewrite or remove a canvas take this so a commit
    /// already past its checks cannot write the old version back.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Commit every [`DrawerEvent::SyncRequested`] from `events`, one at a
    /// time, until cancelled or the channel closes.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<DrawerEvent>, cancel: CancellationToken) {
        debug!("commit loop started");
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let DrawerEvent::SyncRequested(payload) = event {
                // Failures were already reported on the bus.
                let _ = self.commit(&payload).await;
            }
        }
        debug!("commit loop stopped");
    }

    fn persistence_failure(&self, canvas_id: CanvasId, source: crate::store::StoreError) -> SyncError {
        error!(canvas_id = %canvas_id, error = %source, "failed to persist canvas");
        self.bus.emit(&DrawerEvent::ErrorOccurred {
            error: format!("Failed to save canvas: {source}"),
            details: Some(json!({ "canvasId": canvas_id })),
        });
        SyncError::Persistence { canvas_id, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use crate::model::{AppState, Canvas, Element};
    use crate::selection::SelectionTracker;
    use crate::store::{CURRENT_CANVAS_SETTING, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        library: LibraryHandle,
        tracker: SelectionTracker,
        handler: CommitHandler,
        events: mpsc::UnboundedReceiver<DrawerEvent>,
    }

    async fn fixture(canvases: Vec<Canvas>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for canvas in &canvases {
            store.put_canvas(canvas).await.expect("seed canvas");
        }
        let base_writes = store.canvas_writes();
        assert_eq!(base_writes, canvases.len());
        let library = LibraryHandle::new(Library::new(canvases, vec![]));
        let tracker = SelectionTracker::new(store.clone());
        let bus = EventBus::new();
        let (_, events) = bus.subscribe_channel();
        let handler = CommitHandler::new(store.clone(), library.clone(), tracker.handle(), bus);
        Fixture {
            store,
            library,
            tracker,
            handler,
            events,
        }
    }

    fn elements(ids: &[&str]) -> Vec<Element> {
        ids.iter()
            .map(|id| Element::from_value(serde_json::json!({"id": id})).expect("object"))
            .collect()
    }

    fn payload(ids: &[&str], origin: Option<&CanvasId>) -> SyncPayload {
        SyncPayload {
            elements: elements(ids),
            app_state: AppState::default(),
            origin_canvas_id: origin.cloned(),
        }
    }

    #[tokio::test]
    async fn commits_to_open_canvas() {
        let x = Canvas::new("x", None);
        let before = x.updated_at;
        let mut f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select");

        let outcome = f
            .handler
            .commit(&payload(&["e1", "e2"], Some(&x.id)))
            .await
            .expect("commit");
        assert!(outcome.is_committed());

        let stored = f.store.get_canvas(&x.id).await.expect("get").expect("exists");
        let ids: Vec<_> = stored.elements.iter().filter_map(Element::id).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert!(stored.updated_at > before);
        assert_eq!(f.library.read().canvas(&x.id), Some(&stored));
        assert!(matches!(f.events.try_recv(), Ok(DrawerEvent::CanvasSaved(_))));
    }

    #[tokio::test]
    async fn empty_over_empty_is_not_written() {
        let x = Canvas::new("x", None);
        let f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select");

        let outcome = f.handler.commit(&payload(&[], Some(&x.id))).await.expect("commit");
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::NothingToPersist));
        assert_eq!(f.store.canvas_writes(), 1);
    }

    #[tokio::test]
    async fn clearing_a_non_empty_canvas_is_written() {
        let mut x = Canvas::new("x", None);
        x.elements = elements(&["a"]);
        let f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select");

        let outcome = f.handler.commit(&payload(&[], Some(&x.id))).await.expect("commit");
        assert!(outcome.is_committed());
    }

    #[tokio::test]
    async fn origin_mismatch_is_skipped() {
        let x = Canvas::new("x", None);
        let y = Canvas::new("y", None);
        let f = fixture(vec![x.clone(), y.clone()]).await;
        f.tracker.set(Some(y.id.clone())).await.expect("select y");

        let outcome = f
            .handler
            .commit(&payload(&["e1"], Some(&x.id)))
            .await
            .expect("commit");
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::SelectionChanged));
        assert_eq!(f.store.canvas_writes(), 2);
    }

    #[tokio::test]
    async fn no_target_and_unknown_target_are_skipped() {
        let f = fixture(vec![]).await;
        assert_eq!(
            f.handler.commit(&payload(&["e1"], None)).await.expect("commit"),
            CommitOutcome::Skipped(SkipReason::NoTarget)
        );

        let ghost = CanvasId::new_unchecked("ghost");
        f.tracker.set(Some(ghost.clone())).await.expect("select");
        assert_eq!(
            f.handler.commit(&payload(&["e1"], Some(&ghost))).await.expect("commit"),
            CommitOutcome::Skipped(SkipReason::UnknownCanvas)
        );
    }

    #[tokio::test]
    async fn without_origin_the_current_selection_is_the_target() {
        let x = Canvas::new("x", None);
        let f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select");

        let outcome = f.handler.commit(&payload(&["e1"], None)).await.expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed { canvas_id, .. } if canvas_id == x.id));
    }

    #[tokio::test]
    async fn selection_change_during_store_round_trip_aborts() {
        let x = Canvas::new("x", None);
        let y = Canvas::new("y", None);
        let f = fixture(vec![x.clone(), y.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select x");

        let handler = f.handler.clone();
        let sync = payload(&["e1"], Some(&x.id));
        let commit = tokio::spawn(async move { handler.commit(&sync).await });
        // On a current-thread runtime the commit runs up to its first store
        // round-trip before this task resumes.
        tokio::task::yield_now().await;
        f.tracker.set(Some(y.id.clone())).await.expect("select y");

        let outcome = commit.await.expect("join").expect("commit");
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::SelectionChanged));
        let stored = f.store.get_canvas(&x.id).await.expect("get").expect("exists");
        assert!(stored.elements.is_empty());
    }

    #[tokio::test]
    async fn selection_persisted_by_another_process_wins() {
        let x = Canvas::new("x", None);
        let y = Canvas::new("y", None);
        let f = fixture(vec![x.clone(), y.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select x");
        // A second process opened y on the same store; this one still has x.
        f.store
            .set_setting(CURRENT_CANVAS_SETTING, &serde_json::Value::String(y.id.to_string()))
            .await
            .expect("persist y");

        let outcome = f
            .handler
            .commit(&payload(&["y1", "y2"], Some(&x.id)))
            .await
            .expect("commit");
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::SelectionChanged));
        let stored = f.store.get_canvas(&x.id).await.expect("get").expect("exists");
        assert!(stored.elements.is_empty());
    }

    #[tokio::test]
    async fn canvas_removed_during_store_round_trip_is_not_written_back() {
        let x = Canvas::new("x", None);
        let f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select x");

        let handler = f.handler.clone();
        let sync = payload(&["e1"], Some(&x.id));
        let commit = tokio::spawn(async move { handler.commit(&sync).await });
        tokio::task::yield_now().await;
        f.library.write().remove_canvas(&x.id);

        let outcome = commit.await.expect("join").expect("commit");
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::UnknownCanvas));
        assert_eq!(f.store.canvas_writes(), 1);
        assert!(!f.library.read().contains_canvas(&x.id));
    }

    #[tokio::test]
    async fn store_failure_emits_error_and_returns_it() {
        let x = Canvas::new("x", None);
        let mut f = fixture(vec![x.clone()]).await;
        f.tracker.set(Some(x.id.clone())).await.expect("select");
        f.store.set_fail_writes(true);

        let err = f
            .handler
            .commit(&payload(&["e1"], Some(&x.id)))
            .await
            .expect_err("write fails");
        assert!(matches!(err, SyncError::Persistence { .. }));
        assert!(matches!(
            f.events.try_recv(),
            Ok(DrawerEvent::ErrorOccurred { .. })
        ));
        assert!(f.library.read().canvas(&x.id).expect("x").elements.is_empty());
    }
}
