//! The working selection: which canvas is currently projected into the host.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::CanvasId;
use crate::store::{CURRENT_CANVAS_SETTING, EntityStore, StoreError};

/// Shared read access to the working selection.
///
/// Cloned into the sync engine and the commit handler; only
/// [`SelectionTracker`] changes it.
#[derive(Debug, Clone, Default)]
pub struct SelectionHandle(Arc<RwLock<Option<CanvasId>>>);

impl SelectionHandle {
    #[must_use]
    pub fn get(&self) -> Option<CanvasId> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `id` is the working selection.
    #[must_use]
    pub fn is(&self, id: &CanvasId) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            == Some(id)
    }

    fn replace(&self, id: Option<CanvasId>) -> Option<CanvasId> {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, id)
    }
}

/// Owner of the working selection.
pub struct SelectionTracker {
    handle: SelectionHandle,
    store: Arc<dyn EntityStore>,
}

impl std::fmt::Debug for SelectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionTracker")
            .field("current", &self.handle.get())
            .finish_non_exhaustive()
    }
}

impl SelectionTracker {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            handle: SelectionHandle::default(),
            store,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SelectionHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn get(&self) -> Option<CanvasId> {
        self.handle.get()
    }

    /// Change the working selection and persist it.
    ///
    /// The in-memory value changes before the store round-trip, so readers
    /// observe the new selection immediately even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting cannot be written.
    pub async fn set(&self, id: Option<CanvasId>) -> Result<(), StoreError> {
        let previous = self.handle.replace(id.clone());
        debug!(
            from = previous.as_ref().map(CanvasId::as_str),
            to = id.as_ref().map(CanvasId::as_str),
            "working selection changed"
        );
        match id {
            Some(id) => {
                self.store
                    .set_setting(CURRENT_CANVAS_SETTING, &Value::String(id.to_string()))
                    .await
            }
            None => self.store.remove_setting(CURRENT_CANVAS_SETTING).await,
        }
    }

    /// Load the persisted selection, keeping it only if `exists` accepts it.
    pub async fn restore(&self, exists: impl Fn(&CanvasId) -> bool + Send) -> Option<CanvasId> {
        let id = match persisted_selection(self.store.as_ref()).await {
            Ok(id) => id?,
            Err(error) => {
                warn!(error = %error, "could not read persisted selection");
                return None;
            }
        };
        if !exists(&id) {
            debug!(canvas_id = %id, "persisted selection no longer exists");
            return None;
        }
        self.handle.replace(Some(id.clone()));
        Some(id)
    }
}

/// The selection as last persisted by any process sharing `store`.
///
/// # Errors
///
/// Returns an error if the setting cannot be read.
pub async fn persisted_selection(store: &dyn EntityStore) -> Result<Option<CanvasId>, StoreError> {
    match store.get_setting(CURRENT_CANVAS_SETTING).await? {
        Some(Value::String(raw)) => Ok(Some(CanvasId::new_unchecked(raw))),
        Some(_) => {
            warn!("persisted selection is not a string, ignoring");
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn set_updates_memory_before_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let tracker = SelectionTracker::new(store.clone());
        let handle = tracker.handle();

        let id = CanvasId::new_unchecked("c1");
        assert!(tracker.set(Some(id.clone())).await.is_err());
        assert_eq!(handle.get(), Some(id));
    }

    #[tokio::test]
    async fn restore_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let tracker = SelectionTracker::new(store.clone());
        let id = CanvasId::new_unchecked("c1");
        tracker.set(Some(id.clone())).await.expect("persist");

        let fresh = SelectionTracker::new(store);
        assert_eq!(fresh.restore(|c| c.as_str() == "c1").await, Some(id.clone()));
        assert!(fresh.handle().is(&id));
    }

    #[tokio::test]
    async fn restore_ignores_missing_canvas() {
        let store = Arc::new(MemoryStore::new());
        let tracker = SelectionTracker::new(store.clone());
        tracker
            .set(Some(CanvasId::new_unchecked("gone")))
            .await
            .expect("persist");

        let fresh = SelectionTracker::new(store);
        assert_eq!(fresh.restore(|_| false).await, None);
        assert_eq!(fresh.get(), None);
    }

    #[tokio::test]
    async fn clearing_removes_setting() {
        let store = Arc::new(MemoryStore::new());
        let tracker = SelectionTracker::new(store.clone());
        tracker
            .set(Some(CanvasId::new_unchecked("c1")))
            .await
            .expect("persist");
        tracker.set(None).await.expect("clear");
        assert_eq!(
            store
                .get_setting(CURRENT_CANVAS_SETTING)
                .await
                .expect("read"),
            None
        );
    }
}
