//! Keeps the open canvas and the host's live document in step.
//!
//! Two trigger sources feed one debounce slot: a fixed-interval poll that
//! compares the host document to the last [`SyncSnapshot`], and the host's
//! storage notifications for the two document keys. When the slot's quiet
//! period elapses the engine re-reads the host document and emits
//! [`DrawerEvent::SyncRequested`]; committing it is someone else's job.
//!
//! The other direction, [`SyncEngine::load_canvas_to_host`], writes a canvas
//! into host storage and moves the snapshot to what it wrote, so the engine's
//! own writes never come back as foreign changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{DrawerEvent, EventBus, SyncPayload};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::host::{HostAdapter, HostDocument, StorageChange};
use crate::model::element::normalize_elements;
use crate::model::{Canvas, CanvasId};
use crate::selection::SelectionHandle;

use super::snapshot::SyncSnapshot;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A sync that has been scheduled but whose debounce window is still open.
#[derive(Debug)]
struct PendingSync {
    origin: Option<CanvasId>,
}

struct EngineInner {
    host: HostAdapter,
    bus: EventBus,
    selection: SelectionHandle,
    config: SyncConfig,
    snapshot: Mutex<Option<SyncSnapshot>>,
    pending: Mutex<Option<PendingSync>>,
    wake: Notify,
    loading: watch::Sender<usize>,
    alive: AtomicBool,
    cancel: CancellationToken,
}

/// Handle to one engine instance. Clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("host", &self.inner.host)
            .field("alive", &self.is_alive())
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

/// Marks a load as in flight until dropped.
struct LoadingGuard {
    inner: Arc<EngineInner>,
}

impl LoadingGuard {
    fn enter(inner: &Arc<EngineInner>) -> Self {
        inner.loading.send_modify(|n| *n += 1);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.inner.loading.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        host: HostAdapter,
        bus: EventBus,
        selection: SelectionHandle,
        config: SyncConfig,
    ) -> Self {
        let (loading, _) = watch::channel(0);
        Self {
            inner: Arc::new(EngineInner {
                host,
                bus,
                selection,
                config,
                snapshot: Mutex::new(None),
                pending: Mutex::new(None),
                wake: Notify::new(),
                loading,
                alive: AtomicBool::new(true),
                cancel: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn host(&self) -> &HostAdapter {
        &self.inner.host
    }

    /// Start the driver task: poll timer, storage listener and debounce.
    ///
    /// The storage subscription is taken before this returns, so no
    /// notification issued afterwards is missed.
    #[must_use = "the driver stops when the engine shuts down; keep the handle to await it"]
    pub fn spawn(&self) -> JoinHandle<()> {
        let changes = self.inner.host.subscribe();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(drive(inner, changes))
    }

    /// Write `canvas` into host storage.
    ///
    /// Elements are normalized with defaults derived from the canvas id, the
    /// host's current theme wins over the stored one, and the snapshot moves
    /// to exactly what was written. With `force_reload` the host is asked to
    /// re-read its storage after the configured delay; that request runs in
    /// the background and the load counts as in flight until it has been
    /// made.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::HostWrite`] if host storage rejects the write,
    /// after emitting [`DrawerEvent::ErrorOccurred`].
    pub fn load_canvas_to_host(&self, canvas: &Canvas, force_reload: bool) -> Result<(), SyncError> {
        let guard = LoadingGuard::enter(&self.inner);
        let inner = &self.inner;

        let elements = normalize_elements(canvas.id.as_str(), &canvas.elements);
        let mut app_state = canvas.app_state.clone();
        if let Some(theme) = inner.host.current_theme() {
            app_state.theme = theme;
        }

        if let Err(source) = inner.host.write_document(&elements, &app_state) {
            error!(canvas_id = %canvas.id, error = %source, "failed to write canvas into host");
            inner.bus.emit(&DrawerEvent::ErrorOccurred {
                error: format!("Failed to load canvas: {source}"),
                details: Some(json!({ "canvasId": canvas.id })),
            });
            return Err(SyncError::HostWrite {
                canvas_id: canvas.id.clone(),
                source,
            });
        }

        inner.set_snapshot(SyncSnapshot::capture(&elements, inner.config.change_detection));
        // Whatever the open window observed belonged to the previous baseline;
        // the next host change opens a new window for this canvas.
        if let Some(stale) = inner.lock_pending().take() {
            debug!(
                origin = stale.origin.as_ref().map(CanvasId::as_str),
                "load discarded pending sync"
            );
        }
        info!(
            canvas_id = %canvas.id,
            elements = elements.len(),
            force_reload,
            "canvas loaded into host"
        );

        let loaded = Canvas {
            elements,
            app_state,
            ..canvas.clone()
        };
        inner.bus.emit(&DrawerEvent::CanvasLoaded(loaded));

        if force_reload {
            let delay = inner.config.reload_delay();
            let cancel = inner.cancel.clone();
            let host = inner.host.clone();
            let canvas_id = canvas.id.clone();
            tokio::spawn(async move {
                let _guard = guard;
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!(canvas_id = %canvas_id, "engine stopped before host reload");
                    }
                    () = tokio::time::sleep(delay) => {
                        match host.request_reload() {
                            Ok(()) => debug!(canvas_id = %canvas_id, "host reload requested"),
                            Err(error) => warn!(canvas_id = %canvas_id, error = %error, "host reload request failed"),
                        }
                    }
                }
            });
        }

        Ok(())
    }

    /// Read the host document, treating anything unreadable as absent. See [`HostAdapter::read_document`].
    #[must_use]
    pub fn get_host_document(&self) -> Option<HostDocument> {
        self.inner.host.read_document()
    }

    /// Whether the host document differs from the last snapshot.
    ///
    /// True when no snapshot exists yet. An unreadable or absent host
    /// document has nothing to sync and reports false.
    #[must_use]
    pub fn has_document_changed(&self) -> bool {
        self.inner.has_document_changed()
    }

    /// Open (or restart) the debounce window.
    ///
    /// The working selection is captured when the window opens; restarts
    /// keep that origin until the window fires or a load discards it. Has no
    /// effect once the engine has shut down, and nothing fires unless the
    /// driver from [`SyncEngine::spawn`] is running.
    pub fn schedule_sync(&self) {
        self.inner.schedule_sync();
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SyncSnapshot> {
        self.inner.lock_snapshot().clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.is_loading()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Wait until no load (including its delayed reload) is in flight.
    pub async fn settled(&self) {
        let mut rx = self.inner.loading.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop the driver and discard any pending sync. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            debug!("sync engine shutting down");
        }
        self.inner.cancel.cancel();
        self.inner.lock_pending().take();
    }
}

impl EngineInner {
    fn lock_snapshot(&self) -> MutexGuard<'_, Option<SyncSnapshot>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingSync>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_snapshot(&self, snapshot: SyncSnapshot) {
        *self.lock_snapshot() = Some(snapshot);
    }

    fn is_loading(&self) -> bool {
        *self.loading.borrow() > 0
    }

    fn has_document_changed(&self) -> bool {
        let Some(doc) = self.host.read_document() else {
            return false;
        };
        let current = SyncSnapshot::capture(&doc.elements, self.config.change_detection);
        self.lock_snapshot()
            .as_ref()
            .is_none_or(|previous| previous.differs_from(&current))
    }

    fn schedule_sync(&self) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut pending = self.lock_pending();
            if pending.is_none() {
                let origin = self.selection.get();
                trace!(origin = origin.as_ref().map(CanvasId::as_str), "debounce window opened");
                *pending = Some(PendingSync { origin });
            }
        }
        self.wake.notify_one();
    }

    /// Debounce expiry: read the host and hand the payload to the bus.
    fn fire(&self) {
        let pending = self.lock_pending().take();
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        let Some(pending) = pending else {
            return;
        };
        if self.is_loading() {
            debug!("load in flight, dropping pending sync");
            return;
        }
        let Some(doc) = self.host.read_document() else {
            debug!("no host document to sync");
            return;
        };

        self.set_snapshot(SyncSnapshot::capture(&doc.elements, self.config.change_detection));
        let origin_canvas_id = if self.config.capture_origin {
            pending.origin
        } else {
            None
        };
        debug!(
            elements = doc.elements.len(),
            origin = origin_canvas_id.as_ref().map(CanvasId::as_str),
            "sync requested"
        );
        self.bus.emit(&DrawerEvent::SyncRequested(SyncPayload {
            elements: doc.elements,
            app_state: doc.app_state,
            origin_canvas_id,
        }));
    }

    fn on_storage_change(&self, change: &StorageChange) {
        if !self.host.is_document_key(&change.key) {
            return;
        }
        if self.is_loading() {
            trace!(key = %change.key, "ignoring storage change during load");
            return;
        }
        trace!(key = %change.key, "host storage changed");
        self.schedule_sync();
    }
}

async fn drive(inner: Arc<EngineInner>, mut changes: broadcast::Receiver<StorageChange>) {
    let period = inner.config.poll_interval().max(MIN_POLL_INTERVAL);
    let debounce = inner.config.debounce();
    let mut poll = tokio::time::interval_at(Instant::now() + period, period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut deadline: Option<Instant> = None;
    let mut listening = true;

    debug!(?period, ?debounce, "sync engine started");
    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => break,

            _ = poll.tick() => {
                if !inner.is_loading() && inner.has_document_changed() {
                    trace!("poll observed a change");
                    inner.schedule_sync();
                }
            }

            change = changes.recv(), if listening => match change {
                Ok(change) => inner.on_storage_change(&change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "storage notifications lagged");
                    if !inner.is_loading() {
                        inner.schedule_sync();
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("host storage notifications closed, polling only");
                    listening = false;
                }
            },

            () = inner.wake.notified() => {
                deadline = Some(Instant::now() + debounce);
            }

            () = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                deadline = None;
                inner.fire();
            }
        }
    }

    drop(changes);
    debug!("sync engine stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChangeDetection, HostConfig};
    use crate::host::MemoryHost;
    use crate::model::{Element, Theme};
    use serde_json::json;

    struct Harness {
        host: Arc<MemoryHost>,
        engine: SyncEngine,
        events: tokio::sync::mpsc::UnboundedReceiver<DrawerEvent>,
    }

    fn harness(config: SyncConfig) -> Harness {
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        let bus = EventBus::new();
        let (_, events) = bus.subscribe_channel();
        let engine = SyncEngine::new(adapter, bus, SelectionHandle::default(), config);
        Harness {
            host,
            engine,
            events,
        }
    }

    fn canvas_with(ids: &[&str]) -> Canvas {
        let mut canvas = Canvas::new("c", None);
        canvas.elements = ids
            .iter()
            .map(|id| Element::from_value(json!({"id": id})).expect("object"))
            .collect();
        canvas
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<DrawerEvent>) -> Vec<&'static str> {
        let mut topics = Vec::new();
        while let Ok(event) = rx.try_recv() {
            topics.push(event.topic());
        }
        topics
    }

    #[tokio::test(start_paused = true)]
    async fn load_is_idempotent_and_silent() {
        let mut h = harness(SyncConfig::default());
        let _driver = h.engine.spawn();
        let canvas = canvas_with(&["a", "b"]);

        h.engine.load_canvas_to_host(&canvas, false).expect("load");
        let first = h.engine.host().raw_document();
        h.engine.load_canvas_to_host(&canvas, false).expect("load");
        let second = h.engine.host().raw_document();
        assert_eq!(first, second);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(drain(&mut h.events), vec!["canvas_loaded", "canvas_loaded"]);
        assert!(!h.engine.has_document_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn load_preserves_host_theme() {
        let h = harness(SyncConfig::default());
        h.host
            .host_write_silent("excalidraw-state", r#"{"theme":"dark"}"#);
        let canvas = canvas_with(&["a"]);
        assert_eq!(canvas.app_state.theme, Theme::Light);

        h.engine.load_canvas_to_host(&canvas, false).expect("load");
        let doc = h.engine.get_host_document().expect("doc");
        assert_eq!(doc.app_state.theme, Theme::Dark);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_reload_is_delayed_and_holds_loading() {
        let h = harness(SyncConfig::default());
        h.engine
            .load_canvas_to_host(&canvas_with(&["a"]), true)
            .expect("load");
        assert!(h.engine.is_loading());
        assert_eq!(h.host.reload_count(), 0);

        h.engine.settled().await;
        assert_eq!(h.host.reload_count(), 1);
        assert!(!h.engine.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_emits_error_and_returns_it() {
        let mut h = harness(SyncConfig::default());
        h.host.set_fail_writes(true);
        let err = h
            .engine
            .load_canvas_to_host(&canvas_with(&["a"]), true)
            .expect_err("write fails");
        assert!(matches!(err, SyncError::HostWrite { .. }));
        assert_eq!(drain(&mut h.events), vec!["error_occurred"]);
        assert!(!h.engine.is_loading());
        assert_eq!(h.host.reload_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_change_debounces_into_one_sync() {
        let mut h = harness(SyncConfig::default());
        let _driver = h.engine.spawn();
        h.engine
            .load_canvas_to_host(&canvas_with(&[]), false)
            .expect("load");
        drain(&mut h.events);

        for n in 0..5 {
            let ids: Vec<String> = (0..=n).map(|i| format!(r#"{{"id":"e{i}"}}"#)).collect();
            h.host
                .host_write("excalidraw", &format!("[{}]", ids.join(",")));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert!(drain(&mut h.events).is_empty());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let event = h.events.try_recv().expect("sync requested");
        let DrawerEvent::SyncRequested(payload) = event else {
            panic!("expected sync request, got {}", event.topic());
        };
        assert_eq!(payload.elements.len(), 5);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_catches_silent_writes() {
        let mut h = harness(SyncConfig::default());
        let _driver = h.engine.spawn();
        h.engine
            .load_canvas_to_host(&canvas_with(&["a"]), false)
            .expect("load");
        drain(&mut h.events);

        h.host
            .host_write_silent("excalidraw", r#"[{"id":"a"},{"id":"b"}]"#);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(drain(&mut h.events).is_empty(), "debounce still open");

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(drain(&mut h.events), vec!["sync_requested"]);

        // Snapshot moved, so the next poll stays quiet.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn content_mode_detects_in_place_edit() {
        let config = SyncConfig {
            change_detection: ChangeDetection::Content,
            ..SyncConfig::default()
        };
        let h = harness(config);
        h.engine
            .load_canvas_to_host(&canvas_with(&["a"]), false)
            .expect("load");
        assert!(!h.engine.has_document_changed());

        let (raw, _) = h.engine.host().raw_document();
        let edited = raw.expect("elements").replace(r#""x":0"#, r#""x":42"#);
        h.host.host_write_silent("excalidraw", &edited);
        assert!(h.engine.has_document_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn no_snapshot_means_changed() {
        let h = harness(SyncConfig::default());
        h.host.host_write_silent("excalidraw", "[]");
        assert!(h.engine.has_document_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_makes_pending_fire_a_no_op() {
        let mut h = harness(SyncConfig::default());
        let driver = h.engine.spawn();
        h.host.host_write("excalidraw", r#"[{"id":"a"}]"#);
        tokio::time::sleep(Duration::from_millis(200)).await;

        h.engine.shutdown();
        driver.await.expect("driver exits");
        h.engine.schedule_sync();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(drain(&mut h.events).is_empty());
        assert!(!h.engine.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_for_other_keys_are_ignored() {
        let mut h = harness(SyncConfig::default());
        let _driver = h.engine.spawn();
        h.engine
            .load_canvas_to_host(&canvas_with(&[]), false)
            .expect("load");
        drain(&mut h.events);

        h.host.host_write("unrelated", "[1,2,3]");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_waits_for_forced_reload_to_finish() {
        let config = SyncConfig {
            poll_interval_ms: 1_000,
            debounce_ms: 300,
            reload_delay_ms: 2_500,
            ..SyncConfig::default()
        };
        let mut h = harness(config);
        let _driver = h.engine.spawn();
        h.engine
            .load_canvas_to_host(&canvas_with(&["a"]), true)
            .expect("load");
        h.host
            .host_write_silent("excalidraw", r#"[{"id":"a"},{"id":"b"}]"#);

        // Polls at 1s and 2s land inside the reload delay.
        tokio::time::sleep(Duration::from_millis(2_400)).await;
        assert!(h.engine.is_loading());
        assert_eq!(drain(&mut h.events), vec!["canvas_loaded"]);

        // First poll after the reload at 2.5s, then the 300ms window.
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert!(!h.engine.is_loading());
        assert_eq!(drain(&mut h.events), vec!["sync_requested"]);
        assert!(!h.engine.has_document_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_notifications_still_schedule_one_sync() {
        let mut h = harness(SyncConfig::default());
        let driver = h.engine.spawn();
        h.engine
            .load_canvas_to_host(&canvas_with(&[]), false)
            .expect("load");
        drain(&mut h.events);

        // The driver has not run yet, so the notification channel overflows.
        for n in 0..100 {
            h.host
                .host_write("excalidraw", &format!(r#"[{{"id":"e{n}"}}]"#));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let event = h.events.try_recv().expect("sync requested");
        let DrawerEvent::SyncRequested(payload) = event else {
            panic!("expected sync request, got {}", event.topic());
        };
        let ids: Vec<_> = payload.elements.iter().filter_map(Element::id).collect();
        assert_eq!(ids, vec!["e99"]);
        assert!(h.events.try_recv().is_err());
        assert!(!driver.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn load_discards_the_open_window_and_its_origin() {
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        let bus = EventBus::new();
        let (_, mut events) = bus.subscribe_channel();
        let store = Arc::new(crate::store::MemoryStore::new());
        let tracker = crate::selection::SelectionTracker::new(store);
        let engine = SyncEngine::new(adapter, bus, tracker.handle(), SyncConfig::default());
        let _driver = engine.spawn();

        let x = canvas_with(&[]);
        let y = canvas_with(&[]);
        tracker.set(Some(x.id.clone())).await.expect("select x");
        engine.load_canvas_to_host(&x, false).expect("load x");
        host.host_write("excalidraw", r#"[{"id":"x1"}]"#);
        tokio::time::sleep(Duration::from_millis(200)).await;

        tracker.set(Some(y.id.clone())).await.expect("select y");
        engine.load_canvas_to_host(&y, true).expect("load y");
        engine.settled().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        host.host_write("excalidraw", r#"[{"id":"y1"}]"#);
        tokio::time::sleep(Duration::from_secs(3)).await;

        let requests: Vec<SyncPayload> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                DrawerEvent::SyncRequested(payload) => Some(payload),
                _ => None,
            })
            .collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].origin_canvas_id, Some(y.id.clone()));
        let ids: Vec<_> = requests[0].elements.iter().filter_map(Element::id).collect();
        assert_eq!(ids, vec!["y1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn origin_is_captured_when_window_opens() {
        let host = Arc::new(MemoryHost::new());
        let adapter = HostAdapter::new(host.clone(), &HostConfig::default());
        let bus = EventBus::new();
        let (_, mut events) = bus.subscribe_channel();
        let store = Arc::new(crate::store::MemoryStore::new());
        let tracker = crate::selection::SelectionTracker::new(store);
        let engine = SyncEngine::new(adapter, bus, tracker.handle(), SyncConfig::default());
        let _driver = engine.spawn();

        tracker
            .set(Some(CanvasId::new_unchecked("x")))
            .await
            .expect("select x");
        host.host_write("excalidraw", r#"[{"id":"a"}]"#);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker
            .set(Some(CanvasId::new_unchecked("y")))
            .await
            .expect("select y");
        host.host_write("excalidraw", r#"[{"id":"a"},{"id":"b"}]"#);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let Ok(DrawerEvent::SyncRequested(payload)) = events.try_recv() else {
            panic!("expected a sync request");
        };
        assert_eq!(payload.origin_canvas_id, Some(CanvasId::new_unchecked("x")));
        assert_eq!(payload.elements.len(), 2);
    }
}
