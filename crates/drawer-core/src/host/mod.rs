//! Access to the host application's own document storage.
//!
//! The host keeps exactly one live document under two keys: a bare element
//! array and an application-state record. Both are foreign resources that the
//! host rewrites whenever the user edits. Reads tolerate missing or malformed
//! values, and writes are best effort.

pub mod file;
pub mod memory;

pub use file::FileHost;
pub use memory::MemoryHost;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::HostConfig;
use crate::model::{AppState, Element, Theme, element::elements_from_values};

/// Host storage failures.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host storage I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("host storage watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("host storage unavailable: {0}")]
    Unavailable(String),
}

/// Notification that a host key changed through a path the engine did not
/// initiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
}

/// Raw key/value storage owned by the host.
///
/// `write` is the engine's own write path and does not produce a
/// [`StorageChange`]; host-originated writes do.
pub trait HostStorage: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, HostError>;

    /// # Errors
    ///
    /// Returns an error if the storage rejects the write.
    fn write(&self, key: &str, value: &str) -> Result<(), HostError>;

    /// Subscribe to host-originated key changes.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;

    /// Ask the host to re-read its document from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    fn request_reload(&self) -> Result<(), HostError>;
}

/// The host's live document as read from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDocument {
    pub elements: Vec<Element>,
    pub app_state: AppState,
}

/// Typed view over [`HostStorage`] bound to the configured keys.
#[derive(Clone)]
pub struct HostAdapter {
    storage: Arc<dyn HostStorage>,
    elements_key: String,
    state_key: String,
    viewport: (f64, f64),
}

impl std::fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAdapter")
            .field("elements_key", &self.elements_key)
            .field("state_key", &self.state_key)
            .finish_non_exhaustive()
    }
}

impl HostAdapter {
    #[must_use]
    pub fn new(storage: Arc<dyn HostStorage>, config: &HostConfig) -> Self {
        Self {
            storage,
            elements_key: config.elements_key.clone(),
            state_key: config.state_key.clone(),
            viewport: (config.viewport_width, config.viewport_height),
        }
    }

    #[must_use]
    pub fn elements_key(&self) -> &str {
        &self.elements_key
    }

    #[must_use]
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Whether `key` is one of the two document keys.
    #[must_use]
    pub fn is_document_key(&self, key: &str) -> bool {
        key == self.elements_key || key == self.state_key
    }

    /// Read the host document.
    ///
    /// The elements key may hold a bare array or an object carrying
    /// `elements` (and optionally `appState`). A missing or malformed state
    /// key falls back to the embedded state, then to viewport defaults.
    /// Returns `None` only when neither elements nor a recognizable state are
    /// present. Read and parse failures are logged and treated as absent.
    #[must_use]
    pub fn read_document(&self) -> Option<HostDocument> {
        let (elements, embedded_state) = match self.read_json(&self.elements_key) {
            Some(Value::Array(values)) => (Some(elements_from_values(values)), None),
            Some(Value::Object(mut map)) => {
                let elements = match map.remove("elements") {
                    Some(Value::Array(values)) => Some(elements_from_values(values)),
                    _ => None,
                };
                let state = map
                    .remove("appState")
                    .and_then(|v| AppState::from_host_value(v, self.viewport));
                (elements, state)
            }
            Some(other) => {
                warn!(
                    key = %self.elements_key,
                    kind = json_kind(&other),
                    "host elements key holds neither an array nor an object"
                );
                (None, None)
            }
            None => (None, None),
        };

        let state = self.read_state().or(embedded_state);

        if elements.is_none() && state.is_none() {
            return None;
        }

        Some(HostDocument {
            elements: elements.unwrap_or_default(),
            app_state: state
                .unwrap_or_else(|| AppState::for_viewport(self.viewport.0, self.viewport.1)),
        })
    }

    /// Theme the host is currently showing, if its state is readable.
    #[must_use]
    pub fn current_theme(&self) -> Option<Theme> {
        self.read_state().map(|state| state.theme)
    }

    /// Write elements and state under the document keys.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or either write fails.
    pub fn write_document(&self, elements: &[Element], state: &AppState) -> Result<(), HostError> {
        let elements_json = serde_json::to_string(elements)
            .map_err(|e| HostError::Unavailable(format!("encode elements: {e}")))?;
        let state_json = serde_json::to_string(state)
            .map_err(|e| HostError::Unavailable(format!("encode app state: {e}")))?;
        self.storage.write(&self.elements_key, &elements_json)?;
        self.storage.write(&self.state_key, &state_json)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the host cannot be asked to reload.
    pub fn request_reload(&self) -> Result<(), HostError> {
        self.storage.request_reload()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.storage.subscribe()
    }

    /// Raw stored strings for both keys, for byte-level comparisons.
    #[must_use]
    pub fn raw_document(&self) -> (Option<String>, Option<String>) {
        (
            self.storage.read(&self.elements_key).ok().flatten(),
            self.storage.read(&self.state_key).ok().flatten(),
        )
    }

    fn read_state(&self) -> Option<AppState> {
        let value = self.read_json(&self.state_key)?;
        let state = AppState::from_host_value(value, self.viewport);
        if state.is_none() {
            warn!(key = %self.state_key, "host app state is malformed, using defaults");
        }
        state
    }

    fn read_json(&self, key: &str) -> Option<Value> {
        let raw = match self.storage.read(key) {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(key, error = %error, "host storage read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, error = %error, "host storage value is not valid JSON");
                None
            }
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use serde_json::json;

    fn adapter() -> (Arc<MemoryHost>, HostAdapter) {
        let host = Arc::new(MemoryHost::new());
        let config = HostConfig {
            viewport_width: 1280.0,
            viewport_height: 720.0,
            ..HostConfig::default()
        };
        let adapter = HostAdapter::new(host.clone(), &config);
        (host, adapter)
    }

    #[test]
    fn empty_storage_has_no_document() {
        let (_host, adapter) = adapter();
        assert_eq!(adapter.read_document(), None);
    }

    #[test]
    fn bare_array_with_missing_state_uses_viewport_defaults() {
        let (host, adapter) = adapter();
        host.host_write_silent("excalidraw", r#"[{"id":"a"},{"id":"b"}]"#);

        let doc = adapter.read_document().expect("document");
        assert_eq!(doc.elements.len(), 2);
        assert_eq!(doc.app_state.theme, Theme::Light);
        assert!((doc.app_state.width - 1280.0).abs() < f64::EPSILON);
        assert!((doc.app_state.height - 720.0).abs() < f64::EPSILON);
        assert!((doc.app_state.zoom.value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn richer_object_shape_is_accepted() {
        let (host, adapter) = adapter();
        host.host_write_silent(
            "excalidraw",
            &json!({"type": "excalidraw", "elements": [{"id": "a"}], "appState": {"theme": "dark"}})
                .to_string(),
        );

        let doc = adapter.read_document().expect("document");
        assert_eq!(doc.elements[0].id(), Some("a"));
        assert_eq!(doc.app_state.theme, Theme::Dark);
    }

    #[test]
    fn malformed_state_falls_back_to_defaults() {
        let (host, adapter) = adapter();
        host.host_write_silent("excalidraw", "[]");
        host.host_write_silent("excalidraw-state", "{not json");

        let doc = adapter.read_document().expect("document");
        assert!(doc.elements.is_empty());
        assert_eq!(doc.app_state, AppState::for_viewport(1280.0, 720.0));
    }

    #[test]
    fn state_alone_is_a_document() {
        let (host, adapter) = adapter();
        host.host_write_silent("excalidraw-state", r#"{"theme":"dark"}"#);

        let doc = adapter.read_document().expect("document");
        assert!(doc.elements.is_empty());
        assert_eq!(adapter.current_theme(), Some(Theme::Dark));
    }

    #[test]
    fn garbage_everywhere_is_no_document() {
        let (host, adapter) = adapter();
        host.host_write_silent("excalidraw", "42");
        host.host_write_silent("excalidraw-state", "[1]");
        assert_eq!(adapter.read_document(), None);
    }

    #[test]
    fn read_failures_are_treated_as_absent() {
        let (host, adapter) = adapter();
        host.host_write_silent("excalidraw", "[]");
        host.set_fail_reads(true);
        assert_eq!(adapter.read_document(), None);
    }
}
