//! Host storage backed by a directory of JSON files.
//!
//! Each key lives in `<dir>/<key>.json`. An external editor (or a host shim)
//! that rewrites those files is observed through `notify`; the engine's own
//! writes are recognized by content digest and not reported. A reload request
//! drops a `.reload` marker the host side can watch for.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::{HostError, HostStorage, StorageChange};

const CHANGE_CAPACITY: usize = 64;
const KEY_EXTENSION: &str = "json";

/// File name of the reload marker.
pub const RELOAD_MARKER: &str = ".reload";

type OwnWrites = Arc<Mutex<HashMap<String, blake3::Hash>>>;

pub struct FileHost {
    dir: PathBuf,
    changes: broadcast::Sender<StorageChange>,
    own_writes: OwnWrites,
    _watcher: Mutex<RecommendedWatcher>,
}

impl std::fmt::Debug for FileHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHost")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl FileHost {
    /// Open (creating if needed) a host directory and start watching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or watched.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, HostError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let own_writes: OwnWrites = Arc::default();

        let tx = changes.clone();
        let writes = Arc::clone(&own_writes);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => forward_event(&event, &writes, &tx),
                Err(error) => warn!(error = %error, "host directory watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "watching host directory");

        Ok(Self {
            dir,
            changes,
            own_writes,
            _watcher: Mutex::new(watcher),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{KEY_EXTENSION}"))
    }

    fn own_writes(&self) -> MutexGuard<'_, HashMap<String, blake3::Hash>> {
        lock(&self.own_writes)
    }
}

fn lock(writes: &OwnWrites) -> MutexGuard<'_, HashMap<String, blake3::Hash>> {
    writes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key_for_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') {
        return None;
    }
    Some(stem.to_owned())
}

fn forward_event(event: &Event, own_writes: &OwnWrites, tx: &broadcast::Sender<StorageChange>) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        let Some(key) = key_for_path(path) else {
            continue;
        };
        // A vanished file is the next event's problem.
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        if lock(own_writes).get(&key) == Some(&blake3::hash(&bytes)) {
            trace!(key, "ignoring own write");
            continue;
        }
        let _ = tx.send(StorageChange { key });
    }
}

impl HostStorage for FileHost {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        // Record the digest first so the watcher sees it before the rename lands.
        self.own_writes()
            .insert(key.to_owned(), blake3::hash(value.as_bytes()));

        let tmp = self.dir.join(format!(".{key}.{KEY_EXTENSION}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.key_path(key))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    fn request_reload(&self) -> Result<(), HostError> {
        let stamp = chrono::Utc::now().to_rfc3339();
        fs::write(self.dir.join(RELOAD_MARKER), stamp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn key_paths_only_match_visible_json_files() {
        assert_eq!(
            key_for_path(Path::new("/h/excalidraw.json")),
            Some("excalidraw".to_owned())
        );
        assert_eq!(
            key_for_path(Path::new("/h/excalidraw-state.json")),
            Some("excalidraw-state".to_owned())
        );
        assert_eq!(key_for_path(Path::new("/h/.excalidraw.json.tmp")), None);
        assert_eq!(key_for_path(Path::new("/h/.reload")), None);
        assert_eq!(key_for_path(Path::new("/h/notes.txt")), None);
    }

    #[test]
    fn read_write_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FileHost::open(dir.path()).expect("open");

        assert_eq!(host.read("excalidraw").expect("read"), None);
        host.write("excalidraw", "[]").expect("write");
        assert_eq!(host.read("excalidraw").expect("read"), Some("[]".to_owned()));
        assert!(host.key_path("excalidraw").exists());
    }

    #[test]
    fn reload_writes_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FileHost::open(dir.path()).expect("open");
        host.request_reload().expect("reload");
        assert!(dir.path().join(RELOAD_MARKER).exists());
    }

    #[tokio::test]
    async fn external_edit_notifies_but_own_write_does_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FileHost::open(dir.path()).expect("open");
        let mut rx = host.subscribe();

        host.write("excalidraw", r#"[{"id":"a"}]"#).expect("write");
        fs::write(host.key_path("excalidraw"), r#"[{"id":"a"},{"id":"b"}]"#)
            .expect("external edit");

        let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change within timeout")
            .expect("channel open");
        assert_eq!(change.key, "excalidraw");
    }
}
