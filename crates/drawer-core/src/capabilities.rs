//! Runtime capability detection for `drw status`.
//!
//! Every probe is infallible from the caller's perspective: it returns a
//! `bool`, logs the outcome at `debug!` level, and never propagates errors.
//! A broken store or an unwritable host directory shows up here as a
//! degraded capability rather than a startup failure.

use std::path::Path;

use notify::{RecursiveMode, Watcher};
use tracing::debug;

use crate::store::EntityStore;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Runtime capability flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Canvases are kept in the SQLite store rather than in memory.
    pub durable_store: bool,
    /// The active store accepts writes.
    pub store_writable: bool,
    /// The host directory is writable, so documents can be loaded and a
    /// reload can be requested.
    pub host_writable: bool,
    /// Host edits are observed as they happen rather than only by polling.
    pub host_watch: bool,
}

/// Status of a single capability for user-visible display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub name: &'static str,
    pub available: bool,
    /// What happens instead when the capability is missing.
    pub fallback: &'static str,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Probe the active store and, if given, a host directory.
pub async fn detect_capabilities(
    store: &dyn EntityStore,
    durable_store: bool,
    host_dir: Option<&Path>,
) -> Capabilities {
    let store_writable = store.probe().await;
    debug!(available = store_writable, "store probe");

    let (host_writable, host_watch) =
        host_dir.map_or((false, false), |dir| (probe_host_writable(dir), probe_host_watch(dir)));

    let caps = Capabilities {
        durable_store,
        store_writable,
        host_writable,
        host_watch,
    };
    debug!(?caps, "capability detection complete");
    caps
}

/// Describe which capabilities are active or missing, in a stable order.
#[must_use]
pub fn describe_capabilities(caps: &Capabilities) -> Vec<CapabilityStatus> {
    vec![
        CapabilityStatus {
            name: "durable_store",
            available: caps.durable_store,
            fallback: "changes are kept in memory and lost on exit",
        },
        CapabilityStatus {
            name: "store_writable",
            available: caps.store_writable,
            fallback: "saves fail and are reported as errors",
        },
        CapabilityStatus {
            name: "host_writable",
            available: caps.host_writable,
            fallback: "`drw open` cannot load canvases into the host",
        },
        CapabilityStatus {
            name: "host_watch",
            available: caps.host_watch,
            fallback: "host edits are noticed by polling only",
        },
    ]
}

// ---------------------------------------------------------------------------
// Internal probes
// ---------------------------------------------------------------------------

fn probe_host_writable(dir: &Path) -> bool {
    if !dir.is_dir() {
        debug!(path = %dir.display(), "host probe: not a directory");
        return false;
    }
    let probe = dir.join(".drawer-probe");
    let available = match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(e) => {
            debug!(error = %e, "host probe: write failed");
            false
        }
    };
    debug!(available, path = %dir.display(), "host write probe");
    available
}

fn probe_host_watch(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let available = notify::recommended_watcher(|_: notify::Result<notify::Event>| {})
        .and_then(|mut watcher| watcher.watch(dir, RecursiveMode::NonRecursive))
        .map_err(|e| debug!(error = %e, "host watch probe failed"))
        .is_ok();
    debug!(available, "host watch probe");
    available
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn memory_store_without_host() {
        let store = MemoryStore::new();
        let caps = detect_capabilities(&store, false, None).await;
        assert!(!caps.durable_store);
        assert!(caps.store_writable);
        assert!(!caps.host_writable);
        assert!(!caps.host_watch);
    }

    #[tokio::test]
    async fn failing_store_is_not_writable() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let caps = detect_capabilities(&store, true, None).await;
        assert!(!caps.store_writable);
    }

    #[test]
    fn host_probe_leaves_no_trace() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(probe_host_writable(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn missing_host_dir_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(!probe_host_writable(&missing));
        assert!(!probe_host_watch(&missing));
    }

    #[test]
    fn describe_names_are_stable() {
        let names: Vec<_> = describe_capabilities(&Capabilities::default())
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            &["durable_store", "store_writable", "host_writable", "host_watch"]
        );
    }

    #[test]
    fn describe_fallbacks_are_non_empty() {
        for status in describe_capabilities(&Capabilities::default()) {
            assert!(!status.fallback.is_empty(), "fallback for {} is empty", status.name);
        }
    }
}
