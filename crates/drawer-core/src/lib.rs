//! drawer-core library.
//!
//! Durable canvases and projects, kept in step with the single document a
//! host drawing app holds in its own key/value storage.
//!
//! - [`store`]: the entity store (SQLite, or memory in degraded mode)
//! - [`host`]: host storage access and document parsing
//! - [`sync`]: change detection, debounced sync requests, and commits
//! - [`session`]: workflows tying store, library, and selection together
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at the edges; typed `thiserror` enums where
//!   callers branch on the failure.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod bus;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod host;
pub mod library;
pub mod model;
pub mod selection;
pub mod session;
pub mod store;
pub mod sync;
pub mod transfer;

pub use session::{ProjectDeletePolicy, Session, SessionError, SyncRuntime};
