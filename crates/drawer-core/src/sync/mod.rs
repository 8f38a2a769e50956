//! Synchronization between the entity store and the host document.

pub mod commit;
pub mod engine;
pub mod snapshot;

pub use commit::{CommitHandler, CommitOutcome, SkipReason};
pub use engine::SyncEngine;
pub use snapshot::SyncSnapshot;
