//! `duka-sync`: the synchronization engine.
//!
//! Ties the local store to the remote backend: pull merges server rows
//! in, push drains the local mutation queue out, and the connectivity
//! watcher decides when either happens. The store stays the source of
//! truth throughout; nothing here ever blocks the app's own reads and
//! writes.

pub mod assets;
pub mod engine;
pub mod error;
pub mod watcher;

mod fixup;
mod pull;
mod push;
mod remap;

pub use assets::AssetSync;
pub use engine::{DEFAULT_MIN_SYNC_INTERVAL, SkipReason, SyncEngine, SyncOutcome, SyncSummary};
pub use error::{SyncError, SyncResult};
pub use watcher::{ConnectivityState, ConnectivityWatcher, DEFAULT_SYNC_INTERVAL};
