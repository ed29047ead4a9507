//! Change notifications for local writes.

use duka_core::Collection;

/// Emitted on the store's broadcast channel after every local write.
///
/// Subscribers get the collection that changed, not the row: listeners
/// re-read through the store, which keeps the channel cheap and makes a
/// missed event (lagged receiver) harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
}
