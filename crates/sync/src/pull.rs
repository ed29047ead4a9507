//! Pull: merge every remote row into the local store.

use tracing::{debug, warn};

use duka_core::Collection;
use duka_remote::{RemoteBackend, RemoteError};
use duka_store::{Store, StoreError};

use crate::error::SyncResult;

/// What a pull accomplished.
#[derive(Debug, Default)]
pub(crate) struct PullStats {
    /// Rows merged into the local store.
    pub merged: usize,
    /// Malformed remote rows left where they were.
    pub skipped: usize,
    /// Collections whose fetch failed outright.
    pub failed_collections: usize,
}

/// Fetch every collection and merge what came back.
///
/// Pull is best effort per collection: one failing fetch does not stop
/// the others, and a missing remote table means there is nothing to
/// pull yet. Local rows are only ever added or overwritten, never
/// deleted; removals travel through the mutation queue.
pub(crate) async fn pull_all(store: &Store, remote: &dyn RemoteBackend) -> SyncResult<PullStats> {
    let mut stats = PullStats::default();

    for collection in Collection::ALL {
        let rows = match remote.select_all(collection).await {
            Ok(rows) => rows,
            Err(RemoteError::RelationNotFound) => {
                debug!(%collection, "remote table not provisioned, nothing to pull");
                continue;
            }
            Err(err) => {
                warn!(%collection, error = %err, "pull failed for collection");
                stats.failed_collections += 1;
                continue;
            }
        };

        let mut merged = 0usize;
        for row in &rows {
            match store.apply_remote(collection, row).await {
                Ok(()) => merged += 1,
                // One bad row must not block the rest of the dataset.
                Err(StoreError::Serde(err)) => {
                    warn!(%collection, error = %err, "skipping malformed remote row");
                    stats.skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        debug!(%collection, rows = merged, "pulled collection");
        stats.merged += merged;
    }

    Ok(stats)
}
