//! Side channel for binary payloads.

use async_trait::async_trait;

use crate::error::SyncResult;

/// Uploads files that belong to records but do not travel through the
/// row API, such as product images. Runs after a push so the records
/// the assets belong to already exist remotely.
///
/// Asset failures never fail a sync cycle; the engine logs them and
/// moves on, and the next cycle tries again.
#[async_trait]
pub trait AssetSync: Send + Sync {
    /// Upload whatever is outstanding. Returns how many assets went up.
    async fn sync_assets(&self) -> SyncResult<usize>;
}
