//! Error type of the sync engine.

use thiserror::Error;

use duka_remote::RemoteError;
use duka_store::StoreError;

/// A sync cycle failed. Store errors are bugs or local corruption; remote
/// errors are the network being the network and clear on their own.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl SyncError {
    /// True when retrying later could succeed without anyone intervening.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(_) => false,
            SyncError::Remote(err) => err.is_transient(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
