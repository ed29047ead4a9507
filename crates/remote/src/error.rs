//! Error type for remote backend calls.

use thiserror::Error;

/// Failures raised by the remote backend.
///
/// The sync engine branches on two properties of an error: whether the
/// remote schema is missing ([`RemoteError::RelationNotFound`], treated
/// as "not provisioned yet" rather than a failure) and whether the error
/// is [transient](RemoteError::is_transient) and therefore worth
/// retrying.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The target table does not exist on the backend.
    #[error("remote table does not exist")]
    RelationNotFound,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({0}): {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl RemoteError {
    /// True when retrying the same call later can reasonably succeed.
    ///
    /// Timeouts, connection failures and server-side 5xx responses are
    /// transient. 4xx responses and malformed payloads are not: the
    /// same request would fail the same way forever.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Timeout | RemoteError::Network(_) => true,
            RemoteError::Api(status, _) => (500..=599).contains(status),
            RemoteError::RelationNotFound | RemoteError::Parse(_) => false,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
