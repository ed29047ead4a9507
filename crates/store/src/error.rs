//! Error type for the local database.

use duka_core::DomainError;
use thiserror::Error;

/// Failures raised by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A row that should never exist given the schema and the writers.
    /// Surfaced instead of silently dropping data.
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            detail: detail.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
