//! The remote backend seam.

use async_trait::async_trait;
use serde_json::Value;

use duka_core::{Collection, RecordId};

use crate::error::RemoteResult;

/// One remote table per [`Collection`], spoken to row by row.
///
/// Rows cross this boundary as plain JSON objects: the engine owns the
/// typed view, the backend owns transport. Implementations must be safe
/// to call concurrently.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Every row of the collection. Pull is deliberately fetch-all; the
    /// datasets here are a few thousand rows at most.
    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>>;

    /// Insert a row, upserting on id so a replayed push is idempotent.
    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<()>;

    /// Patch the row with this id. A missing row is not an error: the
    /// server copy wins and has evidently moved on.
    async fn update(&self, collection: Collection, id: &RecordId, row: &Value) -> RemoteResult<()>;

    /// Delete the row with this id. Missing rows are not an error.
    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()>;

    /// Delete several rows in one round trip.
    async fn delete_many(&self, collection: Collection, ids: &[RecordId]) -> RemoteResult<()>;

    /// Cheapest possible read against the collection, used before a push
    /// to distinguish "backend not provisioned" from "backend down".
    async fn probe(&self, collection: Collection) -> RemoteResult<()>;

    /// Whether the backend answers at all right now. Never errors; an
    /// unreachable backend is an ordinary state, not a failure.
    async fn reachable(&self) -> bool;
}
