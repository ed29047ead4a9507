//! Sync bookkeeping: the device's client id and the last full-sync stamp.

use chrono::{DateTime, Utc};

use duka_core::ClientId;
use duka_core::time::{format_ts, parse_ts};

use crate::error::{StoreError, StoreResult};
use crate::Store;

impl Store {
    /// This device's client id: minted on first open, overwritable by
    /// the shell when the installation keeps its identity outside the
    /// database.
    pub async fn client_id(&self) -> StoreResult<ClientId> {
        let raw: String = sqlx::query_scalar("SELECT client_id FROM sync_meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        raw.parse::<ClientId>()
            .map_err(|err| StoreError::corrupt("sync_meta", format!("bad client_id: {err}")))
    }

    /// Adopt an externally persisted client id. A fresh database file
    /// starts with a minted id; the shell replaces it at startup with
    /// the one from the identity file so a wiped database keeps the
    /// same device identity.
    pub async fn set_client_id(&self, id: ClientId) -> StoreResult<()> {
        sqlx::query("UPDATE sync_meta SET client_id = ?1 WHERE id = 1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// When the last sync cycle completed end to end, if ever.
    pub async fn last_full_sync_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT last_full_sync_at FROM sync_meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;

        raw.map(|ts| {
            parse_ts(&ts).map_err(|err| {
                StoreError::corrupt("sync_meta", format!("bad last_full_sync_at: {err}"))
            })
        })
        .transpose()
    }

    pub async fn set_last_full_sync_at(&self, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE sync_meta SET last_full_sync_at = ?1 WHERE id = 1")
            .bind(format_ts(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
