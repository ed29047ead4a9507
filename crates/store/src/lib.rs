//! `duka-store`: the device-local SQLite database.
//!
//! The local database is the application's source of truth: every read is
//! served from here and every write lands here first, before any network
//! traffic. The sync layer drains a durable mutation queue (also kept in
//! this database) towards the remote backend and merges remote rows back
//! in, but the store itself never talks to the network.
//!
//! A single [`Store`] handle wraps one SQLite file (or an in-memory
//! database in tests) and is cheap to clone. Local writes fan out on a
//! broadcast channel so the UI and the sync scheduler can react without
//! polling.

mod collections;
mod meta;
mod mutations;
mod notifications;
mod products;
mod sales;
mod schema;
mod settings;

pub mod changes;
pub mod error;

use std::path::Path;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::sync::broadcast;

use duka_core::Collection;

pub use changes::ChangeEvent;
pub use error::{StoreError, StoreResult};

/// Buffered change events per subscriber. Laggards miss events rather
/// than block writers; a missed event only costs an extra re-read.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Handle to the local database. Cheap to clone and safe to share.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        tracing::debug!(path = %path.display(), "opening local store");
        Self::connect(options).await
    }

    /// Open a fresh in-memory database. Used by tests.
    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::connect(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn connect(options: SqliteConnectOptions) -> StoreResult<Self> {
        // One connection only: SQLite has a single writer anyway, and an
        // in-memory database exists per connection, so a larger pool
        // would hand out empty databases.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { pool, changes })
    }

    /// Subscribe to local change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub(crate) fn notify(&self, collection: Collection) {
        // No subscribers is fine.
        let _ = self.changes.send(ChangeEvent { collection });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use duka_core::RecordId;
    use duka_records::ProductRecord;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn test_product(name: &str) -> ProductRecord {
        ProductRecord {
            id: RecordId::placeholder(Collection::Products),
            name: name.to_string(),
            category: None,
            buying_price: 100,
            selling_price: 250,
            quantity: 10,
            low_stock_level: 7,
            image: None,
            created_at: ts(0),
            updated_at: ts(0),
            synced: false,
            last_synced_at: None,
        }
    }

    #[tokio::test]
    async fn open_is_idempotent_on_the_same_file() {
        let dir = std::env::temp_dir().join(format!("duka-store-{}", uuid::Uuid::now_v7()));
        let path = dir.join("duka.db");

        let store = Store::open(&path).await.unwrap();
        let product = test_product("Soap");
        store.upsert_product(&product).await.unwrap();
        drop(store);

        // Second open must not recreate tables or lose rows.
        let store = Store::open(&path).await.unwrap();
        let found = store.get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Soap");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn writes_emit_change_events() {
        let store = Store::open_in_memory().await.unwrap();
        let mut events = store.subscribe();

        store.upsert_product(&test_product("Soap")).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.collection, Collection::Products);
    }

    #[tokio::test]
    async fn events_are_not_required_to_be_consumed() {
        let store = Store::open_in_memory().await.unwrap();

        // No subscriber at all; writes must still succeed.
        store.upsert_product(&test_product("Soap")).await.unwrap();
        store.upsert_product(&test_product("Salt")).await.unwrap();

        assert_eq!(store.list_products().await.unwrap().len(), 2);
    }
}
