//! Table definitions for the local database.
//!
//! There are no SQL-level foreign keys: sales and notifications may
//! reference a product by its placeholder id while the product's first
//! push is still in flight, and the store must accept those rows.

use duka_core::ClientId;
use sqlx::SqlitePool;

/// Create all tables and indexes, then seed the metadata row.
///
/// Every statement is idempotent, so this runs unconditionally on open.
pub(crate) async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            category        TEXT NULL,
            buying_price    INTEGER NOT NULL,
            selling_price   INTEGER NOT NULL,
            quantity        INTEGER NOT NULL,
            low_stock_level INTEGER NOT NULL,
            image           TEXT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            synced          INTEGER NOT NULL DEFAULT 0,
            last_synced_at  TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sales (
            id             TEXT PRIMARY KEY,
            product_id     TEXT NULL,
            product_name   TEXT NOT NULL,
            quantity       INTEGER NOT NULL,
            unit_price     INTEGER NOT NULL,
            total_price    INTEGER NOT NULL,
            sale_date      TEXT NOT NULL,
            created_at     TEXT NOT NULL,
            synced         INTEGER NOT NULL DEFAULT 0,
            last_synced_at TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id             TEXT PRIMARY KEY,
            kind           TEXT NOT NULL,
            message        TEXT NOT NULL,
            product_id     TEXT NULL,
            created_at     TEXT NOT NULL,
            cleared        INTEGER NOT NULL DEFAULT 0,
            synced         INTEGER NOT NULL DEFAULT 0,
            last_synced_at TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `key` is deliberately not UNIQUE: a pull must be able to land a
    // remote row that duplicates a local key without violating a
    // constraint. Readers resolve duplicates by newest `updated_at`.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id             TEXT PRIMARY KEY,
            key            TEXT NOT NULL,
            value          TEXT NOT NULL,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            synced         INTEGER NOT NULL DEFAULT 0,
            last_synced_at TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mutations (
            id         TEXT PRIMARY KEY,
            client_id  TEXT NOT NULL,
            collection TEXT NOT NULL,
            op         TEXT NOT NULL,
            record_id  TEXT NOT NULL,
            payload    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            status     TEXT NOT NULL,
            attempts   INTEGER NOT NULL DEFAULT 0,
            last_error TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_meta (
            id                INTEGER PRIMARY KEY CHECK (id = 1),
            client_id         TEXT NOT NULL,
            last_full_sync_at TEXT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mutations_status_created ON mutations (status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mutations_record ON mutations (record_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_product ON sales (product_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_product ON notifications (product_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_settings_key ON settings (key)")
        .execute(pool)
        .await?;

    // Per-collection filters the app and the push pass lean on: unsynced
    // rows, products by recency, sales by day, open notifications.
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_products_synced ON products (synced)",
        "CREATE INDEX IF NOT EXISTS idx_products_updated ON products (updated_at)",
        "CREATE INDEX IF NOT EXISTS idx_sales_synced ON sales (synced)",
        "CREATE INDEX IF NOT EXISTS idx_sales_date ON sales (sale_date)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_synced ON notifications (synced)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_open ON notifications (cleared, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_settings_synced ON settings (synced)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    // First open mints this device's client id.
    sqlx::query(
        r#"
        INSERT INTO sync_meta (id, client_id)
        VALUES (1, ?1)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(ClientId::new().to_string())
    .execute(pool)
    .await?;

    Ok(())
}
