//! Product rows.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use duka_core::time::{format_ts, parse_ts};
use duka_core::{Collection, RecordId};
use duka_records::ProductRecord;

use crate::error::{StoreError, StoreResult};
use crate::Store;

const SELECT_PRODUCT: &str = r#"
    SELECT
        id,
        name,
        category,
        buying_price,
        selling_price,
        quantity,
        low_stock_level,
        image,
        created_at,
        updated_at,
        synced,
        last_synced_at
    FROM products
"#;

impl Store {
    /// Insert or overwrite a product row.
    pub async fn upsert_product(&self, product: &ProductRecord) -> StoreResult<()> {
        upsert_product_on(&self.pool, product).await?;
        self.notify(Collection::Products);
        Ok(())
    }

    pub async fn get_product(&self, id: &RecordId) -> StoreResult<Option<ProductRecord>> {
        let sql = format!("{SELECT_PRODUCT} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_product).transpose()
    }

    /// All products, sorted by name for display.
    pub async fn list_products(&self) -> StoreResult<Vec<ProductRecord>> {
        let sql = format!("{SELECT_PRODUCT} ORDER BY name COLLATE NOCASE ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_product).collect()
    }

    /// Remove a product row. Returns false when no such row existed.
    pub async fn delete_product(&self, id: &RecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(Collection::Products);
        }
        Ok(deleted)
    }

    /// Flag a product row as confirmed by the remote backend.
    pub async fn mark_product_synced(&self, id: &RecordId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE products SET synced = 1, last_synced_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(format_ts(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a product row from its placeholder id to its server-assigned
    /// id, marking it synced. Delete and reinsert run in one transaction
    /// so no reader ever sees both rows or neither.
    ///
    /// Returns false when the placeholder row no longer exists.
    pub async fn reidentify_product(&self, old: &RecordId, new: &RecordId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{SELECT_PRODUCT} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(old.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut product = row_to_product(row)?;

        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(old.as_str())
            .execute(&mut *tx)
            .await?;

        product.id = new.clone();
        product.synced = true;
        product.last_synced_at = Some(Utc::now());
        upsert_product_on(&mut *tx, &product).await?;

        tx.commit().await?;
        self.notify(Collection::Products);
        Ok(true)
    }
}

/// Upsert through any executor so it can run inside a transaction.
pub(crate) async fn upsert_product_on<'e, E>(
    executor: E,
    product: &ProductRecord,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO products (
            id,
            name,
            category,
            buying_price,
            selling_price,
            quantity,
            low_stock_level,
            image,
            created_at,
            updated_at,
            synced,
            last_synced_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            buying_price = excluded.buying_price,
            selling_price = excluded.selling_price,
            quantity = excluded.quantity,
            low_stock_level = excluded.low_stock_level,
            image = excluded.image,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            synced = excluded.synced,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(product.id.as_str())
    .bind(&product.name)
    .bind(product.category.as_deref())
    .bind(product.buying_price)
    .bind(product.selling_price)
    .bind(product.quantity)
    .bind(product.low_stock_level)
    .bind(product.image.as_deref())
    .bind(format_ts(product.created_at))
    .bind(format_ts(product.updated_at))
    .bind(product.synced)
    .bind(product.last_synced_at.map(format_ts))
    .execute(executor)
    .await?;

    Ok(())
}

/// Map a database row into a `ProductRecord`.
fn row_to_product(row: SqliteRow) -> StoreResult<ProductRecord> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    Ok(ProductRecord {
        id: RecordId::from(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        buying_price: row.try_get("buying_price")?,
        selling_price: row.try_get("selling_price")?,
        quantity: row.try_get("quantity")?,
        low_stock_level: row.try_get("low_stock_level")?,
        image: row.try_get("image")?,
        created_at: parse_ts(&created_at)
            .map_err(|err| StoreError::corrupt("products", format!("bad created_at: {err}")))?,
        updated_at: parse_ts(&updated_at)
            .map_err(|err| StoreError::corrupt("products", format!("bad updated_at: {err}")))?,
        synced: row.try_get("synced")?,
        last_synced_at: last_synced_at
            .map(|ts| {
                parse_ts(&ts).map_err(|err| {
                    StoreError::corrupt("products", format!("bad last_synced_at: {err}"))
                })
            })
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn test_product(name: &str) -> ProductRecord {
        ProductRecord {
            id: RecordId::placeholder(Collection::Products),
            name: name.to_string(),
            category: Some("toiletries".to_string()),
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
    async fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let product = test_product("Soap");

        store.upsert_product(&product).await.unwrap();
        let found = store.get_product(&product.id).await.unwrap().unwrap();

        assert_eq!(found, product);
    }

    #[tokio::test]
    async fn upsert_overwrites_the_existing_row() {
        let store = Store::open_in_memory().await.unwrap();
        let mut product = test_product("Soap");
        store.upsert_product(&product).await.unwrap();

        product.quantity = 3;
        product.updated_at = ts(60);
        store.upsert_product(&product).await.unwrap();

        let found = store.get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(found.quantity, 3);
        assert_eq!(found.updated_at, ts(60));
        assert_eq!(store.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_sorts_by_name_case_insensitively() {
        let store = Store::open_in_memory().await.unwrap();
        for name in ["banana soap", "Almond oil", "Cocoa butter"] {
            store.upsert_product(&test_product(name)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, ["Almond oil", "banana soap", "Cocoa butter"]);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let store = Store::open_in_memory().await.unwrap();
        let product = test_product("Soap");
        store.upsert_product(&product).await.unwrap();

        assert!(store.delete_product(&product.id).await.unwrap());
        assert!(!store.delete_product(&product.id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_synced_sets_both_flags() {
        let store = Store::open_in_memory().await.unwrap();
        let product = test_product("Soap");
        store.upsert_product(&product).await.unwrap();

        store.mark_product_synced(&product.id, ts(90)).await.unwrap();

        let found = store.get_product(&product.id).await.unwrap().unwrap();
        assert!(found.synced);
        assert_eq!(found.last_synced_at, Some(ts(90)));
    }

    #[tokio::test]
    async fn reidentify_moves_the_row_to_the_new_id() {
        let store = Store::open_in_memory().await.unwrap();
        let product = test_product("Soap");
        store.upsert_product(&product).await.unwrap();

        let new_id = RecordId::new();
        assert!(
            store
                .reidentify_product(&product.id, &new_id)
                .await
                .unwrap()
        );

        assert!(store.get_product(&product.id).await.unwrap().is_none());
        let moved = store.get_product(&new_id).await.unwrap().unwrap();
        assert_eq!(moved.name, "Soap");
        assert!(moved.synced);
        assert!(moved.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn reidentify_missing_row_returns_false() {
        let store = Store::open_in_memory().await.unwrap();
        let old = RecordId::placeholder(Collection::Products);

        assert!(!store.reidentify_product(&old, &RecordId::new()).await.unwrap());
    }
}
