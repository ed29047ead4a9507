//! Sale rows.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use duka_core::time::{format_ts, parse_ts};
use duka_core::{Collection, RecordId};
use duka_records::SaleRecord;

use crate::error::{StoreError, StoreResult};
use crate::Store;

const SELECT_SALE: &str = r#"
    SELECT
        id,
        product_id,
        product_name,
        quantity,
        unit_price,
        total_price,
        sale_date,
        created_at,
        synced,
        last_synced_at
    FROM sales
"#;

impl Store {
    /// Insert or overwrite a sale row.
    pub async fn upsert_sale(&self, sale: &SaleRecord) -> StoreResult<()> {
        upsert_sale_on(&self.pool, sale).await?;
        self.notify(Collection::Sales);
        Ok(())
    }

    pub async fn get_sale(&self, id: &RecordId) -> StoreResult<Option<SaleRecord>> {
        let sql = format!("{SELECT_SALE} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_sale).transpose()
    }

    /// All sales, newest first.
    pub async fn list_sales(&self) -> StoreResult<Vec<SaleRecord>> {
        let sql = format!("{SELECT_SALE} ORDER BY sale_date DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_sale).collect()
    }

    /// Remove a sale row. Returns false when no such row existed.
    pub async fn delete_sale(&self, id: &RecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(Collection::Sales);
        }
        Ok(deleted)
    }

    /// Flag a sale row as confirmed by the remote backend.
    pub async fn mark_sale_synced(&self, id: &RecordId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE sales SET synced = 1, last_synced_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(format_ts(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a sale row from its placeholder id to its server-assigned id.
    /// Returns false when the placeholder row no longer exists.
    pub async fn reidentify_sale(&self, old: &RecordId, new: &RecordId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{SELECT_SALE} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(old.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut sale = row_to_sale(row)?;

        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(old.as_str())
            .execute(&mut *tx)
            .await?;

        sale.id = new.clone();
        sale.synced = true;
        sale.last_synced_at = Some(Utc::now());
        upsert_sale_on(&mut *tx, &sale).await?;

        tx.commit().await?;
        self.notify(Collection::Sales);
        Ok(true)
    }
}

pub(crate) async fn upsert_sale_on<'e, E>(executor: E, sale: &SaleRecord) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO sales (
            id,
            product_id,
            product_name,
            quantity,
            unit_price,
            total_price,
            sale_date,
            created_at,
            synced,
            last_synced_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            product_id = excluded.product_id,
            product_name = excluded.product_name,
            quantity = excluded.quantity,
            unit_price = excluded.unit_price,
            total_price = excluded.total_price,
            sale_date = excluded.sale_date,
            created_at = excluded.created_at,
            synced = excluded.synced,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(sale.id.as_str())
    .bind(sale.product_id.as_ref().map(|id| id.as_str()))
    .bind(&sale.product_name)
    .bind(sale.quantity)
    .bind(sale.unit_price)
    .bind(sale.total_price)
    .bind(format_ts(sale.sale_date))
    .bind(format_ts(sale.created_at))
    .bind(sale.synced)
    .bind(sale.last_synced_at.map(format_ts))
    .execute(executor)
    .await?;

    Ok(())
}

/// Map a database row into a `SaleRecord`.
fn row_to_sale(row: SqliteRow) -> StoreResult<SaleRecord> {
    let sale_date: String = row.try_get("sale_date")?;
    let created_at: String = row.try_get("created_at")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    Ok(SaleRecord {
        id: RecordId::from(row.try_get::<String, _>("id")?),
        product_id: row
            .try_get::<Option<String>, _>("product_id")?
            .map(RecordId::from),
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        total_price: row.try_get("total_price")?,
        sale_date: parse_ts(&sale_date)
            .map_err(|err| StoreError::corrupt("sales", format!("bad sale_date: {err}")))?,
        created_at: parse_ts(&created_at)
            .map_err(|err| StoreError::corrupt("sales", format!("bad created_at: {err}")))?,
        synced: row.try_get("synced")?,
        last_synced_at: last_synced_at
            .map(|ts| {
                parse_ts(&ts)
                    .map_err(|err| StoreError::corrupt("sales", format!("bad last_synced_at: {err}")))
            })
            .transpose()?,
    })
}
