//! Notification rows.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use duka_core::time::{format_ts, parse_ts};
use duka_core::{Collection, RecordId};
use duka_records::{NotificationKind, NotificationRecord};

use crate::error::{StoreError, StoreResult};
use crate::Store;

const SELECT_NOTIFICATION: &str = r#"
    SELECT
        id,
        kind,
        message,
        product_id,
        created_at,
        cleared,
        synced,
        last_synced_at
    FROM notifications
"#;

impl Store {
    /// Insert or overwrite a notification row.
    pub async fn upsert_notification(&self, notification: &NotificationRecord) -> StoreResult<()> {
        upsert_notification_on(&self.pool, notification).await?;
        self.notify(Collection::Notifications);
        Ok(())
    }

    pub async fn get_notification(&self, id: &RecordId) -> StoreResult<Option<NotificationRecord>> {
        let sql = format!("{SELECT_NOTIFICATION} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_notification).transpose()
    }

    /// All notifications, newest first.
    pub async fn list_notifications(&self) -> StoreResult<Vec<NotificationRecord>> {
        let sql = format!("{SELECT_NOTIFICATION} ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_notification).collect()
    }

    /// True when an uncleared low-stock notification already exists for
    /// the product. Used to avoid stacking duplicates as a product is
    /// sold down through its threshold.
    pub async fn has_uncleared_low_stock(&self, product_id: &RecordId) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE kind = ?1
              AND product_id = ?2
              AND cleared = 0
            "#,
        )
        .bind(NotificationKind::LowStock.as_str())
        .bind(product_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Remove a notification row. Returns false when no such row existed.
    pub async fn delete_notification(&self, id: &RecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(Collection::Notifications);
        }
        Ok(deleted)
    }

    /// Flag a notification row as confirmed by the remote backend.
    pub async fn mark_notification_synced(
        &self,
        id: &RecordId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE notifications SET synced = 1, last_synced_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(format_ts(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a notification row from its placeholder id to its
    /// server-assigned id. Returns false when the placeholder row no
    /// longer exists.
    pub async fn reidentify_notification(
        &self,
        old: &RecordId,
        new: &RecordId,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{SELECT_NOTIFICATION} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(old.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut notification = row_to_notification(row)?;

        sqlx::query("DELETE FROM notifications WHERE id = ?1")
            .bind(old.as_str())
            .execute(&mut *tx)
            .await?;

        notification.id = new.clone();
        notification.synced = true;
        notification.last_synced_at = Some(Utc::now());
        upsert_notification_on(&mut *tx, &notification).await?;

        tx.commit().await?;
        self.notify(Collection::Notifications);
        Ok(true)
    }
}

pub(crate) async fn upsert_notification_on<'e, E>(
    executor: E,
    notification: &NotificationRecord,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notifications (
            id,
            kind,
            message,
            product_id,
            created_at,
            cleared,
            synced,
            last_synced_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            message = excluded.message,
            product_id = excluded.product_id,
            created_at = excluded.created_at,
            cleared = excluded.cleared,
            synced = excluded.synced,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(notification.id.as_str())
    .bind(notification.kind.as_str())
    .bind(&notification.message)
    .bind(notification.product_id.as_ref().map(|id| id.as_str()))
    .bind(format_ts(notification.created_at))
    .bind(notification.cleared)
    .bind(notification.synced)
    .bind(notification.last_synced_at.map(format_ts))
    .execute(executor)
    .await?;

    Ok(())
}

/// Map a database row into a `NotificationRecord`.
fn row_to_notification(row: SqliteRow) -> StoreResult<NotificationRecord> {
    let kind: String = row.try_get("kind")?;
    let created_at: String = row.try_get("created_at")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    Ok(NotificationRecord {
        id: RecordId::from(row.try_get::<String, _>("id")?),
        kind: kind
            .parse::<NotificationKind>()
            .map_err(|err| StoreError::corrupt("notifications", format!("bad kind: {err}")))?,
        message: row.try_get("message")?,
        product_id: row
            .try_get::<Option<String>, _>("product_id")?
            .map(RecordId::from),
        created_at: parse_ts(&created_at)
            .map_err(|err| StoreError::corrupt("notifications", format!("bad created_at: {err}")))?,
        cleared: row.try_get("cleared")?,
        synced: row.try_get("synced")?,
        last_synced_at: last_synced_at
            .map(|ts| {
                parse_ts(&ts).map_err(|err| {
                    StoreError::corrupt("notifications", format!("bad last_synced_at: {err}"))
                })
            })
            .transpose()?,
    })
}
