//! Setting rows.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use duka_core::time::{format_ts, parse_ts};
use duka_core::{Collection, RecordId};
use duka_records::SettingRecord;

use crate::error::{StoreError, StoreResult};
use crate::Store;

const SELECT_SETTING: &str = r#"
    SELECT
        id,
        key,
        value,
        created_at,
        updated_at,
        synced,
        last_synced_at
    FROM settings
"#;

impl Store {
    /// Insert or overwrite a setting row.
    pub async fn upsert_setting(&self, setting: &SettingRecord) -> StoreResult<()> {
        upsert_setting_on(&self.pool, setting).await?;
        self.notify(Collection::Settings);
        Ok(())
    }

    pub async fn get_setting(&self, id: &RecordId) -> StoreResult<Option<SettingRecord>> {
        let sql = format!("{SELECT_SETTING} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_setting).transpose()
    }

    /// Look a setting up by key. When a pull has landed a remote duplicate
    /// of a local key the newest row wins.
    pub async fn get_setting_by_key(&self, key: &str) -> StoreResult<Option<SettingRecord>> {
        let sql = format!("{SELECT_SETTING} WHERE key = ?1 ORDER BY updated_at DESC LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_setting).transpose()
    }

    /// All settings, sorted by key.
    pub async fn list_settings(&self) -> StoreResult<Vec<SettingRecord>> {
        let sql = format!("{SELECT_SETTING} ORDER BY key ASC, updated_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_setting).collect()
    }

    /// Remove a setting row. Returns false when no such row existed.
    pub async fn delete_setting(&self, id: &RecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(Collection::Settings);
        }
        Ok(deleted)
    }

    /// Flag a setting row as confirmed by the remote backend.
    pub async fn mark_setting_synced(&self, id: &RecordId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE settings SET synced = 1, last_synced_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(format_ts(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a setting row from its placeholder id to its server-assigned
    /// id. Returns false when the placeholder row no longer exists.
    pub async fn reidentify_setting(&self, old: &RecordId, new: &RecordId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{SELECT_SETTING} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(old.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut setting = row_to_setting(row)?;

        sqlx::query("DELETE FROM settings WHERE id = ?1")
            .bind(old.as_str())
            .execute(&mut *tx)
            .await?;

        setting.id = new.clone();
        setting.synced = true;
        setting.last_synced_at = Some(Utc::now());
        upsert_setting_on(&mut *tx, &setting).await?;

        tx.commit().await?;
        self.notify(Collection::Settings);
        Ok(true)
    }
}

pub(crate) async fn upsert_setting_on<'e, E>(
    executor: E,
    setting: &SettingRecord,
) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let value = serde_json::to_string(&setting.value)?;

    sqlx::query(
        r#"
        INSERT INTO settings (
            id,
            key,
            value,
            created_at,
            updated_at,
            synced,
            last_synced_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            key = excluded.key,
            value = excluded.value,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            synced = excluded.synced,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(setting.id.as_str())
    .bind(&setting.key)
    .bind(value)
    .bind(format_ts(setting.created_at))
    .bind(format_ts(setting.updated_at))
    .bind(setting.synced)
    .bind(setting.last_synced_at.map(format_ts))
    .execute(executor)
    .await?;

    Ok(())
}

/// Map a database row into a `SettingRecord`.
fn row_to_setting(row: SqliteRow) -> StoreResult<SettingRecord> {
    let value: String = row.try_get("value")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    Ok(SettingRecord {
        id: RecordId::from(row.try_get::<String, _>("id")?),
        key: row.try_get("key")?,
        value: serde_json::from_str(&value)
            .map_err(|err| StoreError::corrupt("settings", format!("bad value JSON: {err}")))?,
        created_at: parse_ts(&created_at)
            .map_err(|err| StoreError::corrupt("settings", format!("bad created_at: {err}")))?,
        updated_at: parse_ts(&updated_at)
            .map_err(|err| StoreError::corrupt("settings", format!("bad updated_at: {err}")))?,
        synced: row.try_get("synced")?,
        last_synced_at: last_synced_at
            .map(|ts| {
                parse_ts(&ts).map_err(|err| {
                    StoreError::corrupt("settings", format!("bad last_synced_at: {err}"))
                })
            })
            .transpose()?,
    })
}
