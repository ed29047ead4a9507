//! Cross-collection operations keyed by [`Collection`].
//!
//! The sync engine works generically over collections; these dispatchers
//! fan out to the typed per-collection methods so the engine never
//! matches on record types itself.

use chrono::{DateTime, Utc};
use serde_json::Value;

use duka_core::{Collection, DomainError, RecordId};
use duka_records::{
    MutationPayload, NotificationRecord, ProductRecord, SaleRecord, SettingRecord,
};

use crate::error::StoreResult;
use crate::Store;

/// Column behind a rewriteable reference field, when the collection has
/// one. Reference fields are fixed at compile time; this is the only
/// place they map to SQL columns.
fn reference_column(collection: Collection, field: &str) -> Option<&'static str> {
    match (collection, field) {
        (Collection::Sales, "product_id") => Some("product_id"),
        (Collection::Notifications, "product_id") => Some("product_id"),
        _ => None,
    }
}

impl Store {
    /// Merge a remote row into the local table, marking it synced.
    ///
    /// Remote rows win wholesale: whatever the server returned replaces
    /// the local copy field by field.
    pub async fn apply_remote(&self, collection: Collection, row: &Value) -> StoreResult<()> {
        let now = Utc::now();
        match collection {
            Collection::Products => {
                let mut product: ProductRecord = serde_json::from_value(row.clone())?;
                product.synced = true;
                product.last_synced_at = Some(now);
                self.upsert_product(&product).await
            }
            Collection::Sales => {
                let mut sale: SaleRecord = serde_json::from_value(row.clone())?;
                sale.synced = true;
                sale.last_synced_at = Some(now);
                self.upsert_sale(&sale).await
            }
            Collection::Notifications => {
                let mut notification: NotificationRecord = serde_json::from_value(row.clone())?;
                notification.synced = true;
                notification.last_synced_at = Some(now);
                self.upsert_notification(&notification).await
            }
            Collection::Settings => {
                let mut setting: SettingRecord = serde_json::from_value(row.clone())?;
                setting.synced = true;
                setting.last_synced_at = Some(now);
                self.upsert_setting(&setting).await
            }
        }
    }

    /// Current local row as a mutation payload, if the row still exists.
    /// Insert bodies are built from this so a push always carries the
    /// latest local state, not the state at enqueue time.
    pub async fn record_payload(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> StoreResult<Option<MutationPayload>> {
        Ok(match collection {
            Collection::Products => self
                .get_product(id)
                .await?
                .map(MutationPayload::Product),
            Collection::Sales => self.get_sale(id).await?.map(MutationPayload::Sale),
            Collection::Notifications => self
                .get_notification(id)
                .await?
                .map(MutationPayload::Notification),
            Collection::Settings => self
                .get_setting(id)
                .await?
                .map(MutationPayload::Setting),
        })
    }

    /// Remove a row from whichever collection it lives in.
    pub async fn delete_record(&self, collection: Collection, id: &RecordId) -> StoreResult<bool> {
        match collection {
            Collection::Products => self.delete_product(id).await,
            Collection::Sales => self.delete_sale(id).await,
            Collection::Notifications => self.delete_notification(id).await,
            Collection::Settings => self.delete_setting(id).await,
        }
    }

    /// Flag a row as confirmed by the remote backend.
    pub async fn mark_record_synced(
        &self,
        collection: Collection,
        id: &RecordId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        match collection {
            Collection::Products => self.mark_product_synced(id, at).await,
            Collection::Sales => self.mark_sale_synced(id, at).await,
            Collection::Notifications => self.mark_notification_synced(id, at).await,
            Collection::Settings => self.mark_setting_synced(id, at).await,
        }
    }

    /// Move a row from its placeholder id to its server-assigned id.
    pub async fn reidentify(
        &self,
        collection: Collection,
        old: &RecordId,
        new: &RecordId,
    ) -> StoreResult<bool> {
        match collection {
            Collection::Products => self.reidentify_product(old, new).await,
            Collection::Sales => self.reidentify_sale(old, new).await,
            Collection::Notifications => self.reidentify_notification(old, new).await,
            Collection::Settings => self.reidentify_setting(old, new).await,
        }
    }

    /// Ids of rows whose `field` still points at `target`.
    pub async fn referencing_records(
        &self,
        collection: Collection,
        field: &str,
        target: &RecordId,
    ) -> StoreResult<Vec<RecordId>> {
        let Some(column) = reference_column(collection, field) else {
            return Err(DomainError::validation(format!(
                "{collection} has no reference field '{field}'"
            ))
            .into());
        };

        let sql = format!(
            "SELECT id FROM {} WHERE {column} = ?1",
            collection.as_table()
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(target.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(RecordId::from).collect())
    }

    /// Point every row whose `field` references `old` at `new` instead,
    /// marking the rows unsynced. Returns how many rows changed.
    pub async fn rewrite_reference(
        &self,
        collection: Collection,
        field: &str,
        old: &RecordId,
        new: &RecordId,
    ) -> StoreResult<u64> {
        let Some(column) = reference_column(collection, field) else {
            return Err(DomainError::validation(format!(
                "{collection} has no reference field '{field}'"
            ))
            .into());
        };

        let sql = format!(
            "UPDATE {} SET {column} = ?2, synced = 0 WHERE {column} = ?1",
            collection.as_table()
        );
        let result = sqlx::query(&sql)
            .bind(old.as_str())
            .bind(new.as_str())
            .execute(&self.pool)
            .await?;

        let rewritten = result.rows_affected();
        if rewritten > 0 {
            self.notify(collection);
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use duka_core::time::format_ts;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn remote_product_row(id: &RecordId, name: &str) -> Value {
        json!({
            "id": id.as_str(),
            "name": name,
            "category": "toiletries",
            "buying_price": 100,
            "selling_price": 250,
            "quantity": 10,
            "low_stock_level": 7,
            "image": null,
            "created_at": format_ts(ts(0)),
            "updated_at": format_ts(ts(0)),
        })
    }

    fn local_sale(product_id: &RecordId) -> SaleRecord {
        SaleRecord {
            id: RecordId::placeholder(Collection::Sales),
            product_id: Some(product_id.clone()),
            product_name: "Soap".to_string(),
            quantity: 1,
            unit_price: 250,
            total_price: 250,
            sale_date: ts(0),
            created_at: ts(0),
            synced: false,
            last_synced_at: None,
        }
    }

    #[tokio::test]
    async fn apply_remote_lands_the_row_as_synced() {
        let store = Store::open_in_memory().await.unwrap();
        let id = RecordId::new();

        store
            .apply_remote(Collection::Products, &remote_product_row(&id, "Soap"))
            .await
            .unwrap();

        let product = store.get_product(&id).await.unwrap().unwrap();
        assert_eq!(product.name, "Soap");
        assert!(product.synced);
        assert!(product.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn apply_remote_overwrites_local_state() {
        let store = Store::open_in_memory().await.unwrap();
        let id = RecordId::new();
        store
            .apply_remote(Collection::Products, &remote_product_row(&id, "Soap"))
            .await
            .unwrap();

        // A fresher copy of the same row arrives on the next pull.
        let mut row = remote_product_row(&id, "Soap (250g)");
        row["quantity"] = json!(4);
        store.apply_remote(Collection::Products, &row).await.unwrap();

        let product = store.get_product(&id).await.unwrap().unwrap();
        assert_eq!(product.name, "Soap (250g)");
        assert_eq!(product.quantity, 4);
    }

    #[tokio::test]
    async fn malformed_remote_rows_surface_a_serde_error() {
        let store = Store::open_in_memory().await.unwrap();
        let row = json!({ "id": "p1", "name": 42 });

        let err = store.apply_remote(Collection::Products, &row).await.unwrap_err();
        assert!(matches!(err, crate::StoreError::Serde(_)));
    }

    #[tokio::test]
    async fn record_payload_reads_the_live_row() {
        let store = Store::open_in_memory().await.unwrap();
        let id = RecordId::new();
        store
            .apply_remote(Collection::Products, &remote_product_row(&id, "Soap"))
            .await
            .unwrap();

        let payload = store
            .record_payload(Collection::Products, &id)
            .await
            .unwrap()
            .unwrap();

        match payload {
            MutationPayload::Product(p) => assert_eq!(p.name, "Soap"),
            other => panic!("unexpected payload {other:?}"),
        }

        let missing = store
            .record_payload(Collection::Products, &RecordId::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn rewrite_reference_updates_every_matching_row() {
        let store = Store::open_in_memory().await.unwrap();
        let placeholder = RecordId::placeholder(Collection::Products);
        let first = local_sale(&placeholder);
        let second = local_sale(&placeholder);
        store.upsert_sale(&first).await.unwrap();
        store.upsert_sale(&second).await.unwrap();
        store.mark_sale_synced(&second.id, ts(5)).await.unwrap();

        let server_id = RecordId::new();
        let rewritten = store
            .rewrite_reference(Collection::Sales, "product_id", &placeholder, &server_id)
            .await
            .unwrap();
        assert_eq!(rewritten, 2);

        for id in [&first.id, &second.id] {
            let sale = store.get_sale(id).await.unwrap().unwrap();
            assert_eq!(sale.product_id, Some(server_id.clone()));
            assert!(!sale.synced);
        }
    }

    #[tokio::test]
    async fn referencing_records_finds_only_matching_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let placeholder = RecordId::placeholder(Collection::Products);
        let other = RecordId::new();
        let hit = local_sale(&placeholder);
        let miss = local_sale(&other);
        store.upsert_sale(&hit).await.unwrap();
        store.upsert_sale(&miss).await.unwrap();

        let ids = store
            .referencing_records(Collection::Sales, "product_id", &placeholder)
            .await
            .unwrap();

        assert_eq!(ids, vec![hit.id]);
    }

    #[tokio::test]
    async fn unknown_reference_fields_are_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store
            .rewrite_reference(
                Collection::Products,
                "product_id",
                &RecordId::new(),
                &RecordId::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, crate::StoreError::Domain(_)));
    }

    #[tokio::test]
    async fn dispatchers_reach_every_collection() {
        let store = Store::open_in_memory().await.unwrap();
        let id = RecordId::new();
        store
            .apply_remote(
                Collection::Settings,
                &json!({
                    "id": id.as_str(),
                    "key": "currency",
                    "value": "KES",
                    "created_at": format_ts(ts(0)),
                    "updated_at": format_ts(ts(0)),
                }),
            )
            .await
            .unwrap();

        let payload = store
            .record_payload(Collection::Settings, &id)
            .await
            .unwrap();
        assert!(matches!(payload, Some(MutationPayload::Setting(_))));

        let new_id = RecordId::new();
        assert!(store.reidentify(Collection::Settings, &id, &new_id).await.unwrap());
        assert!(store.delete_record(Collection::Settings, &new_id).await.unwrap());
    }
}
