//! The durable mutation queue.
//!
//! Every local write enqueues a row here before the sync layer ever runs.
//! Rows are pushed in creation order and survive restarts, so a device
//! that spends days offline replays its history faithfully once it is
//! back on the network.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use duka_core::time::{format_ts, parse_ts};
use duka_core::{ClientId, Collection, MutationId, Operation, RecordId};
use duka_records::{MAX_SYNC_ATTEMPTS, Mutation, MutationPayload, MutationStatus};

use crate::error::{StoreError, StoreResult};
use crate::Store;

const SELECT_MUTATION: &str = r#"
    SELECT
        id,
        client_id,
        collection,
        op,
        record_id,
        payload,
        created_at,
        status,
        attempts,
        last_error
    FROM mutations
"#;

impl Store {
    /// Append a mutation to the queue.
    pub async fn enqueue_mutation(&self, mutation: &Mutation) -> StoreResult<()> {
        let payload = serde_json::to_string(&mutation.payload)?;

        sqlx::query(
            r#"
            INSERT INTO mutations (
                id,
                client_id,
                collection,
                op,
                record_id,
                payload,
                created_at,
                status,
                attempts,
                last_error
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(mutation.id.to_string())
        .bind(mutation.client_id.to_string())
        .bind(mutation.collection.as_table())
        .bind(mutation.op.as_str())
        .bind(mutation.record_id.as_str())
        .bind(payload)
        .bind(format_ts(mutation.created_at))
        .bind(mutation.status.as_str())
        .bind(mutation.attempts)
        .bind(mutation.last_error.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Pending mutations in creation order. Rows created in the same
    /// microsecond keep their insertion order.
    pub async fn list_pending_mutations(&self) -> StoreResult<Vec<Mutation>> {
        let sql = format!(
            "{SELECT_MUTATION} WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_mutation).collect()
    }

    /// Mutations that exhausted their retries and wait for an operator.
    pub async fn list_failed_mutations(&self) -> StoreResult<Vec<Mutation>> {
        let sql =
            format!("{SELECT_MUTATION} WHERE status = 'failed' ORDER BY created_at ASC, rowid ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_mutation).collect()
    }

    pub async fn pending_mutation_count(&self) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM mutations WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    /// Mark a mutation as accepted by the remote backend.
    pub async fn mark_mutation_synced(&self, id: &MutationId) -> StoreResult<()> {
        sqlx::query("UPDATE mutations SET status = 'synced', last_error = NULL WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a transient failure. The mutation stays pending until it
    /// has failed [`MAX_SYNC_ATTEMPTS`] times, then flips to failed.
    ///
    /// Returns the status after the bump.
    pub async fn bump_mutation_attempts(
        &self,
        id: &MutationId,
        error: &str,
    ) -> StoreResult<MutationStatus> {
        sqlx::query(
            r#"
            UPDATE mutations
            SET attempts = attempts + 1,
                last_error = ?2,
                status = CASE WHEN attempts + 1 >= ?3 THEN 'failed' ELSE status END
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .bind(MAX_SYNC_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        let status: String = sqlx::query_scalar("SELECT status FROM mutations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;

        status
            .parse::<MutationStatus>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad status: {err}")))
    }

    /// Record a permanent failure. The mutation will not be retried.
    pub async fn mark_mutation_failed(&self, id: &MutationId, error: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE mutations
            SET status = 'failed',
                attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return all failed mutations to the queue with a fresh attempt
    /// budget. Returns how many rows were reset.
    pub async fn reset_failed_mutations(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE mutations
            SET status = 'pending',
                attempts = 0,
                last_error = NULL
            WHERE status = 'failed'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Drop mutations the remote backend has accepted. Returns how many
    /// rows were removed.
    pub async fn clear_synced_mutations(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM mutations WHERE status = 'synced'")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Persist a rewritten payload for a queued mutation.
    pub async fn update_mutation_payload(
        &self,
        id: &MutationId,
        payload: &MutationPayload,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(payload)?;

        sqlx::query("UPDATE mutations SET payload = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace the payload of an already-queued pending update for this
    /// record, keeping its position in the queue. Returns false when no
    /// such update is queued, in which case the caller enqueues a new one.
    pub async fn refresh_pending_update(
        &self,
        collection: Collection,
        record_id: &RecordId,
        payload: &MutationPayload,
    ) -> StoreResult<bool> {
        let payload = serde_json::to_string(payload)?;

        let result = sqlx::query(
            r#"
            UPDATE mutations
            SET payload = ?3
            WHERE collection = ?1
              AND record_id = ?2
              AND op = 'update'
              AND status = 'pending'
            "#,
        )
        .bind(collection.as_table())
        .bind(record_id.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Point every pending mutation for `old` at `new`, rewriting both
    /// the target column and the id embedded in each payload. Runs after
    /// a record is reidentified so later cycles need no translation.
    pub async fn retarget_pending_mutations(
        &self,
        collection: Collection,
        old: &RecordId,
        new: &RecordId,
    ) -> StoreResult<u64> {
        let sql = format!(
            "{SELECT_MUTATION} WHERE collection = ?1 AND record_id = ?2 AND status = 'pending'"
        );
        let rows = sqlx::query(&sql)
            .bind(collection.as_table())
            .bind(old.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut moved = 0;
        for row in rows {
            let mut mutation = row_to_mutation(row)?;
            mutation.payload.set_record_id(new.clone());
            let payload = serde_json::to_string(&mutation.payload)?;

            sqlx::query("UPDATE mutations SET record_id = ?2, payload = ?3 WHERE id = ?1")
                .bind(mutation.id.to_string())
                .bind(new.as_str())
                .bind(payload)
                .execute(&self.pool)
                .await?;
            moved += 1;
        }

        Ok(moved)
    }
}

/// Map a database row into a `Mutation`.
fn row_to_mutation(row: SqliteRow) -> StoreResult<Mutation> {
    let id: String = row.try_get("id")?;
    let client_id: String = row.try_get("client_id")?;
    let collection: String = row.try_get("collection")?;
    let op: String = row.try_get("op")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;
    let status: String = row.try_get("status")?;

    Ok(Mutation {
        id: id
            .parse::<MutationId>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad id: {err}")))?,
        client_id: client_id
            .parse::<ClientId>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad client_id: {err}")))?,
        collection: collection
            .parse::<Collection>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad collection: {err}")))?,
        op: op
            .parse::<Operation>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad op: {err}")))?,
        record_id: RecordId::from(row.try_get::<String, _>("record_id")?),
        payload: serde_json::from_str(&payload)
            .map_err(|err| StoreError::corrupt("mutations", format!("bad payload: {err}")))?,
        created_at: parse_ts(&created_at)
            .map_err(|err| StoreError::corrupt("mutations", format!("bad created_at: {err}")))?,
        status: status
            .parse::<MutationStatus>()
            .map_err(|err| StoreError::corrupt("mutations", format!("bad status: {err}")))?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use duka_records::ProductRecord;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn test_product(id: &RecordId) -> ProductRecord {
        ProductRecord {
            id: id.clone(),
            name: "Soap".to_string(),
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

    fn queued(
        client_id: ClientId,
        op: Operation,
        record_id: RecordId,
        payload: MutationPayload,
        at: DateTime<Utc>,
    ) -> Mutation {
        Mutation {
            id: MutationId::new(),
            client_id,
            collection: Collection::Products,
            op,
            record_id,
            payload,
            created_at: at,
            status: MutationStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    fn queued_insert(client_id: ClientId, at: DateTime<Utc>) -> Mutation {
        let record_id = RecordId::placeholder(Collection::Products);
        let payload = MutationPayload::Product(test_product(&record_id));
        queued(client_id, Operation::Insert, record_id, payload, at)
    }

    #[tokio::test]
    async fn enqueue_then_list_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let mutation = queued_insert(ClientId::new(), ts(0));

        store.enqueue_mutation(&mutation).await.unwrap();
        let pending = store.list_pending_mutations().await.unwrap();

        assert_eq!(pending, vec![mutation]);
    }

    #[tokio::test]
    async fn pending_comes_back_in_creation_order() {
        let store = Store::open_in_memory().await.unwrap();
        let client = ClientId::new();
        let second = queued_insert(client, ts(60));
        let first = queued_insert(client, ts(0));
        let third = queued_insert(client, ts(120));

        for mutation in [&second, &first, &third] {
            store.enqueue_mutation(mutation).await.unwrap();
        }

        let ids: Vec<MutationId> = store
            .list_pending_mutations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let store = Store::open_in_memory().await.unwrap();
        let client = ClientId::new();
        let a = queued_insert(client, ts(0));
        let b = queued_insert(client, ts(0));

        store.enqueue_mutation(&a).await.unwrap();
        store.enqueue_mutation(&b).await.unwrap();

        let ids: Vec<MutationId> = store
            .list_pending_mutations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn attempts_accumulate_until_the_ceiling() {
        let store = Store::open_in_memory().await.unwrap();
        let mutation = queued_insert(ClientId::new(), ts(0));
        store.enqueue_mutation(&mutation).await.unwrap();

        for attempt in 1..MAX_SYNC_ATTEMPTS {
            let status = store
                .bump_mutation_attempts(&mutation.id, "connection reset")
                .await
                .unwrap();
            assert_eq!(status, MutationStatus::Pending, "attempt {attempt}");
        }

        let status = store
            .bump_mutation_attempts(&mutation.id, "connection reset")
            .await
            .unwrap();
        assert_eq!(status, MutationStatus::Failed);
        assert!(store.list_pending_mutations().await.unwrap().is_empty());

        let failed = store.list_failed_mutations().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, MAX_SYNC_ATTEMPTS);
        assert_eq!(failed[0].last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn permanent_failures_skip_the_retry_budget() {
        let store = Store::open_in_memory().await.unwrap();
        let mutation = queued_insert(ClientId::new(), ts(0));
        store.enqueue_mutation(&mutation).await.unwrap();

        store
            .mark_mutation_failed(&mutation.id, "409 duplicate key")
            .await
            .unwrap();

        assert!(store.list_pending_mutations().await.unwrap().is_empty());
        let failed = store.list_failed_mutations().await.unwrap();
        assert_eq!(failed[0].attempts, 1);
    }

    #[tokio::test]
    async fn reset_returns_failed_rows_to_the_queue() {
        let store = Store::open_in_memory().await.unwrap();
        let mutation = queued_insert(ClientId::new(), ts(0));
        store.enqueue_mutation(&mutation).await.unwrap();
        store.mark_mutation_failed(&mutation.id, "boom").await.unwrap();

        assert_eq!(store.reset_failed_mutations().await.unwrap(), 1);

        let pending = store.list_pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 0);
        assert_eq!(pending[0].last_error, None);
    }

    #[tokio::test]
    async fn clear_drops_only_synced_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let client = ClientId::new();
        let done = queued_insert(client, ts(0));
        let waiting = queued_insert(client, ts(1));
        store.enqueue_mutation(&done).await.unwrap();
        store.enqueue_mutation(&waiting).await.unwrap();
        store.mark_mutation_synced(&done.id).await.unwrap();

        assert_eq!(store.clear_synced_mutations().await.unwrap(), 1);
        assert_eq!(store.pending_mutation_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn refresh_rewrites_a_queued_update_in_place() {
        let store = Store::open_in_memory().await.unwrap();
        let client = ClientId::new();
        let record_id = RecordId::placeholder(Collection::Products);
        let mut product = test_product(&record_id);
        let update = queued(
            client,
            Operation::Update,
            record_id.clone(),
            MutationPayload::Product(product.clone()),
            ts(0),
        );
        store.enqueue_mutation(&update).await.unwrap();

        product.quantity = 3;
        let refreshed = store
            .refresh_pending_update(
                Collection::Products,
                &record_id,
                &MutationPayload::Product(product),
            )
            .await
            .unwrap();
        assert!(refreshed);

        let pending = store.list_pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, update.id);
        match &pending[0].payload {
            MutationPayload::Product(p) => assert_eq!(p.quantity, 3),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_without_a_queued_update_reports_false() {
        let store = Store::open_in_memory().await.unwrap();
        let record_id = RecordId::placeholder(Collection::Products);

        let refreshed = store
            .refresh_pending_update(
                Collection::Products,
                &record_id,
                &MutationPayload::Product(test_product(&record_id)),
            )
            .await
            .unwrap();

        assert!(!refreshed);
    }

    #[tokio::test]
    async fn retarget_rewrites_target_and_payload() {
        let store = Store::open_in_memory().await.unwrap();
        let client = ClientId::new();
        let record_id = RecordId::placeholder(Collection::Products);
        let update = queued(
            client,
            Operation::Update,
            record_id.clone(),
            MutationPayload::Product(test_product(&record_id)),
            ts(0),
        );
        store.enqueue_mutation(&update).await.unwrap();

        let server_id = RecordId::new();
        let moved = store
            .retarget_pending_mutations(Collection::Products, &record_id, &server_id)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let pending = store.list_pending_mutations().await.unwrap();
        assert_eq!(pending[0].record_id, server_id);
        assert_eq!(pending[0].payload.record_id(), Some(&server_id));
    }

    #[tokio::test]
    async fn retarget_leaves_synced_rows_alone() {
        let store = Store::open_in_memory().await.unwrap();
        let mutation = queued_insert(ClientId::new(), ts(0));
        store.enqueue_mutation(&mutation).await.unwrap();
        store.mark_mutation_synced(&mutation.id).await.unwrap();

        let moved = store
            .retarget_pending_mutations(
                Collection::Products,
                &mutation.record_id,
                &RecordId::new(),
            )
            .await
            .unwrap();

        assert_eq!(moved, 0);
    }
}
