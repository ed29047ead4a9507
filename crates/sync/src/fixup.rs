//! Post-push repair of references written during the push itself.
//!
//! The reference rewrite inside a push only covers rows that existed
//! when the push started. A sale rung up while the push is in flight
//! can still reference a placeholder that was reidentified moments
//! earlier. This pass sweeps those stragglers after the queue drains.

use tracing::warn;

use duka_core::{Operation, RecordId};
use duka_records::Mutation;
use duka_store::Store;

use crate::error::SyncResult;
use crate::remap::{REFERENCES, RemapTable};

/// Rewrite rows that still reference a remapped placeholder and queue
/// an update for each, so the correction reaches the backend on the
/// next cycle. Returns how many rows were repaired.
pub(crate) async fn fixup_references(store: &Store, remap: &RemapTable) -> SyncResult<usize> {
    let client_id = store.client_id().await?;
    let mut repaired = 0usize;

    for &(child, field, parent) in REFERENCES {
        let pairs: Vec<(RecordId, RecordId)> = remap
            .for_collection(parent)
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();

        for (old, new) in pairs {
            let stragglers = store.referencing_records(child, field, &old).await?;
            if stragglers.is_empty() {
                continue;
            }

            warn!(
                %child,
                field,
                count = stragglers.len(),
                "rewriting references written during the push"
            );
            store.rewrite_reference(child, field, &old, &new).await?;

            for id in stragglers {
                let Some(payload) = store.record_payload(child, &id).await? else {
                    continue;
                };

                // An update may already be queued for this row; refresh
                // it in place rather than queueing a second one.
                if store.refresh_pending_update(child, &id, &payload).await? {
                    repaired += 1;
                    continue;
                }

                match Mutation::new(client_id, child, Operation::Update, id, payload) {
                    Ok(mutation) => {
                        store.enqueue_mutation(&mutation).await?;
                        repaired += 1;
                    }
                    Err(err) => {
                        warn!(error = %err, "could not queue a reference fixup update");
                    }
                }
            }
        }
    }

    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    use duka_core::Collection;
    use duka_records::{MutationPayload, SaleRecord};

    fn ts(seconds: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sale_record(id: &RecordId, product_id: &RecordId) -> SaleRecord {
        SaleRecord {
            id: id.clone(),
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
    async fn stragglers_are_rewritten_and_queued() {
        let store = Store::open_in_memory().await.unwrap();
        let placeholder = RecordId::placeholder(Collection::Products);
        let assigned = RecordId::new();
        let mut remap = RemapTable::new();
        remap.insert(Collection::Products, placeholder.clone(), assigned.clone());

        // A sale written while the push was running, still pointing at
        // the placeholder.
        let sale = sale_record(&RecordId::new(), &placeholder);
        store.upsert_sale(&sale).await.unwrap();

        let repaired = fixup_references(&store, &remap).await.unwrap();
        assert_eq!(repaired, 1);

        let fixed = store.get_sale(&sale.id).await.unwrap().unwrap();
        assert_eq!(fixed.product_id, Some(assigned.clone()));

        let pending = store.list_pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, Operation::Update);
        assert_eq!(pending[0].record_id, sale.id);
        match &pending[0].payload {
            MutationPayload::Sale(s) => assert_eq!(s.product_id, Some(assigned)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn an_already_queued_update_is_refreshed_not_duplicated() {
        let store = Store::open_in_memory().await.unwrap();
        let placeholder = RecordId::placeholder(Collection::Products);
        let assigned = RecordId::new();
        let mut remap = RemapTable::new();
        remap.insert(Collection::Products, placeholder.clone(), assigned.clone());

        let sale = sale_record(&RecordId::new(), &placeholder);
        store.upsert_sale(&sale).await.unwrap();
        let queued = Mutation::new(
            store.client_id().await.unwrap(),
            Collection::Sales,
            Operation::Update,
            sale.id.clone(),
            MutationPayload::Sale(sale.clone()),
        )
        .unwrap();
        store.enqueue_mutation(&queued).await.unwrap();

        let repaired = fixup_references(&store, &remap).await.unwrap();
        assert_eq!(repaired, 1);

        let pending = store.list_pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued.id);
        match &pending[0].payload {
            MutationPayload::Sale(s) => assert_eq!(s.product_id, Some(assigned)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_rows_are_left_alone() {
        let store = Store::open_in_memory().await.unwrap();
        let mut remap = RemapTable::new();
        remap.insert(
            Collection::Products,
            RecordId::placeholder(Collection::Products),
            RecordId::new(),
        );

        let sale = sale_record(&RecordId::new(), &RecordId::new());
        store.upsert_sale(&sale).await.unwrap();

        let repaired = fixup_references(&store, &remap).await.unwrap();

        assert_eq!(repaired, 0);
        assert_eq!(store.pending_mutation_count().await.unwrap(), 0);
        let untouched = store.get_sale(&sale.id).await.unwrap().unwrap();
        assert_eq!(untouched.product_id, sale.product_id);
    }
}
