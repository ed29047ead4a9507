//! Application-level write operations.
//!
//! Every write lands in the local store and the mutation queue in the
//! same call, so the app never waits for the network and the sync
//! layer always finds a queue that matches the data.

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use duka_core::{ClientId, Collection, DomainError, Operation, RecordId};
use duka_records::{
    DEFAULT_LOW_STOCK_LEVEL, Mutation, MutationPayload, NotificationKind, NotificationRecord,
    ProductRecord, SaleRecord, SettingRecord, StockLevel,
};
use duka_store::{Store, StoreResult};

/// Input for [`Actions::create_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub buying_price: i64,
    pub selling_price: i64,
    pub quantity: i64,
    /// Defaults to [`DEFAULT_LOW_STOCK_LEVEL`] when unset.
    pub low_stock_level: Option<i64>,
    /// Local file path of the product photo; the asset sync uploads it
    /// and rewrites this to the public URL.
    pub image: Option<String>,
}

/// The write API of the app.
#[derive(Debug, Clone)]
pub struct Actions {
    store: Store,
    client_id: ClientId,
}

impl Actions {
    pub async fn new(store: Store) -> StoreResult<Self> {
        let client_id = store.client_id().await?;
        Ok(Self { store, client_id })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Add a product to the catalog under a placeholder id.
    pub async fn create_product(&self, input: NewProduct) -> StoreResult<ProductRecord> {
        let now = Utc::now();
        let product = ProductRecord {
            id: RecordId::placeholder(Collection::Products),
            name: input.name,
            category: input.category,
            buying_price: input.buying_price,
            selling_price: input.selling_price,
            quantity: input.quantity,
            low_stock_level: input.low_stock_level.unwrap_or(DEFAULT_LOW_STOCK_LEVEL),
            image: input.image,
            created_at: now,
            updated_at: now,
            synced: false,
            last_synced_at: None,
        };
        product.validate()?;

        self.store.upsert_product(&product).await?;
        self.enqueue(
            Collection::Products,
            Operation::Insert,
            product.id.clone(),
            MutationPayload::Product(product.clone()),
        )
        .await?;
        self.raise_low_stock(&product).await?;

        info!(product = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    /// Save edits to an existing product.
    pub async fn update_product(&self, mut product: ProductRecord) -> StoreResult<ProductRecord> {
        if self.store.get_product(&product.id).await?.is_none() {
            return Err(DomainError::not_found().into());
        }
        product.validate()?;
        product.updated_at = Utc::now();
        product.synced = false;

        self.store.upsert_product(&product).await?;
        self.queue_update(
            Collection::Products,
            &product.id,
            MutationPayload::Product(product.clone()),
        )
        .await?;
        self.raise_low_stock(&product).await?;

        Ok(product)
    }

    /// Add received stock to a product.
    pub async fn restock(&self, id: &RecordId, received: i64) -> StoreResult<ProductRecord> {
        if received <= 0 {
            return Err(DomainError::validation("restock quantity must be positive").into());
        }
        let mut product = self
            .store
            .get_product(id)
            .await?
            .ok_or(DomainError::not_found())?;

        product.quantity += received;
        product.updated_at = Utc::now();
        product.synced = false;

        self.store.upsert_product(&product).await?;
        self.queue_update(
            Collection::Products,
            id,
            MutationPayload::Product(product.clone()),
        )
        .await?;

        info!(product = %id, received, quantity = product.quantity, "stock received");
        Ok(product)
    }

    /// Ring up a sale: decrement stock, record the sale at today's
    /// selling price, and raise a low-stock notification when the sale
    /// crosses the threshold.
    pub async fn record_sale(&self, product_id: &RecordId, quantity: i64) -> StoreResult<SaleRecord> {
        if quantity <= 0 {
            return Err(DomainError::validation("sale quantity must be positive").into());
        }
        let mut product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(DomainError::not_found())?;
        if quantity > product.quantity {
            return Err(DomainError::invariant(format!(
                "cannot sell {quantity} of '{}', only {} in stock",
                product.name, product.quantity
            ))
            .into());
        }

        let now = Utc::now();
        product.quantity -= quantity;
        product.updated_at = now;
        product.synced = false;
        self.store.upsert_product(&product).await?;
        self.queue_update(
            Collection::Products,
            product_id,
            MutationPayload::Product(product.clone()),
        )
        .await?;

        let sale = SaleRecord {
            id: RecordId::placeholder(Collection::Sales),
            product_id: Some(product.id.clone()),
            product_name: product.name.clone(),
            quantity,
            unit_price: product.selling_price,
            total_price: product.selling_price * quantity,
            sale_date: now,
            created_at: now,
            synced: false,
            last_synced_at: None,
        };
        self.store.upsert_sale(&sale).await?;
        self.enqueue(
            Collection::Sales,
            Operation::Insert,
            sale.id.clone(),
            MutationPayload::Sale(sale.clone()),
        )
        .await?;

        self.raise_low_stock(&product).await?;

        info!(
            sale = %sale.id,
            product = %product.name,
            quantity,
            total = sale.total_price,
            "sale recorded"
        );
        Ok(sale)
    }

    /// Delete a product locally and queue the remote delete.
    ///
    /// Sales keep their `product_name` snapshot, so sale history stays
    /// readable after the product is gone.
    pub async fn delete_product(&self, id: &RecordId) -> StoreResult<()> {
        if !self.store.delete_product(id).await? {
            return Err(DomainError::not_found().into());
        }
        self.enqueue(
            Collection::Products,
            Operation::Delete,
            id.clone(),
            MutationPayload::Delete,
        )
        .await?;

        info!(product = %id, "product deleted");
        Ok(())
    }

    /// Mark a notification as handled. This is an update, not a delete:
    /// other devices converge on the cleared state through sync.
    pub async fn clear_notification(&self, id: &RecordId) -> StoreResult<NotificationRecord> {
        let mut notification = self
            .store
            .get_notification(id)
            .await?
            .ok_or(DomainError::not_found())?;
        if notification.cleared {
            return Ok(notification);
        }

        notification.cleared = true;
        notification.synced = false;
        self.store.upsert_notification(&notification).await?;
        self.queue_update(
            Collection::Notifications,
            id,
            MutationPayload::Notification(notification.clone()),
        )
        .await?;

        Ok(notification)
    }

    /// Create or update the setting stored under `key`.
    pub async fn put_setting(&self, key: &str, value: Value) -> StoreResult<SettingRecord> {
        let now = Utc::now();
        match self.store.get_setting_by_key(key).await? {
            Some(mut setting) => {
                setting.value = value;
                setting.updated_at = now;
                setting.synced = false;
                self.store.upsert_setting(&setting).await?;

                let id = setting.id.clone();
                self.queue_update(
                    Collection::Settings,
                    &id,
                    MutationPayload::Setting(setting.clone()),
                )
                .await?;
                Ok(setting)
            }
            None => {
                let setting = SettingRecord {
                    id: RecordId::placeholder(Collection::Settings),
                    key: key.to_string(),
                    value,
                    created_at: now,
                    updated_at: now,
                    synced: false,
                    last_synced_at: None,
                };
                setting.validate()?;
                self.store.upsert_setting(&setting).await?;
                self.enqueue(
                    Collection::Settings,
                    Operation::Insert,
                    setting.id.clone(),
                    MutationPayload::Setting(setting.clone()),
                )
                .await?;
                Ok(setting)
            }
        }
    }

    async fn enqueue(
        &self,
        collection: Collection,
        op: Operation,
        record_id: RecordId,
        payload: MutationPayload,
    ) -> StoreResult<()> {
        let mutation = Mutation::new(self.client_id, collection, op, record_id, payload)?;
        self.store.enqueue_mutation(&mutation).await
    }

    /// Queue an update, folding it into an already-pending update for
    /// the same record. Selling the same product forty times offline
    /// leaves one queued update, not forty.
    async fn queue_update(
        &self,
        collection: Collection,
        record_id: &RecordId,
        payload: MutationPayload,
    ) -> StoreResult<()> {
        if self
            .store
            .refresh_pending_update(collection, record_id, &payload)
            .await?
        {
            return Ok(());
        }
        self.enqueue(collection, Operation::Update, record_id.clone(), payload)
            .await
    }

    /// Raise a low-stock notification unless an uncleared one is
    /// already open for this product.
    async fn raise_low_stock(&self, product: &ProductRecord) -> StoreResult<()> {
        if product.stock_level() == StockLevel::InStock {
            return Ok(());
        }
        if self.store.has_uncleared_low_stock(&product.id).await? {
            return Ok(());
        }

        let message = match product.stock_level() {
            StockLevel::OutOfStock => format!("{} is out of stock", product.name),
            _ => format!(
                "{} is low on stock ({} left, threshold {})",
                product.name, product.quantity, product.low_stock_level
            ),
        };
        let notification = NotificationRecord {
            id: RecordId::placeholder(Collection::Notifications),
            kind: NotificationKind::LowStock,
            message,
            product_id: Some(product.id.clone()),
            created_at: Utc::now(),
            cleared: false,
            synced: false,
            last_synced_at: None,
        };
        self.store.upsert_notification(&notification).await?;
        self.enqueue(
            Collection::Notifications,
            Operation::Insert,
            notification.id.clone(),
            MutationPayload::Notification(notification),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_records::MutationStatus;
    use duka_store::StoreError;
    use serde_json::json;

    async fn actions() -> Actions {
        let store = Store::open_in_memory().await.unwrap();
        Actions::new(store).await.unwrap()
    }

    fn new_product(name: &str, quantity: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category: Some("toiletries".to_string()),
            buying_price: 300,
            selling_price: 500,
            quantity,
            low_stock_level: None,
            image: None,
        }
    }

    async fn pending_ops(actions: &Actions) -> Vec<(Collection, Operation)> {
        actions
            .store()
            .list_pending_mutations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.collection, m.op))
            .collect()
    }

    #[tokio::test]
    async fn creating_a_product_queues_one_insert() {
        let actions = actions().await;

        let product = actions.create_product(new_product("Soap", 20)).await.unwrap();

        assert!(product.id.is_placeholder());
        assert_eq!(
            pending_ops(&actions).await,
            vec![(Collection::Products, Operation::Insert)]
        );

        let stored = actions.store().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.low_stock_level, DEFAULT_LOW_STOCK_LEVEL);
        assert!(!stored.synced);
    }

    #[tokio::test]
    async fn a_sale_decrements_stock_and_queues_both_sides() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 20)).await.unwrap();

        let sale = actions.record_sale(&product.id, 3).await.unwrap();

        assert_eq!(sale.quantity, 3);
        assert_eq!(sale.unit_price, 500);
        assert_eq!(sale.total_price, 1500);
        assert_eq!(sale.product_id.as_ref(), Some(&product.id));
        assert_eq!(sale.product_name, "Soap");

        let stored = actions.store().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 17);

        assert_eq!(
            pending_ops(&actions).await,
            vec![
                (Collection::Products, Operation::Insert),
                (Collection::Products, Operation::Update),
                (Collection::Sales, Operation::Insert),
            ]
        );
    }

    #[tokio::test]
    async fn repeat_sales_fold_into_one_queued_update() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 20)).await.unwrap();

        actions.record_sale(&product.id, 2).await.unwrap();
        actions.record_sale(&product.id, 5).await.unwrap();

        let ops = pending_ops(&actions).await;
        let updates = ops
            .iter()
            .filter(|(_, op)| *op == Operation::Update)
            .count();
        assert_eq!(updates, 1, "sales fold into a single product update");
        // Each sale is still its own insert.
        let sale_inserts = ops
            .iter()
            .filter(|(c, op)| *c == Collection::Sales && *op == Operation::Insert)
            .count();
        assert_eq!(sale_inserts, 2);

        // The folded update carries the latest quantity.
        let pending = actions.store().list_pending_mutations().await.unwrap();
        let update = pending
            .iter()
            .find(|m| m.op == Operation::Update)
            .unwrap();
        match &update.payload {
            MutationPayload::Product(p) => assert_eq!(p.quantity, 13),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn overselling_is_rejected_and_changes_nothing() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 8)).await.unwrap();

        let err = actions.record_sale(&product.id, 9).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(_)));

        let stored = actions.store().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 8);
        assert_eq!(actions.store().list_sales().await.unwrap().len(), 0);
        assert_eq!(pending_ops(&actions).await.len(), 1, "only the create is queued");
    }

    #[tokio::test]
    async fn crossing_the_threshold_raises_one_notification() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 9)).await.unwrap();
        assert_eq!(actions.store().list_notifications().await.unwrap().len(), 0);

        // 9 -> 6 crosses the default threshold of 7.
        actions.record_sale(&product.id, 3).await.unwrap();
        let notifications = actions.store().list_notifications().await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::LowStock);
        assert_eq!(notifications[0].product_id.as_ref(), Some(&product.id));
        assert!(notifications[0].message.contains("Soap"));

        // Further sales do not pile on while it stays uncleared.
        actions.record_sale(&product.id, 1).await.unwrap();
        assert_eq!(actions.store().list_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn creating_at_or_below_the_threshold_raises_immediately() {
        let actions = actions().await;

        actions.create_product(new_product("Soap", 5)).await.unwrap();

        let notifications = actions.store().list_notifications().await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].message.contains("low on stock"));
    }

    #[tokio::test]
    async fn clearing_reopens_the_low_stock_alarm() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 8)).await.unwrap();

        actions.record_sale(&product.id, 2).await.unwrap();
        let first = &actions.store().list_notifications().await.unwrap()[0];
        let cleared = actions.clear_notification(&first.id).await.unwrap();
        assert!(cleared.cleared);

        // Still below threshold, so the next sale raises a fresh one.
        actions.record_sale(&product.id, 1).await.unwrap();
        let notifications = actions.store().list_notifications().await.unwrap();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications.iter().filter(|n| !n.cleared).count(), 1);
    }

    #[tokio::test]
    async fn selling_out_names_the_outage() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 8)).await.unwrap();

        actions.record_sale(&product.id, 8).await.unwrap();

        let notifications = actions.store().list_notifications().await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].message, "Soap is out of stock");
    }

    #[tokio::test]
    async fn restock_rejects_non_positive_amounts() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 2)).await.unwrap();

        assert!(actions.restock(&product.id, 0).await.is_err());
        assert!(actions.restock(&product.id, -3).await.is_err());

        let restocked = actions.restock(&product.id, 10).await.unwrap();
        assert_eq!(restocked.quantity, 12);
    }

    #[tokio::test]
    async fn deleting_a_missing_product_is_not_found() {
        let actions = actions().await;
        let id = RecordId::placeholder(Collection::Products);

        let err = actions.delete_product(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(_)));
    }

    #[tokio::test]
    async fn deleting_keeps_sale_history_readable() {
        let actions = actions().await;
        let product = actions.create_product(new_product("Soap", 20)).await.unwrap();
        actions.record_sale(&product.id, 2).await.unwrap();

        actions.delete_product(&product.id).await.unwrap();

        assert!(actions.store().get_product(&product.id).await.unwrap().is_none());
        let sales = actions.store().list_sales().await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].product_name, "Soap");
    }

    #[tokio::test]
    async fn put_setting_updates_in_place() {
        let actions = actions().await;

        let created = actions
            .put_setting("currency", json!("KES"))
            .await
            .unwrap();
        let updated = actions
            .put_setting("currency", json!("TZS"))
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.value, json!("TZS"));
        assert_eq!(actions.store().list_settings().await.unwrap().len(), 1);

        // Insert then update folds into two queue entries, not three.
        assert_eq!(
            pending_ops(&actions).await,
            vec![
                (Collection::Settings, Operation::Insert),
                (Collection::Settings, Operation::Update),
            ]
        );
    }

    #[tokio::test]
    async fn queued_mutations_start_pending_with_no_attempts() {
        let actions = actions().await;
        actions.create_product(new_product("Soap", 20)).await.unwrap();

        let pending = actions.store().list_pending_mutations().await.unwrap();
        assert_eq!(pending[0].status, MutationStatus::Pending);
        assert_eq!(pending[0].attempts, 0);
    }
}
