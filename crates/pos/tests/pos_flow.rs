//! End-to-end flows: app writes through [`Actions`], sync through the
//! engine, against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use duka_core::{Collection, RecordId};
use duka_pos::{Actions, NewProduct, ProductImageSync};
use duka_remote::{InMemoryBackend, InMemoryObjectStore};
use duka_store::Store;
use duka_sync::{SyncEngine, SyncOutcome, SyncSummary};

struct Rig {
    actions: Actions,
    remote: Arc<InMemoryBackend>,
    objects: Arc<InMemoryObjectStore>,
    engine: SyncEngine,
}

async fn rig() -> Rig {
    let store = Store::open_in_memory().await.unwrap();
    let actions = Actions::new(store.clone()).await.unwrap();
    let remote = Arc::new(InMemoryBackend::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let assets = Arc::new(ProductImageSync::new(store.clone(), objects.clone()));
    let engine = SyncEngine::new(store, remote.clone())
        .with_assets(assets)
        .with_min_interval(Duration::ZERO);

    Rig {
        actions,
        remote,
        objects,
        engine,
    }
}

async fn completed(engine: &SyncEngine) -> SyncSummary {
    match engine.full_sync().await.unwrap() {
        SyncOutcome::Completed(summary) => summary,
        SyncOutcome::Skipped(reason) => panic!("cycle skipped: {reason:?}"),
    }
}

fn hair_cream(quantity: i64) -> NewProduct {
    NewProduct {
        name: "Hair Cream".to_string(),
        category: Some("cosmetics".to_string()),
        buying_price: 200,
        selling_price: 500,
        quantity,
        low_stock_level: None,
        image: None,
    }
}

#[tokio::test]
async fn a_days_trading_reaches_the_backend() {
    let rig = rig().await;

    let product = rig.actions.create_product(hair_cream(10)).await.unwrap();
    rig.actions.record_sale(&product.id, 2).await.unwrap();

    let summary = completed(&rig.engine).await;
    // Product insert, product update, sale insert.
    assert_eq!(summary.pushed, 3);
    assert_eq!(summary.push_failed, 0);

    let products = rig.remote.rows(Collection::Products).await;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Hair Cream");
    assert_eq!(products[0]["quantity"], 8);

    let sales = rig.remote.rows(Collection::Sales).await;
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0]["total_price"], 1000);
    // The sale points at the product's server id, not the placeholder.
    assert_eq!(sales[0]["product_id"], products[0]["id"]);

    // Locally nothing is left queued and the ids are final.
    let store = rig.actions.store();
    assert!(store.list_pending_mutations().await.unwrap().is_empty());
    let local = &store.list_products().await.unwrap()[0];
    assert!(!local.id.is_placeholder());
    assert!(local.synced);
}

#[tokio::test]
async fn a_low_stock_alert_lands_linked_to_its_product() {
    let rig = rig().await;

    let product = rig.actions.create_product(hair_cream(8)).await.unwrap();
    // 8 -> 6 crosses the default threshold of 7.
    rig.actions.record_sale(&product.id, 2).await.unwrap();

    let summary = completed(&rig.engine).await;
    assert_eq!(summary.push_failed, 0);

    let products = rig.remote.rows(Collection::Products).await;
    let notifications = rig.remote.rows(Collection::Notifications).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "low-stock");
    assert_eq!(notifications[0]["product_id"], products[0]["id"]);
    assert_eq!(notifications[0]["cleared"], false);

    // Clearing it syncs as an update to the same row.
    let local = rig
        .actions
        .store()
        .list_notifications()
        .await
        .unwrap()
        .remove(0);
    rig.actions.clear_notification(&local.id).await.unwrap();
    completed(&rig.engine).await;

    let notifications = rig.remote.rows(Collection::Notifications).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["cleared"], true);
}

#[tokio::test]
async fn product_images_upload_once_the_row_has_its_server_id() {
    let rig = rig().await;

    let path = std::env::temp_dir().join(format!("duka-flow-{}.png", RecordId::new()));
    tokio::fs::write(&path, b"png bytes").await.unwrap();

    let mut input = hair_cream(10);
    input.image = Some(path.to_string_lossy().into_owned());
    rig.actions.create_product(input).await.unwrap();

    // First cycle pushes the row; assets run after push, so the upload
    // happens in the same cycle, then the queued URL rewrite goes out
    // on the second.
    completed(&rig.engine).await;
    assert_eq!(rig.objects.object_count().await, 1);

    let local = &rig.actions.store().list_products().await.unwrap()[0];
    let url = local.image.clone().unwrap();
    assert!(url.starts_with("memory://products/"), "got {url}");
    assert!(url.ends_with(".png"));

    completed(&rig.engine).await;
    let products = rig.remote.rows(Collection::Products).await;
    assert_eq!(products[0]["image"], url.as_str());

    // Re-running uploads nothing new.
    completed(&rig.engine).await;
    assert_eq!(rig.objects.object_count().await, 1);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn settings_round_trip_by_key() {
    let rig = rig().await;

    rig.actions
        .put_setting("shop_name", serde_json::json!("Mama Duka"))
        .await
        .unwrap();
    completed(&rig.engine).await;

    rig.actions
        .put_setting("shop_name", serde_json::json!("Duka la Mama"))
        .await
        .unwrap();
    completed(&rig.engine).await;

    let settings = rig.remote.rows(Collection::Settings).await;
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0]["key"], "shop_name");
    assert_eq!(settings[0]["value"], serde_json::json!("Duka la Mama"));
}
