use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use duka_pos::{Config, ProductImageSync, identity};
use duka_remote::{PostgrestClient, RemoteBackend, StorageClient};
use duka_store::Store;
use duka_sync::{ConnectivityWatcher, SyncEngine, SyncOutcome};

#[tokio::main]
async fn main() {
    duka_observability::init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.database_path.display(),
        url = %config.supabase_url,
        "starting duka"
    );

    // The identity file outlives the database, so reinstalls that keep
    // the data directory keep their client id.
    let data_dir = config.database_path.parent().unwrap_or(Path::new("."));
    let client_id = identity::load_or_create(data_dir)
        .await
        .expect("failed to read the client identity");

    let store = Store::open(&config.database_path)
        .await
        .expect("failed to open the local database");
    store
        .set_client_id(client_id)
        .await
        .expect("failed to record the client identity");

    let remote: Arc<dyn RemoteBackend> = Arc::new(
        PostgrestClient::new(&config.supabase_url, &config.supabase_key)
            .expect("failed to build the backend client"),
    );
    let objects = Arc::new(
        StorageClient::new(
            &config.supabase_url,
            &config.supabase_key,
            &config.storage_bucket,
        )
        .expect("failed to build the storage client"),
    );
    let assets = Arc::new(ProductImageSync::new(store.clone(), objects));
    let engine = Arc::new(
        SyncEngine::new(store.clone(), remote.clone())
            .with_assets(assets)
            .with_min_interval(config.debounce),
    );

    match std::env::args().nth(1).as_deref() {
        // One cycle, then exit. Handy under cron and when debugging.
        Some("sync") => match engine.full_sync().await {
            Ok(SyncOutcome::Completed(summary)) => {
                tracing::info!(
                    pulled = summary.pulled,
                    pushed = summary.pushed,
                    failed = summary.push_failed,
                    "sync finished"
                );
            }
            Ok(SyncOutcome::Skipped(reason)) => {
                tracing::warn!(?reason, "sync skipped");
            }
            Err(err) => {
                tracing::error!(error = %err, "sync failed");
                std::process::exit(1);
            }
        },
        // Return failed mutations to the queue once the operator has
        // fixed whatever the backend rejected.
        Some("retry-failed") => {
            let reset = store
                .reset_failed_mutations()
                .await
                .expect("failed to reset the queue");
            tracing::info!(reset, "failed mutations returned to the queue");
        }
        Some(other) => {
            eprintln!("unknown command '{other}' (expected: sync, retry-failed)");
            std::process::exit(2);
        }
        None => run_watcher(engine, remote, &config).await,
    }
}

/// Run the connectivity watcher until ctrl-c.
async fn run_watcher(engine: Arc<SyncEngine>, remote: Arc<dyn RemoteBackend>, config: &Config) {
    // A headless process has no OS network signal to subscribe to.
    // Start optimistic and let the reachability probe sort it out.
    let (_host_tx, host_rx) = watch::channel(true);

    let watcher = ConnectivityWatcher::new(engine, remote, host_rx)
        .with_sync_interval(config.sync_interval);
    let shutdown = watcher.shutdown_handle();
    let handle = watcher.start();

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    shutdown.notify_one();
    let _ = handle.await;
}
