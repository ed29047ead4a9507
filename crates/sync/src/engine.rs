//! The sync engine: one full cycle, serialized and debounced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use duka_remote::RemoteBackend;
use duka_store::Store;

use crate::assets::AssetSync;
use crate::error::SyncResult;
use crate::fixup::fixup_references;
use crate::pull::pull_all;
use crate::push::push_pending;

/// Cycles starting closer together than this are debounced.
pub const DEFAULT_MIN_SYNC_INTERVAL: Duration = Duration::from_secs(2);

/// Counters from one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Remote rows merged into the store.
    pub pulled: usize,
    /// Malformed remote rows ignored.
    pub pull_skipped: usize,
    /// Mutations accepted by the backend.
    pub pushed: usize,
    /// Mutations whose send failed.
    pub push_failed: usize,
    /// Mutations deferred or settled without a send.
    pub push_skipped: usize,
    /// Rows repaired by the post-push reference fixup.
    pub repaired: usize,
    /// False when the backend tables are not provisioned yet.
    pub schema_ready: bool,
}

/// Why a requested cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle holds the engine right now.
    AlreadyRunning,
    /// The previous cycle started too recently.
    Debounced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncSummary),
    Skipped(SkipReason),
}

/// Runs full sync cycles against one store and one backend.
///
/// At most one cycle runs at a time; callers asking for another while
/// one is in flight are told so rather than queued.
pub struct SyncEngine {
    store: Store,
    remote: Arc<dyn RemoteBackend>,
    assets: Option<Arc<dyn AssetSync>>,
    /// When the last cycle started. Held locked for the whole cycle.
    last_started: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl SyncEngine {
    pub fn new(store: Store, remote: Arc<dyn RemoteBackend>) -> Self {
        Self {
            store,
            remote,
            assets: None,
            last_started: Mutex::new(None),
            min_interval: DEFAULT_MIN_SYNC_INTERVAL,
        }
    }

    /// Attach an asset uploader, run after each push against a
    /// provisioned backend.
    pub fn with_assets(mut self, assets: Arc<dyn AssetSync>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one pull-then-push cycle, unless one is already running or
    /// one started a moment ago.
    ///
    /// The start time is recorded before the cycle runs, so failing
    /// cycles are debounced exactly like successful ones; a flaky
    /// backend is retried on the next trigger, not in a tight loop.
    pub async fn full_sync(&self) -> SyncResult<SyncOutcome> {
        let mut last_started = match self.last_started.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("a sync cycle is already running, skipping");
                return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
            }
        };

        if let Some(started) = *last_started {
            if started.elapsed() < self.min_interval {
                debug!(elapsed = ?started.elapsed(), "last cycle started moments ago, debounced");
                return Ok(SyncOutcome::Skipped(SkipReason::Debounced));
            }
        }
        *last_started = Some(Instant::now());

        let summary = self.cycle().await?;
        info!(
            pulled = summary.pulled,
            pushed = summary.pushed,
            failed = summary.push_failed,
            schema_ready = summary.schema_ready,
            "sync cycle complete"
        );
        Ok(SyncOutcome::Completed(summary))
    }

    async fn cycle(&self) -> SyncResult<SyncSummary> {
        let pull = pull_all(&self.store, self.remote.as_ref()).await?;
        let push = push_pending(&self.store, self.remote.as_ref()).await?;

        if push.schema_ready {
            if let Some(assets) = &self.assets {
                if let Err(err) = assets.sync_assets().await {
                    warn!(error = %err, "asset sync failed, continuing");
                }
            }
        }

        let mut repaired = 0;
        if !push.remap.is_empty() {
            repaired = fixup_references(&self.store, &push.remap).await?;
        }

        // The stamp means "this device has seen the full server state
        // and drained what it could". A partial pull or an unprovisioned
        // backend does not qualify.
        if push.schema_ready && pull.failed_collections == 0 {
            self.store.set_last_full_sync_at(Utc::now()).await?;
        }

        Ok(SyncSummary {
            pulled: pull.merged,
            pull_skipped: pull.skipped,
            pushed: push.pushed,
            push_failed: push.failed,
            push_skipped: push.skipped,
            repaired,
            schema_ready: push.schema_ready,
        })
    }
}
