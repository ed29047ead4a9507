//! Connectivity tracking and sync scheduling.
//!
//! The watcher owns the long-running loop: it listens to the host's
//! network hint, verifies it against the backend, reacts to local
//! writes, and keeps a periodic tick as a safety net. Sync itself is
//! always one call into the engine, which serializes and debounces.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use duka_remote::RemoteBackend;

use crate::engine::{SyncEngine, SyncOutcome};

/// What the watcher currently believes about the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// The host reports no network, or the last probe failed.
    Offline,
    /// The host reports network; a probe is confirming it.
    Verifying,
    /// The backend answered a probe.
    Online,
}

/// Pause between the two reachability probes of one verification.
const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default period of the background sync tick.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Drives the sync engine from connectivity changes, local writes and a
/// periodic tick.
pub struct ConnectivityWatcher {
    engine: Arc<SyncEngine>,
    remote: Arc<dyn RemoteBackend>,
    host_online: watch::Receiver<bool>,
    state_tx: watch::Sender<ConnectivityState>,
    shutdown: Arc<Notify>,
    sync_interval: Duration,
}

impl ConnectivityWatcher {
    /// `host_online` is the host's own network signal, whatever form it
    /// takes upstream. The watcher treats it as a hint and verifies
    /// against the backend before trusting it.
    pub fn new(
        engine: Arc<SyncEngine>,
        remote: Arc<dyn RemoteBackend>,
        host_online: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Offline);
        Self {
            engine,
            remote,
            host_online,
            state_tx,
            shutdown: Arc::new(Notify::new()),
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }

    /// Current state plus every transition after it.
    pub fn state(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// Handle for stopping the watcher once `start` has consumed it.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Spawn the watch loop.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!("connectivity watcher started");

        let shutdown = self.shutdown.clone();
        let mut host = self.host_online.clone();
        let mut changes = self.engine.store().subscribe();
        let mut ticker = tokio::time::interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the startup check below
        // already covers it.
        ticker.tick().await;

        if *host.borrow() {
            self.verify_and_sync().await;
        } else {
            debug!("host reports offline at startup");
        }

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,

                changed = host.changed() => {
                    if changed.is_err() {
                        // The host dropped its side of the signal; the
                        // app is tearing down.
                        break;
                    }
                    if *host.borrow_and_update() {
                        self.verify_and_sync().await;
                    } else {
                        self.set_state(ConnectivityState::Offline);
                    }
                }

                event = changes.recv() => {
                    match event {
                        Ok(_) => {
                            if self.current() == ConnectivityState::Online {
                                self.try_sync().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // Sync reads the store directly, so missed
                            // events cost nothing.
                            debug!(missed, "change events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = ticker.tick() => {
                    match self.current() {
                        ConnectivityState::Online => self.try_sync().await,
                        _ if *host.borrow() => self.verify_and_sync().await,
                        _ => {}
                    }
                }
            }
        }

        info!("connectivity watcher stopped");
    }

    /// Probe the backend and, if it answers, sync.
    async fn verify_and_sync(&self) {
        self.set_state(ConnectivityState::Verifying);
        if self.probe_with_retry().await {
            self.set_state(ConnectivityState::Online);
            self.try_sync().await;
        } else {
            self.set_state(ConnectivityState::Offline);
        }
    }

    /// One probe, and on failure one more after a short pause. Wi-Fi
    /// coming back up routinely drops the first packet.
    async fn probe_with_retry(&self) -> bool {
        if self.remote.reachable().await {
            return true;
        }
        tokio::time::sleep(PROBE_RETRY_DELAY).await;
        self.remote.reachable().await
    }

    async fn try_sync(&self) {
        match self.engine.full_sync().await {
            Ok(SyncOutcome::Completed(summary)) => {
                debug!(pulled = summary.pulled, pushed = summary.pushed, "sync ran");
            }
            Ok(SyncOutcome::Skipped(reason)) => {
                debug!(?reason, "sync skipped");
            }
            Err(err) => {
                warn!(error = %err, "sync cycle failed");
                // A failed cycle may mean the connection is gone again;
                // check rather than staying optimistically online.
                if err.is_transient() && !self.remote.reachable().await {
                    self.set_state(ConnectivityState::Offline);
                }
            }
        }
    }

    fn current(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectivityState) {
        if self.current() != state {
            info!(?state, "connectivity changed");
            let _ = self.state_tx.send(state);
        }
    }
}
