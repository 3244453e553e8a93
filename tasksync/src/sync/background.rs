//! Background driver: reacts to reachability transitions and refreshes
//! periodically while everything is in sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::SyncOrchestrator;
use crate::cache::KeyValueStore;
use crate::gateway::RemoteGateway;
use crate::state::SyncStatus;

/// Refresh period used when a zero interval is configured.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the background driver. Dropping it stops the driver.
#[derive(Debug)]
pub struct BackgroundHandle {
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Stop the driver now.
    pub fn stop(self) {
        drop(self);
    }

    /// Whether the driver has exited (its monitor went away).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(super) fn spawn<G: RemoteGateway, S: KeyValueStore>(
    sync: Arc<SyncOrchestrator<G, S>>,
    interval: Duration,
) -> BackgroundHandle {
    let interval = if interval.is_zero() {
        tracing::warn!(fallback = ?FALLBACK_INTERVAL, "zero sync interval, using fallback");
        FALLBACK_INTERVAL
    } else {
        interval
    };
    let task = tokio::spawn(async move {
        let mut reachability = sync.monitor.subscribe();
        sync.state.set_network_online(reachability.current());

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = reachability.changed() => match changed {
                    Some(true) => {
                        sync.state.set_network_online(true);
                        if sync.state.sync_state().status == SyncStatus::Pending {
                            tracing::info!("back online with pending changes, syncing");
                            sync.sync_all().await;
                        }
                    }
                    Some(false) => {
                        tracing::info!("went offline, sync pending");
                        sync.state.set_network_online(false);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let status = sync.state.sync_state().status;
                    if sync.monitor.is_reachable()
                        && status == SyncStatus::Synced
                        && !sync.is_syncing()
                    {
                        tracing::debug!("periodic refresh");
                        sync.sync_all().await;
                    }
                }
            }
        }
        tracing::debug!("background sync driver stopped");
    });
    BackgroundHandle { task }
}
