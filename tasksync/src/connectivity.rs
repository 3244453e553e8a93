//! Connectivity monitor: publishes whether the backend is currently reachable.
//!
//! The monitor is the single writer of a tokio `watch` channel; any number of
//! [`Subscription`]s read from it. Transitions are published only when the
//! value actually changes, so subscribers never see duplicate notifications.
//!
//! Reachability comes either from a [`ReachabilityProbe`] polled on an
//! interval ([`ConnectivityMonitor::start`]) or from push-style reports
//! ([`ConnectivityMonitor::report`]), e.g. a platform network callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A single reachability check.
///
/// Probes never fail: anything that goes wrong means "unreachable".
pub trait ReachabilityProbe: Send + Sync + 'static {
    /// Returns `true` if the backend can currently be reached.
    fn probe(&self) -> impl std::future::Future<Output = bool> + Send;
}

/// Probe that opens a TCP connection to the backend host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `addr` (`host:port`), giving up after `timeout`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// Probe the host and port of a backend base URL.
    ///
    /// Returns `None` if the URL has no host or no known port.
    #[must_use]
    pub fn for_url(url: &url::Url, timeout: Duration) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(format!("{host}:{port}"), timeout))
    }

    /// The `host:port` being probed.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl ReachabilityProbe for TcpProbe {
    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.addr)).await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::trace!(addr = %self.addr, error = %e, "probe connect failed");
                false
            }
            Err(_) => {
                tracing::trace!(addr = %self.addr, "probe timed out");
                false
            }
        }
    }
}

/// Probe whose answer is set by hand. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ManualProbe {
    reachable: Arc<AtomicBool>,
}

impl ManualProbe {
    /// Create a probe that initially answers `reachable`.
    #[must_use]
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(reachable)),
        }
    }

    /// Change the answer of subsequent probes.
    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl ReachabilityProbe for ManualProbe {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Probe period used when a zero interval is requested.
const FALLBACK_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Owner of the reachability state.
///
/// Dropping the monitor stops its poller and ends every subscription.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    poller: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Probe once to establish the initial state, then re-probe every
    /// `interval` in a background task.
    pub async fn start<P: ReachabilityProbe>(probe: P, interval: Duration) -> Self {
        let initial = probe.probe().await;
        tracing::info!(reachable = initial, "connectivity monitor started");

        let interval = if interval.is_zero() {
            tracing::warn!(
                fallback = ?FALLBACK_PROBE_INTERVAL,
                "zero probe interval, using fallback"
            );
            FALLBACK_PROBE_INTERVAL
        } else {
            interval
        };

        let state = Arc::new(watch::Sender::new(initial));
        let writer = Arc::clone(&state);
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial probe covered it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reachable = probe.probe().await;
                publish(&writer, reachable);
            }
        });

        Self {
            state,
            poller: Some(poller),
        }
    }

    /// A monitor without a poller, driven only by [`report`](Self::report).
    #[must_use]
    pub fn manual(initial: bool) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(initial)),
            poller: None,
        }
    }

    /// Push a reachability observation. Repeating the current value is a no-op.
    pub fn report(&self, reachable: bool) {
        publish(&self.state, reachable);
    }

    /// Current reachability.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    /// Subscribe to reachability transitions.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let mut rx = self.state.subscribe();
        let last = *rx.borrow_and_update();
        Subscription { rx, last }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

fn publish(state: &watch::Sender<bool>, reachable: bool) {
    let changed = state.send_if_modified(|current| {
        if *current == reachable {
            false
        } else {
            *current = reachable;
            true
        }
    });
    if changed {
        tracing::info!(reachable, "connectivity changed");
    }
}

/// Handle yielding reachability transitions. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<bool>,
    last: bool,
}

impl Subscription {
    /// The value seen by the last call to [`changed`](Self::changed), or the
    /// state at subscription time.
    #[must_use]
    pub const fn current(&self) -> bool {
        self.last
    }

    /// Wait for the next transition and return the new reachability.
    ///
    /// Returns `None` once the monitor has been dropped.
    pub async fn changed(&mut self) -> Option<bool> {
        loop {
            self.rx.changed().await.ok()?;
            let value = *self.rx.borrow_and_update();
            // Flips in quick succession can coalesce back to the old value.
            if value != self.last {
                self.last = value;
                return Some(value);
            }
        }
    }
}
