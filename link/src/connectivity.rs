//! Network connectivity observation.
//!
//! Before each connect attempt the supervisor asks the observer whether the
//! device is online and, if not, suspends until it reports online again.

use std::sync::Arc;
use tokio::sync::watch;

/// Reports the current online/offline status.
pub trait ConnectivityObserver: Send + Sync + 'static {
    /// Current status.
    fn is_connected(&self) -> bool;

    /// Status updates; the receiver's current value is the latest status.
    fn observe(&self) -> watch::Receiver<bool>;
}

/// Observer for environments without connectivity reporting. Always online.
#[derive(Debug, Clone)]
pub struct AlwaysOnline {
    rx: watch::Receiver<bool>,
    _tx: Arc<watch::Sender<bool>>,
}

impl AlwaysOnline {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(true);
        Self { rx, _tx: Arc::new(tx) }
    }
}

impl Default for AlwaysOnline {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityObserver for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }

    fn observe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

/// Connectivity observer fed by the application (or a platform hook).
///
/// ```rust
/// use realtime_link::NetworkMonitor;
///
/// let monitor = NetworkMonitor::new(true);
/// monitor.set_online(false);
/// assert!(!monitor.is_online());
/// ```
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a status change. Repeating the current status is a no-op.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                log::debug!("[realtime-link] Connectivity changed: online={}", online);
                *current = online;
                true
            }
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ConnectivityObserver for NetworkMonitor {
    fn is_connected(&self) -> bool {
        self.is_online()
    }

    fn observe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Suspend until `observer` reports online.
///
/// Returns immediately when already online. If the observer's sender goes
/// away while offline, returns as well so the caller can make one attempt.
pub async fn wait_until_online(observer: &dyn ConnectivityObserver) {
    if observer.is_connected() {
        return;
    }
    let mut rx = observer.observe();
    if rx.wait_for(|online| *online).await.is_err() {
        log::debug!("[realtime-link] Connectivity observer dropped while offline");
    }
}
