//! Subscription registry.
//!
//! Process-wide map from [`SubscriptionHandle`] to the channel names that
//! subscription asked for. Every mutation recomputes the required channel set
//! (the union of all lists) and, when it differs from the last one announced,
//! queues a [`RequiredSetChange`] for the connection supervisor. The mutation,
//! the comparison and the enqueue all happen under one lock, so two concurrent
//! subscribe/unsubscribe calls can never announce changes out of order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::models::ChannelSet;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Mint a new handle.
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A change of the required channel set, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSetChange {
    /// The new required set
    pub required: ChannelSet,
    /// `true` when produced by a deregistration; the supervisor debounces
    /// these before reconnecting.
    pub shrinking: bool,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<SubscriptionHandle, Vec<String>>,
    /// Last required set handed to the supervisor.
    announced: ChannelSet,
}

impl RegistryState {
    fn required(&self) -> ChannelSet {
        let mut set = ChannelSet::new();
        for channels in self.entries.values() {
            set.extend_from(channels);
        }
        set
    }
}

/// Lock-guarded registry of active subscriptions.
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    changes_tx: mpsc::UnboundedSender<RequiredSetChange>,
}

impl SubscriptionRegistry {
    /// Create a registry that announces required-set changes on `changes_tx`.
    pub fn new(changes_tx: mpsc::UnboundedSender<RequiredSetChange>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            changes_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the channel list of `handle` and return the new
    /// required set.
    pub fn register(&self, handle: SubscriptionHandle, channels: Vec<String>) -> ChannelSet {
        let mut state = self.lock();
        log::debug!("[realtime-link] Registering {} for {:?}", handle, channels);
        state.entries.insert(handle, channels);
        self.announce(&mut state, false)
    }

    /// Remove `handle` and return the new required set. Unknown handles are
    /// ignored.
    pub fn deregister(&self, handle: SubscriptionHandle) -> ChannelSet {
        let mut state = self.lock();
        if state.entries.remove(&handle).is_some() {
            log::debug!("[realtime-link] Deregistered {}", handle);
        }
        self.announce(&mut state, true)
    }

    /// Current required set.
    pub fn required(&self) -> ChannelSet {
        self.lock().required()
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: SubscriptionHandle) -> bool {
        self.lock().entries.contains_key(&handle)
    }

    /// Recompute the required set and enqueue it if it differs from the last
    /// announced one. Must be called with the lock held.
    fn announce(&self, state: &mut RegistryState, shrinking: bool) -> ChannelSet {
        let required = state.required();
        if required != state.announced {
            state.announced = required.clone();
            let change = RequiredSetChange {
                required: required.clone(),
                shrinking,
            };
            if self.changes_tx.send(change).is_err() {
                log::debug!("[realtime-link] Supervisor gone; required set {} not announced", required);
            }
        }
        required
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("handles", &state.entries.len())
            .field("announced", &state.announced)
            .finish()
    }
}
