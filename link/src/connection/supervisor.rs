//! Connection supervisor.
//!
//! A single background task consumes required-set changes from the
//! [`SubscriptionRegistry`](crate::registry::SubscriptionRegistry) and keeps at
//! most one connection generation alive:
//!
//! - A growing set is reconciled immediately.
//! - A shrinking set is reconciled after `unsubscribe_debounce`; if another
//!   change arrives first, only the latest set is used.
//! - Reconciling with the set the live generation was opened for is a no-op.
//! - Otherwise generation N is cancelled and awaited (which closes its
//!   connection) before generation N+1 is spawned.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;

use super::{session, ConnectionState, SessionContext, StopReason, FAR_FUTURE};
use crate::models::ChannelSet;
use crate::registry::RequiredSetChange;

/// Handle to the supervisor task.
pub(crate) struct ConnectionSupervisor {
    shutdown: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor task. Must be called inside a tokio runtime.
    pub fn spawn(
        ctx: Arc<SessionContext>,
        changes_rx: mpsc::UnboundedReceiver<RequiredSetChange>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let state_rx = ctx.state_tx.subscribe();
        let task = tokio::spawn(supervise(ctx, changes_rx, shutdown.clone()));

        Self {
            shutdown,
            state_rx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the supervisor and wait until the live connection is closed.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("[realtime-link] Supervisor task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the supervisor shuts down; subscriber streams end
    /// when it fires.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The generation currently allowed to own the live connection.
struct ActiveGeneration {
    generation: u64,
    channels: ChannelSet,
    cancel: CancellationToken,
    stop_reason: Arc<OnceLock<StopReason>>,
    task: JoinHandle<()>,
}

struct Reconciler {
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    active: Option<ActiveGeneration>,
    next_generation: u64,
}

impl Reconciler {
    async fn reconcile(&mut self, required: ChannelSet) {
        if let Some(current) = &self.active {
            if current.task.is_finished() {
                log::debug!(
                    "[realtime-link] Generation {} already ended; starting fresh",
                    current.generation
                );
            } else if current.channels == required {
                log::debug!(
                    "[realtime-link] Required set {} unchanged; keeping generation {}",
                    required,
                    current.generation
                );
                return;
            }
        }

        if let Some(previous) = self.active.take() {
            let reason = if required.is_empty() {
                StopReason::NoChannels
            } else {
                StopReason::ChannelsChanged
            };
            stop_generation(previous, reason).await;
        }

        if required.is_empty() {
            log::info!("[realtime-link] No channels required; connection idle");
            self.ctx.set_state(ConnectionState::Idle);
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let cancel = self.shutdown.child_token();
        let stop_reason = Arc::new(OnceLock::new());
        log::debug!(
            "[realtime-link] Starting generation {} for {}",
            generation,
            required
        );
        let task = tokio::spawn(session::run_session(
            generation,
            required.clone(),
            self.ctx.clone(),
            cancel.clone(),
            stop_reason.clone(),
        ));
        self.active = Some(ActiveGeneration {
            generation,
            channels: required,
            cancel,
            stop_reason,
            task,
        });
    }

    async fn stop(&mut self) {
        if let Some(current) = self.active.take() {
            stop_generation(current, StopReason::Shutdown).await;
        }
        self.ctx.set_state(ConnectionState::Idle);
    }
}

async fn stop_generation(generation: ActiveGeneration, reason: StopReason) {
    let _ = generation.stop_reason.set(reason);
    generation.cancel.cancel();
    if let Err(e) = generation.task.await {
        log::warn!(
            "[realtime-link] Generation {} ended abnormally: {}",
            generation.generation,
            e
        );
    }
}

async fn supervise(
    ctx: Arc<SessionContext>,
    mut changes_rx: mpsc::UnboundedReceiver<RequiredSetChange>,
    shutdown: CancellationToken,
) {
    let debounce = ctx.timeouts.unsubscribe_debounce;
    let mut reconciler = Reconciler {
        ctx,
        shutdown: shutdown.clone(),
        active: None,
        next_generation: 1,
    };
    let mut pending: Option<ChannelSet> = None;
    let debounce_timer = tokio::time::sleep(FAR_FUTURE);
    tokio::pin!(debounce_timer);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            change = changes_rx.recv() => {
                let Some(mut change) = change else {
                    log::debug!("[realtime-link] Registry dropped; supervisor exiting");
                    break;
                };
                // Only the latest queued set matters.
                while let Ok(newer) = changes_rx.try_recv() {
                    change = newer;
                }
                if change.shrinking && !debounce.is_zero() {
                    log::debug!(
                        "[realtime-link] Required set shrank to {}; reconciling in {:?}",
                        change.required,
                        debounce
                    );
                    pending = Some(change.required);
                    debounce_timer.as_mut().reset(TokioInstant::now() + debounce);
                } else {
                    pending = None;
                    reconciler.reconcile(change.required).await;
                }
            }

            _ = &mut debounce_timer, if pending.is_some() => {
                if let Some(required) = pending.take() {
                    reconciler.reconcile(required).await;
                }
            }
        }
    }

    reconciler.stop().await;
    log::debug!("[realtime-link] Supervisor stopped");
}
