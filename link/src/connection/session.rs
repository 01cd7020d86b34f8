//! One connection generation.
//!
//! A session owns the live duplex stream for exactly one channel set. It
//! connects, runs the receive loop, and after an unplanned close retries the
//! same channel set under the backoff schedule. It ends when its cancellation
//! token fires (planned close) or when no retry is warranted.

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, SessionContext, StopReason};
use crate::connectivity::wait_until_online;
use crate::error::{RealtimeError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::{ChannelSet, MalformedFramePolicy};
use crate::timeouts::RealtimeTimeouts;
use crate::transport::{ConnectRequest, DuplexStream, IncomingMessage};

/// Why the receive loop stopped.
#[derive(Debug)]
enum SessionEnd {
    /// The supervisor cancelled this generation.
    Cancelled,
    /// The connection went away without being asked to.
    Dropped(String),
}

pub(crate) async fn run_session(
    generation: u64,
    channels: ChannelSet,
    ctx: Arc<SessionContext>,
    cancel: CancellationToken,
    stop_reason: Arc<OnceLock<StopReason>>,
) {
    let request = ConnectRequest::for_channels(&ctx.endpoint, &ctx.project, &channels);
    let mut attempts: u32 = 0;

    loop {
        ctx.set_state(ConnectionState::Connecting);

        if !ctx.connectivity.is_connected() {
            log::info!(
                "[realtime-link] Offline; generation {} waiting for connectivity",
                generation
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = wait_until_online(ctx.connectivity.as_ref()) => {},
            }
        }

        log::info!(
            "[realtime-link] Connecting generation {} for channels {}",
            generation,
            channels
        );
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = open(&ctx, &request) => result,
        };

        match connected {
            Ok(mut stream) => {
                log::info!("[realtime-link] Generation {} connected", generation);
                ctx.set_state(ConnectionState::Open);
                ctx.handlers.emit_connect(&channels);

                let end = receive_loop(stream.as_mut(), &ctx, &cancel, &mut attempts).await;

                ctx.set_state(ConnectionState::Closing);
                close_quietly(stream.as_mut(), &ctx.timeouts).await;

                match end {
                    SessionEnd::Cancelled => {
                        // Only shutdown cancels a generation without naming a reason.
                        let reason = stop_reason.get().copied().unwrap_or(StopReason::Shutdown);
                        log::info!(
                            "[realtime-link] Generation {} closed: {}",
                            generation,
                            reason.message()
                        );
                        ctx.handlers
                            .emit_disconnect(DisconnectReason::planned(reason.message()));
                        return;
                    },
                    SessionEnd::Dropped(reason) => {
                        log::warn!(
                            "[realtime-link] Generation {} lost its connection: {}",
                            generation,
                            reason
                        );
                        ctx.handlers.emit_disconnect(DisconnectReason::unplanned(reason));
                    },
                }
            },
            Err(e) => {
                log::warn!(
                    "[realtime-link] Connect attempt for generation {} failed: {}",
                    generation,
                    e
                );
                ctx.handlers
                    .emit_error(ConnectionError::new(e.to_string(), ctx.options.auto_reconnect));
            },
        }

        if !ctx.options.auto_reconnect {
            log::info!(
                "[realtime-link] Auto-reconnect disabled; generation {} going idle",
                generation
            );
            ctx.set_state(ConnectionState::Idle);
            return;
        }

        attempts = attempts.saturating_add(1);
        if let Some(max) = ctx.options.max_reconnect_attempts {
            if attempts > max {
                log::warn!("[realtime-link] Max reconnection attempts ({}) reached", max);
                ctx.handlers.emit_error(ConnectionError::new(
                    format!("Max reconnection attempts ({}) reached", max),
                    false,
                ));
                ctx.set_state(ConnectionState::Idle);
                return;
            }
        }

        let delay = ctx.options.backoff.delay_for(attempts);
        log::info!(
            "[realtime-link] Attempting reconnection in {:?} (attempt {})",
            delay,
            attempts
        );
        ctx.set_state(ConnectionState::Connecting);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {},
        }
    }
}

async fn open(ctx: &SessionContext, request: &ConnectRequest) -> Result<Box<dyn DuplexStream>> {
    let timeout = ctx.timeouts.connection_timeout;
    if RealtimeTimeouts::is_no_timeout(timeout) {
        return ctx.transport.connect(request).await;
    }
    match tokio::time::timeout(timeout, ctx.transport.connect(request)).await {
        Ok(result) => result,
        Err(_) => Err(RealtimeError::TimeoutError(format!(
            "Connection timeout ({:?})",
            timeout
        ))),
    }
}

/// Read frames until the stream ends, fails, or the generation is cancelled.
///
/// Every well-formed frame resets `attempts` and is published unfiltered.
/// Frames that fail to decode follow the malformed-frame policy.
async fn receive_loop(
    stream: &mut dyn DuplexStream,
    ctx: &SessionContext,
    cancel: &CancellationToken,
    attempts: &mut u32,
) -> SessionEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            next = stream.receive() => next,
        };

        let dispatched = match next {
            Some(Ok(IncomingMessage::Text(text))) => {
                ctx.handlers.emit_receive(&text);
                ctx.demux.dispatch(&text).map_err(|e| e.to_string())
            },
            Some(Ok(IncomingMessage::Undecodable(reason))) => Err(reason),
            Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
            None => return SessionEnd::Dropped("Stream closed by remote".to_string()),
        };

        match dispatched {
            Ok(_) => {
                if *attempts > 0 {
                    log::debug!(
                        "[realtime-link] Frame received; resetting {} reconnect attempt(s)",
                        attempts
                    );
                }
                *attempts = 0;
            },
            Err(reason) => match ctx.options.malformed_frames {
                MalformedFramePolicy::Skip => {
                    log::warn!("[realtime-link] Skipping malformed frame: {}", reason);
                    ctx.handlers.emit_error(ConnectionError::new(reason, true));
                },
                MalformedFramePolicy::Reconnect => {
                    return SessionEnd::Dropped(format!("Malformed frame: {}", reason));
                },
            },
        }
    }
}

async fn close_quietly(stream: &mut dyn DuplexStream, timeouts: &RealtimeTimeouts) {
    match tokio::time::timeout(timeouts.close_timeout, stream.close()).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => log::debug!("[realtime-link] Error while closing connection: {}", e),
        Err(_) => log::debug!(
            "[realtime-link] Close did not finish within {:?}; dropping connection",
            timeouts.close_timeout
        ),
    }
}
