//! Timeout configuration for the shared realtime connection.

use std::time::Duration;

/// Timeout configuration for realtime-link.
///
/// # Examples
///
/// ```rust
/// use realtime_link::RealtimeTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = RealtimeTimeouts::default();
///
/// // Longer connect timeout for high-latency networks
/// let timeouts = RealtimeTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeTimeouts {
    /// Timeout for establishing the connection (TCP + TLS + upgrade).
    /// Set to 0 to wait indefinitely.
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// How long the supervisor waits after the required channel set shrinks
    /// before reconnecting. A subscriber that unsubscribes and resubscribes
    /// within this window does not cause a reconnect.
    /// Default: 50 milliseconds
    pub unsubscribe_debounce: Duration,

    /// Upper bound on a graceful close of the transport before it is dropped.
    /// Default: 2 seconds
    pub close_timeout: Duration,
}

impl Default for RealtimeTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            unsubscribe_debounce: Duration::from_millis(50),
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl RealtimeTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> RealtimeTimeoutsBuilder {
        RealtimeTimeoutsBuilder::new()
    }

    /// Short timeouts for local development servers.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            unsubscribe_debounce: Duration::from_millis(20),
            close_timeout: Duration::from_millis(500),
        }
    }

    /// Timeouts for tests driving an in-memory transport.
    pub fn for_testing(debounce_ms: u64) -> Self {
        Self {
            connection_timeout: Duration::from_secs(1),
            unsubscribe_debounce: Duration::from_millis(debounce_ms),
            close_timeout: Duration::from_millis(200),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`RealtimeTimeouts`].
#[derive(Debug, Clone)]
pub struct RealtimeTimeoutsBuilder {
    timeouts: RealtimeTimeouts,
}

impl RealtimeTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: RealtimeTimeouts::default(),
        }
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the debounce applied when the required channel set shrinks.
    pub fn unsubscribe_debounce(mut self, delay: Duration) -> Self {
        self.timeouts.unsubscribe_debounce = delay;
        self
    }

    /// Set the debounce in milliseconds.
    pub fn unsubscribe_debounce_ms(self, ms: u64) -> Self {
        self.unsubscribe_debounce(Duration::from_millis(ms))
    }

    /// Set the graceful close timeout.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.close_timeout = timeout;
        self
    }

    pub fn build(self) -> RealtimeTimeouts {
        self.timeouts
    }
}
