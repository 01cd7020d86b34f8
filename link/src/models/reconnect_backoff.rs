use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One step of a [`ReconnectBackoff`] schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffStep {
    /// First attempt number this delay applies to
    pub from_attempt: u32,

    /// Delay before retrying, in milliseconds
    pub delay_ms: u64,
}

/// Stepped delay schedule applied between unplanned reconnect attempts.
///
/// The attempt counter is incremented before the delay is looked up, so the
/// first retry after a drop uses attempt `1`. The default schedule is:
///
/// | attempts | delay |
/// |----------|-------|
/// | < 5      | 1 s   |
/// | 5–14     | 5 s   |
/// | 15–99    | 10 s  |
/// | ≥ 100    | 60 s  |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconnectBackoff {
    steps: Vec<BackoffStep>,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::stepped(&[(0, 1_000), (5, 5_000), (15, 10_000), (100, 60_000)])
    }
}

impl ReconnectBackoff {
    /// Build a schedule from `(from_attempt, delay_ms)` pairs.
    ///
    /// Steps are sorted by `from_attempt`; attempts below the first step use
    /// the first step's delay.
    pub fn stepped(steps: &[(u32, u64)]) -> Self {
        let mut steps: Vec<BackoffStep> = steps
            .iter()
            .map(|&(from_attempt, delay_ms)| BackoffStep {
                from_attempt,
                delay_ms,
            })
            .collect();
        steps.sort_by_key(|s| s.from_attempt);
        Self { steps }
    }

    /// A schedule that retries after the same delay every time.
    pub fn constant(delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self::stepped(&[(0, delay_ms)])
    }

    /// Delay before the retry numbered `attempts`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let step = self
            .steps
            .iter()
            .rev()
            .find(|s| s.from_attempt <= attempts)
            .or_else(|| self.steps.first());
        Duration::from_millis(step.map_or(0, |s| s.delay_ms))
    }

    pub fn steps(&self) -> &[BackoffStep] {
        &self.steps
    }
}
