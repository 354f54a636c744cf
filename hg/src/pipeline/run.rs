//! Run lifecycle: queued -> running -> completed | failed | timed out
//!
//! A run is polled on a fixed interval for a bounded number of attempts.
//! Sleeping goes through [`Sleeper`] so tests never wait on a wall clock.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::HypothesisError;
use crate::config::PollingConfig;
use crate::provider::{AssistantProvider, RunStatus};

/// State of one provider-side run as seen by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Failed(String),
    /// The poll budget ran out; the provider-side run is abandoned, not cancelled
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::TimedOut)
    }

    /// Apply one status observation
    ///
    /// Terminal states absorb further observations.
    pub fn observe(self, status: RunStatus) -> RunState {
        if self.is_terminal() {
            return self;
        }
        match status {
            RunStatus::Queued => RunState::Queued,
            RunStatus::Running => RunState::Running,
            RunStatus::Completed => RunState::Completed,
            RunStatus::Failed(reason) => RunState::Failed(reason),
        }
    }

    /// The poll budget is exhausted without a terminal observation
    pub fn expire(self) -> RunState {
        if self.is_terminal() { self } else { RunState::TimedOut }
    }
}

/// Bounded retry-with-sleep: `max_attempts` polls, `interval` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.interval(), config.max_attempts())
    }

    /// Wall-clock budget covered by the policy
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Sleep abstraction for the poll loop
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping on the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately; for tests and embedding in simulations
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Drives a run to a terminal state
pub struct RunPoller {
    provider: Arc<dyn AssistantProvider>,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RunPoller {
    pub fn new(provider: Arc<dyn AssistantProvider>, policy: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            provider,
            policy,
            sleeper,
        }
    }

    /// Poll until the run completes
    ///
    /// Failure maps to `ProviderFailed`, an exhausted budget to the
    /// retryable `ProviderTimeout`.
    pub async fn await_run(&self, thread_id: &str, run_id: &str) -> Result<(), HypothesisError> {
        debug!(%thread_id, %run_id, max_attempts = self.policy.max_attempts, "await_run: called");
        let started = Instant::now();
        let mut state = RunState::Queued;

        for attempt in 1..=self.policy.max_attempts {
            let status = self.provider.get_run_status(thread_id, run_id).await?;
            state = state.observe(status);
            debug!(attempt, ?state, "await_run: observed");

            match &state {
                RunState::Completed => {
                    info!(%thread_id, %run_id, attempt, "Run completed");
                    return Ok(());
                }
                RunState::Failed(reason) => {
                    warn!(%thread_id, %run_id, %reason, "Run failed");
                    return Err(HypothesisError::ProviderFailed(format!("run {} failed: {}", run_id, reason)));
                }
                _ => {}
            }

            if attempt < self.policy.max_attempts {
                self.sleeper.sleep(self.policy.interval).await;
            }
        }

        state = state.expire();
        let elapsed = started.elapsed();
        warn!(%thread_id, %run_id, ?state, ?elapsed, budget = ?self.policy.budget(), "Run did not complete in time");
        Err(HypothesisError::ProviderTimeout {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            elapsed,
        })
    }
}
