//! Retry/backoff state machine for a single directory lookup.
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                       -> FailedPermanent   (NotFound, PermanentError)
//!                       -> Waiting -> Attempting ...   (RateLimited, TransientError)
//!                       -> FailedExhausted   (still failing after `max_retries`)
//! ```
//!
//! Transitions are computed by [`Retrier::transition`] (pure); the async
//! driver [`Retrier::run`] performs the calls and waits through the injected
//! [`Clock`], so the schedule is observable in tests.

use std::{future::Future, sync::Arc, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, directory::LookupOutcome};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total calls are at most `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Extra random delay, as a fraction of the computed backoff (0.2 = up to +20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry number `retry` (1-based).
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let secs = self.base_delay.as_secs_f64() * factor;
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Backoff with jitter; never below [`RetryPolicy::base_backoff`].
    pub fn backoff(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        base + base.mul_f64(jitter * rng.gen::<f64>())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Attempting { attempt: u32 },
    Waiting { retry: u32, delay: Duration },
    Succeeded,
    FailedPermanent,
    FailedExhausted,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RetryState::Succeeded | RetryState::FailedPermanent | RetryState::FailedExhausted
        )
    }
}

/// The last retryable failure seen before giving up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastFailure {
    RateLimited(Duration),
    Transient(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal<T> {
    Succeeded(T),
    NotFound,
    Permanent { reason: String, session_fatal: bool },
    Exhausted(LastFailure),
    /// The run was cancelled before this lookup finished.
    Aborted,
}

#[derive(Clone, Debug)]
pub struct RetryReport<T> {
    pub terminal: Terminal<T>,
    /// Adapter calls made.
    pub attempts: u32,
    pub retries: u32,
    pub finished_at: DateTime<Utc>,
}

pub struct Retrier {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Next state after an attempt produced `outcome`, given `retries` already spent.
    pub fn transition<T>(&self, retries: u32, outcome: &LookupOutcome<T>) -> RetryState {
        self.transition_within(retries, self.policy.max_retries, outcome)
    }

    fn transition_within<T>(
        &self,
        retries: u32,
        budget: u32,
        outcome: &LookupOutcome<T>,
    ) -> RetryState {
        let hint = match outcome {
            LookupOutcome::Success(_) => return RetryState::Succeeded,
            LookupOutcome::NotFound | LookupOutcome::PermanentError { .. } => {
                return RetryState::FailedPermanent
            }
            LookupOutcome::RateLimited(d) => *d,
            LookupOutcome::TransientError(_) => Duration::ZERO,
        };
        if retries >= budget {
            return RetryState::FailedExhausted;
        }
        let retry = retries + 1;
        let backoff = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.policy.backoff(retry, &mut *rng)
        };
        RetryState::Waiting {
            retry,
            delay: hint.max(backoff),
        }
    }

    /// Drive one lookup to a terminal state with the full retry budget.
    ///
    /// `op` is called once per attempt. Cancellation is observed both while
    /// a call is in flight and while waiting between attempts.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LookupOutcome<T>>,
    {
        self.run_with_budget(label, cancel, self.policy.max_retries, op)
            .await
    }

    /// Like [`Retrier::run`], but allows at most `budget` retries. Used when
    /// earlier lookups for the same item already spent part of the policy.
    pub async fn run_with_budget<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        budget: u32,
        mut op: F,
    ) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LookupOutcome<T>>,
    {
        let mut state = RetryState::Pending;
        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut last: Option<LookupOutcome<T>> = None;

        loop {
            match state {
                RetryState::Pending => state = RetryState::Attempting { attempt: 1 },
                RetryState::Attempting { attempt } => {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self.report(Terminal::Aborted, attempts, retries);
                        }
                        out = op() => out,
                    };
                    attempts = attempt;
                    state = self.transition_within(retries, budget, &outcome);
                    last = Some(outcome);
                }
                RetryState::Waiting { retry, delay } => {
                    tracing::debug!(
                        target: "tbc_core::retry",
                        id = label,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        reason = %describe_retryable(last.as_ref()),
                        "retrying after wait"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self.report(Terminal::Aborted, attempts, retries);
                        }
                        _ = self.clock.sleep(delay) => {}
                    }
                    retries = retry;
                    state = RetryState::Attempting {
                        attempt: attempts + 1,
                    };
                }
                RetryState::Succeeded
                | RetryState::FailedPermanent
                | RetryState::FailedExhausted => break,
            }
        }

        let terminal = match (state, last) {
            (RetryState::Succeeded, Some(LookupOutcome::Success(v))) => Terminal::Succeeded(v),
            (_, Some(LookupOutcome::NotFound)) => Terminal::NotFound,
            (
                _,
                Some(LookupOutcome::PermanentError {
                    reason,
                    session_fatal,
                }),
            ) => Terminal::Permanent {
                reason,
                session_fatal,
            },
            (_, Some(LookupOutcome::RateLimited(d))) => {
                Terminal::Exhausted(LastFailure::RateLimited(d))
            }
            (_, Some(LookupOutcome::TransientError(e))) => {
                Terminal::Exhausted(LastFailure::Transient(e))
            }
            // The loop only exits after at least one attempt.
            (_, Some(LookupOutcome::Success(_))) | (_, None) => Terminal::Aborted,
        };

        if let Terminal::Exhausted(last) = &terminal {
            tracing::warn!(
                target: "tbc_core::retry",
                id = label,
                attempts,
                last = ?last,
                "giving up after {retries} retries"
            );
        }

        self.report(terminal, attempts, retries)
    }

    fn report<T>(&self, terminal: Terminal<T>, attempts: u32, retries: u32) -> RetryReport<T> {
        RetryReport {
            terminal,
            attempts,
            retries,
            finished_at: self.clock.wall_now(),
        }
    }
}

fn describe_retryable<T>(outcome: Option<&LookupOutcome<T>>) -> String {
    match outcome {
        Some(LookupOutcome::RateLimited(d)) => format!("rate limited for {}s", d.as_secs()),
        Some(LookupOutcome::TransientError(e)) => e.clone(),
        _ => String::new(),
    }
}
