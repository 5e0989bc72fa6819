//! Async operation waiter
//!
//! Polls an upstream long-running operation until it reaches a target label.
//! Polls are sequential; every refresh and every sleep observes cancellation.

use crate::context::Context;
use crate::error::{CloudError, Result};
use crate::value::Attributes;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// One refresh result: the observed object (absent when the upstream no
/// longer has it) and its status label.
#[derive(Debug, Clone)]
pub struct Observation<T> {
    pub value: Option<T>,
    pub label: String,
}

impl<T> Observation<T> {
    pub fn new(value: T, label: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            label: label.into(),
        }
    }

    /// The object is gone; report it under `label`, e.g. `DELETED`.
    pub fn gone(label: impl Into<String>) -> Self {
        Self {
            value: None,
            label: label.into(),
        }
    }
}

/// Map a not-found refresh error to a synthetic `label` observation.
///
/// Used by delete waiters: the upstream stops answering for the object once
/// deletion completes.
pub fn gone_when_not_found<T>(
    ctx: &Context,
    result: Result<Observation<T>>,
    label: &str,
) -> Result<Observation<T>> {
    match result {
        Err(e) if ctx.classifier().is_not_found(&e) => {
            tracing::debug!("Object no longer found, treating as {}", label);
            Ok(Observation::gone(label))
        }
        other => other,
    }
}

/// Successful end of a wait
#[derive(Debug, Clone)]
pub struct WaitOutcome<T> {
    pub value: Option<T>,
    pub label: String,
    /// Number of refresh calls made
    pub polls: u32,
}

/// Polling state machine
#[derive(Debug, Clone)]
pub struct StateWaiter {
    /// What is being waited for, used in errors and logs
    pub description: String,
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Labels that fail the wait immediately
    pub error: Vec<String>,
    /// Before the first refresh
    pub delay: Duration,
    /// Between refreshes; zero means exponential backoff
    pub poll_interval: Duration,
    /// Lower bound on the spacing of refreshes
    pub min_timeout: Duration,
    /// Hard deadline, clamped to the context deadline
    pub timeout: Duration,
    /// Consecutive target observations needed
    pub continuous_target_occurrence: u32,
}

impl StateWaiter {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            pending: Vec::new(),
            target: Vec::new(),
            error: Vec::new(),
            delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            min_timeout: Duration::ZERO,
            timeout: Duration::from_secs(600),
            continuous_target_occurrence: 1,
        }
    }

    pub fn pending<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.pending = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn target<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.target = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn error<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.error = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_timeout(mut self, min: Duration) -> Self {
        self.min_timeout = min;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn continuous_target_occurrence(mut self, n: u32) -> Self {
        self.continuous_target_occurrence = n.max(1);
        self
    }

    fn next_wait(&self, previous: Duration) -> Duration {
        let wait = if !self.poll_interval.is_zero() {
            self.poll_interval
        } else if previous.is_zero() {
            Duration::from_millis(100)
        } else {
            (previous * 2).min(Duration::from_secs(10))
        };
        wait.max(self.min_timeout)
    }

    /// Poll `refresh` until a target label has been seen
    /// `continuous_target_occurrence` times in a row.
    ///
    /// Retryable refresh errors are logged and polling continues; any other
    /// error ends the wait. A label that is neither pending nor target fails
    /// with [`CloudError::UnexpectedState`]. On timeout the error carries the
    /// last observed label.
    pub async fn wait<T, F, Fut>(&self, ctx: &Context, mut refresh: F) -> Result<WaitOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>>>,
    {
        let start = Instant::now();
        let mut budget = self.timeout;
        if let Some(remaining) = ctx.remaining() {
            budget = budget.min(remaining);
        }
        let deadline = start + budget;

        let mut last_label: Option<String> = None;
        let mut targets_seen = 0u32;
        let mut polls = 0u32;
        let mut wait = Duration::ZERO;

        tracing::debug!(
            waiting_for = %self.description,
            pending = ?self.pending,
            target = ?self.target,
            timeout_secs = budget.as_secs(),
            "Waiting for state"
        );

        if !self.delay.is_zero() {
            ctx.sleep(self.delay.min(budget)).await?;
        }

        loop {
            if ctx.is_cancelled() {
                return Err(CloudError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CloudError::Timeout {
                    waiting_for: self.description.clone(),
                    elapsed: now.saturating_duration_since(start),
                    last_state: last_label.unwrap_or_else(|| "(none)".to_string()),
                });
            }

            polls += 1;
            match refresh().await {
                Err(e) if ctx.classifier().is_retryable(&e) => {
                    tracing::warn!(waiting_for = %self.description, poll = polls, error = %e, "Retryable error while waiting");
                }
                Err(e) => return Err(e),
                Ok(observation) => {
                    let label = observation.label;
                    tracing::debug!(waiting_for = %self.description, poll = polls, state = %label, "Observed state");

                    if self.target.contains(&label) {
                        targets_seen += 1;
                        if targets_seen >= self.continuous_target_occurrence {
                            return Ok(WaitOutcome {
                                value: observation.value,
                                label,
                                polls,
                            });
                        }
                    } else {
                        targets_seen = 0;
                        if self.error.contains(&label) || !self.pending.contains(&label) {
                            let mut expected = self.pending.clone();
                            expected.extend(self.target.iter().cloned());
                            return Err(CloudError::UnexpectedState {
                                waiting_for: self.description.clone(),
                                state: label,
                                expected: expected.join(", "),
                            });
                        }
                    }
                    last_label = Some(label);
                }
            }

            wait = self.next_wait(wait);
            let remaining = deadline.saturating_duration_since(Instant::now());
            ctx.sleep(wait.min(remaining)).await?;
        }
    }
}

/// Common shape of an upstream long-running job
pub trait UpstreamJob: Send {
    fn id(&self) -> &str;

    /// Current status label
    fn status(&self) -> &str;

    /// Objects the job created or touched, e.g. `{"cluster_id": "..."}`
    fn entities(&self) -> Attributes;
}

/// Wait for a job fetched by `fetch` to reach one of the waiter's targets.
pub async fn wait_for_job<J, F, Fut>(ctx: &Context, waiter: &StateWaiter, mut fetch: F) -> Result<J>
where
    J: UpstreamJob,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<J>>,
{
    let outcome = waiter
        .wait(ctx, || {
            let fut = fetch();
            async move {
                let job = fut.await?;
                let label = job.status().to_string();
                Ok(Observation::new(job, label))
            }
        })
        .await?;
    outcome.value.ok_or_else(|| {
        CloudError::Internal(format!("{} finished without a job", waiter.description))
    })
}
