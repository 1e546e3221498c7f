//! Fixed-interval polling with explicit bounds and cancellation
//!
//! Readiness waits poll at a constant interval with no backoff. A policy may
//! bound the wait by attempt count, by wall-clock deadline, or both; running
//! out of either ends the poll with [`PollError::Exhausted`]. A
//! [`CancelToken`] is raced against every sleep.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Bounds for a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Sleep before every probe
    pub poll_interval: Duration,
    /// Give up after this many probes
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first sleep
    pub deadline: Option<Duration>,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: Some(600),
            deadline: None,
        }
    }
}

impl ReadinessPolicy {
    pub fn new(poll_interval: Duration, max_attempts: Option<u32>, deadline: Option<Duration>) -> Self {
        Self {
            poll_interval,
            max_attempts,
            deadline,
        }
    }

    /// Poll forever, stopping only on success, error or cancellation
    pub fn unbounded(poll_interval: Duration) -> Self {
        Self::new(poll_interval, None, None)
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The probe itself failed; polling stops immediately
    Failed(E),
    /// The policy's bound was reached first
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Value produced by a successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
}

/// Sleep then probe until `probe` reports ready.
///
/// `probe` receives the 1-based attempt number.
#[instrument(level = "debug", skip(cancel, probe))]
pub async fn poll_until<T, E, Fut, Op>(
    policy: &ReadinessPolicy,
    cancel: &CancelToken,
    mut probe: Op,
) -> Result<Polled<T>, PollError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if policy.max_attempts.is_some_and(|max| attempts >= max)
            || policy.deadline.is_some_and(|d| started.elapsed() >= d)
        {
            warn!(attempts, "Readiness poll exhausted");
            return Err(PollError::Exhausted { attempts });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempts, "Readiness poll cancelled");
                return Err(PollError::Cancelled);
            }
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }

        attempts += 1;
        match probe(attempts).await {
            Ok(Probe::Ready(value)) => {
                debug!(attempts, "Readiness poll succeeded");
                return Ok(Polled { value, attempts });
            }
            Ok(Probe::Pending) => debug!(attempts, "Not ready yet"),
            Err(error) => return Err(PollError::Failed(error)),
        }
    }
}

/// Owner side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone without cancelling
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending_attempts() {
        let policy = ReadinessPolicy::default();
        let result: Result<Polled<&str>, PollError<()>> =
            poll_until(&policy, &CancelToken::never(), |attempt| async move {
                if attempt < 3 {
                    Ok(Probe::Pending)
                } else {
                    Ok(Probe::Ready("up"))
                }
            })
            .await;
        assert_eq!(
            result,
            Ok(Polled {
                value: "up",
                attempts: 3
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<Polled<()>, PollError<&str>> =
            poll_until(&ReadinessPolicy::default(), &CancelToken::never(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            })
            .await;
        assert_eq!(result, Err(PollError::Failed("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_bound() {
        let policy = ReadinessPolicy::new(Duration::from_millis(10), Some(4), None);
        let result: Result<Polled<()>, PollError<()>> =
            poll_until(&policy, &CancelToken::never(), |_| async { Ok(Probe::Pending) }).await;
        assert_eq!(result, Err(PollError::Exhausted { attempts: 4 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bound() {
        let policy = ReadinessPolicy::new(Duration::from_secs(1), None, Some(Duration::from_secs(5)));
        let result: Result<Polled<()>, PollError<()>> =
            poll_until(&policy, &CancelToken::never(), |_| async { Ok(Probe::Pending) }).await;
        assert_eq!(result, Err(PollError::Exhausted { attempts: 5 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let handle = CancelHandle::new();
        let token = handle.token();
        let policy = ReadinessPolicy::unbounded(Duration::from_secs(60));

        let poll = tokio::spawn(async move {
            poll_until::<(), (), _, _>(&policy, &token, |_| async { Ok(Probe::Pending) }).await
        });
        tokio::task::yield_now().await;
        handle.cancel();
        assert_eq!(poll.await.unwrap(), Err(PollError::Cancelled));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_default_policy() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, Some(600));
        assert_eq!(policy.deadline, None);
    }
}
