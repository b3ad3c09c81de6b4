//! Retry with linear backoff
//!
//! Every outbound call runs through [`retry_with_backoff`]: connectivity is
//! re-checked before each attempt, transient failures wait
//! `attempt × base_delay` and try again, and the last error is propagated
//! once `max_attempts` is reached. Non-transient errors are returned on first
//! occurrence.
//!
//! The loop is driven by [`RetryState`], whose transitions are a pure
//! function and can be tested without timers.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nutriplanner_ai::connectivity::ConnectivityProbe;
//! use nutriplanner_ai::logging::default_sink;
//! use nutriplanner_ai::retry::{retry_with_backoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> nutriplanner_ai::Result<()> {
//! let sink = default_sink();
//! let probe = ConnectivityProbe::always_online(sink.clone());
//! let config = RetryConfig::default().with_base_delay(Duration::from_millis(500));
//!
//! let value = retry_with_backoff(&config, &probe, sink.as_ref(), |_attempt| async {
//!     Ok::<_, nutriplanner_ai::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::connectivity::ConnectivityProbe;
use crate::logging::DiagnosticSink;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

const TARGET: &str = "nutriplanner_ai::retry";

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Wait after attempt `n` is `n × base_delay`
    pub base_delay: Duration,

    /// Extra random wait as a fraction of the linear delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts (at least 1)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the linear backoff step
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt);
        if self.jitter_factor <= 0.0 {
            return linear;
        }

        let jitter = linear.as_secs_f64() * self.jitter_factor * rand::random::<f64>();
        linear + Duration::from_secs_f64(jitter)
    }
}

/// Position of one call in the retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to run attempt `n` (1-based)
    Attempting(u32),
    /// Attempt `attempt` failed transiently; sleeping before the next one
    Waiting { attempt: u32, delay: Duration },
    Succeeded,
    /// Last allowed attempt failed
    Exhausted,
    /// A non-transient error ended the cycle
    Aborted,
}

/// What happened since the last transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    Succeeded,
    Failed { transient: bool },
    WaitElapsed,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded | RetryState::Exhausted | RetryState::Aborted
        )
    }

    /// Next state for `event`. Events that do not apply leave the state unchanged.
    pub fn next(self, event: RetryEvent, config: &RetryConfig) -> RetryState {
        match (self, event) {
            (RetryState::Attempting(_), RetryEvent::Succeeded) => RetryState::Succeeded,
            (RetryState::Attempting(_), RetryEvent::Failed { transient: false }) => {
                RetryState::Aborted
            }
            (RetryState::Attempting(attempt), RetryEvent::Failed { transient: true }) => {
                if attempt >= config.max_attempts.max(1) {
                    RetryState::Exhausted
                } else {
                    RetryState::Waiting {
                        attempt,
                        delay: config.delay_for(attempt),
                    }
                }
            }
            (RetryState::Waiting { attempt, .. }, RetryEvent::WaitElapsed) => {
                RetryState::Attempting(attempt + 1)
            }
            (state, _) => state,
        }
    }
}

/// Run `operation` until it succeeds, fails non-transiently, or runs out of attempts.
///
/// `operation` receives the 1-based attempt number. Before each attempt the
/// probe is consulted; when offline the attempt fails with
/// [`Error::NoConnectivity`] without calling `operation`, and still counts
/// toward the ceiling. Dropping the returned future cancels any pending wait
/// and further attempts.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    probe: &ConnectivityProbe,
    sink: &dyn DiagnosticSink,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::Attempting(1);
    let mut value = None;
    let mut last_error = None;

    while !state.is_terminal() {
        match state {
            RetryState::Attempting(attempt) => {
                let result = if probe.is_online().await {
                    operation(attempt).await
                } else {
                    Err(Error::NoConnectivity)
                };

                let event = match result {
                    Ok(ok) => {
                        value = Some(ok);
                        RetryEvent::Succeeded
                    }
                    Err(err) => {
                        let transient = err.is_transient();
                        sink.warn(
                            TARGET,
                            &format!(
                                "Attempt {}/{} failed: {}",
                                attempt, config.max_attempts, err
                            ),
                        );
                        last_error = Some(err);
                        RetryEvent::Failed { transient }
                    }
                };
                state = state.next(event, config);
            }
            RetryState::Waiting { attempt, delay } => {
                sink.info(
                    TARGET,
                    &format!("Retrying in {}ms (attempt {})", delay.as_millis(), attempt + 1),
                );
                sleep(delay).await;
                state = state.next(RetryEvent::WaitElapsed, config);
            }
            _ => break,
        }
    }

    match (state, value) {
        (RetryState::Succeeded, Some(value)) => Ok(value),
        _ => Err(last_error.unwrap_or_else(|| Error::other("Retry failed with no error"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ReachabilityCheck;
    use crate::logging::MemorySink;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new().with_base_delay(Duration::from_millis(10))
    }

    fn online() -> ConnectivityProbe {
        ConnectivityProbe::always_online(Arc::new(MemorySink::new()))
    }

    struct Offline;

    #[async_trait]
    impl ReachabilityCheck for Offline {
        async fn check(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay(Duration::from_millis(500))
            .with_jitter_factor(2.0);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.jitter_factor, 1.0);
        assert_eq!(RetryConfig::new().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_linear_delay() {
        let config = RetryConfig::new();
        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::new().with_jitter_factor(0.5);
        for _ in 0..50 {
            let delay = config.delay_for(2);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_state_transitions() {
        let config = RetryConfig::new();

        assert_eq!(
            RetryState::Attempting(1).next(RetryEvent::Succeeded, &config),
            RetryState::Succeeded
        );
        assert_eq!(
            RetryState::Attempting(1).next(RetryEvent::Failed { transient: true }, &config),
            RetryState::Waiting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            RetryState::Waiting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .next(RetryEvent::WaitElapsed, &config),
            RetryState::Attempting(2)
        );
        assert_eq!(
            RetryState::Attempting(3).next(RetryEvent::Failed { transient: true }, &config),
            RetryState::Exhausted
        );
        assert_eq!(
            RetryState::Attempting(1).next(RetryEvent::Failed { transient: false }, &config),
            RetryState::Aborted
        );
        assert_eq!(
            RetryState::Exhausted.next(RetryEvent::WaitElapsed, &config),
            RetryState::Exhausted
        );
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let sink = MemorySink::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(&fast(), &online(), &sink, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<i32, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let sink = MemorySink::new();
        let result = retry_with_backoff(&fast(), &online(), &sink, |attempt| async move {
            if attempt < 3 {
                Err(Error::transport(503, "unavailable"))
            } else {
                Ok::<u32, Error>(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(sink.at_level(log::Level::Warn).len(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(
            &fast().with_max_attempts(2),
            &online(),
            &MemorySink::new(),
            move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, Error>(Error::timeout()) }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(&fast(), &online(), &MemorySink::new(), move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::blocked("SAFETY", "")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Blocked { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_counts_as_failed_attempt() {
        let probe = ConnectivityProbe::new(Arc::new(Offline), Arc::new(MemorySink::new()));
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(&fast(), &probe, &MemorySink::new(), move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<i32, Error>(1) }
        })
        .await;

        assert!(matches!(result, Err(Error::NoConnectivity)));
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_are_linear() {
        let started = tokio::time::Instant::now();
        let _ = retry_with_backoff(&RetryConfig::new(), &online(), &MemorySink::new(), |_| async {
            Err::<(), Error>(Error::timeout())
        })
        .await;

        // 1s after the first failure, 2s after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }
}
