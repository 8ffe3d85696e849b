//! Retry with exponential backoff at the sink boundary
//!
//! `WithRetry` wraps a `NotificationSink` or `TicketMutator` so that transient
//! failures are retried a bounded number of times, each attempt capped by a
//! timeout. Permanent failures are returned immediately.

use async_trait::async_trait;
use soporte_shared::{NotificationRequest, TicketMutationRequest};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{NotificationSink, SinkError, TicketMutator};

/// Upper bound on retries; larger configured values are clamped to it
pub const MAX_RETRIES_CEILING: u32 = 16;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting initial attempt)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Timeout applied to each individual attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: 0.1,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.min(MAX_RETRIES_CEILING);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay.as_millis() as f64);

        let jittered_delay = if self.config.jitter > 0.0 {
            let jitter_range = capped_delay * self.config.jitter;
            let jitter_offset = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
            (capped_delay + jitter_offset).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(jittered_delay as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, SinkError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let attempts = self.config.max_retries.min(MAX_RETRIES_CEILING) + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            let error = match tokio::time::timeout(self.config.attempt_timeout, operation()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => SinkError::Timeout(self.config.attempt_timeout),
            };

            if attempt + 1 < attempts {
                let delay = self.calculate_delay(attempt);
                warn!(
                    "{} failed ({}), retrying in {:?} ({}/{})",
                    label,
                    error,
                    delay,
                    attempt + 1,
                    attempts - 1
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        Err(SinkError::Exhausted {
            attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// Decorator adding bounded retries to a sink or ticket mutator
pub struct WithRetry<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> WithRetry<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: NotificationSink> NotificationSink for WithRetry<T> {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError> {
        self.policy
            .execute("notification delivery", || self.inner.send(request))
            .await
    }
}

#[async_trait]
impl<T: TicketMutator> TicketMutator for WithRetry<T> {
    async fn apply(&self, request: &TicketMutationRequest) -> Result<(), SinkError> {
        self.policy
            .execute("ticket mutation", || self.inner.apply(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soporte_shared::MutableTicketField;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_max_retries(max_retries)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2))
                .with_jitter(0.0)
                .with_attempt_timeout(Duration::from_millis(200)),
        )
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(300))
                .with_jitter(0.0),
        );
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(300));
        assert_eq!(policy.calculate_delay(8), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(3)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SinkError::Transient("421".into()))
                    } else {
                        Ok("delivered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), SinkError> = fast_policy(3)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SinkError::Rejected("550".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(SinkError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), SinkError> = fast_policy(2)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SinkError::Transient("connection reset".into()))
                }
            })
            .await;

        match result {
            Err(SinkError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_oversized_retry_budget_is_clamped() {
        assert_eq!(
            RetryConfig::default().with_max_retries(u32::MAX).max_retries,
            MAX_RETRIES_CEILING
        );

        // Set directly, bypassing the builder
        let mut config = fast_policy(0).config().clone();
        config.max_retries = u32::MAX;

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), SinkError> = RetryPolicy::new(config)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SinkError::Transient("busy".into()))
                }
            })
            .await;

        match result {
            Err(SinkError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, MAX_RETRIES_CEILING + 1);
                assert!(last_error.contains("busy"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES_CEILING + 1);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_max_retries(0)
                .with_attempt_timeout(Duration::from_millis(10)),
        );

        let result: Result<(), SinkError> = policy
            .execute("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(SinkError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_retry_wraps_ticket_mutator() {
        let mut mutator = super::super::MockTicketMutator::new();
        let mut seq = mockall::Sequence::new();
        mutator
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SinkError::Transient("deadlock".into())));
        mutator
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let wrapped = WithRetry::new(mutator, fast_policy(2));
        let request = TicketMutationRequest {
            ticket_id: Uuid::new_v4(),
            field: MutableTicketField::Status,
            value: "CERRADO".into(),
        };

        assert!(wrapped.apply(&request).await.is_ok());
    }
}
