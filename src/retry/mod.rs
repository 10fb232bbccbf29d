/// Generic retry executor with capped exponential backoff.
///
/// Wraps any side-effecting async operation (webhook delivery, query
/// execution) and retries transient failures. Errors are classified by
/// message text; anything unrecognized is treated as permanent and returned
/// immediately. Attempts are strictly sequential — no two attempts of the
/// same call ever overlap.
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

/// How a failed attempt was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NetworkError,
    ResourceBusy,
    ServerError,
    OperationFailed,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::OperationFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::ResourceBusy => "RESOURCE_BUSY",
            FailureKind::ServerError => "SERVER_ERROR",
            FailureKind::OperationFailed => "OPERATION_FAILED",
        }
    }
}

const NETWORK_PATTERNS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "etimedout",
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "error sending request",
];

const BUSY_PATTERNS: &[&str] = &[
    "deadlock",
    "lock wait",
    "resource busy",
    "database is locked",
];

const SERVER_PATTERNS: &[&str] = &["500", "502", "503"];

/// Classify a failure message. Network and contention failures are
/// transient; 5xx substrings mark an upstream server error; everything else
/// is permanent.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if NETWORK_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::NetworkError;
    }
    if BUSY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::ResourceBusy;
    }
    if SERVER_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::ServerError;
    }
    FailureKind::OperationFailed
}

#[derive(Debug, Clone)]
pub struct FailureDetails {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one `execute` call. One produced per invocation; the attempts
/// counter counts every attempt made, `1..=max_retries + 1`.
#[derive(Debug)]
pub struct ExecutionResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<FailureDetails>,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
}

impl<T> ExecutionResult<T> {
    fn succeeded(data: T, attempts: u32) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            attempts,
            last_attempt_at: Utc::now(),
        }
    }

    fn failed(error: FailureDetails, attempts: u32) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            attempts,
            last_attempt_at: Utc::now(),
        }
    }
}

/// Delay before the retry following `attempt` (1-indexed). The first retry
/// waits exactly `initial_delay_ms`; the exponent is `attempt - 1`.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1);
    let millis = (config.initial_delay_ms as f64
        * config.backoff_multiplier.powi(exp as i32))
    .min(config.max_delay_ms as f64);
    Duration::from_millis(millis as u64)
}

pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` with retry. The closure receives the 1-indexed
    /// attempt number. Never returns an `Err`; failure is reported through
    /// the `ExecutionResult`.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> ExecutionResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.execute_cancellable(operation, std::future::pending()).await
    }

    /// Like [`execute`](Self::execute), but stops scheduling further
    /// attempts as soon as `cancel` resolves. Cancellation during the
    /// backoff sleep resolves to `Failed` with the last attempt's error.
    pub async fn execute_cancellable<T, F, Fut, C>(
        &self,
        mut operation: F,
        cancel: C,
    ) -> ExecutionResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        C: Future<Output = ()>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 1u32;
        tokio::pin!(cancel);

        loop {
            match operation(attempt).await {
                Ok(data) => {
                    debug!(attempt, "operation succeeded");
                    return ExecutionResult::succeeded(data, attempt);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    let kind = classify_failure(&message);
                    if !kind.is_retryable() || attempt >= max_attempts {
                        return ExecutionResult::failed(
                            FailureDetails { kind, message },
                            attempt,
                        );
                    }
                    let delay = backoff_delay(&self.config, attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = kind.as_str(),
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::select! {
                        () = &mut cancel => {
                            debug!(attempt, "retry cancelled during backoff");
                            return ExecutionResult::failed(
                                FailureDetails { kind, message },
                                attempt,
                            );
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn classify_network_failures() {
        assert_eq!(
            classify_failure("connect ECONNREFUSED 127.0.0.1:3306"),
            FailureKind::NetworkError
        );
        assert_eq!(classify_failure("request timed out"), FailureKind::NetworkError);
    }

    #[test]
    fn classify_contention_failures() {
        assert_eq!(
            classify_failure("Deadlock found when trying to get lock"),
            FailureKind::ResourceBusy
        );
        assert_eq!(classify_failure("resource busy"), FailureKind::ResourceBusy);
    }

    #[test]
    fn classify_server_errors() {
        assert_eq!(
            classify_failure("upstream returned 503"),
            FailureKind::ServerError
        );
    }

    #[test]
    fn classify_everything_else_as_permanent() {
        assert_eq!(
            classify_failure("syntax error near SELECT"),
            FailureKind::OperationFailed
        );
        assert!(!FailureKind::OperationFailed.is_retryable());
    }

    #[test]
    fn first_retry_waits_exactly_initial_delay() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 250,
            backoff_multiplier: 2.0,
        };
        assert_eq!(backoff_delay(&config, 5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_after_one_attempt() {
        let executor = RetryExecutor::new(fast_config(3));
        let calls = AtomicU32::new(0);
        let result: ExecutionResult<()> = executor
            .execute(|_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("syntax error near SELECT") }
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error.unwrap().kind, FailureKind::OperationFailed);
    }

    #[tokio::test]
    async fn retryable_error_exhausts_all_attempts() {
        let executor = RetryExecutor::new(fast_config(2));
        let calls = AtomicU32::new(0);
        let result: ExecutionResult<()> = executor
            .execute(|_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("connection refused") }
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.error.unwrap().kind, FailureKind::NetworkError);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(fast_config(3));
        let result = executor
            .execute(|attempt| async move {
                if attempt < 3 {
                    anyhow::bail!("upstream returned 502");
                }
                Ok(attempt)
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data, Some(3));
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn operation_receives_one_indexed_attempts() {
        let executor = RetryExecutor::new(fast_config(2));
        let seen = std::sync::Mutex::new(Vec::new());
        let _result: ExecutionResult<()> = executor
            .execute(|attempt| {
                seen.lock().unwrap().push(attempt);
                async { anyhow::bail!("timeout") }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn cancellation_stops_further_attempts() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 5,
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        });
        let calls = AtomicU32::new(0);
        // Cancel resolves immediately, so the first backoff sleep is aborted.
        let result: ExecutionResult<()> = executor
            .execute_cancellable(
                |_attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { anyhow::bail!("connection reset") }
                },
                std::future::ready(()),
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error.unwrap().kind, FailureKind::NetworkError);
    }
}
