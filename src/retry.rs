//! Bounded retry with exponential backoff for outbound calls.
//!
//! Every storage and inference call goes through [`with_retry`], which
//! distinguishes transient failures (connection/DNS/timeout, HTTP 429 and
//! 5xx) from terminal ones (other 4xx, malformed requests). Transient
//! failures retry up to the attempt cap with doubling delays; terminal
//! failures stop immediately rather than spending the backoff budget.
//!
//! The wrapper never propagates an error past itself: exhaustion yields an
//! explicit [`Outcome::Unavailable`] so callers can degrade to a documented
//! default instead of failing the whole request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// A classified outbound-call failure.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Network-level or rate-limit failure worth retrying.
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),
    /// Failure that retrying cannot fix (bad request, auth, contract).
    #[error("terminal: {0}")]
    Terminal(#[source] anyhow::Error),
}

impl CallError {
    pub fn transient(msg: impl Into<String>) -> Self {
        CallError::Transient(anyhow::anyhow!(msg.into()))
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        CallError::Terminal(anyhow::anyhow!(msg.into()))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }
}

/// Classify a reqwest transport error. Connection establishment, DNS, and
/// timeout failures are transient; request construction, redirect, and
/// body/decode failures are not — retrying replays the same failure.
pub fn classify_reqwest(err: reqwest::Error) -> CallError {
    if err.is_connect() || err.is_timeout() {
        CallError::Transient(err.into())
    } else {
        CallError::Terminal(err.into())
    }
}

/// Classify an HTTP error status: 429 and 5xx are transient, every other
/// status is terminal.
pub fn classify_status(status: reqwest::StatusCode, body: String, label: &str) -> CallError {
    let err = anyhow::anyhow!("{} returned {}: {}", label, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        CallError::Transient(err)
    } else {
        CallError::Terminal(err)
    }
}

/// Retry policy: attempt cap, base backoff delay, and an optional deadline
/// bounding total wait so an abandoned request does not keep retrying.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Delay before the given attempt (2-based): base, 2×base, 4×base, ...
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1 << (attempt - 2).min(5))
    }
}

/// Result of a wrapped call: the success value, or an explicit
/// "unavailable" marker after classification or exhaustion.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Unavailable { attempts: u32, reason: String },
}

impl<T> Outcome<T> {
    /// Degrade to a default value, logging the failure once.
    pub fn unwrap_or_else_default(self, label: &str, default: impl FnOnce() -> T) -> T {
        match self {
            Outcome::Success(v) => v,
            Outcome::Unavailable { attempts, reason } => {
                tracing::warn!(%label, attempts, %reason, "call unavailable, using default");
                default()
            }
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Unavailable { .. } => None,
        }
    }
}

/// Run `op` with bounded retry and exponential backoff.
///
/// `op` is invoked up to `policy.max_attempts` times. Transient errors
/// sleep (base × 2^(n-1)) between attempts; terminal errors and an
/// expired deadline stop early. Each failed attempt is logged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Outcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut last_reason = String::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            if let Some(deadline) = policy.deadline {
                if Instant::now() + delay > deadline {
                    tracing::warn!(%label, attempt, "deadline reached, abandoning retries");
                    return Outcome::Unavailable {
                        attempts: attempt - 1,
                        reason: format!("deadline reached after: {}", last_reason),
                    };
                }
            }
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Outcome::Success(value),
            Err(CallError::Transient(e)) => {
                tracing::warn!(%label, attempt, error = %e, "transient failure");
                last_reason = e.to_string();
            }
            Err(CallError::Terminal(e)) => {
                tracing::warn!(%label, attempt, error = %e, "terminal failure, not retrying");
                return Outcome::Unavailable {
                    attempts: attempt,
                    reason: e.to_string(),
                };
            }
        }
    }

    Outcome::Unavailable {
        attempts: policy.max_attempts,
        reason: last_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy_ms(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(base_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(&policy_ms(3, 100), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CallError::transient("connection refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert!(matches!(outcome, Outcome::Success(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_unavailable_after_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let outcome: Outcome<()> = with_retry(&policy_ms(3, 100), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::transient("dns failure")) }
        })
        .await;
        let elapsed = start.elapsed();

        match outcome {
            Outcome::Unavailable { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("dns failure"));
            }
            Outcome::Success(_) => panic!("expected unavailable"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Doubling backoff: 100ms + 200ms between three attempts.
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_stops_without_spending_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let outcome: Outcome<()> = with_retry(&policy_ms(3, 100), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::terminal("401 unauthorized")) }
        })
        .await;

        assert!(matches!(outcome, Outcome::Unavailable { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_total_wait() {
        let calls = AtomicU32::new(0);
        let policy = policy_ms(5, 100).with_deadline(Instant::now() + Duration::from_millis(150));
        let outcome: Outcome<()> = with_retry(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::transient("timeout")) }
        })
        .await;

        // Attempt 1 at t=0, attempt 2 after 100ms; the 200ms delay before
        // attempt 3 would cross the deadline, so no third invocation.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            Outcome::Unavailable { reason, .. } => assert!(reason.contains("deadline")),
            Outcome::Success(_) => panic!("expected unavailable"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        // Port 9 (discard) is closed on loopback; no external network needed.
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9")
            .send()
            .await
            .unwrap_err();
        assert!(classify_reqwest(err).is_transient());
    }

    #[tokio::test]
    async fn unsendable_request_is_terminal() {
        // An unsupported scheme fails at request construction; retrying
        // would replay the identical failure.
        let err = reqwest::Client::new()
            .get("htp://unsupported-scheme.invalid")
            .send()
            .await
            .unwrap_err();
        assert!(!classify_reqwest(err).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn unwrap_or_else_default_degrades_gracefully() {
        let outcome: Outcome<String> = with_retry(&policy_ms(1, 10), "op", || async {
            Err(CallError::transient("down"))
        })
        .await;
        let value = outcome.unwrap_or_else_default("op", || "fallback".to_string());
        assert_eq!(value, "fallback");
    }
}
