//! Circuit Breaker Pattern
//!
//! Prevents cascading failures by failing fast once a dependency keeps
//! erroring, and bounds every admitted call by a request timeout.
//!
//! ```text
//! Closed   → Open:     failures within monitoring_period >= failure_threshold
//! Open     → HalfOpen: first call at or after next_attempt_time
//! HalfOpen → Closed:   first trial succeeds
//! HalfOpen → Open:     first trial fails
//! ```

use crate::config::ConfigError;
use crate::error::ServiceError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker configuration (one per resource name).
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Resource name used for registry lookup and logging
    pub name: String,
    /// Failures within `monitoring_period` before opening the circuit
    pub failure_threshold: u32,
    /// Duration to keep the circuit open before admitting a trial
    pub recovery_timeout: Duration,
    /// Deadline for every admitted call
    pub request_timeout: Duration,
    /// Window for counting failures (older failures are forgotten)
    pub monitoring_period: Duration,
    /// Trial calls admitted during one half-open episode
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            monitoring_period: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration with defaults for the named resource.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }

    pub fn half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    /// All counts and durations must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "circuit_breaker.name".to_string(),
                value: String::new(),
            });
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::NotPositive("failure_threshold"));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::NotPositive("half_open_max_calls"));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::NotPositive("recovery_timeout"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::NotPositive("request_timeout"));
        }
        if self.monitoring_period.is_zero() {
            return Err(ConfigError::NotPositive("monitoring_period"));
        }
        Ok(())
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation - calls admitted
    #[default]
    Closed,
    /// Circuit tripped - calls rejected
    Open,
    /// Testing recovery - limited trial calls admitted
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Circuit is open; the operation was not invoked
    Open { name: String, retry_after: Duration },
    /// Half-open trial capacity exhausted; the operation was not invoked
    HalfOpenSaturated { name: String },
    /// Operation did not settle within the request timeout
    Timeout {
        name: String,
        context: String,
        timeout: Duration,
    },
    /// Operation panicked or its task was cancelled
    Aborted { name: String, context: String },
    /// The operation's own error
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker itself short-circuited the call.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::HalfOpenSaturated { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The wrapped operation's error, if that is what failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { name, retry_after } => write!(
                f,
                "circuit '{}' is open, retry in {}ms",
                name,
                retry_after.as_millis()
            ),
            Self::HalfOpenSaturated { name } => {
                write!(f, "circuit '{}' is half-open and at trial capacity", name)
            }
            Self::Timeout {
                name,
                context,
                timeout,
            } => write!(
                f,
                "'{}' on circuit '{}' timed out after {}ms",
                context,
                name,
                timeout.as_millis()
            ),
            Self::Aborted { name, context } => {
                write!(f, "'{}' on circuit '{}' panicked or was cancelled", context, name)
            }
            Self::Operation(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Into<ServiceError>> From<BreakerError<E>> for ServiceError {
    fn from(err: BreakerError<E>) -> Self {
        match err {
            BreakerError::Open { name, retry_after } => {
                ServiceError::service_unavailable(&name, Some(retry_after))
            }
            BreakerError::HalfOpenSaturated { name } => {
                ServiceError::service_unavailable(&name, None)
            }
            BreakerError::Timeout {
                context, timeout, ..
            } => ServiceError::timeout(&context, timeout),
            BreakerError::Aborted { name, context } => ServiceError::internal(format!(
                "'{}' on circuit '{}' panicked or was cancelled",
                context, name
            )),
            BreakerError::Operation(e) => e.into(),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Failures still inside the monitoring window
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub next_attempt_time: Option<Instant>,
    pub half_open_call_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Failure timestamps inside the monitoring window, oldest first
    failures: VecDeque<Instant>,
    last_failure_time: Option<Instant>,
    next_attempt_time: Option<Instant>,
    half_open_calls: u32,
    /// Bumped on every transition; outcomes from an older generation are stale
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_failure_time: None,
            next_attempt_time: None,
            half_open_calls: 0,
            generation: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

enum Rejection {
    Open(Duration),
    Saturated,
}

/// A call the breaker let through. Settled exactly once by the task that runs it.
#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
}

/// State and counters shared with in-flight calls.
struct Core {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

/// Circuit breaker guarding a single named resource.
pub struct CircuitBreaker {
    core: Arc<Core>,
}

impl CircuitBreaker {
    /// Create a breaker, rejecting invalid configuration.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(Core {
                config,
                inner: Mutex::new(BreakerState::new()),
                total_calls: AtomicU64::new(0),
                total_failures: AtomicU64::new(0),
                total_rejections: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.core.config
    }

    pub fn state(&self) -> CircuitState {
        self.core.inner.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// The timeout race and its bookkeeping run in their own task, so an
    /// admitted call settles once even if the caller stops waiting; a trial
    /// slot stays taken until then. On timeout the operation itself is left
    /// to finish in the background and its result is dropped.
    pub async fn execute<T, E, F, Fut>(
        &self,
        context: &str,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let core = &self.core;
        core.total_calls.fetch_add(1, Ordering::Relaxed);

        let admission = match core.admit() {
            Ok(admission) => admission,
            Err(rejection) => {
                core.total_rejections.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(circuit = %core.config.name, context, "call rejected");
                return Err(match rejection {
                    Rejection::Open(retry_after) => BreakerError::Open {
                        name: core.config.name.clone(),
                        retry_after,
                    },
                    Rejection::Saturated => BreakerError::HalfOpenSaturated {
                        name: core.config.name.clone(),
                    },
                });
            }
        };

        let settle = tokio::spawn(
            core.clone()
                .settle(admission, context.to_string(), operation()),
        );

        match settle.await {
            Ok(result) => result,
            Err(_) => Err(BreakerError::Aborted {
                name: core.config.name.clone(),
                context: context.to_string(),
            }),
        }
    }

    /// Current state and counters.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let core = &self.core;
        let now = Instant::now();
        let inner = core.inner.lock();
        let failure_count = inner
            .failures
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= core.config.monitoring_period)
            .count() as u32;

        CircuitBreakerSnapshot {
            name: core.config.name.clone(),
            state: inner.state,
            failure_count,
            last_failure_time: inner.last_failure_time,
            next_attempt_time: inner.next_attempt_time,
            half_open_call_count: inner.half_open_calls,
            total_calls: core.total_calls.load(Ordering::Relaxed),
            total_failures: core.total_failures.load(Ordering::Relaxed),
            total_rejections: core.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        let mut inner = self.core.inner.lock();
        self.core.to_closed(&mut inner);
        tracing::info!(circuit = %self.core.config.name, "circuit breaker manually reset");
    }

    /// Force the circuit open for one recovery timeout.
    pub fn trip(&self) {
        let mut inner = self.core.inner.lock();
        self.core.to_open(&mut inner, Instant::now());
        tracing::warn!(circuit = %self.core.config.name, "circuit breaker manually tripped");
    }
}

impl Core {
    /// Race `operation` against the request timeout and record the outcome.
    async fn settle<T, E, Fut>(
        self: Arc<Self>,
        admission: Admission,
        context: String,
        operation: Fut,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let task = tokio::spawn(operation);

        match tokio::time::timeout(self.config.request_timeout, task).await {
            Ok(Ok(Ok(value))) => {
                self.on_success(admission);
                Ok(value)
            }
            Ok(Ok(Err(err))) => {
                self.on_failure(admission);
                Err(BreakerError::Operation(err))
            }
            Ok(Err(join_err)) => {
                tracing::warn!(
                    circuit = %self.config.name,
                    context = %context,
                    panicked = join_err.is_panic(),
                    "operation aborted"
                );
                self.on_failure(admission);
                Err(BreakerError::Aborted {
                    name: self.config.name.clone(),
                    context,
                })
            }
            Err(_) => {
                tracing::warn!(
                    circuit = %self.config.name,
                    context = %context,
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "operation timed out"
                );
                self.on_failure(admission);
                Err(BreakerError::Timeout {
                    name: self.config.name.clone(),
                    context,
                    timeout: self.config.request_timeout,
                })
            }
        }
    }

    fn admit(&self) -> Result<Admission, Rejection> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let next_attempt = inner.next_attempt_time.unwrap_or(now);
                if now < next_attempt {
                    return Err(Rejection::Open(next_attempt - now));
                }
                self.to_half_open(&mut inner);
                inner.half_open_calls = 1;
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    return Err(Rejection::Saturated);
                }
                inner.half_open_calls += 1;
            }
        }

        Ok(Admission {
            generation: inner.generation,
        })
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();

        if inner.generation != admission.generation {
            tracing::debug!(circuit = %self.config.name, "discarding stale success");
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.failures.clear(),
            CircuitState::HalfOpen => self.to_closed(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.generation != admission.generation {
            tracing::debug!(circuit = %self.config.name, "discarding stale failure");
            return;
        }
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        inner.last_failure_time = Some(now);
        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                inner.prune(now, self.config.monitoring_period);
                let failures = inner.failures.len() as u32;
                if failures >= self.config.failure_threshold {
                    self.to_open(&mut inner, now);
                    tracing::warn!(
                        circuit = %self.config.name,
                        failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.to_open(&mut inner, now);
                tracing::warn!(
                    circuit = %self.config.name,
                    "circuit breaker re-opened (trial failed)"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn to_open(&self, inner: &mut BreakerState, now: Instant) {
        inner.state = CircuitState::Open;
        inner.next_attempt_time = Some(now + self.config.recovery_timeout);
        inner.half_open_calls = 0;
        inner.generation += 1;
    }

    fn to_half_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::HalfOpen;
        inner.half_open_calls = 0;
        inner.generation += 1;
        tracing::info!(circuit = %self.config.name, "circuit breaker half-open");
    }

    fn to_closed(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.half_open_calls = 0;
        inner.next_attempt_time = None;
        inner.generation += 1;
        tracing::info!(circuit = %self.config.name, "circuit breaker closed (recovered)");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.core.config.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new("test")
                .failure_threshold(threshold)
                .recovery_timeout(Duration::from_millis(1000))
                .request_timeout(Duration::from_millis(50))
                .monitoring_period(Duration::from_secs(60)),
        )
        .unwrap()
    }

    async fn fail(cb: &CircuitBreaker) -> BreakerError<&'static str> {
        cb.execute("fail", || async { Err::<(), _>("boom") })
            .await
            .unwrap_err()
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        cb.execute("succeed", || async { Ok(7) }).await
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }

    #[test]
    fn test_circuit_state_default() {
        assert_eq!(CircuitState::default(), CircuitState::Closed);
    }

    #[test]
    fn test_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.half_open_max_calls, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = CircuitBreakerConfig::new("x").failure_threshold(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("failure_threshold"))
        );

        let config = CircuitBreakerConfig::new("x").request_timeout(Duration::ZERO);
        assert!(CircuitBreaker::new(config).is_err());

        let config = CircuitBreakerConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_value_through() {
        let cb = breaker(3);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_reraised() {
        let cb = breaker(3);
        let err = fail(&cb).await;
        assert!(!err.is_rejection());
        assert_eq!(err.into_operation_error(), Some("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let cb = breaker(5);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.snapshot().failure_count, 2);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let cb = breaker(3);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let snapshot = cb.snapshot();
        assert!(snapshot.last_failure_time.is_some());
        assert!(snapshot.next_attempt_time.unwrap() > Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let cb = breaker(1);
        fail(&cb).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = cb
            .execute("probe", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BreakerError::Open { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_not_failures() {
        let cb = breaker(1);
        fail(&cb).await;
        fail(&cb).await;
        fail(&cb).await;

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.total_failures, 1);
        assert_eq!(snapshot.total_rejections, 2);
        assert_eq!(snapshot.total_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reports_retry_after() {
        let cb = breaker(1);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(400)).await;

        match fail(&cb).await {
            BreakerError::Open { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_millis(600));
            }
            other => panic!("expected Open, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker(1);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(1000)).await;

        succeed(&cb).await.unwrap();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.half_open_call_count, 0);
        assert!(snapshot.next_attempt_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        let before = Instant::now();
        let err = fail(&cb).await;
        assert!(!err.is_rejection());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.half_open_call_count, 0);
        assert!(snapshot.next_attempt_time.unwrap() >= before + Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_at_most_max_calls() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("trial")
                .failure_threshold(1)
                .recovery_timeout(Duration::from_millis(100))
                .request_timeout(Duration::from_secs(1))
                .half_open_max_calls(2),
        )
        .unwrap();
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let trial = || {
            let calls = calls.clone();
            cb.execute("trial", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, &str>(())
            })
        };

        let (a, b, c) = futures::join!(trial(), trial(), trial());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(matches!(c, Err(BreakerError::HalfOpenSaturated { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_trial_outcome_is_authoritative() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("trial")
                .failure_threshold(1)
                .recovery_timeout(Duration::from_millis(100))
                .request_timeout(Duration::from_secs(1))
                .half_open_max_calls(2),
        )
        .unwrap();
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let fast = cb.execute("fast", || async { Ok::<_, &str>(()) });
        let slow = cb.execute("slow", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<(), _>("late failure")
        });

        let (fast, slow) = futures::join!(fast, slow);
        assert!(fast.is_ok());
        assert!(slow.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 0);
        // The slow trial's failure was stale and is not counted
        assert_eq!(cb.snapshot().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure_and_late_result_is_discarded() {
        let cb = breaker(3);
        let completed = Arc::new(AtomicUsize::new(0));
        let done = completed.clone();

        let err = cb
            .execute("slow", move || async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(cb.snapshot().failure_count, 1);

        // The abandoned operation still runs to completion
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(cb.snapshot().failure_count, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_is_a_failure() {
        let cb = breaker(1);
        let err = cb
            .execute("panics", || async {
                if true {
                    panic!("operation blew up");
                }
                Ok::<(), &str>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BreakerError::Aborted { .. }));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    // Rolling-window reading of monitoring_period: failures older than the
    // window stop counting toward the threshold.
    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_monitoring_period_expire() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("window")
                .failure_threshold(3)
                .request_timeout(Duration::from_millis(50))
                .monitoring_period(Duration::from_millis(100)),
        )
        .unwrap();

        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.snapshot().failure_count, 2);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cb.snapshot().failure_count, 0);

        fail(&cb).await;
        assert_eq!(cb.snapshot().failure_count, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    fn trial_breaker(request_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new("trial")
                .failure_threshold(1)
                .recovery_timeout(Duration::from_millis(1000))
                .request_timeout(request_timeout)
                .half_open_max_calls(1),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_holds_slot_until_it_settles() {
        let cb = trial_breaker(Duration::from_secs(10));
        cb.trip();
        tokio::time::advance(Duration::from_millis(1000)).await;

        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let slow_trial = || {
            let running = running.clone();
            let max_running = max_running.clone();
            cb.execute("slow", move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
        };

        let abandoned = tokio::time::timeout(Duration::from_millis(1), slow_trial()).await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().half_open_call_count, 1);

        let second = slow_trial().await;
        assert!(matches!(second, Err(BreakerError::HalfOpenSaturated { .. })));
        assert_eq!(max_running.load(Ordering::SeqCst), 1);

        // The abandoned trial's own success decides the episode
        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_timeout_is_recorded() {
        let cb = trial_breaker(Duration::from_millis(50));
        cb.trip();
        tokio::time::advance(Duration::from_millis(1000)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            cb.execute("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, &str>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(matches!(fail(&cb).await, BreakerError::HalfOpenSaturated { .. }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_timeout_reopens_and_late_result_is_ignored() {
        let cb = trial_breaker(Duration::from_millis(50));
        cb.trip();
        tokio::time::advance(Duration::from_millis(1000)).await;

        let err = cb
            .execute("slow", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let reopened = cb.snapshot();
        assert_eq!(reopened.state, CircuitState::Open);
        assert_eq!(
            reopened.next_attempt_time,
            Some(Instant::now() + Duration::from_millis(1000))
        );

        // Let the abandoned operation succeed late
        tokio::time::sleep(Duration::from_millis(300)).await;
        let after = cb.snapshot();
        assert_eq!(after.state, CircuitState::Open);
        assert_eq!(after.next_attempt_time, reopened.next_attempt_time);
        assert_eq!(after.total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_trip() {
        let cb = breaker(5);
        cb.trip();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(fail(&cb).await.is_rejection());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converts_into_service_error() {
        use crate::error::ErrorKind;

        let cb = breaker(1);
        let err: ServiceError = cb
            .execute("op", || async { Err::<(), _>(ServiceError::data("bad record")) })
            .await
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Data);

        let err: ServiceError = cb
            .execute("op", || async { Ok::<_, ServiceError>(()) })
            .await
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(err.retry_after().is_some());
    }
}
