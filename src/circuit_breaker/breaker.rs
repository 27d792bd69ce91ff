use super::builder::CircuitBreakerBuilder;
use super::clock::{Clock, SystemClock};
use super::listener::{CircuitBreakerListener, ListenerRegistry};
use super::types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Counters};
use crate::error::{BoxError, BreakerError, Result};
use crate::metrics::{self, CallOutcome, Timer};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lock-free circuit breaker guarding a single dependency.
///
/// Every method is non-blocking. State transitions are atomic swaps or
/// compare-and-swaps on a single state cell; the `Open -> HalfOpen` edge is a
/// CAS so that at most one caller holds the trial slot. Outcome recording is
/// not transactional across fields: a success and a failure recorded at the
/// same instant may interleave, which only happens when callers record
/// outcomes for calls the gate did not admit.
pub struct CircuitBreaker {
    /// Identifier used in logs, metrics and errors
    name: String,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    failure_threshold: u32,
    base_retry_timeout_ms: u64,
    max_retry_timeout_ms: u64,
    current_retry_timeout_ms: AtomicU64,
    /// 0 when no failure has been recorded since the last success
    last_failure_ms: AtomicU64,
    listeners: ListenerRegistry,
    counters: Counters,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new circuit breaker reading time from `clock`
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            retry_timeout_ms = config.retry_timeout_ms,
            max_retry_factor = config.max_retry_factor,
            "Creating circuit breaker"
        );

        metrics::record_circuit_breaker_state(&name, CircuitState::Closed);

        Ok(Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            failure_threshold: config.failure_threshold,
            base_retry_timeout_ms: config.retry_timeout_ms,
            max_retry_timeout_ms: config.max_retry_timeout_ms(),
            current_retry_timeout_ms: AtomicU64::new(config.retry_timeout_ms),
            last_failure_ms: AtomicU64::new(0),
            listeners: ListenerRegistry::new(),
            counters: Counters::default(),
            clock,
            name,
        })
    }

    /// Start a builder with default settings
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    /// Check if a request can proceed.
    ///
    /// When the circuit is open and the retry timeout has elapsed, exactly one
    /// caller wins the transition to half-open and is admitted as the trial request.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => {
                Counters::bump(&self.counters.allowed);
                true
            }
            CircuitState::HalfOpen => {
                self.reject("Trial request already in flight, rejecting request");
                false
            }
            CircuitState::Open => {
                let last_failure = self.last_failure_ms.load(Ordering::Acquire);
                let retry_timeout = self.current_retry_timeout_ms.load(Ordering::Acquire);
                let elapsed = self.clock.now_millis().saturating_sub(last_failure);

                if elapsed <= retry_timeout {
                    debug!(
                        breaker = %self.name,
                        remaining_ms = retry_timeout - elapsed,
                        "Circuit breaker open, rejecting request"
                    );
                    self.reject_quietly();
                    return false;
                }

                match self.state.compare_exchange(
                    CircuitState::Open as u8,
                    CircuitState::HalfOpen as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        info!(
                            breaker = %self.name,
                            retry_timeout_ms = retry_timeout,
                            "Circuit breaker transitioning to half-open"
                        );
                        Counters::bump(&self.counters.allowed);
                        self.transitioned(CircuitState::Open, CircuitState::HalfOpen);
                        true
                    }
                    Err(_) => {
                        self.reject("Lost the race for the trial slot, rejecting request");
                        false
                    }
                }
            }
        }
    }

    /// Record a successful request, closing the circuit and resetting backoff
    pub fn record_success(&self) {
        let previous =
            CircuitState::from_u8(self.state.swap(CircuitState::Closed as u8, Ordering::AcqRel));
        self.consecutive_failures.store(0, Ordering::Release);
        self.last_failure_ms.store(0, Ordering::Release);
        self.current_retry_timeout_ms
            .store(self.base_retry_timeout_ms, Ordering::Release);
        Counters::bump(&self.counters.successes);

        if previous != CircuitState::Closed {
            info!(
                breaker = %self.name,
                previous = %previous,
                "Circuit breaker closing"
            );
            self.transitioned(previous, CircuitState::Closed);
        }
    }

    /// Record a failed request.
    ///
    /// A failed trial request doubles the retry timeout (capped) and reopens the
    /// circuit; reaching the failure threshold opens it from any state.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_failure_ms
            .store(self.clock.now_millis(), Ordering::Release);
        Counters::bump(&self.counters.failures);

        debug!(
            breaker = %self.name,
            consecutive_failures = failures,
            threshold = self.failure_threshold,
            "Request failed"
        );

        if self.state() == CircuitState::HalfOpen {
            let retry_timeout_ms = self.grow_retry_timeout();
            warn!(
                breaker = %self.name,
                retry_timeout_ms,
                "Half-open trial request failed, reopening circuit"
            );
            self.open();
        }

        if failures >= u64::from(self.failure_threshold) {
            self.open();
        }
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Register a listener for state change notifications
    pub fn add_listener(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.listeners.add(listener);
        debug!(breaker = %self.name, listeners = self.listeners.len(), "Listener added");
    }

    /// Run `operation` through the breaker, falling back when the circuit
    /// rejects the call or the operation fails. Never returns an error.
    pub fn execute_with_fallback<T, E, F, G>(&self, operation: F, fallback: G) -> T
    where
        F: FnOnce() -> std::result::Result<T, E>,
        G: FnOnce() -> T,
        E: std::fmt::Display,
    {
        if !self.allow_request() {
            return fallback();
        }

        match self.invoke(operation) {
            Ok(result) => result,
            Err(e) => {
                debug!(breaker = %self.name, error = %e, "Operation failed, using fallback");
                fallback()
            }
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`BreakerError::Open`] when the circuit rejects the call and
    /// [`BreakerError::Execution`] wrapping the cause when the operation fails.
    pub fn execute<T, E, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        if !self.allow_request() {
            return Err(self.open_error());
        }

        self.invoke(operation)
            .map_err(|e| self.execution_error(e.into()))
    }

    /// Async counterpart of [`execute_with_fallback`](Self::execute_with_fallback)
    pub async fn call_with_fallback<T, E, F, Fut, G>(&self, operation: F, fallback: G) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        G: FnOnce() -> T,
        E: std::fmt::Display,
    {
        if !self.allow_request() {
            return fallback();
        }

        match self.invoke_async(operation).await {
            Ok(result) => result,
            Err(e) => {
                debug!(breaker = %self.name, error = %e, "Operation failed, using fallback");
                fallback()
            }
        }
    }

    /// Async counterpart of [`execute`](Self::execute)
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        if !self.allow_request() {
            return Err(self.open_error());
        }

        self.invoke_async(operation)
            .await
            .map_err(|e| self.execution_error(e.into()))
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failures recorded since the last success
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Current wait between the last failure and the next trial request
    pub fn current_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.current_retry_timeout_ms.load(Ordering::Acquire))
    }

    /// Consecutive failures that open the circuit
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
            current_retry_timeout_ms: self.current_retry_timeout_ms.load(Ordering::Acquire),
            allowed_requests: Counters::get(&self.counters.allowed),
            rejected_requests: Counters::get(&self.counters.rejected),
            successful_requests: Counters::get(&self.counters.successes),
            failed_requests: Counters::get(&self.counters.failures),
            circuit_opened_count: Counters::get(&self.counters.opened),
            circuit_half_opened_count: Counters::get(&self.counters.half_opened),
            circuit_closed_count: Counters::get(&self.counters.closed),
        }
    }

    /// Run an admitted operation and record its outcome.
    fn invoke<T, E, F>(&self, operation: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let pending = PendingCall::new(self);
        let outcome = operation();
        pending.settle(outcome)
    }

    async fn invoke_async<T, E, F, Fut>(&self, operation: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let pending = PendingCall::new(self);
        let outcome = operation().await;
        pending.settle(outcome)
    }

    /// Double the retry timeout, capped at the configured maximum.
    fn grow_retry_timeout(&self) -> u64 {
        let max = self.max_retry_timeout_ms;
        let grow = |current: u64| current.saturating_mul(2).min(max);
        let previous = self
            .current_retry_timeout_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(grow(current))
            })
            .unwrap_or_else(|current| current);
        grow(previous)
    }

    /// Swap to open, notifying only when the circuit was not already open.
    fn open(&self) {
        let previous =
            CircuitState::from_u8(self.state.swap(CircuitState::Open as u8, Ordering::AcqRel));
        if previous == CircuitState::Open {
            return;
        }

        warn!(
            breaker = %self.name,
            previous = %previous,
            consecutive_failures = self.consecutive_failures(),
            retry_timeout_ms = self.current_retry_timeout_ms.load(Ordering::Acquire),
            "Circuit breaker opening"
        );
        self.transitioned(previous, CircuitState::Open);
    }

    fn transitioned(&self, from: CircuitState, to: CircuitState) {
        let counter = match to {
            CircuitState::Open => &self.counters.opened,
            CircuitState::HalfOpen => &self.counters.half_opened,
            CircuitState::Closed => &self.counters.closed,
        };
        Counters::bump(counter);
        metrics::record_circuit_breaker_transition(&self.name, from, to);
        self.listeners.notify(&self.name, to);
    }

    fn reject(&self, reason: &'static str) {
        debug!(breaker = %self.name, "{}", reason);
        self.reject_quietly();
    }

    fn reject_quietly(&self) {
        Counters::bump(&self.counters.rejected);
        metrics::record_call(&self.name, CallOutcome::Rejected);
    }

    fn open_error(&self) -> BreakerError {
        BreakerError::Open {
            name: self.name.clone(),
            failure_threshold: self.failure_threshold,
            retry_after_ms: self.current_retry_timeout_ms.load(Ordering::Acquire),
        }
    }

    fn execution_error(&self, source: BoxError) -> BreakerError {
        BreakerError::Execution {
            name: self.name.clone(),
            state: self.state(),
            source,
        }
    }
}

/// An admitted call whose outcome has not been recorded yet.
///
/// Dropping it unsettled records a failure. That covers a panicking operation
/// and a future dropped mid-flight (timeout, `select!`, task abort), so the
/// trial slot is always released.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    timer: Option<Timer>,
}

impl<'a> PendingCall<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            timer: Some(Timer::new(&breaker.name)),
        }
    }

    fn settle<T, E>(mut self, outcome: std::result::Result<T, E>) -> std::result::Result<T, E> {
        let timer = self.timer.take();
        let result = match &outcome {
            Ok(_) => {
                self.breaker.record_success();
                CallOutcome::Success
            }
            Err(_) => {
                self.breaker.record_failure();
                CallOutcome::Failure
            }
        };
        if let Some(timer) = timer {
            timer.record(result);
        }
        outcome
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            warn!(
                breaker = %self.breaker.name,
                "Admitted call ended without an outcome, recording failure"
            );
            self.breaker.record_failure();
            timer.record(CallOutcome::Failure);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures())
            .field("failure_threshold", &self.failure_threshold)
            .field("current_retry_timeout", &self.current_retry_timeout())
            .field("listeners", &self.listeners)
            .finish()
    }
}
