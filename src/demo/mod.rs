//! Concurrent workload driver.
//!
//! Spawns a set of callers that share one breaker and hit a simulated
//! dependency failing at a configured rate.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::config::DemoConfig;
use crate::error::{BreakerError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Outcome of a demo run
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    /// Breaker name
    pub breaker: String,
    /// Calls answered by the dependency
    pub served: u64,
    /// Calls answered by the fallback
    pub fallbacks: u64,
    /// Breaker counters after the run
    pub metrics: CircuitBreakerMetrics,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated dependency failure on request {0}")]
struct SimulatedFailure(usize);

/// Drive `config.workers` concurrent callers through `breaker`.
pub async fn run(config: &DemoConfig, breaker: Arc<CircuitBreaker>) -> Result<DemoReport> {
    info!(
        breaker = %breaker.name(),
        workers = config.workers,
        requests = config.requests,
        failure_rate = config.failure_rate,
        "Starting demo workload"
    );

    let served = Arc::new(AtomicU64::new(0));
    let fallbacks = Arc::new(AtomicU64::new(0));
    let mut tasks = JoinSet::new();

    for worker in 0..config.workers {
        let breaker = breaker.clone();
        let served = served.clone();
        let fallbacks = fallbacks.clone();
        let config = config.clone();

        tasks.spawn(async move {
            for i in 0..config.requests {
                let request = worker * config.requests + i;
                let fails = rand::random::<f64>() < config.failure_rate;
                let work = Duration::from_millis(config.work_ms);

                let answered_by_dependency = breaker
                    .call_with_fallback(
                        || async move {
                            tokio::time::sleep(work).await;
                            if fails {
                                Err(SimulatedFailure(request))
                            } else {
                                Ok(true)
                            }
                        },
                        || false,
                    )
                    .await;

                if answered_by_dependency {
                    served.fetch_add(1, Ordering::Relaxed);
                } else {
                    fallbacks.fetch_add(1, Ordering::Relaxed);
                }

                debug!(
                    worker,
                    request,
                    served = answered_by_dependency,
                    state = %breaker.state(),
                    "Request finished"
                );

                tokio::time::sleep(Duration::from_millis(config.request_interval_ms)).await;
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| BreakerError::Internal(format!("Demo worker failed: {}", e)))?;
    }

    let report = DemoReport {
        breaker: breaker.name().to_string(),
        served: served.load(Ordering::Relaxed),
        fallbacks: fallbacks.load(Ordering::Relaxed),
        metrics: breaker.metrics(),
    };

    info!(
        breaker = %report.breaker,
        served = report.served,
        fallbacks = report.fallbacks,
        state = %report.metrics.state,
        "Demo workload complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};

    fn quick(workers: usize, requests: usize, failure_rate: f64) -> DemoConfig {
        DemoConfig {
            workers,
            requests,
            failure_rate,
            request_interval_ms: 1,
            work_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_healthy_dependency_serves_everything() {
        let breaker = Arc::new(
            CircuitBreaker::new("healthy", CircuitBreakerConfig::default()).unwrap(),
        );
        let report = run(&quick(4, 5, 0.0), breaker).await.unwrap();

        assert_eq!(report.served, 20);
        assert_eq!(report.fallbacks, 0);
        assert_eq!(report.metrics.state, CircuitState::Closed);
        assert_eq!(report.metrics.successful_requests, 20);
    }

    #[tokio::test]
    async fn test_failing_dependency_opens_circuit() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            retry_timeout_ms: 60_000,
            max_retry_factor: 1,
        };
        let breaker = Arc::new(CircuitBreaker::new("failing", config).unwrap());
        let report = run(&quick(2, 10, 1.0), breaker).await.unwrap();

        assert_eq!(report.served, 0);
        assert_eq!(report.fallbacks, 20);
        assert_eq!(report.metrics.state, CircuitState::Open);
        assert_eq!(report.metrics.circuit_opened_count, 1);
        assert!(report.metrics.rejected_requests > 0);
    }
}
