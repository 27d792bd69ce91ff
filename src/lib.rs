pub mod circuit_breaker;
pub mod config;
pub mod demo;
pub mod error;
pub mod metrics;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, CircuitBreakerListener,
    CircuitState,
};
pub use error::{BreakerError, Result};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "breaker=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
