pub mod breaker;
pub mod builder;
pub mod clock;
pub mod listener;
pub mod types;

pub use breaker::CircuitBreaker;
pub use builder::CircuitBreakerBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use listener::{CircuitBreakerListener, TracingListener};
pub use types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
