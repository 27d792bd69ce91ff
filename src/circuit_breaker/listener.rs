use super::types::CircuitState;
use arc_swap::ArcSwap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// Receives circuit breaker state change notifications.
///
/// Callbacks run synchronously on the thread that triggered the transition
/// and may be invoked concurrently. A panicking callback is caught and logged;
/// it never changes the breaker's state or the caller's result.
pub trait CircuitBreakerListener: Send + Sync {
    /// The circuit opened and is now rejecting requests
    fn on_open(&self) {}

    /// The retry timeout elapsed and a single trial request was admitted
    fn on_half_open(&self) {}

    /// A request succeeded and the circuit closed
    fn on_close(&self) {}
}

/// Listener that logs every transition for one breaker.
#[derive(Debug, Clone)]
pub struct TracingListener {
    breaker: String,
}

impl TracingListener {
    pub fn new(breaker: impl Into<String>) -> Self {
        Self {
            breaker: breaker.into(),
        }
    }
}

impl CircuitBreakerListener for TracingListener {
    fn on_open(&self) {
        info!(breaker = %self.breaker, "Listener notified: circuit opened");
    }

    fn on_half_open(&self) {
        info!(breaker = %self.breaker, "Listener notified: circuit half-open");
    }

    fn on_close(&self) {
        info!(breaker = %self.breaker, "Listener notified: circuit closed");
    }
}

/// Append-only, copy-on-write listener list.
pub(crate) struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn CircuitBreakerListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(listener.clone());
            next
        });
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Deliver the notification matching `state` to every registered listener.
    pub fn notify(&self, breaker: &str, state: CircuitState) {
        let listeners = self.listeners.load_full();
        for listener in listeners.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match state {
                CircuitState::Open => listener.on_open(),
                CircuitState::HalfOpen => listener.on_half_open(),
                CircuitState::Closed => listener.on_close(),
            }));

            if let Err(payload) = outcome {
                error!(
                    breaker = %breaker,
                    state = %state,
                    error = %panic_message(payload.as_ref()),
                    "Listener panicked during state change notification"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        opened: AtomicU32,
        half_opened: AtomicU32,
        closed: AtomicU32,
    }

    impl CircuitBreakerListener for Recorder {
        fn on_open(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn on_half_open(&self) {
            self.half_opened.fetch_add(1, Ordering::SeqCst);
        }

        fn on_close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl CircuitBreakerListener for Panicking {
        fn on_open(&self) {
            panic!("listener exploded");
        }
    }

    #[test]
    fn test_notify_dispatches_by_state() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add(recorder.clone());

        registry.notify("test", CircuitState::Open);
        registry.notify("test", CircuitState::HalfOpen);
        registry.notify("test", CircuitState::Closed);
        registry.notify("test", CircuitState::Closed);

        assert_eq!(recorder.opened.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.half_opened.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add(Arc::new(Panicking));
        registry.add(recorder.clone());

        registry.notify("test", CircuitState::Open);

        assert_eq!(registry.len(), 2);
        assert_eq!(recorder.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(ListenerRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.add(Arc::new(TracingListener::new("test")));
                        registry.notify("test", CircuitState::Closed);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
