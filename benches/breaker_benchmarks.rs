use breaker::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, ManualClock};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;

fn breaker(threshold: u32) -> CircuitBreaker {
    let config = CircuitBreakerConfig {
        failure_threshold: threshold,
        retry_timeout_ms: 1000,
        max_retry_factor: 8,
    };
    CircuitBreaker::with_clock("bench", config, Arc::new(ManualClock::new(0)))
        .expect("valid config")
}

fn benchmark_allow_request_closed(c: &mut Criterion) {
    let cb = breaker(5);
    c.bench_function("allow_request_closed", |b| {
        b.iter(|| black_box(cb.allow_request()))
    });
}

fn benchmark_allow_request_open(c: &mut Criterion) {
    let cb = breaker(1);
    cb.record_failure();
    c.bench_function("allow_request_open", |b| {
        b.iter(|| black_box(cb.allow_request()))
    });
}

fn benchmark_record_cycle(c: &mut Criterion) {
    let cb = breaker(1_000_000);
    c.bench_function("record_failure_then_success", |b| {
        b.iter(|| {
            cb.record_failure();
            cb.record_success();
        })
    });
}

fn benchmark_execute(c: &mut Criterion) {
    let cb = breaker(5);
    c.bench_function("execute_with_fallback_success", |b| {
        b.iter(|| {
            black_box(cb.execute_with_fallback(|| Ok::<_, String>(black_box(42u64)), || 0))
        })
    });
}

fn benchmark_contended_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_allow_request");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let cb = Arc::new(breaker(5));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let cb = cb.clone();
                        thread::spawn(move || {
                            for _ in 0..1_000 {
                                black_box(cb.allow_request());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().expect("bench thread panicked");
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_allow_request_closed,
    benchmark_allow_request_open,
    benchmark_record_cycle,
    benchmark_execute,
    benchmark_contended_gate
);
criterion_main!(benches);
