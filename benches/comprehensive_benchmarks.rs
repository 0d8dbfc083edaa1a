//! Worst-case scenario and composition benchmarks for the resilience patterns.

use criterion::{Criterion, criterion_group, criterion_main};
use futures::future::BoxFuture;
use std::hint::black_box;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};
use resilience_bulkhead::{BulkheadError, BulkheadLayer};
use resilience_circuitbreaker::CircuitBreakerLayer;
use resilience_ratelimiter::RateLimiterLayer;
use resilience_retry::RetryLayer;
use resilience_timelimiter::TimeLimiterLayer;

#[derive(Clone, Debug)]
struct TestRequest(u64);

#[derive(Clone, Debug)]
struct TestResponse(#[allow(dead_code)] u64);

#[derive(Clone, Debug)]
struct TestError;

impl From<BulkheadError> for TestError {
    fn from(_: BulkheadError) -> Self {
        TestError
    }
}

// Baseline service
#[derive(Clone)]
struct BaselineService;

impl Service<TestRequest> for BaselineService {
    type Response = TestResponse;
    type Error = TestError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TestRequest) -> Self::Future {
        Box::pin(async move { Ok(TestResponse(req.0)) })
    }
}

// ============================================================================
// Worst-Case Scenario Benchmarks
// ============================================================================

fn bench_circuit_breaker_open(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("worst_case_circuit_breaker_open", |b| {
        b.to_async(&runtime).iter(|| async {
            let layer = CircuitBreakerLayer::<TestResponse, TestError>::builder()
                .failure_rate_threshold(0.0) // Open immediately on any failure
                .ring_buffer_size_in_closed_state(10)
                .build();

            let mut service = layer.layer(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

fn bench_bulkhead_full(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("worst_case_bulkhead_full", |b| {
        b.to_async(&runtime).iter(|| async {
            let config = BulkheadLayer::builder()
                .max_concurrent_calls(1) // Very limited
                .max_wait_duration(Duration::from_millis(1)) // Short timeout
                .build();

            let mut service = ServiceBuilder::new().layer(config).service(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

fn bench_rate_limiter_exhausted(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("worst_case_rate_limiter_exhausted", |b| {
        b.to_async(&runtime).iter(|| async {
            let layer = RateLimiterLayer::builder()
                .limit_for_period(1) // Very limited
                .refresh_period(Duration::from_secs(60)) // Long refresh
                .timeout_duration(Duration::from_millis(1)) // Short timeout
                .build();

            let mut service = layer.layer(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

fn bench_retry_exhausted(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("worst_case_retry_exhausted", |b| {
        b.to_async(&runtime).iter(|| async {
            let layer = RetryLayer::<TestRequest, TestError>::builder()
                .max_attempts(1) // No retries
                .fixed_backoff(Duration::from_millis(1))
                .build();

            let mut service = layer.layer(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

fn bench_timelimiter_timeout(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("worst_case_timelimiter_completes_quickly", |b| {
        b.to_async(&runtime).iter(|| async {
            let layer = TimeLimiterLayer::<TestRequest>::builder()
                .timeout_duration(Duration::from_millis(1)) // Very short
                .cancel_running_future(true)
                .build();

            let mut service = layer.layer(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

// ============================================================================
// Pattern Composition Benchmarks
// ============================================================================

fn bench_full_stack_composition(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("composition_three_layers", |b| {
        b.to_async(&runtime).iter(|| async {
            let bh_layer = BulkheadLayer::builder().max_concurrent_calls(100).build();

            let rl_layer = RateLimiterLayer::builder()
                .limit_for_period(1000)
                .refresh_period(Duration::from_secs(1))
                .build();

            let tl_layer = TimeLimiterLayer::<TestRequest>::builder()
                .timeout_duration(Duration::from_secs(30))
                .build();

            let mut service = ServiceBuilder::new()
                .layer(tl_layer)
                .layer(rl_layer)
                .layer(bh_layer)
                .service(BaselineService);

            let response = service
                .ready()
                .await
                .unwrap()
                .call(black_box(TestRequest(42)))
                .await;
            black_box(response)
        });
    });
}

criterion_group!(
    worst_case_benches,
    bench_circuit_breaker_open,
    bench_bulkhead_full,
    bench_rate_limiter_exhausted,
    bench_retry_exhausted,
    bench_timelimiter_timeout,
);

criterion_group!(composition_benches, bench_full_stack_composition,);

criterion_main!(worst_case_benches, composition_benches);
