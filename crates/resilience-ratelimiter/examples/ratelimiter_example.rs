//! Rate limiting example using cycle-based permit reservation.
//!
//! Run with: cargo run --example ratelimiter_example -p resilience-ratelimiter
//!
//! This example demonstrates:
//! - A basic limit-for-period configuration
//! - Runtime reconfiguration via `change_limit_for_period`
//! - Boundary behavior of the fixed-cycle algorithm

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Service, ServiceBuilder, ServiceExt};
use resilience_ratelimiter::{RateLimiterError, RateLimiterLayer};

#[tokio::main]
async fn main() {
    println!("=== Resilience Rate Limiter Demo ===\n");

    demo_basic_limiting().await;

    println!("\n{}\n", "=".repeat(50));

    demo_runtime_reconfiguration().await;

    println!("\n{}\n", "=".repeat(50));

    demo_boundary_behavior().await;
}

async fn demo_basic_limiting() {
    println!("1. BASIC CYCLE-BASED RATE LIMITING");
    println!("   Partitions time into fixed cycles; each cycle grants up to");
    println!("   `limit_for_period` permits.\n");

    let permit_count = Arc::new(AtomicUsize::new(0));
    let reject_count = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&permit_count);
    let r = Arc::clone(&reject_count);

    let layer = RateLimiterLayer::builder()
        .limit_for_period(5)
        .refresh_period(Duration::from_secs(1))
        .timeout_duration(Duration::from_millis(50))
        .name("basic-limiter")
        .on_permit_acquired(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        })
        .on_permit_rejected(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let service = tower::service_fn(|_req: ()| async { Ok::<_, std::convert::Infallible>("OK") });
    let mut svc = ServiceBuilder::new().layer(layer).service(service);

    println!("   Sending 8 requests (limit: 5 per second)...");
    for i in 1..=8 {
        match svc.ready().await.unwrap().call(()).await {
            Ok(_) => println!("   Request {}: permitted", i),
            Err(RateLimiterError::RequestNotPermitted { retry_after }) => {
                println!("   Request {}: rejected (retry after {:?})", i, retry_after)
            }
        }
    }

    println!(
        "\n   Result: {} permitted, {} rejected",
        permit_count.load(Ordering::SeqCst),
        reject_count.load(Ordering::SeqCst)
    );
}

async fn demo_runtime_reconfiguration() {
    println!("2. RUNTIME RECONFIGURATION");
    println!("   `change_limit_for_period` takes effect on the next reservation.\n");

    let layer = RateLimiterLayer::builder()
        .limit_for_period(1)
        .refresh_period(Duration::from_millis(200))
        .timeout_duration(Duration::ZERO)
        .name("reconfigurable-limiter")
        .build();

    let service = tower::service_fn(|_req: ()| async { Ok::<_, std::convert::Infallible>("OK") });
    let mut svc = ServiceBuilder::new().layer(layer).service(service);

    println!("   First request (limit 1):");
    match svc.ready().await.unwrap().call(()).await {
        Ok(_) => println!("   - permitted"),
        Err(_) => println!("   - rejected"),
    }
    match svc.ready().await.unwrap().call(()).await {
        Ok(_) => println!("   - permitted"),
        Err(_) => println!("   - rejected (expected, limit exhausted for the cycle)"),
    }
}

async fn demo_boundary_behavior() {
    println!("3. CYCLE BOUNDARY BEHAVIOR");
    println!("   Demonstrates that permits reset when a new cycle begins.\n");

    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);

    let layer = RateLimiterLayer::builder()
        .limit_for_period(5)
        .refresh_period(Duration::from_millis(200))
        .timeout_duration(Duration::from_millis(10))
        .build();

    let service = tower::service_fn(move |_req: ()| {
        c.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, std::convert::Infallible>("OK") }
    });
    let mut svc = ServiceBuilder::new().layer(layer).service(service);

    // Use all 5 permits
    for _ in 0..5 {
        let _ = svc.ready().await.unwrap().call(()).await;
    }
    println!("   - Used 5 permits");

    // Wait for the next cycle
    tokio::time::sleep(Duration::from_millis(210)).await;
    println!("   - Waited for cycle boundary (210ms)");

    // Try 5 more
    for _ in 0..5 {
        let _ = svc.ready().await.unwrap().call(()).await;
    }

    println!(
        "   - Total requests in ~210ms: {} (permits reset each cycle)",
        count.load(Ordering::SeqCst)
    );
}
