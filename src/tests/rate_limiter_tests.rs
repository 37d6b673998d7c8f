//! tests/rate_limiter_tests.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::future::join_all;

use crate::config::app_config::{RateLimitBackend, RateLimitConfig, RateLimitRule};
use crate::models::audit_model::OperationKind;
use crate::services::rate_limiter::{
    MemoryRateLimitStore, RateLimitStore, RateLimiter, SqliteRateLimitStore, WindowState,
};
use crate::tests::support::test_store;

const T0: i64 = 1_700_000_000_000;

fn config(dispatch_max: u32) -> RateLimitConfig {
    RateLimitConfig {
        dispatch: RateLimitRule {
            max_requests: dispatch_max,
            window: Duration::from_secs(3600),
        },
        analytics: RateLimitRule {
            max_requests: 2,
            window: Duration::from_secs(60),
        },
        backend: RateLimitBackend::Memory,
    }
}

fn memory_limiter(dispatch_max: u32) -> RateLimiter {
    RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), config(dispatch_max))
}

async fn exhaust_then_deny(limiter: &RateLimiter) {
    for i in 0..3 {
        let d = limiter
            .check_at("u1", OperationKind::Dispatch, T0 + i * 1000)
            .await;
        assert!(d.allowed, "request {} should be admitted", i + 1);
        assert_eq!(d.retry_after, None);
    }

    let denied = limiter
        .check_at("u1", OperationKind::Dispatch, T0 + 3000)
        .await;
    assert!(!denied.allowed);
    // La ventana empezó en T0 y dura 3600s
    assert_eq!(denied.retry_after, Some(3597));
}

#[actix_rt::test]
async fn memory_store_denies_over_limit() {
    exhaust_then_deny(&memory_limiter(3)).await;
}

#[actix_rt::test]
async fn sqlite_store_denies_over_limit() {
    let store = test_store().await;
    let limiter = RateLimiter::new(
        Arc::new(SqliteRateLimitStore::new(store.pool().clone())),
        config(3),
    );
    exhaust_then_deny(&limiter).await;
}

#[actix_rt::test]
async fn window_rolls_over() {
    let limiter = memory_limiter(1);
    assert!(limiter.check_at("u1", OperationKind::Dispatch, T0).await.allowed);
    assert!(!limiter.check_at("u1", OperationKind::Dispatch, T0 + 10).await.allowed);

    let next_window = T0 + 3_600_000;
    assert!(
        limiter
            .check_at("u1", OperationKind::Dispatch, next_window)
            .await
            .allowed
    );
}

#[actix_rt::test]
async fn sqlite_window_rolls_over() {
    let store = test_store().await;
    let limiter = RateLimiter::new(
        Arc::new(SqliteRateLimitStore::new(store.pool().clone())),
        config(1),
    );
    assert!(limiter.check_at("u1", OperationKind::Dispatch, T0).await.allowed);
    assert!(!limiter.check_at("u1", OperationKind::Dispatch, T0 + 10).await.allowed);
    assert!(
        limiter
            .check_at("u1", OperationKind::Dispatch, T0 + 3_600_000)
            .await
            .allowed
    );
}

#[actix_rt::test]
async fn keys_are_independent_per_user_and_operation() {
    let limiter = memory_limiter(1);
    assert!(limiter.check_at("u1", OperationKind::Dispatch, T0).await.allowed);
    assert!(!limiter.check_at("u1", OperationKind::Dispatch, T0).await.allowed);

    assert!(limiter.check_at("u2", OperationKind::Dispatch, T0).await.allowed);
    assert!(limiter.check_at("u1", OperationKind::Analytics, T0).await.allowed);
}

#[actix_rt::test]
async fn retry_after_rounds_up_to_one_second() {
    let limiter = memory_limiter(1);
    limiter.check_at("u1", OperationKind::Dispatch, T0).await;

    let d = limiter
        .check_at("u1", OperationKind::Dispatch, T0 + 3_599_500)
        .await;
    assert!(!d.allowed);
    assert_eq!(d.retry_after, Some(1));
}

#[actix_rt::test]
async fn short_window_does_not_expire_long_window() {
    let limiter = memory_limiter(1);
    assert!(limiter.check_at("u1", OperationKind::Dispatch, T0).await.allowed);

    // Una ventana de analytics (60s) más tarde no debe borrar el contador de dispatch (3600s)
    let later = T0 + 120_000;
    assert!(limiter.check_at("u1", OperationKind::Analytics, later).await.allowed);
    assert!(!limiter.check_at("u1", OperationKind::Dispatch, later).await.allowed);
}

/// 50 llamadas simultáneas sobre la misma clave con límite 10: entran exactamente 10.
async fn concurrent_hits_admit_exactly_limit(limiter: &RateLimiter) {
    let checks = (0..50).map(|i| limiter.check_at("u1", OperationKind::Dispatch, T0 + i));
    let decisions = join_all(checks).await;

    let admitted = decisions.iter().filter(|d| d.allowed).count();
    assert_eq!(admitted, 10);
    assert!(decisions
        .iter()
        .filter(|d| !d.allowed)
        .all(|d| d.retry_after.is_some()));
}

#[actix_rt::test]
async fn memory_store_is_exact_under_concurrent_calls() {
    concurrent_hits_admit_exactly_limit(&memory_limiter(10)).await;
}

#[actix_rt::test]
async fn sqlite_store_is_exact_under_concurrent_calls() {
    let store = test_store().await;
    let limiter = RateLimiter::new(
        Arc::new(SqliteRateLimitStore::new(store.pool().clone())),
        config(10),
    );
    concurrent_hits_admit_exactly_limit(&limiter).await;
}

#[test]
fn memory_store_is_exact_across_threads() {
    let store = Arc::new(MemoryRateLimitStore::new());
    let limiter = RateLimiter::new(store, config(10));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let limiter = limiter.clone();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let mut admitted = 0;
                    for i in 0..10 {
                        let d = limiter
                            .check_at("u1", OperationKind::Dispatch, T0 + t * 10 + i)
                            .await;
                        if d.allowed {
                            admitted += 1;
                        }
                    }
                    admitted
                })
            })
        })
        .collect();

    let admitted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 10);
}

struct BrokenStore;

#[async_trait]
impl RateLimitStore for BrokenStore {
    async fn hit(&self, _key: &str, _window: Duration, _now_ms: i64) -> anyhow::Result<WindowState> {
        Err(anyhow!("store unavailable"))
    }
}

#[actix_rt::test]
async fn store_failure_admits_request() {
    let limiter = RateLimiter::new(Arc::new(BrokenStore), config(1));
    for _ in 0..5 {
        assert!(limiter.check("u1", OperationKind::Dispatch).await.allowed);
    }
}
