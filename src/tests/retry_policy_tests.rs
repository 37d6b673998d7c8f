//! tests/retry_policy_tests.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::services::retry_policy::RetryPolicy;

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

#[actix_rt::test]
async fn retries_until_success() {
    let calls = AtomicU32::new(0);

    let result: Result<&str, ProviderError> = fast_policy()
        .execute(
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(ProviderError::Transient("connection reset".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            },
            |e: &ProviderError, _| e.is_retryable(),
        )
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[actix_rt::test]
async fn non_retryable_error_stops_after_first_attempt() {
    let calls = AtomicU32::new(0);

    let result: Result<(), ProviderError> = fast_policy()
        .execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Permanent("mailbox does not exist".to_string())) }
            },
            |e: &ProviderError, _| e.is_retryable(),
        )
        .await;

    assert!(matches!(result, Err(ProviderError::Permanent(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[actix_rt::test]
async fn gives_up_after_max_attempts_with_last_error() {
    let calls = AtomicU32::new(0);

    let result: Result<(), ProviderError> = fast_policy()
        .execute_always(|attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ProviderError::Transient(format!("attempt {}", attempt))) }
        })
        .await;

    assert_eq!(result, Err(ProviderError::Transient("attempt 3".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[actix_rt::test]
async fn predicate_sees_attempt_number() {
    let calls = AtomicU32::new(0);

    // Solo se permite reintentar después del primer intento
    let result: Result<(), ProviderError> = fast_policy()
        .execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout(30)) }
            },
            |_, attempt| attempt < 2,
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn backoff_doubles_from_base_delay() {
    let policy = RetryPolicy::new(3, Duration::from_millis(1000));
    assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
    assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
    assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
}

#[test]
fn named_policies_and_minimum_attempts() {
    let sends = RetryPolicy::for_provider_sends();
    assert_eq!(sends.max_attempts(), 3);
    assert_eq!(sends.backoff_for(1), Duration::from_millis(2000));

    let queries = RetryPolicy::for_queries();
    assert_eq!(queries.max_attempts(), 3);
    assert_eq!(queries.backoff_for(1), Duration::from_millis(1000));

    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
}
