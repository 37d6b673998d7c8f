//! services/retry_policy.rs
//! Reintentos acotados con backoff exponencial: `base * 2^(intento-1)`.

use std::{future::Future, time::Duration};

/// Política de reintentos inyectable (envío de lotes, consultas de analytics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 3 intentos, 2000ms base.
    pub fn for_provider_sends() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }

    /// 3 intentos, 1000ms base.
    pub fn for_queries() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }

    #[cfg(test)]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Espera antes del reintento que sigue al intento `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Ejecuta `operation`, reintentando mientras `is_retryable(err, intento)` lo permita.
    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E, u32) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.max_attempts || !is_retryable(&e, attempt) {
                        log::warn!(
                            "(retry_policy) giving up after attempt {}/{}: {}",
                            attempt,
                            self.max_attempts,
                            e
                        );
                        return Err(e);
                    }
                    let wait = self.backoff_for(attempt);
                    log::info!(
                        "(retry_policy) attempt {}/{} failed: {}. Retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        e,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Variante con el predicado por defecto (todo error es reintentable).
    pub async fn execute_always<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute(operation, |_, _| true).await
    }
}
