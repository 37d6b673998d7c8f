//! services/rate_limiter.rs
//! Control de admisión por (usuario, operación) con ventana fija.
//! El contador vive detrás de `RateLimitStore`: memoria del proceso o SQLite compartido.

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::config::app_config::{RateLimitConfig, RateLimitRule};
use crate::models::audit_model::OperationKind;

/// Estado de la ventana tras registrar un hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub window_start_ms: i64,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after: Option<u64>,
}

/// Incremento atómico "reset-si-expiró + sumar uno" para una clave.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, window: Duration, now_ms: i64) -> Result<WindowState>;
}

#[derive(Debug, Clone, Copy)]
struct MemoryWindow {
    state: WindowState,
    window_ms: i64,
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, MemoryWindow>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, now_ms: i64) -> Result<WindowState> {
        let window_ms = window.as_millis() as i64;
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("rate limit map poisoned"))?;

        // Las ventanas vencidas (cada una con su propio largo) se descartan de paso
        windows.retain(|_, w| now_ms - w.state.window_start_ms < w.window_ms);

        let entry = windows.entry(key.to_string()).or_insert(MemoryWindow {
            state: WindowState {
                window_start_ms: now_ms,
                count: 0,
            },
            window_ms,
        });
        if now_ms - entry.state.window_start_ms >= window_ms {
            entry.state.window_start_ms = now_ms;
            entry.state.count = 0;
        }
        entry.window_ms = window_ms;
        entry.state.count = entry.state.count.saturating_add(1);
        Ok(entry.state)
    }
}

/// Contador compartido entre instancias, un solo UPSERT atómico por hit.
pub struct SqliteRateLimitStore {
    db_pool: Pool<Sqlite>,
}

impl SqliteRateLimitStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, now_ms: i64) -> Result<WindowState> {
        let window_ms = window.as_millis() as i64;
        let (window_start_ms, count): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO rate_limit_windows (key, window_start, count)
            VALUES (?1, ?2, 1)
            ON CONFLICT(key) DO UPDATE SET
                count = CASE WHEN ?2 - rate_limit_windows.window_start >= ?3
                             THEN 1 ELSE rate_limit_windows.count + 1 END,
                window_start = CASE WHEN ?2 - rate_limit_windows.window_start >= ?3
                             THEN ?2 ELSE rate_limit_windows.window_start END
            RETURNING window_start, count
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .bind(window_ms)
        .fetch_one(&self.db_pool)
        .await
        .context("Error actualizando rate_limit_windows")?;

        Ok(WindowState {
            window_start_ms,
            count: u32::try_from(count).unwrap_or(u32::MAX),
        })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn rule_for(&self, operation: OperationKind) -> RateLimitRule {
        match operation {
            OperationKind::Dispatch => self.config.dispatch,
            OperationKind::Analytics => self.config.analytics,
        }
    }

    pub async fn check(&self, user_id: &str, operation: OperationKind) -> RateLimitDecision {
        self.check_at(user_id, operation, Utc::now().timestamp_millis())
            .await
    }

    /// Nunca falla: si el store no responde se deja pasar la petición.
    pub async fn check_at(
        &self,
        user_id: &str,
        operation: OperationKind,
        now_ms: i64,
    ) -> RateLimitDecision {
        let rule = self.rule_for(operation);
        let key = format!("{}:{}", user_id, operation.as_str());

        match self.store.hit(&key, rule.window, now_ms).await {
            Ok(state) if state.count <= rule.max_requests => RateLimitDecision {
                allowed: true,
                retry_after: None,
            },
            Ok(state) => {
                let window_end = state.window_start_ms + rule.window.as_millis() as i64;
                let remaining_ms = (window_end - now_ms).max(0) as u64;
                let retry_after = remaining_ms.div_ceil(1000).max(1);
                log::warn!(
                    "(rate_limiter) key={} count={} limit={} retry_after={}s",
                    key,
                    state.count,
                    rule.max_requests,
                    retry_after
                );
                RateLimitDecision {
                    allowed: false,
                    retry_after: Some(retry_after),
                }
            }
            Err(e) => {
                log::error!("(rate_limiter) store error for key={}: {:?}", key, e);
                RateLimitDecision {
                    allowed: true,
                    retry_after: None,
                }
            }
        }
    }
}
