//! config/app_config.rs
//! Configuración global de la app, leída de variables de entorno (.env).

use std::{env, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};

use crate::services::audit_service::DEFAULT_AUDIT_QUEUE_CAPACITY;

/// Configuración completa del proceso.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub http_workers: usize,
    pub database_url: String,
    pub provider: ProviderConfig,
    pub rate_limits: RateLimitConfig,
    pub analytics: AnalyticsConfig,
    pub audit_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Smtp {
        host: String,
        port: u16,
        user: String,
        pass: String,
        timeout: Duration,
    },
    Http {
        base_url: String,
        api_key: String,
        timeout: Duration,
    },
}

/// Límite por (usuario, operación) con ventana fija.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub dispatch: RateLimitRule,
    pub analytics: RateLimitRule,
    pub backend: RateLimitBackend,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            dispatch: RateLimitRule {
                max_requests: 10,
                window: Duration::from_secs(3600),
            },
            analytics: RateLimitRule {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
            backend: RateLimitBackend::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyticsConfig {
    /// Mejora relativa fija que se proyecta en "predictive analytics".
    /// No hay modelo detrás: es una heurística con nombre propio.
    pub heuristic_improvement_factor: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            heuristic_improvement_factor: 0.05,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let provider = match var_or("MAIL_PROVIDER", "smtp").as_str() {
            "smtp" => ProviderConfig::Smtp {
                host: required("SMTP_HOST")?,
                port: parse_or("SMTP_PORT", 587)?,
                user: required("SMTP_USER")?,
                pass: required("SMTP_PASS")?,
                timeout: Duration::from_secs(parse_or("MAIL_SEND_TIMEOUT_SECS", 30)?),
            },
            "http" => ProviderConfig::Http {
                base_url: required("MAIL_API_URL")?,
                api_key: required("MAIL_API_KEY")?,
                timeout: Duration::from_secs(parse_or("MAIL_SEND_TIMEOUT_SECS", 30)?),
            },
            other => return Err(anyhow!("MAIL_PROVIDER desconocido: {}", other)),
        };

        let backend = match var_or("RATE_LIMIT_STORE", "memory").as_str() {
            "memory" => RateLimitBackend::Memory,
            "sqlite" => RateLimitBackend::Sqlite,
            other => return Err(anyhow!("RATE_LIMIT_STORE desconocido: {}", other)),
        };

        let rate_limits = RateLimitConfig {
            dispatch: RateLimitRule {
                max_requests: parse_or("RATE_LIMIT_DISPATCH_MAX", 10)?,
                window: Duration::from_secs(parse_or("RATE_LIMIT_DISPATCH_WINDOW_SECS", 3600)?),
            },
            analytics: RateLimitRule {
                max_requests: parse_or("RATE_LIMIT_ANALYTICS_MAX", 60)?,
                window: Duration::from_secs(parse_or("RATE_LIMIT_ANALYTICS_WINDOW_SECS", 60)?),
            },
            backend,
        };

        let factor: f64 = parse_or("PREDICTIVE_IMPROVEMENT_FACTOR", 0.05)?;
        if !(0.0..=1.0).contains(&factor) {
            return Err(anyhow!(
                "PREDICTIVE_IMPROVEMENT_FACTOR fuera de rango [0, 1]: {}",
                factor
            ));
        }

        Ok(AppConfig {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0"),
            port: parse_or("PORT", 5022)?,
            http_workers: parse_or("HTTP_WORKERS", 1)?,
            database_url: var_or("DATABASE_URL", "sqlite:data/outreach.db"),
            provider,
            rate_limits,
            analytics: AnalyticsConfig {
                heuristic_improvement_factor: factor,
            },
            audit_queue_capacity: parse_or(
                "AUDIT_QUEUE_CAPACITY",
                DEFAULT_AUDIT_QUEUE_CAPACITY,
            )?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("No se definió {}", key))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
