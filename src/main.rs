use std::{str::FromStr, sync::Arc};

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::config::app_config::{AppConfig, RateLimitBackend};
use crate::logger::init_logger;
use crate::services::analytics_service::AnalyticsService;
use crate::services::audit_service::AuditSink;
use crate::services::campaign_store::CampaignStore;
use crate::services::dispatch_service::DispatchService;
use crate::services::provider_service::build_provider;
use crate::services::rate_limiter::{
    MemoryRateLimitStore, RateLimitStore, RateLimiter, SqliteRateLimitStore,
};
use crate::services::retry_policy::RetryPolicy;

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    // Crear la carpeta del archivo si es una ruta local (sqlite:data/outreach.db)
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !path.starts_with(":memory:") {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
            }
        }
    }

    log::info!("Conectando a SQLite en {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("DATABASE_URL inválida: {}", database_url))?
        .create_if_missing(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env().context("Configuración inválida")?;

    let db_pool = setup_database(&config.database_url).await?;

    let store = CampaignStore::new(db_pool);
    store.run_migrations().await?;

    let provider = build_provider(&config.provider)?;

    let limiter_store: Arc<dyn RateLimitStore> = match config.rate_limits.backend {
        RateLimitBackend::Memory => Arc::new(MemoryRateLimitStore::new()),
        RateLimitBackend::Sqlite => Arc::new(SqliteRateLimitStore::new(store.pool().clone())),
    };
    log::info!(
        "Rate limits: dispatch={}/{}s analytics={}/{}s store={:?}",
        config.rate_limits.dispatch.max_requests,
        config.rate_limits.dispatch.window.as_secs(),
        config.rate_limits.analytics.max_requests,
        config.rate_limits.analytics.window.as_secs(),
        config.rate_limits.backend
    );
    let rate_limiter = RateLimiter::new(limiter_store, config.rate_limits.clone());

    let audit_sink = AuditSink::spawn(store.clone(), config.audit_queue_capacity);

    let dispatch_service = DispatchService::new(
        provider,
        store.clone(),
        RetryPolicy::for_provider_sends(),
    );
    let analytics_service = AnalyticsService::new(
        store.clone(),
        RetryPolicy::for_queries(),
        config.analytics,
    );

    log::info!(
        "Levantando servidor en {}:{} ({} workers)",
        config.bind_addr,
        config.port,
        config.http_workers
    );
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(rate_limiter.clone()))
            .app_data(web::Data::new(audit_sink.clone()))
            .app_data(web::Data::new(dispatch_service.clone()))
            .app_data(web::Data::new(analytics_service.clone()))
            .configure(app::init_app)
    })
    .workers(config.http_workers)
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
