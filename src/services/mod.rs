//! services/mod.rs
//! Módulo que agrupa los "servicios" o capas de negocio de la app.

pub mod analytics_engine;
pub mod analytics_service;
pub mod audit_service;
pub mod campaign_store;
pub mod dispatch_service;
pub mod provider_service;
pub mod rate_limiter;
pub mod retry_policy;
