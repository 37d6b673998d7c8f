//! config/mod.rs
//! Configuración de la app (entorno, límites, proveedor).

pub mod app_config;
