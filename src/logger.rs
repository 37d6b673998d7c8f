//! logger.rs
//! Inicialización del logger (env_logger detrás de la fachada `log`).

/// Lee RUST_LOG; si no existe usa "info" y silencia las trazas de queries de sqlx.
pub fn init_logger() {
    let log_env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_env))
        .format_timestamp_secs()
        .format_module_path(false)
        .init();
}
