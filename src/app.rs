//! app.rs
use actix_web::{error, web, HttpRequest};

use crate::errors::{AppError, FieldError};
use crate::handlers::{analytics_handler, dispatch_handler};

/// Límite del body JSON: 100 destinatarios + plantilla de 10k chars caben de sobra.
const JSON_BODY_LIMIT: usize = 256 * 1024;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(json_error_handler),
    )
    .app_data(web::QueryConfig::default().error_handler(query_error_handler))
    .service(
        web::scope("/api")
            .route("/health", web::get().to(analytics_handler::health_endpoint))
            .route(
                "/analytics",
                web::get().to(analytics_handler::analytics_endpoint),
            )
            .service(web::scope("/campaigns").route(
                "/dispatch",
                web::post().to(dispatch_handler::dispatch_endpoint),
            )),
    );
}

/// JSON mal formado => 400 con el mismo formato que el resto de validaciones.
fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> error::Error {
    AppError::Validation(vec![FieldError::new("body", err.to_string())]).into()
}

fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> error::Error {
    AppError::Validation(vec![FieldError::new("query", err.to_string())]).into()
}
