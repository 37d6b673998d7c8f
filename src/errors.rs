//! errors.rs
//! Taxonomía de errores de la app y su traducción a respuestas HTTP.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;

/// Detalle de validación por campo (se devuelve tal cual en el 400).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request")]
    Validation(Vec<FieldError>),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Message provider quota exceeded")]
    ProviderQuotaExceeded,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRequired => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } | AppError::ProviderQuotaExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            AppError::Validation(details) => builder.json(json!({
                "success": false,
                "error": self.to_string(),
                "details": details
            })),
            AppError::RateLimitExceeded { retry_after } => builder
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(json!({
                    "success": false,
                    "error": "Rate limit exceeded",
                    "retryAfter": retry_after
                })),
            AppError::Internal(e) => {
                // Nunca se devuelve el detalle al cliente, solo el id de correlación
                let correlation_id = uuid::Uuid::new_v4().to_string();
                log::error!("(error_response) correlation_id={} error={:?}", correlation_id, e);
                builder.json(json!({
                    "success": false,
                    "error": "Internal server error",
                    "correlationId": correlation_id
                }))
            }
            _ => builder.json(json!({
                "success": false,
                "error": self.to_string()
            })),
        }
    }
}

/// Errores del proveedor de envío (SMTP / API HTTP).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider call timed out after {0}s")]
    Timeout(u64),
}

impl ProviderError {
    /// Cuota y errores permanentes no se reintentan.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::Timeout(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, ProviderError::QuotaExceeded(_))
    }
}
