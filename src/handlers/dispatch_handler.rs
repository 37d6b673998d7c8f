//! handlers/dispatch_handler.rs
use actix_web::{web, HttpResponse};

use crate::{
    errors::AppError,
    handlers::session::AuthenticatedUser,
    models::{
        audit_model::{AuditEvent, OperationKind},
        dispatch_model::DispatchRequest,
    },
    services::{
        audit_service::AuditSink, dispatch_service::DispatchService, rate_limiter::RateLimiter,
    },
};

/// POST /api/campaigns/dispatch
pub async fn dispatch_endpoint(
    user: AuthenticatedUser,
    rate_limiter: web::Data<RateLimiter>,
    dispatch_service: web::Data<DispatchService>,
    audit: web::Data<AuditSink>,
    body: web::Json<DispatchRequest>,
) -> Result<HttpResponse, AppError> {
    let requested = body.recipients.len() as i64;

    let cmd = match body.into_inner().validate() {
        Ok(cmd) => cmd,
        Err(e) => {
            audit.record(failure_event(&user.user_id, requested, &e));
            return Err(e);
        }
    };

    let decision = rate_limiter
        .check(&user.user_id, OperationKind::Dispatch)
        .await;
    if !decision.allowed {
        let e = AppError::RateLimitExceeded {
            retry_after: decision.retry_after.unwrap_or(1),
        };
        audit.record(failure_event(&user.user_id, requested, &e));
        return Err(e);
    }

    match dispatch_service.dispatch(&user.user_id, cmd).await {
        Ok(resp) => {
            audit.record(
                AuditEvent::new(&user.user_id, OperationKind::Dispatch, true)
                    .with_count("recipients", requested)
                    .with_count("sent", resp.sent_count as i64)
                    .with_count("failed", resp.failed_count as i64)
                    .with_count("batches", resp.metadata.batch_count as i64),
            );
            Ok(HttpResponse::Ok().json(resp))
        }
        Err(e) => {
            log::error!("(dispatch_endpoint) user={} error: {}", user.user_id, e);
            audit.record(failure_event(&user.user_id, requested, &e));
            Err(e)
        }
    }
}

fn failure_event(user_id: &str, requested: i64, e: &AppError) -> AuditEvent {
    AuditEvent::new(user_id, OperationKind::Dispatch, false)
        .with_count("recipients", requested)
        .with_detail(e.to_string())
}
