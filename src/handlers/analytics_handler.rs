//! handlers/analytics_handler.rs
use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::{
    errors::AppError,
    handlers::session::AuthenticatedUser,
    models::{
        analytics_model::{AnalyticsQuery, DateRange},
        audit_model::{AuditEvent, OperationKind},
    },
    services::{
        analytics_service::AnalyticsService, audit_service::AuditSink, rate_limiter::RateLimiter,
    },
};

/// GET /api/analytics?timeRange=7d|30d|90d&startDate=&endDate=&campaignId=&includeAdvanced=
pub async fn analytics_endpoint(
    user: AuthenticatedUser,
    rate_limiter: web::Data<RateLimiter>,
    analytics_service: web::Data<AnalyticsService>,
    audit: web::Data<AuditSink>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    let range = match DateRange::resolve(&query, Utc::now()) {
        Ok(range) => range,
        Err(e) => {
            audit.record(
                AuditEvent::new(&user.user_id, OperationKind::Analytics, false)
                    .with_detail(e.to_string()),
            );
            return Err(e);
        }
    };

    let decision = rate_limiter
        .check(&user.user_id, OperationKind::Analytics)
        .await;
    if !decision.allowed {
        let e = AppError::RateLimitExceeded {
            retry_after: decision.retry_after.unwrap_or(1),
        };
        audit.record(
            AuditEvent::new(&user.user_id, OperationKind::Analytics, false).with_detail(e.to_string()),
        );
        return Err(e);
    }

    match analytics_service
        .analytics(&user.user_id, &query, range)
        .await
    {
        Ok(resp) => {
            audit.record(
                AuditEvent::new(&user.user_id, OperationKind::Analytics, true)
                    .with_count("campaigns", resp.overview.total_campaigns as i64)
                    .with_count("sent", resp.overview.sent_messages as i64)
                    .with_count("days", resp.time_series_data.len() as i64),
            );
            Ok(HttpResponse::Ok().json(resp))
        }
        Err(e) => {
            log::error!("(analytics_endpoint) user={} error: {}", user.user_id, e);
            audit.record(
                AuditEvent::new(&user.user_id, OperationKind::Analytics, false)
                    .with_detail(e.to_string()),
            );
            Err(e)
        }
    }
}

/// GET /api/health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
