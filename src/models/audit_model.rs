//! models/audit_model.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Dispatch,
    Analytics,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Dispatch => "dispatch",
            OperationKind::Analytics => "analytics",
        }
    }
}

/// Evento append-only; nunca se modifica ni se borra.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub user_id: String,
    pub operation: OperationKind,
    pub success: bool,
    pub counts: BTreeMap<String, i64>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(user_id: &str, operation: OperationKind, success: bool) -> Self {
        AuditEvent {
            user_id: user_id.to_string(),
            operation,
            success,
            counts: BTreeMap::new(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_count(mut self, key: &str, value: i64) -> Self {
        self.counts.insert(key.to_string(), value);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
