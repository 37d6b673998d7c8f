//! models/dispatch_model.rs
//! Request/response del envío por lotes y su validación en el borde.

use std::str::FromStr;

use lettre::Address;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, FieldError};

pub const MIN_RECIPIENTS: usize = 1;
pub const MAX_RECIPIENTS: usize = 100;
pub const MAX_SUBJECT_CHARS: usize = 200;
pub const MIN_TEMPLATE_CHARS: usize = 10;
pub const MAX_TEMPLATE_CHARS: usize = 10_000;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub company: Option<String>,
}

#[cfg(test)]
impl Recipient {
    pub fn new(email: &str) -> Self {
        Recipient {
            email: email.to_string(),
            name: None,
            role: None,
            company: None,
        }
    }
}

/// Body JSON de POST /api/campaigns/dispatch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub sender: Sender,
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub message_template: String,
    pub campaign_id: Option<String>,
    pub template_id: Option<String>,
    pub batch_size: Option<usize>,
    pub delay_ms: Option<u64>,
}

/// Ritmo del envío ya validado (batchSize 1..=50, delayMs 0..=10000).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    batch_size: usize,
    delay_ms: u64,
}

impl DispatchOptions {
    pub fn new(batch_size: Option<usize>, delay_ms: Option<u64>) -> Result<Self, Vec<FieldError>> {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let delay_ms = delay_ms.unwrap_or(DEFAULT_DELAY_MS);
        let mut errors = Vec::new();

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
            errors.push(FieldError::new(
                "batchSize",
                format!("must be between {} and {}", MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            ));
        }
        if delay_ms > MAX_DELAY_MS {
            errors.push(FieldError::new(
                "delayMs",
                format!("must be between 0 and {}", MAX_DELAY_MS),
            ));
        }

        if errors.is_empty() {
            Ok(DispatchOptions {
                batch_size,
                delay_ms,
            })
        } else {
            Err(errors)
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

/// Orden de envío validada; el dispatcher solo trabaja con esto.
#[derive(Debug, Clone)]
pub struct DispatchCommand {
    pub sender: Sender,
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub message_template: String,
    pub campaign_id: Option<String>,
    pub template_id: Option<String>,
    pub options: DispatchOptions,
}

impl DispatchRequest {
    /// Valida todos los campos y acumula los errores en un solo 400.
    pub fn validate(self) -> Result<DispatchCommand, AppError> {
        let mut errors = Vec::new();

        if self.sender.name.trim().is_empty() {
            errors.push(FieldError::new("sender.name", "is required"));
        }
        if !is_valid_email(&self.sender.email) {
            errors.push(FieldError::new("sender.email", "is not a valid email address"));
        }

        let count = self.recipients.len();
        if !(MIN_RECIPIENTS..=MAX_RECIPIENTS).contains(&count) {
            errors.push(FieldError::new(
                "recipients",
                format!(
                    "must contain between {} and {} entries",
                    MIN_RECIPIENTS, MAX_RECIPIENTS
                ),
            ));
        }
        for (i, r) in self.recipients.iter().enumerate() {
            if !is_valid_email(&r.email) {
                errors.push(FieldError::new(
                    format!("recipients[{}].email", i),
                    "is not a valid email address",
                ));
            }
        }

        let subject_len = self.subject.chars().count();
        if subject_len == 0 || subject_len > MAX_SUBJECT_CHARS {
            errors.push(FieldError::new(
                "subject",
                format!("must be between 1 and {} characters", MAX_SUBJECT_CHARS),
            ));
        }

        let template_len = self.message_template.chars().count();
        if !(MIN_TEMPLATE_CHARS..=MAX_TEMPLATE_CHARS).contains(&template_len) {
            errors.push(FieldError::new(
                "messageTemplate",
                format!(
                    "must be between {} and {} characters",
                    MIN_TEMPLATE_CHARS, MAX_TEMPLATE_CHARS
                ),
            ));
        }

        let options = match DispatchOptions::new(self.batch_size, self.delay_ms) {
            Ok(opts) => Some(opts),
            Err(mut option_errors) => {
                errors.append(&mut option_errors);
                None
            }
        };

        match options {
            Some(options) if errors.is_empty() => Ok(DispatchCommand {
                sender: self.sender,
                recipients: self.recipients,
                subject: self.subject,
                message_template: self.message_template,
                campaign_id: self.campaign_id.filter(|id| !id.trim().is_empty()),
                template_id: self.template_id.filter(|id| !id.trim().is_empty()),
                options,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

pub fn is_valid_email(raw: &str) -> bool {
    Address::from_str(raw.trim()).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecipientResult {
    pub email: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecipientResult {
    pub fn sent(email: &str, message_id: Option<String>) -> Self {
        RecipientResult {
            email: email.to_string(),
            status: DeliveryStatus::Sent,
            message_id,
            error: None,
        }
    }

    pub fn failed(email: &str, error: String) -> Self {
        RecipientResult {
            email: email.to_string(),
            status: DeliveryStatus::Failed,
            message_id: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMetadata {
    pub processing_time_ms: u64,
    pub batch_count: usize,
    pub total_recipients: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub sent_count: usize,
    pub failed_count: usize,
    pub results: Vec<RecipientResult>,
    pub metadata: DispatchMetadata,
}
