//! services/provider_service.rs
//! Proveedor externo de envío de mensajes: SMTP (lettre) o API HTTP (reqwest).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::app_config::ProviderConfig,
    errors::ProviderError,
    models::dispatch_model::{Recipient, Sender},
};

/// Confirmación del proveedor: id de entrega si lo reporta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider_id: Option<String>,
}

#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn send(
        &self,
        sender: &Sender,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError>;
}

pub fn build_provider(config: &ProviderConfig) -> Result<std::sync::Arc<dyn MessageProvider>> {
    Ok(match config {
        ProviderConfig::Smtp {
            host,
            port,
            user,
            pass,
            timeout,
        } => std::sync::Arc::new(SmtpProvider::new(host, *port, user, pass, *timeout)?),
        ProviderConfig::Http {
            base_url,
            api_key,
            timeout,
        } => std::sync::Arc::new(HttpApiProvider::new(base_url, api_key, *timeout)?),
    })
}

// ========================================================================
// SMTP
// ========================================================================

#[derive(Clone)]
pub struct SmtpProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    timeout: Duration,
}

impl SmtpProvider {
    pub fn new(host: &str, port: u16, user: &str, pass: &str, timeout: Duration) -> Result<Self> {
        // 465 = TLS implícito; cualquier otro puerto negocia STARTTLS
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("Invalid SMTP relay {}", host))?;

        let mailer = builder
            .port(port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();

        log::info!("(smtp_provider) relay={} port={}", host, port);
        Ok(Self { mailer, timeout })
    }

    fn build_message(
        sender: &Sender,
        recipient: &Recipient,
        subject: &str,
        body: &str,
        message_id: &str,
    ) -> Result<Message, ProviderError> {
        let from_addr: Address = sender
            .email
            .trim()
            .parse()
            .map_err(|e| ProviderError::Permanent(format!("invalid sender address: {}", e)))?;
        let to_addr: Address = recipient
            .email
            .trim()
            .parse()
            .map_err(|e| ProviderError::Permanent(format!("invalid recipient address: {}", e)))?;

        Message::builder()
            .from(Mailbox::new(Some(sender.name.clone()), from_addr))
            .to(Mailbox::new(recipient.name.clone(), to_addr))
            .subject(subject)
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| ProviderError::Permanent(format!("could not build message: {}", e)))
    }
}

#[async_trait]
impl MessageProvider for SmtpProvider {
    async fn send(
        &self,
        sender: &Sender,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        let domain = sender
            .email
            .rsplit_once('@')
            .map(|(_, d)| d.to_string())
            .unwrap_or_else(|| "localhost".to_string());
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), domain);
        let message = Self::build_message(sender, recipient, subject, body, &message_id)?;

        match tokio::time::timeout(self.timeout, self.mailer.send(message)).await {
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
            Ok(Err(e)) => Err(classify_smtp_error(&e, self.timeout.as_secs())),
            Ok(Ok(_)) => Ok(DeliveryReceipt {
                provider_id: Some(message_id),
            }),
        }
    }
}

fn classify_smtp_error(e: &lettre::transport::smtp::Error, timeout_secs: u64) -> ProviderError {
    let text = e.to_string();
    if looks_like_quota(&text) {
        ProviderError::QuotaExceeded(text)
    } else if e.is_permanent() {
        ProviderError::Permanent(text)
    } else if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::Transient(text)
    }
}

fn looks_like_quota(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("quota") || lower.contains("rate limit") || lower.contains("too many")
}

// ========================================================================
// API HTTP (JSON)
// ========================================================================

#[derive(Clone)]
pub struct HttpApiProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HttpSendResponse {
    id: Option<String>,
}

impl HttpApiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Could not build HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl MessageProvider for HttpApiProvider {
    async fn send(
        &self,
        sender: &Sender,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let payload = json!({
            "from": { "name": sender.name, "email": sender.email },
            "to": recipient.email,
            "subject": subject,
            "html": body
        });

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout.as_secs())
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            let parsed = resp.json::<HttpSendResponse>().await.ok();
            return Ok(DeliveryReceipt {
                provider_id: parsed.and_then(|r| r.id),
            });
        }

        let body_txt = resp.text().await.unwrap_or_default();
        log::error!(
            "(http_provider) send to {} failed: status={} body='{}'",
            recipient.email,
            status,
            body_txt
        );
        Err(classify_http_status(status, body_txt))
    }
}

fn classify_http_status(status: StatusCode, body_txt: String) -> ProviderError {
    let msg = format!("HTTP {}: {}", status.as_u16(), body_txt);
    if status == StatusCode::TOO_MANY_REQUESTS || looks_like_quota(&body_txt) {
        ProviderError::QuotaExceeded(msg)
    } else if status.is_client_error() {
        ProviderError::Permanent(msg)
    } else {
        ProviderError::Transient(msg)
    }
}
