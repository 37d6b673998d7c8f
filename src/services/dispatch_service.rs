//! services/dispatch_service.rs
//! Envío por lotes: parte la lista de destinatarios, envía cada lote con reintentos,
//! espera entre lotes y junta los resultados sin abortar por fallos parciales.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::{
    errors::{AppError, ProviderError},
    models::{
        campaign_model::MessageStatus,
        dispatch_model::{
            DeliveryStatus, DispatchCommand, DispatchMetadata, DispatchResponse, Recipient,
            RecipientResult,
        },
    },
    services::{
        campaign_store::CampaignStore,
        provider_service::{DeliveryReceipt, MessageProvider},
        retry_policy::RetryPolicy,
    },
};

/// Reemplaza {{name}}, {{email}}, {{company}} y {{role}} con los datos del destinatario.
pub fn personalize(text: &str, recipient: &Recipient) -> String {
    text.replace("{{name}}", recipient.name.as_deref().unwrap_or(""))
        .replace("{{email}}", recipient.email.trim())
        .replace("{{company}}", recipient.company.as_deref().unwrap_or(""))
        .replace("{{role}}", recipient.role.as_deref().unwrap_or(""))
}

/// Resultado de un lote: un resultado por destinatario, en orden, y el error final si lo hubo.
struct BatchOutcome {
    results: Vec<RecipientResult>,
    error: Option<ProviderError>,
}

#[derive(Clone)]
pub struct DispatchService {
    provider: Arc<dyn MessageProvider>,
    store: CampaignStore,
    retry_policy: RetryPolicy,
}

impl DispatchService {
    pub fn new(provider: Arc<dyn MessageProvider>, store: CampaignStore, retry_policy: RetryPolicy) -> Self {
        Self {
            provider,
            store,
            retry_policy,
        }
    }

    pub async fn dispatch(&self, owner_id: &str, cmd: DispatchCommand) -> Result<DispatchResponse, AppError> {
        let started = Instant::now();
        let total = cmd.recipients.len();
        let batch_size = cmd.options.batch_size();
        let batch_count = total.div_ceil(batch_size);

        log::info!(
            "(dispatch) user={} recipients={} batch_size={} batches={} delay_ms={} campaign={:?}",
            owner_id,
            total,
            batch_size,
            batch_count,
            cmd.options.delay_ms(),
            cmd.campaign_id
        );

        let message_ids = self.prepare_messages(owner_id, &cmd).await?;

        let mut results: Vec<RecipientResult> = Vec::with_capacity(total);
        let mut quota_hit = false;

        for (index, chunk) in cmd.recipients.chunks(batch_size).enumerate() {
            let offset = index * batch_size;
            let outcome = self.send_batch(&cmd, chunk).await;

            if let Some(e) = &outcome.error {
                quota_hit |= e.is_quota();
                log::error!(
                    "(dispatch) user={} batch {}/{} failed: {}",
                    owner_id,
                    index + 1,
                    batch_count,
                    e
                );
            } else {
                log::info!(
                    "(dispatch) user={} batch {}/{} sent ({} recipients)",
                    owner_id,
                    index + 1,
                    batch_count,
                    chunk.len()
                );
            }

            if let Some(ids) = &message_ids {
                self.persist_outcomes(&ids[offset..offset + chunk.len()], &outcome.results)
                    .await;
            }
            results.extend(outcome.results);

            if index + 1 < batch_count && cmd.options.delay_ms() > 0 {
                tokio::time::sleep(Duration::from_millis(cmd.options.delay_ms())).await;
            }
        }

        let sent_count = results
            .iter()
            .filter(|r| r.status == DeliveryStatus::Sent)
            .count();
        let failed_count = results.len() - sent_count;

        log::info!(
            "(dispatch) user={} finished: sent={} failed={} in {}ms",
            owner_id,
            sent_count,
            failed_count,
            started.elapsed().as_millis()
        );

        if sent_count == 0 && quota_hit {
            return Err(AppError::ProviderQuotaExceeded);
        }

        Ok(DispatchResponse {
            sent_count,
            failed_count,
            results,
            metadata: DispatchMetadata {
                processing_time_ms: started.elapsed().as_millis() as u64,
                batch_count,
                total_recipients: total,
            },
        })
    }

    /// Con campaña: valida pertenencia, crea contactos y mensajes 'queued' (todo o nada).
    /// Sin campaña no se persiste nada (un mensaje siempre pertenece a una campaña).
    async fn prepare_messages(
        &self,
        owner_id: &str,
        cmd: &DispatchCommand,
    ) -> Result<Option<Vec<String>>, AppError> {
        if let Some(template_id) = &cmd.template_id {
            if self.store.find_template(owner_id, template_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Template {}", template_id)));
            }
        }

        let campaign_id = match &cmd.campaign_id {
            Some(id) => id,
            None => return Ok(None),
        };
        if self.store.find_campaign(owner_id, campaign_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Campaign {}", campaign_id)));
        }

        let ids = self
            .store
            .queue_messages(
                owner_id,
                campaign_id,
                cmd.template_id.as_deref(),
                &cmd.recipients,
                |recipient| personalize(&cmd.subject, recipient),
            )
            .await
            .context("(dispatch) could not queue messages")?;
        Ok(Some(ids))
    }

    /// Envía un lote con la política de reintentos. Un reintento solo reenvía
    /// a los destinatarios del lote que todavía no fueron entregados.
    async fn send_batch(&self, cmd: &DispatchCommand, chunk: &[Recipient]) -> BatchOutcome {
        let delivered: Arc<Mutex<Vec<Option<DeliveryReceipt>>>> =
            Arc::new(Mutex::new(vec![None; chunk.len()]));

        let attempt_result = self
            .retry_policy
            .execute(
                |_attempt| {
                    let delivered = Arc::clone(&delivered);
                    async move {
                        let pending: Vec<usize> = {
                            let guard = delivered.lock().await;
                            (0..chunk.len()).filter(|i| guard[*i].is_none()).collect()
                        };

                        let sends = pending.iter().map(|&i| self.send_one(cmd, &chunk[i]));
                        let outcomes = join_all(sends).await;

                        let mut guard = delivered.lock().await;
                        let mut batch_error: Option<ProviderError> = None;
                        for (i, outcome) in pending.into_iter().zip(outcomes) {
                            match outcome {
                                Ok(receipt) => guard[i] = Some(receipt),
                                Err(e) => {
                                    // Un error no reintentable manda sobre uno transitorio
                                    let replace = match &batch_error {
                                        None => true,
                                        Some(prev) => prev.is_retryable() && !e.is_retryable(),
                                    };
                                    if replace {
                                        batch_error = Some(e);
                                    }
                                }
                            }
                        }
                        match batch_error {
                            Some(e) => Err(e),
                            None => Ok(()),
                        }
                    }
                },
                |e: &ProviderError, _attempt| e.is_retryable(),
            )
            .await;

        let receipts = delivered.lock().await.clone();
        let error = attempt_result.err();
        let results = chunk
            .iter()
            .zip(receipts)
            .map(|(recipient, receipt)| match (receipt, &error) {
                (Some(r), _) => RecipientResult::sent(&recipient.email, r.provider_id),
                (None, Some(e)) => RecipientResult::failed(&recipient.email, e.to_string()),
                (None, None) => {
                    RecipientResult::failed(&recipient.email, "no delivery confirmation".to_string())
                }
            })
            .collect();

        BatchOutcome { results, error }
    }

    async fn send_one(
        &self,
        cmd: &DispatchCommand,
        recipient: &Recipient,
    ) -> Result<DeliveryReceipt, ProviderError> {
        let subject = personalize(&cmd.subject, recipient);
        let body = personalize(&cmd.message_template, recipient);
        self.provider
            .send(&cmd.sender, recipient, &subject, &body)
            .await
    }

    /// El envío ya ocurrió: un fallo al guardar el estado se registra pero no cambia el resultado.
    async fn persist_outcomes(&self, message_ids: &[String], results: &[RecipientResult]) {
        for (message_id, result) in message_ids.iter().zip(results) {
            let to = match result.status {
                DeliveryStatus::Sent => MessageStatus::Sent,
                DeliveryStatus::Failed => MessageStatus::Failed,
            };
            let update = self
                .store
                .advance_message_status(
                    message_id,
                    MessageStatus::Queued,
                    to,
                    result.message_id.as_deref(),
                    result.error.as_deref(),
                )
                .await;
            match update {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "(dispatch) message {} was no longer queued, status not updated",
                    message_id
                ),
                Err(e) => log::error!(
                    "(dispatch) could not persist status for message {}: {:?}",
                    message_id,
                    e
                ),
            }
        }
    }
}
