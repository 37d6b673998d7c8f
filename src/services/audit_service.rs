//! services/audit_service.rs
//! Auditoría best-effort: cola acotada + tarea de fondo que persiste los eventos.
//! `record` nunca bloquea ni falla al llamador.

use tokio::sync::mpsc;

use crate::{models::audit_model::AuditEvent, services::campaign_store::CampaignStore};

pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditSink {
    /// Lanza la tarea consumidora. Debe llamarse dentro de un runtime tokio.
    pub fn spawn(store: CampaignStore, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(Self::writer_loop(rx, store));
        Self { tx }
    }

    /// Encola el evento; si la cola está llena o cerrada se descarta con un log.
    pub fn record(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                log::warn!(
                    "(audit) queue full, dropping event user={} op={}",
                    ev.user_id,
                    ev.operation.as_str()
                );
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                log::error!(
                    "(audit) writer stopped, dropping event user={} op={}",
                    ev.user_id,
                    ev.operation.as_str()
                );
            }
        }
    }

    async fn writer_loop(mut rx: mpsc::Receiver<AuditEvent>, store: CampaignStore) {
        log::info!("(audit) writer started");
        while let Some(event) = rx.recv().await {
            log::info!(
                "(audit) user={} op={} success={} counts={:?}",
                event.user_id,
                event.operation.as_str(),
                event.success,
                event.counts
            );
            if let Err(e) = store.insert_audit_event(&event).await {
                log::error!("(audit) could not persist event: {:?}", e);
            }
        }
        log::info!("(audit) writer stopped");
    }
}
