//! tests/support.rs
//! Helpers compartidos: DB en memoria, datos semilla y un proveedor con guion.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::errors::ProviderError;
use crate::models::campaign_model::{MessageRecord, MessageStatus};
use crate::models::dispatch_model::{DispatchRequest, Recipient, Sender};
use crate::services::campaign_store::{db_timestamp, CampaignStore};
use crate::services::provider_service::{DeliveryReceipt, MessageProvider};

/// SQLite en memoria con una sola conexión que nunca se recicla
/// (cada conexión nueva sería una base vacía).
pub async fn test_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("No se pudo abrir SQLite en memoria")
}

pub async fn test_store() -> CampaignStore {
    let store = CampaignStore::new(test_pool().await);
    store
        .run_migrations()
        .await
        .expect("Fallaron las migraciones");
    store
}

pub async fn seed_campaign(store: &CampaignStore, owner_id: &str, id: &str, status: &str) {
    sqlx::query(
        "INSERT INTO campaigns (id, owner_id, name, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(owner_id)
    .bind(format!("Campaign {}", id))
    .bind(status)
    .bind(db_timestamp(Utc::now()))
    .execute(store.pool())
    .await
    .expect("seed campaign");
}

pub async fn seed_template(store: &CampaignStore, owner_id: &str, id: &str, name: &str) {
    sqlx::query(
        r#"INSERT INTO templates (id, owner_id, name, category, content, created_at)
           VALUES (?1, ?2, ?3, 'intro', 'Hola {{name}}, ¿hablamos?', ?4)"#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(name)
    .bind(db_timestamp(Utc::now()))
    .execute(store.pool())
    .await
    .expect("seed template");
}

pub async fn seed_contact(store: &CampaignStore, owner_id: &str, email: &str) -> String {
    let (id,): (String,) = sqlx::query_as(
        r#"INSERT INTO contacts (id, owner_id, email, created_at) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(owner_id, email) DO UPDATE SET email = excluded.email
           RETURNING id"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(owner_id)
    .bind(email.trim().to_lowercase())
    .bind(db_timestamp(Utc::now()))
    .fetch_one(store.pool())
    .await
    .expect("seed contact");
    id
}

/// Inserta un mensaje ya con su estado final, como lo dejaría el feed de engagement.
pub async fn seed_message(
    store: &CampaignStore,
    campaign_id: &str,
    contact_id: &str,
    template_id: Option<&str>,
    subject: &str,
    status: MessageStatus,
    created_at: DateTime<Utc>,
) {
    let ts = db_timestamp(created_at);
    sqlx::query(
        r#"INSERT INTO messages (id, campaign_id, contact_id, template_id, subject, status, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(campaign_id)
    .bind(contact_id)
    .bind(template_id)
    .bind(subject)
    .bind(status.as_str())
    .bind(ts)
    .execute(store.pool())
    .await
    .expect("seed message");
}

pub async fn message_statuses(store: &CampaignStore, campaign_id: &str) -> Vec<(String, Option<String>)> {
    sqlx::query_as(
        "SELECT status, error_message FROM messages WHERE campaign_id = ?1 ORDER BY created_at, id",
    )
    .bind(campaign_id)
    .fetch_all(store.pool())
    .await
    .expect("select statuses")
}

/// Espera (acotado) a que el writer de auditoría persista `expected` filas.
pub async fn wait_for_audit_rows(store: &CampaignStore, expected: i64) -> i64 {
    let mut count = 0;
    for _ in 0..50 {
        let (c,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_events")
            .fetch_one(store.pool())
            .await
            .expect("count audit");
        count = c;
        if count >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    count
}

/// MessageRecord en memoria para las pruebas del agregador.
pub fn message(
    contact_id: &str,
    template_id: Option<&str>,
    subject: &str,
    status: MessageStatus,
    created_at: DateTime<Utc>,
) -> MessageRecord {
    MessageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        campaign_id: "c1".to_string(),
        contact_id: contact_id.to_string(),
        template_id: template_id.map(str::to_string),
        subject: subject.to_string(),
        status,
        created_at,
    }
}

pub fn recipients(n: usize) -> Vec<Recipient> {
    (0..n)
        .map(|i| Recipient {
            email: format!("user{}@example.com", i),
            name: Some(format!("User {}", i)),
            role: Some("CTO".to_string()),
            company: Some("Acme".to_string()),
        })
        .collect()
}

pub fn dispatch_request(n: usize) -> DispatchRequest {
    DispatchRequest {
        sender: Sender {
            name: "Ana".to_string(),
            email: "ana@outreach.test".to_string(),
        },
        recipients: recipients(n),
        subject: "Hola {{name}}".to_string(),
        message_template: "Hola {{name}}, vi que {{company}} está creciendo.".to_string(),
        campaign_id: None,
        template_id: None,
        batch_size: Some(10),
        delay_ms: Some(0),
    }
}

type SendScript = dyn Fn(&str, u32) -> Result<DeliveryReceipt, ProviderError> + Send + Sync;

/// Proveedor falso: el guion recibe (email, número de intento para ese email).
pub struct ScriptedProvider {
    script: Box<SendScript>,
    calls: Mutex<HashMap<String, u32>>,
    deliveries: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedProvider {
    pub fn new(
        script: impl Fn(&str, u32) -> Result<DeliveryReceipt, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        ScriptedProvider {
            script: Box::new(script),
            calls: Mutex::new(HashMap::new()),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(|email, _| {
            Ok(DeliveryReceipt {
                provider_id: Some(format!("msg-{}", email)),
            })
        })
    }

    pub fn calls_for(&self, email: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(email)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// (email, asunto, cuerpo) de cada envío exitoso.
    pub fn deliveries(&self) -> Vec<(String, String, String)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageProvider for ScriptedProvider {
    async fn send(
        &self,
        _sender: &Sender,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(recipient.email.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let result = (self.script)(&recipient.email, attempt);
        if result.is_ok() {
            self.deliveries.lock().unwrap().push((
                recipient.email.clone(),
                subject.to_string(),
                body.to_string(),
            ));
        }
        result
    }
}
