//! services/campaign_store.rs
//! Acceso a SQLite para campañas, contactos, plantillas, mensajes y auditoría.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::models::{
    audit_model::AuditEvent,
    campaign_model::{CampaignRecord, MessageRecord, MessageStatus, TemplateRecord},
    dispatch_model::Recipient,
};

/// Formato único de timestamps en DB (RFC3339 UTC, milisegundos) para que
/// los filtros por rango comparen bien como texto.
pub fn db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Timestamp inválido en DB: {}", raw))?
        .with_timezone(&Utc))
}

#[derive(FromRow)]
struct CampaignRow {
    id: String,
    owner_id: String,
    name: String,
    status: String,
    created_at: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl CampaignRow {
    fn into_record(self) -> Result<CampaignRecord> {
        Ok(CampaignRecord {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            start_date: self.start_date.as_deref().map(parse_timestamp).transpose()?,
            end_date: self.end_date.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    campaign_id: String,
    contact_id: String,
    template_id: Option<String>,
    subject: String,
    status: String,
    created_at: String,
}

impl MessageRow {
    fn into_record(self) -> Result<MessageRecord> {
        Ok(MessageRecord {
            id: self.id,
            campaign_id: self.campaign_id,
            contact_id: self.contact_id,
            template_id: self.template_id,
            subject: self.subject,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    owner_id: String,
    name: String,
    category: String,
    content: String,
}

impl From<TemplateRow> for TemplateRecord {
    fn from(r: TemplateRow) -> Self {
        TemplateRecord {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            category: r.category,
            content: r.content,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CampaignStore {
    db_pool: Pool<Sqlite>,
}

impl CampaignStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignStore { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run outreach migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db_pool
    }

    // ----------------------------------------------------------------
    // Campañas / plantillas
    // ----------------------------------------------------------------

    pub async fn find_campaign(&self, owner_id: &str, campaign_id: &str) -> Result<Option<CampaignRecord>> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, owner_id, name, status, created_at, start_date, end_date
            FROM campaigns
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(campaign_id)
        .bind(owner_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Error buscando campaña")?;

        row.map(CampaignRow::into_record).transpose()
    }

    /// Campañas del usuario vigentes en algún momento de `[start, end]`:
    /// creadas antes del fin de la ventana y sin terminar antes de su inicio.
    pub async fn list_campaigns(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        campaign_id: Option<&str>,
    ) -> Result<Vec<CampaignRecord>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, owner_id, name, status, created_at, start_date, end_date
            FROM campaigns
            WHERE owner_id = ?1
              AND created_at <= ?3
              AND (end_date IS NULL OR end_date >= ?2)
              AND (?4 IS NULL OR id = ?4)
            ORDER BY created_at, id
            "#,
        )
        .bind(owner_id)
        .bind(db_timestamp(start))
        .bind(db_timestamp(end))
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error listando campañas")?;

        rows.into_iter().map(CampaignRow::into_record).collect()
    }

    pub async fn find_template(&self, owner_id: &str, template_id: &str) -> Result<Option<TemplateRecord>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, owner_id, name, category, content
            FROM templates
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(template_id)
        .bind(owner_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Error buscando plantilla")?;

        Ok(row.map(TemplateRecord::from))
    }

    pub async fn list_templates(&self, owner_id: &str) -> Result<Vec<TemplateRecord>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, owner_id, name, category, content
            FROM templates
            WHERE owner_id = ?1
            ORDER BY name, id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error listando plantillas")?;

        Ok(rows.into_iter().map(TemplateRecord::from).collect())
    }

    // ----------------------------------------------------------------
    // Contactos / mensajes en cola
    // ----------------------------------------------------------------

    /// Crea (o reutiliza) el contacto de cada destinatario y su mensaje 'queued',
    /// todo en una transacción: si una fila falla no queda ninguna.
    /// Devuelve los ids de mensaje en el orden de `recipients`.
    pub async fn queue_messages<F>(
        &self,
        owner_id: &str,
        campaign_id: &str,
        template_id: Option<&str>,
        recipients: &[Recipient],
        subject_for: F,
    ) -> Result<Vec<String>>
    where
        F: Fn(&Recipient) -> String,
    {
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Error abriendo transacción de mensajes")?;

        let mut ids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let contact_id = upsert_contact(&mut *tx, owner_id, recipient).await?;
            let message_id = insert_queued_message(
                &mut *tx,
                campaign_id,
                &contact_id,
                template_id,
                &subject_for(recipient),
            )
            .await?;
            ids.push(message_id);
        }

        tx.commit()
            .await
            .context("Error confirmando transacción de mensajes")?;
        Ok(ids)
    }

    pub async fn count_contacts(&self, owner_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(&self.db_pool)
            .await
            .context("Error contando contactos")?;
        Ok(count)
    }

    // ----------------------------------------------------------------
    // Mensajes
    // ----------------------------------------------------------------

    /// Avanza el estado solo si la transición es válida y el estado actual es `from`.
    /// Devuelve false si otro escritor ya lo movió.
    pub async fn advance_message_status(
        &self,
        message_id: &str,
        from: MessageStatus,
        to: MessageStatus,
        provider_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(anyhow!("Transición de estado inválida: {} -> {}", from, to));
        }
        let now = db_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = ?3,
                provider_id = COALESCE(?4, provider_id),
                error_message = ?5,
                updated_at = ?6
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(message_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(provider_id)
        .bind(error_message)
        .bind(now)
        .execute(&self.db_pool)
        .await
        .context("Error actualizando estado de mensaje")?;

        Ok(result.rows_affected() == 1)
    }

    /// Mensajes del usuario creados dentro de `[start, end]`.
    pub async fn list_messages(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        campaign_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.campaign_id, m.contact_id, m.template_id, m.subject,
                   m.status, m.created_at
            FROM messages m
            JOIN campaigns c ON c.id = m.campaign_id
            WHERE c.owner_id = ?1
              AND m.created_at >= ?2
              AND m.created_at <= ?3
              AND (?4 IS NULL OR m.campaign_id = ?4)
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(owner_id)
        .bind(db_timestamp(start))
        .bind(db_timestamp(end))
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error listando mensajes")?;

        rows.into_iter().map(MessageRow::into_record).collect()
    }

    // ----------------------------------------------------------------
    // Auditoría
    // ----------------------------------------------------------------

    pub async fn insert_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let counts = serde_json::to_string(&event.counts)?;
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, user_id, operation, success, counts, detail, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&event.user_id)
        .bind(event.operation.as_str())
        .bind(event.success as i32)
        .bind(counts)
        .bind(event.detail.as_deref())
        .bind(db_timestamp(event.timestamp))
        .execute(&self.db_pool)
        .await
        .context("Error insertando audit_event")?;
        Ok(())
    }
}

/// Crea o actualiza el contacto (owner, email) y devuelve su id.
async fn upsert_contact(
    conn: &mut SqliteConnection,
    owner_id: &str,
    recipient: &Recipient,
) -> Result<String> {
    let new_id = Uuid::new_v4().to_string();
    let now = db_timestamp(Utc::now());
    let email = recipient.email.trim().to_lowercase();

    let (id,): (String,) = sqlx::query_as(
        r#"
        INSERT INTO contacts (id, owner_id, email, name, role, company, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(owner_id, email) DO UPDATE SET
            name = COALESCE(excluded.name, contacts.name),
            role = COALESCE(excluded.role, contacts.role),
            company = COALESCE(excluded.company, contacts.company)
        RETURNING id
        "#,
    )
    .bind(new_id)
    .bind(owner_id)
    .bind(email)
    .bind(recipient.name.as_deref())
    .bind(recipient.role.as_deref())
    .bind(recipient.company.as_deref())
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .context("Error guardando contacto")?;

    Ok(id)
}

async fn insert_queued_message(
    conn: &mut SqliteConnection,
    campaign_id: &str,
    contact_id: &str,
    template_id: Option<&str>,
    subject: &str,
) -> Result<String> {
    let message_id = Uuid::new_v4().to_string();
    let now = db_timestamp(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO messages (
            id, campaign_id, contact_id, template_id, subject,
            status, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6, ?6)
        "#,
    )
    .bind(&message_id)
    .bind(campaign_id)
    .bind(contact_id)
    .bind(template_id)
    .bind(subject)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Error insertando mensaje")?;

    Ok(message_id)
}
