//! services/analytics_service.rs
//! Lee campañas/mensajes/plantillas de la ventana y arma la respuesta de analytics.

use std::sync::Arc;

use crate::{
    config::app_config::AnalyticsConfig,
    errors::AppError,
    models::analytics_model::{AdvancedAnalytics, AnalyticsQuery, AnalyticsResponse, DateRange},
    services::{
        analytics_engine::{self, AnalyticsDataset},
        campaign_store::CampaignStore,
        retry_policy::RetryPolicy,
    },
};

#[derive(Clone)]
pub struct AnalyticsService {
    store: CampaignStore,
    retry_policy: RetryPolicy,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(store: CampaignStore, retry_policy: RetryPolicy, config: AnalyticsConfig) -> Self {
        Self {
            store,
            retry_policy,
            config,
        }
    }

    pub async fn analytics(
        &self,
        owner_id: &str,
        query: &AnalyticsQuery,
        range: DateRange,
    ) -> Result<AnalyticsResponse, AppError> {
        let campaign_id = query
            .campaign_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        log::info!(
            "(analytics) user={} range={:?} start={} end={} campaign={:?} advanced={}",
            owner_id,
            range.range,
            range.start,
            range.end,
            campaign_id,
            query.include_advanced.unwrap_or(false)
        );

        let dataset = self.fetch_dataset(owner_id, &range, campaign_id).await?;
        if let Some(id) = campaign_id {
            if dataset.campaigns.is_empty() {
                return Err(AppError::NotFound(format!("Campaign {}", id)));
            }
        }

        let dataset = Arc::new(dataset);
        let advanced = if query.include_advanced.unwrap_or(false) {
            Some(self.advanced(Arc::clone(&dataset)).await)
        } else {
            None
        };

        Ok(AnalyticsResponse {
            overview: analytics_engine::overview(&dataset),
            campaign_performance: analytics_engine::campaign_performance(&dataset),
            time_series_data: analytics_engine::time_series(&dataset.messages, &range),
            template_usage: analytics_engine::template_usage(&dataset),
            advanced,
        })
    }

    /// Las cuatro lecturas van en paralelo, cada una con su propia política de reintentos.
    async fn fetch_dataset(
        &self,
        owner_id: &str,
        range: &DateRange,
        campaign_id: Option<&str>,
    ) -> Result<AnalyticsDataset, AppError> {
        let retry = self.retry_policy;
        let (campaigns, messages, templates, total_contacts) = tokio::try_join!(
            retry.execute_always(|_| self
                .store
                .list_campaigns(owner_id, range.start, range.end, campaign_id)),
            retry.execute_always(|_| self
                .store
                .list_messages(owner_id, range.start, range.end, campaign_id)),
            retry.execute_always(|_| self.store.list_templates(owner_id)),
            retry.execute_always(|_| self.store.count_contacts(owner_id)),
        )?;

        log::info!(
            "(analytics) user={} fetched campaigns={} messages={} templates={} contacts={}",
            owner_id,
            campaigns.len(),
            messages.len(),
            templates.len(),
            total_contacts
        );

        Ok(AnalyticsDataset {
            campaigns,
            messages,
            templates,
            total_contacts,
        })
    }

    async fn advanced(&self, ds: Arc<AnalyticsDataset>) -> AdvancedAnalytics {
        let factor = self.config.heuristic_improvement_factor;

        let (
            ab_testing,
            performance_insights,
            predictive_analytics,
            contact_segmentation,
            optimal_send_times,
            template_comparison,
        ) = tokio::join!(
            run_isolated("ab_testing", Arc::clone(&ds), |d| {
                analytics_engine::ab_testing(&d.messages)
            }),
            run_isolated("performance_insights", Arc::clone(&ds), |d| {
                analytics_engine::performance_insights(&d.messages)
            }),
            run_isolated("predictive_analytics", Arc::clone(&ds), move |d| {
                let active = analytics_engine::overview(d).active_campaigns;
                analytics_engine::predictive_analytics(&d.messages, active, factor)
            }),
            run_isolated("contact_segmentation", Arc::clone(&ds), |d| {
                analytics_engine::contact_segmentation(&d.messages)
            }),
            run_isolated("optimal_send_times", Arc::clone(&ds), |d| {
                analytics_engine::optimal_send_times(&d.messages)
            }),
            run_isolated("template_comparison", Arc::clone(&ds), |d| {
                analytics_engine::template_comparison(&d.messages, &d.templates)
            }),
        );

        AdvancedAnalytics {
            ab_testing,
            performance_insights,
            predictive_analytics,
            contact_segmentation,
            optimal_send_times,
            template_comparison,
        }
    }
}

/// Corre un cálculo en su propia tarea; si falla, ese hueco queda vacío/neutral.
pub async fn run_isolated<T, F>(name: &'static str, ds: Arc<AnalyticsDataset>, compute: F) -> T
where
    T: Default + Send + 'static,
    F: FnOnce(&AnalyticsDataset) -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(move || compute(&ds)).await {
        Ok(value) => value,
        Err(e) => {
            log::error!(
                "(analytics) {} failed, returning neutral result: {}",
                name,
                e
            );
            T::default()
        }
    }
}
