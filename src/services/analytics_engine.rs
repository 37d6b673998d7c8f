//! services/analytics_engine.rs
//! Agregaciones puras sobre datos ya leídos de la DB.
//! Mismo dataset => misma salida (los grupos se recorren en orden de BTreeMap
//! y los empates se rompen por clave).

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Timelike};

use crate::models::{
    analytics_model::{
        AbTestVariant, CampaignPerformance, ContactSegmentation, DateRange, OptimalSendTime,
        Overview, PerformanceInsights, PredictedPerformance, PredictiveAnalytics, SegmentSummary,
        SlotPerformance, TemplateComparison, TemplateUsage, TimeSeriesPoint,
    },
    campaign_model::{CampaignRecord, CampaignStatus, MessageRecord, MessageStatus, TemplateRecord},
};

/// Mínimo de mensajes para que una variante A/B cuente.
pub const AB_MIN_GROUP_SIZE: usize = 10;
/// Mínimo de muestras por franja (día, hora).
pub const OPTIMAL_TIME_MIN_SAMPLES: usize = 5;
pub const OPTIMAL_TIME_TOP_N: usize = 10;
/// z para un intervalo de confianza del 95%.
const Z_95: f64 = 1.96;

/// Todo lo que necesita el agregador para una ventana.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsDataset {
    pub campaigns: Vec<CampaignRecord>,
    pub messages: Vec<MessageRecord>,
    pub templates: Vec<TemplateRecord>,
    pub total_contacts: i64,
}

/// Conteo por estado. `sent` son los mensajes cuyo estado actual es 'sent'.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
    pub bounced: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: MessageStatus) {
        self.total += 1;
        match status {
            MessageStatus::Sent => self.sent += 1,
            MessageStatus::Opened => self.opened += 1,
            MessageStatus::Replied => self.replied += 1,
            MessageStatus::Bounced => self.bounced += 1,
            MessageStatus::Queued | MessageStatus::Failed => {}
        }
    }

    fn from_messages<'a>(messages: impl IntoIterator<Item = &'a MessageRecord>) -> Self {
        let mut counts = StatusCounts::default();
        for m in messages {
            counts.add(m.status);
        }
        counts
    }

    fn open_rate(&self) -> f64 {
        percent_2dp(self.opened, self.sent)
    }

    fn reply_rate(&self) -> f64 {
        percent_2dp(self.replied, self.sent)
    }
}

/// round(part / whole * 100), 0 si whole == 0.
pub fn percent_rounded(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

/// Porcentaje con dos decimales, 0 si whole == 0.
pub fn percent_2dp(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_2dp(part as f64 / whole as f64 * 100.0)
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Margen del IC 95% (aproximación normal), en puntos porcentuales.
pub fn confidence_interval(open_rate: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = (open_rate / 100.0).clamp(0.0, 1.0);
    round_2dp(Z_95 * (p * (1.0 - p) / n as f64).sqrt() * 100.0)
}

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Nombre del día a partir de `num_days_from_sunday`.
fn day_name(days_from_sunday: u32) -> &'static str {
    DAY_NAMES
        .get(days_from_sunday as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Orden descendente por reply rate, luego open rate; la clave rompe empates.
fn by_reply_then_open<K: Ord>(a: (&K, f64, f64), b: (&K, f64, f64)) -> std::cmp::Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.2.total_cmp(&a.2))
        .then_with(|| a.0.cmp(b.0))
}

// ========================================================================
// Resumen, campañas, serie temporal, uso de plantillas
// ========================================================================

pub fn overview(ds: &AnalyticsDataset) -> Overview {
    let counts = StatusCounts::from_messages(&ds.messages);
    Overview {
        active_campaigns: ds
            .campaigns
            .iter()
            .filter(|c| c.status == CampaignStatus::Active)
            .count(),
        total_campaigns: ds.campaigns.len(),
        total_contacts: ds.total_contacts,
        sent_messages: counts.sent,
        opened_messages: counts.opened,
        replied_messages: counts.replied,
        bounced_messages: counts.bounced,
        open_rate: percent_rounded(counts.opened, counts.sent),
        reply_rate: percent_rounded(counts.replied, counts.sent),
        bounce_rate: percent_rounded(counts.bounced, counts.sent),
    }
}

pub fn campaign_performance(ds: &AnalyticsDataset) -> Vec<CampaignPerformance> {
    let mut per_campaign: HashMap<&str, StatusCounts> = HashMap::new();
    for m in &ds.messages {
        per_campaign
            .entry(m.campaign_id.as_str())
            .or_default()
            .add(m.status);
    }

    ds.campaigns
        .iter()
        .map(|c| {
            let counts = per_campaign.get(c.id.as_str()).copied().unwrap_or_default();
            CampaignPerformance {
                campaign_id: c.id.clone(),
                name: c.name.clone(),
                status: c.status.as_str().to_string(),
                sent: counts.sent,
                opened: counts.opened,
                replied: counts.replied,
                bounced: counts.bounced,
                open_rate: percent_rounded(counts.opened, counts.sent),
                reply_rate: percent_rounded(counts.replied, counts.sent),
                bounce_rate: percent_rounded(counts.bounced, counts.sent),
            }
        })
        .collect()
}

/// Un bucket por día calendario (UTC) de la ventana, aunque esté vacío.
pub fn time_series(messages: &[MessageRecord], range: &DateRange) -> Vec<TimeSeriesPoint> {
    let mut per_day: HashMap<chrono::NaiveDate, StatusCounts> = HashMap::new();
    for m in messages {
        per_day
            .entry(m.created_at.date_naive())
            .or_default()
            .add(m.status);
    }

    range
        .days()
        .into_iter()
        .map(|day| {
            let counts = per_day.get(&day).copied().unwrap_or_default();
            TimeSeriesPoint {
                date: day.format("%Y-%m-%d").to_string(),
                sent: counts.sent,
                opened: counts.opened,
                replied: counts.replied,
            }
        })
        .collect()
}

pub fn template_usage(ds: &AnalyticsDataset) -> Vec<TemplateUsage> {
    let mut uses: HashMap<&str, usize> = HashMap::new();
    for m in &ds.messages {
        if let Some(t) = m.template_id.as_deref() {
            *uses.entry(t).or_default() += 1;
        }
    }

    let mut usage: Vec<TemplateUsage> = ds
        .templates
        .iter()
        .map(|t| TemplateUsage {
            template_id: t.id.clone(),
            name: t.name.clone(),
            category: t.category.clone(),
            usage_count: uses.get(t.id.as_str()).copied().unwrap_or(0),
        })
        .collect();
    usage.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.template_id.cmp(&b.template_id))
    });
    usage
}

// ========================================================================
// Analytics avanzados
// ========================================================================

/// Variante = primera palabra del asunto. Heurística débil pero es la regla establecida.
pub fn ab_testing(messages: &[MessageRecord]) -> Vec<AbTestVariant> {
    let mut groups: BTreeMap<&str, StatusCounts> = BTreeMap::new();
    for m in messages {
        if let Some(key) = m.subject.split_whitespace().next() {
            groups.entry(key).or_default().add(m.status);
        }
    }

    let mut variants: Vec<AbTestVariant> = groups
        .into_iter()
        .filter(|(_, c)| c.total >= AB_MIN_GROUP_SIZE && c.sent > 0)
        .map(|(key, c)| {
            let open_rate = c.open_rate();
            AbTestVariant {
                variant: key.to_string(),
                total_messages: c.total,
                sent: c.sent,
                opened: c.opened,
                replied: c.replied,
                open_rate,
                reply_rate: c.reply_rate(),
                confidence_interval: confidence_interval(open_rate, c.sent),
            }
        })
        .collect();

    variants.sort_by(|a, b| {
        b.open_rate
            .total_cmp(&a.open_rate)
            .then_with(|| a.variant.cmp(&b.variant))
    });
    variants
}

pub fn performance_insights(messages: &[MessageRecord]) -> PerformanceInsights {
    let mut by_day: BTreeMap<u32, StatusCounts> = BTreeMap::new();
    let mut by_hour: BTreeMap<u32, StatusCounts> = BTreeMap::new();
    for m in messages {
        by_day
            .entry(m.created_at.weekday().num_days_from_sunday())
            .or_default()
            .add(m.status);
        by_hour.entry(m.created_at.hour()).or_default().add(m.status);
    }

    let mut days: Vec<(u32, SlotPerformance)> = by_day
        .into_iter()
        .map(|(idx, c)| (idx, slot(day_name(idx).to_string(), &c)))
        .collect();
    days.sort_by(|a, b| {
        by_reply_then_open(
            (&a.0, a.1.reply_rate, a.1.open_rate),
            (&b.0, b.1.reply_rate, b.1.open_rate),
        )
    });

    let mut hours: Vec<(u32, SlotPerformance)> = by_hour
        .into_iter()
        .map(|(hour, c)| (hour, slot(format!("{:02}:00", hour), &c)))
        .collect();
    hours.sort_by(|a, b| {
        by_reply_then_open(
            (&a.0, a.1.reply_rate, a.1.open_rate),
            (&b.0, b.1.reply_rate, b.1.open_rate),
        )
    });

    let best_day = days.first().map(|(_, s)| s.label.clone());
    let best_hour = hours.first().map(|(h, _)| *h);

    let mut recommendations = Vec::new();
    match days.first() {
        Some((_, s)) => recommendations.push(format!(
            "Send on {} for the best reply rate ({:.2}%).",
            s.label, s.reply_rate
        )),
        None => recommendations.push("Not enough data yet to pick a best day.".to_string()),
    }
    match hours.first() {
        Some((h, s)) => recommendations.push(format!(
            "Schedule sends around {:02}:00 UTC ({:.2}% reply rate).",
            h, s.reply_rate
        )),
        None => recommendations.push("Not enough data yet to pick a best hour.".to_string()),
    }

    PerformanceInsights {
        by_day: days.into_iter().map(|(_, s)| s).collect(),
        by_hour: hours.into_iter().map(|(_, s)| s).collect(),
        best_day,
        best_hour,
        recommendations,
    }
}

fn slot(label: String, c: &StatusCounts) -> SlotPerformance {
    SlotPerformance {
        label,
        sent: c.sent,
        opened: c.opened,
        replied: c.replied,
        open_rate: c.open_rate(),
        reply_rate: c.reply_rate(),
    }
}

/// Proyección ingenua: mejora relativa fija `improvement_factor` sobre las tasas actuales.
pub fn predictive_analytics(
    messages: &[MessageRecord],
    active_campaigns: usize,
    improvement_factor: f64,
) -> PredictiveAnalytics {
    let c = StatusCounts::from_messages(messages);
    let current_open_rate = c.open_rate();
    let current_reply_rate = c.reply_rate();

    let mut recommendations = Vec::new();
    if current_open_rate < 20.0 {
        recommendations.push(
            "Open rate is below 20%: try shorter, more personal subject lines.".to_string(),
        );
    }
    if current_reply_rate < 5.0 {
        recommendations.push(
            "Reply rate is below 5%: add a clear call to action and personalize the opening."
                .to_string(),
        );
    }
    if active_campaigns > 5 {
        recommendations.push(format!(
            "{} active campaigns: consolidate them to avoid contact fatigue.",
            active_campaigns
        ));
    }

    PredictiveAnalytics {
        current_open_rate,
        current_reply_rate,
        improvement_factor,
        predicted_performance: PredictedPerformance {
            open_rate: round_2dp(current_open_rate * (1.0 + improvement_factor)),
            reply_rate: round_2dp(current_reply_rate * (1.0 + improvement_factor)),
            estimated_additional_opens: (c.opened as f64 * improvement_factor).round() as u64,
            estimated_additional_replies: (c.replied as f64 * improvement_factor).round() as u64,
        },
        recommendations,
    }
}

/// Puntaje del contacto: (aperturas + 3 * respuestas) / enviados.
pub fn engagement_score(c: &StatusCounts) -> f64 {
    if c.sent == 0 {
        return 0.0;
    }
    (c.opened as f64 + c.replied as f64 * 3.0) / c.sent as f64
}

pub fn contact_segmentation(messages: &[MessageRecord]) -> ContactSegmentation {
    let mut per_contact: BTreeMap<&str, StatusCounts> = BTreeMap::new();
    for m in messages {
        per_contact
            .entry(m.contact_id.as_str())
            .or_default()
            .add(m.status);
    }

    let mut seg = ContactSegmentation::default();
    for (contact_id, c) in per_contact.into_iter().filter(|(_, c)| c.sent >= 1) {
        let score = engagement_score(&c);
        let bucket = if score >= 2.0 {
            &mut seg.high_engagement
        } else if score >= 1.0 {
            &mut seg.medium_engagement
        } else {
            &mut seg.low_engagement
        };
        bucket.push(contact_id.to_string());
    }

    seg.summary = SegmentSummary {
        high: seg.high_engagement.len(),
        medium: seg.medium_engagement.len(),
        low: seg.low_engagement.len(),
        total: seg.high_engagement.len() + seg.medium_engagement.len() + seg.low_engagement.len(),
    };
    seg
}

pub fn optimal_send_times(messages: &[MessageRecord]) -> Vec<OptimalSendTime> {
    let mut slots: BTreeMap<(u32, u32), StatusCounts> = BTreeMap::new();
    for m in messages {
        let key = (m.created_at.weekday().num_days_from_sunday(), m.created_at.hour());
        slots.entry(key).or_default().add(m.status);
    }

    let mut ranked: Vec<((u32, u32), StatusCounts)> = slots
        .into_iter()
        .filter(|(_, c)| c.total >= OPTIMAL_TIME_MIN_SAMPLES)
        .collect();
    ranked.sort_by(|a, b| {
        by_reply_then_open(
            (&a.0, a.1.reply_rate(), a.1.open_rate()),
            (&b.0, b.1.reply_rate(), b.1.open_rate()),
        )
    });

    ranked
        .into_iter()
        .take(OPTIMAL_TIME_TOP_N)
        .map(|((day, hour), c)| OptimalSendTime {
            day: day_name(day).to_string(),
            hour,
            open_rate: c.open_rate(),
            reply_rate: c.reply_rate(),
            sample_size: c.total,
        })
        .collect()
}

pub fn template_comparison(
    messages: &[MessageRecord],
    templates: &[TemplateRecord],
) -> Vec<TemplateComparison> {
    let names: HashMap<&str, &str> = templates
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();

    let mut groups: BTreeMap<&str, StatusCounts> = BTreeMap::new();
    for m in messages {
        if let Some(t) = m.template_id.as_deref() {
            groups.entry(t).or_default().add(m.status);
        }
    }

    let mut rows: Vec<TemplateComparison> = groups
        .into_iter()
        .map(|(id, c)| TemplateComparison {
            template_id: id.to_string(),
            name: names.get(id).copied().unwrap_or("Unknown template").to_string(),
            sent: c.sent,
            opened: c.opened,
            replied: c.replied,
            open_rate: c.open_rate(),
            reply_rate: c.reply_rate(),
        })
        .collect();
    rows.sort_by(|a, b| {
        by_reply_then_open(
            (&a.template_id, a.reply_rate, a.open_rate),
            (&b.template_id, b.reply_rate, b.open_rate),
        )
    });
    rows
}
