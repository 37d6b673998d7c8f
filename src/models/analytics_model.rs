//! models/analytics_model.rs
//! Query de analytics, resolución del rango de fechas y estructuras de respuesta.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Tope de días para un rango con fechas explícitas (una serie diaria por día).
pub const MAX_CUSTOM_RANGE_DAYS: i64 = 366;

/// Query string de GET /api/analytics
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub time_range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub campaign_id: Option<String>,
    pub include_advanced: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "custom")]
    Custom,
}

impl TimeRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "7d" => Some(TimeRange::Last7Days),
            "30d" => Some(TimeRange::Last30Days),
            "90d" => Some(TimeRange::Last90Days),
            _ => None,
        }
    }

    fn days(&self) -> Option<i64> {
        match self {
            TimeRange::Last7Days => Some(7),
            TimeRange::Last30Days => Some(30),
            TimeRange::Last90Days => Some(90),
            TimeRange::Custom => None,
        }
    }
}

/// Ventana ya resuelta `[start, end]`, con el número de días del time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub range: TimeRange,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub day_span: i64,
}

impl DateRange {
    /// Fechas explícitas tienen prioridad sobre el rango con nombre (default 30d).
    pub fn resolve(query: &AnalyticsQuery, now: DateTime<Utc>) -> Result<Self, AppError> {
        let start_raw = query.start_date.as_deref().filter(|s| !s.trim().is_empty());
        let end_raw = query.end_date.as_deref().filter(|s| !s.trim().is_empty());

        match (start_raw, end_raw) {
            (Some(s), Some(e)) => {
                let start = parse_date(s, false)
                    .ok_or_else(|| AppError::validation("startDate", "is not a valid date"))?;
                let end = parse_date(e, true)
                    .ok_or_else(|| AppError::validation("endDate", "is not a valid date"))?;
                if start > end {
                    return Err(AppError::validation(
                        "startDate",
                        "must not be after endDate",
                    ));
                }
                let span = i64::from(
                    end.date_naive().num_days_from_ce() - start.date_naive().num_days_from_ce(),
                ) + 1;
                if span > MAX_CUSTOM_RANGE_DAYS {
                    return Err(AppError::validation(
                        "endDate",
                        format!("range must not exceed {} days", MAX_CUSTOM_RANGE_DAYS),
                    ));
                }
                Ok(DateRange {
                    range: TimeRange::Custom,
                    start,
                    end,
                    day_span: span.max(1),
                })
            }
            (Some(_), None) => Err(AppError::validation(
                "endDate",
                "is required when startDate is given",
            )),
            (None, Some(_)) => Err(AppError::validation(
                "startDate",
                "is required when endDate is given",
            )),
            (None, None) => {
                let range = match query.time_range.as_deref() {
                    None | Some("") => TimeRange::Last30Days,
                    Some(raw) => TimeRange::parse(raw).ok_or_else(|| {
                        AppError::validation("timeRange", "must be one of 7d, 30d, 90d")
                    })?,
                };
                let days = range.days().unwrap_or(30);
                let first_day = now.date_naive() - Duration::days(days - 1);
                Ok(DateRange {
                    range,
                    start: Utc.from_utc_datetime(&first_day.and_time(NaiveTime::MIN)),
                    end: now,
                    day_span: days,
                })
            }
        }
    }

    /// Días calendario (UTC) cubiertos por la ventana, en orden.
    pub fn days(&self) -> Vec<NaiveDate> {
        let first = self.start.date_naive();
        (0..self.day_span).map(|i| first + Duration::days(i)).collect()
    }
}

fn parse_date(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::MIN
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Conteos y tasas enteras (0 cuando no hay enviados).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub active_campaigns: usize,
    pub total_campaigns: usize,
    pub total_contacts: i64,
    pub sent_messages: usize,
    pub opened_messages: usize,
    pub replied_messages: usize,
    pub bounced_messages: usize,
    pub open_rate: u32,
    pub reply_rate: u32,
    pub bounce_rate: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPerformance {
    pub campaign_id: String,
    pub name: String,
    pub status: String,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
    pub bounced: usize,
    pub open_rate: u32,
    pub reply_rate: u32,
    pub bounce_rate: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub date: String,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUsage {
    pub template_id: String,
    pub name: String,
    pub category: String,
    pub usage_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AbTestVariant {
    pub variant: String,
    pub total_messages: usize,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
    pub open_rate: f64,
    pub reply_rate: f64,
    pub confidence_interval: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotPerformance {
    pub label: String,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
    pub open_rate: f64,
    pub reply_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInsights {
    pub by_day: Vec<SlotPerformance>,
    pub by_hour: Vec<SlotPerformance>,
    pub best_day: Option<String>,
    pub best_hour: Option<u32>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictedPerformance {
    pub open_rate: f64,
    pub reply_rate: f64,
    pub estimated_additional_opens: u64,
    pub estimated_additional_replies: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveAnalytics {
    pub current_open_rate: f64,
    pub current_reply_rate: f64,
    pub improvement_factor: f64,
    pub predicted_performance: PredictedPerformance,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactSegmentation {
    pub high_engagement: Vec<String>,
    pub medium_engagement: Vec<String>,
    pub low_engagement: Vec<String>,
    pub summary: SegmentSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimalSendTime {
    pub day: String,
    pub hour: u32,
    pub open_rate: f64,
    pub reply_rate: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateComparison {
    pub template_id: String,
    pub name: String,
    pub sent: usize,
    pub opened: usize,
    pub replied: usize,
    pub open_rate: f64,
    pub reply_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedAnalytics {
    pub ab_testing: Vec<AbTestVariant>,
    pub performance_insights: PerformanceInsights,
    pub predictive_analytics: PredictiveAnalytics,
    pub contact_segmentation: ContactSegmentation,
    pub optimal_send_times: Vec<OptimalSendTime>,
    pub template_comparison: Vec<TemplateComparison>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub overview: Overview,
    pub campaign_performance: Vec<CampaignPerformance>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub template_usage: Vec<TemplateUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedAnalytics>,
}
