//! tests/models_tests.rs
//! Validación de requests, resolución de rangos y transiciones de estado.

use chrono::{NaiveDate, TimeZone, Timelike, Utc};

use crate::errors::AppError;
use crate::models::analytics_model::{AnalyticsQuery, DateRange, TimeRange, MAX_CUSTOM_RANGE_DAYS};
use crate::models::campaign_model::MessageStatus;
use crate::models::dispatch_model::{DispatchOptions, DEFAULT_BATCH_SIZE, DEFAULT_DELAY_MS};
use crate::tests::support::{dispatch_request, recipients};

fn field_names(err: AppError) -> Vec<String> {
    match err {
        AppError::Validation(details) => details.into_iter().map(|d| d.field).collect(),
        other => panic!("expected validation error, got {:?}", other),
    }
}

fn query(time_range: Option<&str>, start: Option<&str>, end: Option<&str>) -> AnalyticsQuery {
    AnalyticsQuery {
        time_range: time_range.map(str::to_string),
        start_date: start.map(str::to_string),
        end_date: end.map(str::to_string),
        ..Default::default()
    }
}

// ----------------------------------------------------------------
// DateRange
// ----------------------------------------------------------------

#[test]
fn default_range_is_last_30_days() {
    let now = Utc.with_ymd_and_hms(2025, 3, 31, 18, 45, 0).unwrap();
    let range = DateRange::resolve(&query(None, None, None), now).unwrap();

    assert_eq!(range.range, TimeRange::Last30Days);
    assert_eq!(range.day_span, 30);
    assert_eq!(range.end, now);
    assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap());

    let days = range.days();
    assert_eq!(days.len(), 30);
    assert_eq!(days.last().copied(), NaiveDate::from_ymd_opt(2025, 3, 31));
}

#[test]
fn named_ranges_resolve() {
    let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
    let week = DateRange::resolve(&query(Some("7d"), None, None), now).unwrap();
    assert_eq!(week.range, TimeRange::Last7Days);
    assert_eq!(week.day_span, 7);

    let quarter = DateRange::resolve(&query(Some("90d"), None, None), now).unwrap();
    assert_eq!(quarter.day_span, 90);
}

#[test]
fn explicit_dates_override_named_range() {
    let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
    let range = DateRange::resolve(
        &query(Some("7d"), Some("2025-03-01"), Some("2025-03-10")),
        now,
    )
    .unwrap();

    assert_eq!(range.range, TimeRange::Custom);
    assert_eq!(range.day_span, 10);
    assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    assert_eq!(range.end.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    assert_eq!(range.end.hour(), 23);
}

#[test]
fn same_day_custom_range_spans_one_day() {
    let now = Utc::now();
    let range = DateRange::resolve(
        &query(None, Some("2025-03-05T08:00:00Z"), Some("2025-03-05T17:00:00Z")),
        now,
    )
    .unwrap();
    assert_eq!(range.day_span, 1);
}

#[test]
fn start_after_end_is_rejected() {
    let err = DateRange::resolve(
        &query(None, Some("2025-03-10"), Some("2025-03-01")),
        Utc::now(),
    )
    .unwrap_err();
    assert_eq!(field_names(err), vec!["startDate"]);
}

#[test]
fn custom_range_span_is_capped() {
    let now = Utc::now();
    let full_year = DateRange::resolve(
        &query(None, Some("2024-01-01"), Some("2024-12-31")),
        now,
    )
    .unwrap();
    assert_eq!(full_year.day_span, MAX_CUSTOM_RANGE_DAYS);

    let err = DateRange::resolve(
        &query(None, Some("2024-01-01"), Some("2025-01-01")),
        now,
    )
    .unwrap_err();
    assert_eq!(field_names(err), vec!["endDate"]);

    let err = DateRange::resolve(
        &query(None, Some("0001-01-01"), Some("9999-12-31")),
        now,
    )
    .unwrap_err();
    assert_eq!(field_names(err), vec!["endDate"]);
}

#[test]
fn lone_date_is_rejected() {
    let err = DateRange::resolve(&query(None, Some("2025-03-10"), None), Utc::now()).unwrap_err();
    assert_eq!(field_names(err), vec!["endDate"]);

    let err = DateRange::resolve(&query(None, None, Some("2025-03-10")), Utc::now()).unwrap_err();
    assert_eq!(field_names(err), vec!["startDate"]);
}

#[test]
fn unknown_time_range_and_bad_dates_are_rejected() {
    let err = DateRange::resolve(&query(Some("1y"), None, None), Utc::now()).unwrap_err();
    assert_eq!(field_names(err), vec!["timeRange"]);

    let err = DateRange::resolve(&query(None, Some("yesterday"), Some("2025-03-10")), Utc::now())
        .unwrap_err();
    assert_eq!(field_names(err), vec!["startDate"]);
}

// ----------------------------------------------------------------
// DispatchRequest
// ----------------------------------------------------------------

#[test]
fn valid_request_applies_defaults() {
    let mut req = dispatch_request(3);
    req.batch_size = None;
    req.delay_ms = None;
    req.campaign_id = Some("   ".to_string());

    let cmd = req.validate().unwrap();
    assert_eq!(cmd.options.batch_size(), DEFAULT_BATCH_SIZE);
    assert_eq!(cmd.options.delay_ms(), DEFAULT_DELAY_MS);
    assert_eq!(cmd.recipients.len(), 3);
    assert!(cmd.campaign_id.is_none());
}

#[test]
fn recipient_count_bounds() {
    let mut req = dispatch_request(0);
    req.recipients.clear();
    assert_eq!(field_names(req.validate().unwrap_err()), vec!["recipients"]);

    assert!(dispatch_request(100).validate().is_ok());

    let mut req = dispatch_request(100);
    req.recipients = recipients(101);
    assert_eq!(field_names(req.validate().unwrap_err()), vec!["recipients"]);
}

#[test]
fn all_field_errors_are_reported_together() {
    let mut req = dispatch_request(2);
    req.sender.email = "not-an-email".to_string();
    req.recipients[1].email = "broken@".to_string();
    req.subject = "x".repeat(201);
    req.message_template = "too short".to_string();
    req.batch_size = Some(51);
    req.delay_ms = Some(10_001);

    let fields = field_names(req.validate().unwrap_err());
    assert_eq!(
        fields,
        vec![
            "sender.email",
            "recipients[1].email",
            "subject",
            "messageTemplate",
            "batchSize",
            "delayMs",
        ]
    );
}

#[test]
fn subject_and_template_edges() {
    let mut req = dispatch_request(1);
    req.subject = "s".repeat(200);
    req.message_template = "t".repeat(10);
    assert!(req.validate().is_ok());

    let mut req = dispatch_request(1);
    req.subject = String::new();
    req.message_template = "t".repeat(10_001);
    assert_eq!(
        field_names(req.validate().unwrap_err()),
        vec!["subject", "messageTemplate"]
    );
}

#[test]
fn dispatch_options_bounds() {
    assert!(DispatchOptions::new(Some(1), Some(0)).is_ok());
    assert!(DispatchOptions::new(Some(50), Some(10_000)).is_ok());
    assert!(DispatchOptions::new(Some(0), None).is_err());
    assert_eq!(DispatchOptions::new(Some(0), Some(20_000)).unwrap_err().len(), 2);

    let defaults = DispatchOptions::default();
    assert_eq!(defaults.batch_size(), 10);
    assert_eq!(defaults.delay_ms(), 1000);
}

#[test]
fn dispatch_request_deserializes_camel_case() {
    let raw = serde_json::json!({
        "sender": { "name": "Ana", "email": "ana@outreach.test" },
        "recipients": [{ "email": "bob@example.com", "name": "Bob" }],
        "subject": "Hola",
        "messageTemplate": "Hola {{name}}, ¿hablamos?",
        "campaignId": "camp-1",
        "batchSize": 5
    });
    let req: crate::models::dispatch_model::DispatchRequest = serde_json::from_value(raw).unwrap();
    assert_eq!(req.batch_size, Some(5));
    assert_eq!(req.delay_ms, None);
    assert_eq!(req.recipients[0].company, None);

    let cmd = req.validate().unwrap();
    assert_eq!(cmd.campaign_id.as_deref(), Some("camp-1"));
}

// ----------------------------------------------------------------
// MessageStatus
// ----------------------------------------------------------------

#[test]
fn message_status_only_moves_forward() {
    use MessageStatus::*;

    assert!(Queued.can_transition_to(Sent));
    assert!(Queued.can_transition_to(Failed));
    assert!(Sent.can_transition_to(Opened));
    assert!(Sent.can_transition_to(Bounced));
    assert!(Opened.can_transition_to(Replied));

    assert!(!Sent.can_transition_to(Queued));
    assert!(!Replied.can_transition_to(Opened));
    assert!(!Failed.can_transition_to(Sent));
    assert!(!Queued.can_transition_to(Opened));
    assert!(!Bounced.can_transition_to(Opened));
}

#[test]
fn message_status_round_trips_through_text() {
    for status in [
        MessageStatus::Queued,
        MessageStatus::Sent,
        MessageStatus::Opened,
        MessageStatus::Replied,
        MessageStatus::Bounced,
        MessageStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<MessageStatus>().unwrap(), status);
    }
    assert!("delivered".parse::<MessageStatus>().is_err());
}
