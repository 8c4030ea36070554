//! End-to-end tests of the escalation engine against an in-memory SQLite
//! database with fake HTTP and SMTP transports.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use escalator::config::EngineConfig;
use escalator::database::models::{
    ChannelDbModel, NotificationDbModel, NotificationStatus, NotificationUpdate, UserDbModel,
    UserNotificationPreferencesDbModel, WorkflowDbModel,
};
use escalator::database::repositories::Repositories;
use escalator::database::time::datetime_to_ms;
use escalator::database::{DbPool, init_pool_with_size, run_migrations};
use escalator::domain::{DndMode, DndWindow, Event, Severity, UserNotificationPreferences};
use escalator::engine::{EscalationEngine, ProcessSummary, SweepSummary};
use escalator::notification::{EmailMessage, EmailTransport, HttpClient, HttpResponse};
use escalator::{Error, Result};

const ORG: &str = "org-1";

#[derive(Default)]
struct FakeHttp {
    requests: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn post_json(&self, url: &str, _headers: &[(String, String)], body: &Value) -> Result<HttpResponse> {
        self.requests.lock().await.push((url.to_string(), body.clone()));
        Ok(HttpResponse {
            status: 200,
            body: "ok".to_string(),
        })
    }
}

#[derive(Default)]
struct FakeEmail {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailTransport for FakeEmail {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        if message.to.ends_with("@bounce.test") {
            return Err(Error::transport("mailbox unavailable"));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

struct Harness {
    _pool: DbPool,
    repos: Repositories,
    http: Arc<FakeHttp>,
    email: Arc<FakeEmail>,
    engine: EscalationEngine,
}

/// Monday 2024-01-01 12:00 UTC.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

async fn harness_with(config: EngineConfig) -> Harness {
    let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repos = Repositories::sqlx(pool.clone());
    let http = Arc::new(FakeHttp::default());
    let email = Arc::new(FakeEmail::default());
    let engine = EscalationEngine::with_transports(repos.clone(), http.clone(), email.clone(), config);

    Harness {
        _pool: pool,
        repos,
        http,
        email,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

impl Harness {
    async fn event(&self, id: &str, event_type: &str, severity: Severity) -> Event {
        let event = Event {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            event_type: event_type.to_string(),
            severity,
            confidence: 0.9,
            zone_name: Some("Perimeter".to_string()),
            camera_name: "Gate 3".to_string(),
            description: "Person climbing fence".to_string(),
            created_at: t0(),
        };
        self.repos.events.create_event(&event.to_db_model()).await.unwrap();
        event
    }

    async fn workflow(&self, id: &str, conditions: Value, policy: Value, use_user_preferences: bool) {
        self.repos
            .workflows
            .create_workflow(&WorkflowDbModel {
                id: id.to_string(),
                organization_id: ORG.to_string(),
                name: format!("workflow {}", id),
                is_active: true,
                trigger_conditions: Some(conditions.to_string()),
                escalation_policy: policy.to_string(),
                use_user_preferences,
                created_at: datetime_to_ms(t0()),
            })
            .await
            .unwrap();
    }

    async fn channel(&self, id: &str, channel_type: &str, config: Value, is_active: bool) {
        self.repos
            .channels
            .create_channel(&ChannelDbModel {
                id: id.to_string(),
                organization_id: ORG.to_string(),
                channel_type: channel_type.to_string(),
                channel_name: format!("{} channel", channel_type),
                is_active,
                channel_configuration: config.to_string(),
            })
            .await
            .unwrap();
    }

    async fn user(&self, id: &str, email: &str) {
        self.repos
            .users
            .create_user(&UserDbModel {
                id: id.to_string(),
                organization_id: ORG.to_string(),
                email: email.to_string(),
                full_name: None,
            })
            .await
            .unwrap();
    }

    async fn records(&self, event_id: &str) -> Vec<NotificationDbModel> {
        self.repos.notifications.list_for_event(event_id).await.unwrap()
    }
}

#[tokio::test]
async fn test_immediate_step_writes_one_terminal_record() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({"event_types": ["intrusion"]}),
        json!([{"channel_ids": ["c1"], "delay_minutes": 0}]),
        false,
    )
    .await;
    h.channel("c1", "webhook", json!({"url": "https://hooks.example.com/a"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(
        summary,
        ProcessSummary {
            workflows_matched: 1,
            records_written: 1,
            scheduled: 0
        }
    );

    let records = h.records("e1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "sent");
    assert_eq!(records[0].notification_type, "webhook");
    assert_eq!(records[0].escalation_step, 0);
    assert_eq!(records[0].title, "Critical Alert: intrusion");
    assert_eq!(records[0].sent_at, Some(datetime_to_ms(t0())));

    let requests = h.http.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "https://hooks.example.com/a");
    assert_eq!(requests[0].1["event_id"], "e1");
}

#[tokio::test]
async fn test_delayed_step_is_persisted_then_swept_in_place() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({"event_types": ["intrusion"]}),
        json!([
            {"channel_ids": ["c1"], "delay_minutes": 0},
            {"channel_ids": ["c2"], "delay_minutes": 15}
        ]),
        false,
    )
    .await;
    h.channel("c1", "webhook", json!({"url": "https://hooks.example.com/a"}), true).await;
    h.channel("c2", "sms", json!({"phone_number": "+15550100"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.scheduled, 1);

    let records = h.records("e1").await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, "sent");
    let pending = &records[1];
    assert_eq!(pending.status, "pending");
    assert_eq!(pending.channel_id, "c2");
    assert_eq!(pending.escalation_step, 1);
    assert_eq!(pending.scheduled_for, Some(datetime_to_ms(t0() + Duration::minutes(15))));
    assert_eq!(pending.sent_at, None);

    // Not yet due
    let early = h.engine.process_due_at(t0() + Duration::minutes(10)).await;
    assert_eq!(early, SweepSummary::default());

    let due_at = t0() + Duration::minutes(15);
    let swept = h.engine.process_due_at(due_at).await;
    assert_eq!(
        swept,
        SweepSummary {
            claimed: 1,
            dispatched: 1,
            failed: 0,
            lease_lost: 0
        }
    );

    let records = h.records("e1").await;
    assert_eq!(records.len(), 2, "sweep must update the pending row, not add one");
    let delivered = records.iter().find(|r| r.id == pending.id).unwrap();
    assert_eq!(delivered.status, "sent");
    let sent_at = delivered.sent_at.unwrap();
    assert!((datetime_to_ms(due_at)..datetime_to_ms(due_at) + 1_000).contains(&sent_at));
    assert_eq!(delivered.claimed_until, None);
    let content: Value = serde_json::from_str(delivered.message_content.as_deref().unwrap()).unwrap();
    assert_eq!(content["phone_number"], "+15550100");

    // Terminal records are never picked up again
    let again = h.engine.process_due_at(due_at + Duration::hours(1)).await;
    assert_eq!(again.claimed, 0);
}

#[rstest]
#[case::same_day_before_midnight(DndMode::SameDay, 11, "sent")]
#[case::same_day_after_midnight(DndMode::SameDay, 13, "sent")]
#[case::overnight_before_midnight(DndMode::Overnight, 11, "skipped")]
#[case::overnight_after_midnight(DndMode::Overnight, 13, "skipped")]
#[case::overnight_outside_window(DndMode::Overnight, 20, "sent")]
#[tokio::test]
async fn test_overnight_dnd_window(#[case] mode: DndMode, #[case] hours_after_t0: i64, #[case] expected: &str) {
    let h = harness_with(EngineConfig {
        dnd_mode: mode,
        ..EngineConfig::default()
    })
    .await;
    let event = h.event("e1", "intrusion", Severity::High).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), true).await;
    h.channel("c1", "in_app", json!({}), true).await;
    h.user("u1", "ops@example.com").await;

    let mut prefs = UserNotificationPreferences::new("u1", ORG);
    prefs.do_not_disturb_windows = vec![DndWindow::new(&["monday"], "22:00", "06:00")];
    h.repos
        .users
        .upsert_preferences(&prefs.to_db_model().unwrap())
        .await
        .unwrap();

    // t0 + 11h is Monday 23:00, t0 + 13h is Tuesday 01:00
    h.engine
        .process_event_at(&event, t0() + Duration::hours(hours_after_t0))
        .await;

    let records = h.records("e1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, expected);
    assert_eq!(records[0].user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_email_without_address_fails_without_transport_call() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "email", json!({}), true).await;

    h.engine.process_event_at(&event, t0()).await;

    let records = h.records("e1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "failed");
    assert!(records[0].delivery_error.as_deref().unwrap().contains("not configured"));
    assert!(h.email.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_email_transport_failure_is_recorded() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1", "c2"]}]), false).await;
    h.channel("c1", "email", json!({"email_address": "ops@bounce.test"}), true).await;
    h.channel("c2", "email", json!({"email_address": "ops@example.com"}), true).await;

    h.engine.process_event_at(&event, t0()).await;

    let records = h.records("e1").await;
    let statuses: Vec<_> = records.iter().map(|r| (r.channel_id.as_str(), r.status.as_str())).collect();
    assert_eq!(statuses, vec![("c1", "failed"), ("c2", "sent")]);
    assert!(records[0].delivery_error.as_deref().unwrap().contains("mailbox unavailable"));

    let sent = h.email.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Critical Alert: intrusion");
}

#[tokio::test]
async fn test_inactive_and_missing_channels_are_skipped() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1", "ghost"]}]), false).await;
    h.channel("c1", "slack", json!({"webhook_url": "https://hooks.slack.test/x"}), false).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary.records_written, 2);

    let records = h.records("e1").await;
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, "skipped");
        assert_eq!(record.delivery_error.as_deref(), Some("channel inactive or missing"));
    }
    assert_eq!(records[0].notification_type, "slack");
    assert_eq!(records[1].notification_type, "unknown");
    assert!(h.http.requests.lock().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_channel_type_fails() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "pager", json!({}), true).await;

    h.engine.process_event_at(&event, t0()).await;

    let records = h.records("e1").await;
    assert_eq!(records[0].status, "failed");
    assert_eq!(
        records[0].delivery_error.as_deref(),
        Some("unsupported channel type: pager")
    );
}

#[tokio::test]
async fn test_non_matching_workflows_write_nothing() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Low).await;
    h.workflow("w1", json!({"event_types": ["loitering"]}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.workflow("w2", json!({"severity_levels": ["critical"]}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary, ProcessSummary::default());
    assert!(h.records("e1").await.is_empty());
}

#[tokio::test]
async fn test_malformed_workflow_does_not_block_others() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!({"not": "a list"}), false).await;
    h.workflow("w2", json!({}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary.workflows_matched, 1);

    let records = h.records("e1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].workflow_id, "w2");
}

#[tokio::test]
async fn test_unreadable_preferences_fail_open() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), true).await;
    h.channel("c1", "in_app", json!({}), true).await;
    h.user("u1", "ops@example.com").await;
    h.user("u2", "night@example.com").await;

    h.repos
        .users
        .upsert_preferences(&UserNotificationPreferencesDbModel {
            user_id: "u1".to_string(),
            organization_id: ORG.to_string(),
            mute_alerts: false,
            severity_threshold: "medium".to_string(),
            blocked_channels: "not json".to_string(),
            do_not_disturb_windows: "[]".to_string(),
        })
        .await
        .unwrap();
    let mut muted = UserNotificationPreferences::new("u2", ORG);
    muted.mute_alerts = true;
    h.repos
        .users
        .upsert_preferences(&muted.to_db_model().unwrap())
        .await
        .unwrap();

    h.engine.process_event_at(&event, t0()).await;

    let records = h.records("e1").await;
    let by_user: Vec<_> = records
        .iter()
        .map(|r| (r.user_id.as_deref(), r.status.as_str()))
        .collect();
    assert_eq!(by_user, vec![(Some("u1"), "sent"), (Some("u2"), "skipped")]);
    assert_eq!(records[1].delivery_error.as_deref(), Some("user has muted all alerts"));
}

#[tokio::test]
async fn test_claim_leases_records_until_timeout() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([{"channel_ids": []}, {"channel_ids": ["c1"], "delay_minutes": 5}]),
        false,
    )
    .await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;
    h.engine.process_event_at(&event, t0()).await;

    let now = datetime_to_ms(t0() + Duration::minutes(5));
    let lease = 60_000;
    let notifications = &h.repos.notifications;

    let first = notifications.claim_due(now, now + lease, 10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].claimed_until, Some(now + lease));

    let overlapping = notifications.claim_due(now + 1_000, now + 1_000 + lease, 10).await.unwrap();
    assert!(overlapping.is_empty());

    let after_expiry = now + lease + 1;
    let reclaimed = notifications
        .claim_due(after_expiry, after_expiry + lease, 10)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, first[0].id);
}

#[tokio::test]
async fn test_sweep_fails_record_with_missing_event() {
    let h = harness().await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;

    let created = datetime_to_ms(t0());
    h.repos
        .notifications
        .create_notification(&NotificationDbModel {
            id: "n-orphan".to_string(),
            organization_id: ORG.to_string(),
            user_id: None,
            event_id: "e-missing".to_string(),
            workflow_id: "w1".to_string(),
            channel_id: "c1".to_string(),
            notification_type: "sms".to_string(),
            title: "Critical Alert: intrusion".to_string(),
            description: "Person climbing fence at Gate 3".to_string(),
            severity: "critical".to_string(),
            status: "pending".to_string(),
            delivery_error: None,
            message_content: None,
            escalation_step: 1,
            scheduled_for: Some(created),
            sent_at: None,
            claimed_until: None,
            created_at: created,
            updated_at: created,
        })
        .await
        .unwrap();

    let summary = h.engine.process_due_at(t0() + Duration::minutes(1)).await;
    assert_eq!(
        summary,
        SweepSummary {
            claimed: 1,
            dispatched: 0,
            failed: 1,
            lease_lost: 0
        }
    );

    let records = h.records("e-missing").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "failed");
    assert_eq!(records[0].delivery_error.as_deref(), Some("event e-missing not found"));
    assert_eq!(records[0].claimed_until, None);
    assert_eq!(records[0].sent_at, None);
}

#[tokio::test]
async fn test_sweep_fails_record_when_channel_was_deactivated() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([{"channel_ids": []}, {"channel_ids": ["c1"], "delay_minutes": 5}]),
        false,
    )
    .await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;
    h.engine.process_event_at(&event, t0()).await;

    h.repos.channels.set_channel_active("c1", false).await.unwrap();

    let summary = h.engine.process_due_at(t0() + Duration::minutes(5)).await;
    assert_eq!(summary.failed, 1);

    let records = h.records("e1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "failed");
    assert_eq!(records[0].delivery_error.as_deref(), Some("channel c1 is inactive"));
    assert_eq!(records[0].sent_at, None);
}

#[tokio::test]
async fn test_delayed_in_app_step_fans_out_to_every_user() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([{"channel_ids": []}, {"channel_ids": ["c1"], "delay_minutes": 5}]),
        false,
    )
    .await;
    h.channel("c1", "in_app", json!({}), true).await;
    h.user("u1", "ops@example.com").await;
    h.user("u2", "night@example.com").await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary.scheduled, 1);
    let pending_id = h.records("e1").await[0].id.clone();

    let swept = h.engine.process_due_at(t0() + Duration::minutes(5)).await;
    assert_eq!(swept.dispatched, 1);

    let records = h.records("e1").await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, pending_id);
    assert_eq!(records[0].user_id.as_deref(), Some("u1"));
    assert_eq!(records[1].user_id.as_deref(), Some("u2"));
    assert!(records.iter().all(|r| r.status == "sent" && r.escalation_step == 1));
}

#[tokio::test]
async fn test_non_positive_delay_dispatches_immediately() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([
            {"channel_ids": ["c1"], "delay_minutes": 0},
            {"channel_ids": ["c2"], "delay_minutes": -5}
        ]),
        false,
    )
    .await;
    h.channel("c1", "webhook", json!({"url": "https://hooks.example.com/a"}), true).await;
    h.channel("c2", "sms", json!({"phone_number": "+15550100"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(
        summary,
        ProcessSummary {
            workflows_matched: 1,
            records_written: 2,
            scheduled: 0
        }
    );

    let records = h.records("e1").await;
    let steps: Vec<_> = records
        .iter()
        .map(|r| (r.channel_id.as_str(), r.escalation_step, r.status.as_str()))
        .collect();
    assert_eq!(steps, vec![("c1", 0, "sent"), ("c2", 1, "sent")]);
    assert!(records.iter().all(|r| r.scheduled_for.is_none()));
    assert_eq!(h.http.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn test_out_of_range_delay_fails_only_its_step() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([
            {"channel_ids": ["c1"], "delay_minutes": 0},
            {"channel_ids": ["c2"], "delay_minutes": 9_000_000_000_000_i64},
            {"channel_ids": ["c2"], "delay_minutes": 30}
        ]),
        false,
    )
    .await;
    h.channel("c1", "webhook", json!({"url": "https://hooks.example.com/a"}), true).await;
    h.channel("c2", "sms", json!({"phone_number": "+15550100"}), true).await;

    let summary = h.engine.process_event_at(&event, t0()).await;
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.scheduled, 1);

    let records = h.records("e1").await;
    assert_eq!(records[0].status, "sent");
    assert_eq!(records[1].status, "failed");
    assert_eq!(records[1].escalation_step, 1);
    assert!(records[1].delivery_error.as_deref().unwrap().contains("out of range"));
    assert_eq!(records[2].status, "pending");
    assert_eq!(records[2].escalation_step, 2);
}

#[tokio::test]
async fn test_stale_lease_holder_cannot_overwrite_finished_record() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([{"channel_ids": []}, {"channel_ids": ["c1"], "delay_minutes": 5}]),
        false,
    )
    .await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;
    h.engine.process_event_at(&event, t0()).await;

    let notifications = &h.repos.notifications;
    let due = t0() + Duration::minutes(5);
    let lease = Duration::minutes(5);

    // A slow sweep claims the record and stalls past its lease
    let stale = notifications
        .claim_due(datetime_to_ms(due), datetime_to_ms(due + lease), 10)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    let id = stale[0].id.clone();

    let late = due + Duration::minutes(6);
    let summary = h.engine.process_due_at(late).await;
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.dispatched, 1);

    // The stale holder can neither keep its lease nor finish the record
    let renewed = notifications
        .renew_claim(&id, stale[0].claimed_until.unwrap(), datetime_to_ms(late + lease))
        .await
        .unwrap();
    assert!(!renewed);

    let err = notifications
        .update_notification(
            &id,
            &NotificationUpdate {
                status: NotificationStatus::Failed,
                delivery_error: Some("dispatch timed out after 60s".to_string()),
                message_content: None,
                user_id: None,
                sent_at: None,
                updated_at: datetime_to_ms(late + Duration::minutes(1)),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{err}");

    let record = notifications.get_notification(&id).await.unwrap();
    assert_eq!(record.status, "sent");
    assert_eq!(record.delivery_error, None);
    let sent_at = record.sent_at.unwrap();
    assert!((datetime_to_ms(late)..datetime_to_ms(late) + 1_000).contains(&sent_at));
}

#[tokio::test]
async fn test_terminal_record_rejects_second_update() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow("w1", json!({}), json!([{"channel_ids": ["c1"]}]), false).await;
    h.channel("c1", "sms", json!({"phone_number": "+15550100"}), true).await;
    h.engine.process_event_at(&event, t0()).await;

    let record = h.records("e1").await.remove(0);
    assert_eq!(record.status, "sent");

    let update = NotificationUpdate {
        status: NotificationStatus::Skipped,
        delivery_error: Some("user has muted all alerts".to_string()),
        message_content: None,
        user_id: None,
        sent_at: None,
        updated_at: datetime_to_ms(t0() + Duration::minutes(1)),
    };
    let notifications = &h.repos.notifications;
    assert!(notifications.update_notification(&record.id, &update).await.unwrap_err().is_conflict());
    assert!(notifications.update_notification("nope", &update).await.unwrap_err().is_not_found());

    let unchanged = notifications.get_notification(&record.id).await.unwrap();
    assert_eq!(unchanged.status, "sent");
    assert_eq!(unchanged.sent_at, record.sent_at);
}

#[tokio::test]
async fn test_sent_at_only_on_sent_rows_after_sweep() {
    let h = harness().await;
    let event = h.event("e1", "intrusion", Severity::Critical).await;
    h.workflow(
        "w1",
        json!({}),
        json!([{"channel_ids": []}, {"channel_ids": ["c1", "c2", "c3"], "delay_minutes": 5}]),
        false,
    )
    .await;
    h.channel("c1", "sms", json!({}), true).await;
    h.channel("c2", "in_app", json!({}), true).await;
    h.channel("c3", "webhook", json!({"url": "https://hooks.example.com/a"}), true).await;
    h.engine.process_event_at(&event, t0()).await;

    let summary = h.engine.process_due_at(t0() + Duration::minutes(5)).await;
    assert_eq!(summary.dispatched, 3);

    let records = h.records("e1").await;
    let statuses: Vec<_> = records.iter().map(|r| (r.channel_id.as_str(), r.status.as_str())).collect();
    assert_eq!(statuses, vec![("c1", "failed"), ("c2", "skipped"), ("c3", "sent")]);
    for record in &records {
        assert_eq!(record.sent_at.is_some(), record.status == "sent", "{}", record.channel_id);
        assert_eq!(record.claimed_until, None);
    }
}
