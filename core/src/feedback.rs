//! Feedback ingestor: normalizes a provider notification into a
//! `FeedbackEvent`, writes the append-only `FeedbackLog` row, enqueues the
//! analytics reducer job, and (for a permanent bounce) synchronously
//! suppresses the recipient.

use chrono::Utc;
use entity::{feedback_log, suppression};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use shared::constants::QUEUE_ANALYTICS;
use shared::dto::feedback::{FeedbackEvent, FeedbackEventKind};
use tracing::instrument;
use uuid::Uuid;

use crate::queue::{EnqueueOptions, JobQueue};
use crate::suppression_cache::SuppressionCache;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEventJob {
    pub feedback_log_id: i32,
}

/// The payload enqueued on the `webhook` queue by the public intake
/// endpoint: the SNS envelope's already-decoded `Message` body, so the
/// worker only has to run [`normalize`]/[`resolve_org_id`]/[`ingest`], not
/// re-verify a signature.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    pub body: serde_json::Value,
}

/// Runs the full worker-side pipeline for one dequeued webhook body:
/// normalize, attribute to a tenant, ingest. An event whose organization
/// can't be determined is dropped (logged, not retried) rather than
/// failing the job, since retrying won't make the message id resolvable.
#[instrument(skip(db, suppression, job))]
pub async fn process_webhook_job(
    db: &DatabaseConnection,
    suppression: &crate::suppression_cache::SuppressionCache,
    job: &WebhookJob,
) -> anyhow::Result<()> {
    let event = normalize(&job.body)?;

    let Some(org_id) = resolve_org_id(db, &event).await? else {
        tracing::warn!(message_id = ?event.message_id, "dropping webhook event with unresolvable org");
        return Ok(());
    };

    ingest(db, suppression, org_id, &event).await
}

/// Parses an SES/SNS-style notification body into the canonical event
/// shape. The exact JSON schema is provider-specific; this matches SES
/// event publishing's `eventType` + `mail`/`bounce`/`complaint`/`delivery`/
/// `open`/`click` sub-objects.
pub fn normalize(body: &serde_json::Value) -> anyhow::Result<FeedbackEvent> {
    let event_type = body
        .get("eventType")
        .or_else(|| body.get("notificationType"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing eventType"))?;

    let mail = body.get("mail");
    let message_id = mail
        .and_then(|m| m.get("messageId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_owned());

    let feedback_id = match &message_id {
        Some(mid) => format!("{mid}:{event_type}"),
        None => Uuid::new_v4().to_string(),
    };

    let first_recipient = |obj: &serde_json::Value, key: &str| -> Option<String> {
        obj.get(key)
            .and_then(|v| v.get("recipients"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .map(|s| s.to_owned())
    };

    let (email, kind) = match event_type {
        "Bounce" => {
            let bounce = body.get("bounce").cloned().unwrap_or_default();
            let permanent = bounce.get("bounceType").and_then(|v| v.as_str()) == Some("Permanent");
            let reason = bounce
                .get("bouncedRecipients")
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|r| r.get("diagnosticCode"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_owned();
            let email = first_recipient(body, "bounce").unwrap_or_default();
            (email, FeedbackEventKind::Bounce { permanent, reason })
        }
        "Complaint" => {
            let email = first_recipient(body, "complaint").unwrap_or_default();
            (email, FeedbackEventKind::Complaint)
        }
        "Delivery" => {
            let email = first_recipient(body, "delivery").unwrap_or_default();
            (email, FeedbackEventKind::Delivery)
        }
        "Send" => {
            let email = mail
                .and_then(|m| m.get("destination"))
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned();
            (email, FeedbackEventKind::Send)
        }
        "Reject" => {
            let email = mail
                .and_then(|m| m.get("destination"))
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned();
            (email, FeedbackEventKind::Reject)
        }
        "Open" => {
            let email = first_recipient(body, "open").unwrap_or_default();
            (email, FeedbackEventKind::Open)
        }
        "Click" => {
            let url = body
                .get("click")
                .and_then(|v| v.get("link"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned();
            let email = first_recipient(body, "click").unwrap_or_default();
            (email, FeedbackEventKind::Click { url })
        }
        other => anyhow::bail!("unrecognized event type: {other}"),
    };

    Ok(FeedbackEvent {
        feedback_id,
        tracking_id: None,
        message_id,
        email,
        kind,
        timestamp: Utc::now(),
    })
}

/// Resolves which organization a normalized event belongs to by looking up
/// the `EmailLog` row its `message_id` points at. The public webhook intake
/// endpoint has no tenant context of its own (SES/SNS delivers one account-
/// wide stream), so this is the only way to attribute an event to a
/// tenant; an event whose message id is unknown (or missing) can't be
/// attributed and is dropped by the caller.
#[instrument(skip(db, event))]
pub async fn resolve_org_id(db: &DatabaseConnection, event: &FeedbackEvent) -> anyhow::Result<Option<i32>> {
    let Some(message_id) = &event.message_id else {
        return Ok(None);
    };
    let log = entity::email_log::Entity::find()
        .filter(entity::email_log::Column::MessageId.eq(message_id.clone()))
        .one(db)
        .await?;
    Ok(log.map(|row| row.org_id))
}

/// Ingests one normalized event for `org_id`: writes the FeedbackLog row,
/// enqueues the reducer job, and synchronously suppresses a permanent
/// bounce's recipient.
#[instrument(skip(db, suppression, event), fields(org_id))]
pub async fn ingest(
    db: &DatabaseConnection,
    suppression: &SuppressionCache,
    org_id: i32,
    event: &FeedbackEvent,
) -> anyhow::Result<()> {
    let kind_str = event_kind_label(&event.kind);

    let email_log_id = match (&event.message_id, &event.tracking_id) {
        (Some(message_id), _) => entity::email_log::Entity::find()
            .filter(entity::email_log::Column::MessageId.eq(message_id.clone()))
            .one(db)
            .await?
            .map(|row| row.id),
        (None, Some(tracking_id)) => entity::email_log::Entity::find()
            .filter(entity::email_log::Column::TrackingId.eq(tracking_id.to_string()))
            .one(db)
            .await?
            .map(|row| row.id),
        (None, None) => None,
    };

    let log = feedback_log::ActiveModel {
        id: NotSet,
        org_id: Set(org_id),
        feedback_id: Set(event.feedback_id.clone()),
        email_log_id: Set(email_log_id),
        kind: Set(kind_str.to_owned()),
        email: Set(event.email.clone()),
        timestamp: Set(event.timestamp),
        details: Set(serde_json::to_value(&event.kind)?),
        processed_at: Set(None),
    };

    let existing = feedback_log::Entity::find()
        .filter(feedback_log::Column::FeedbackId.eq(event.feedback_id.clone()))
        .one(db)
        .await?;

    let log = match existing {
        Some(row) => row,
        None => log.insert(db).await?,
    };

    if let FeedbackEventKind::Bounce { permanent: true, reason } = &event.kind {
        suppress(db, org_id, &event.email, reason).await?;
        suppression.invalidate(org_id, &event.email);
    }

    let queue = JobQueue::new(db, QUEUE_ANALYTICS);
    queue
        .enqueue(
            &ProcessEventJob {
                feedback_log_id: log.id,
            },
            &EnqueueOptions::default(),
        )
        .await?;

    Ok(())
}

async fn suppress(db: &DatabaseConnection, org_id: i32, email: &str, reason: &str) -> anyhow::Result<()> {
    let existing = suppression::Entity::find()
        .filter(suppression::Column::OrgId.eq(org_id))
        .filter(suppression::Column::Email.eq(email.to_lowercase()))
        .one(db)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let row = suppression::ActiveModel {
        id: NotSet,
        org_id: Set(org_id),
        email: Set(email.to_lowercase()),
        reason: Set(reason.to_owned()),
        bounce_type: Set(Some(entity::enums::BounceType::Hard)),
        created_at: Set(Utc::now()),
    };
    row.insert(db).await?;
    Ok(())
}

fn event_kind_label(kind: &FeedbackEventKind) -> &'static str {
    match kind {
        FeedbackEventKind::Delivery => "delivery",
        FeedbackEventKind::Open => "open",
        FeedbackEventKind::Click { .. } => "click",
        FeedbackEventKind::Bounce { .. } => "bounce",
        FeedbackEventKind::Complaint => "complaint",
        FeedbackEventKind::Reject => "reject",
        FeedbackEventKind::Send => "send",
        FeedbackEventKind::Unsubscribe { .. } => "unsubscribe",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_permanent_bounce() {
        let body = json!({
            "eventType": "Bounce",
            "mail": { "messageId": "m-1" },
            "bounce": {
                "bounceType": "Permanent",
                "bouncedRecipients": [{ "emailAddress": "a@b.com", "diagnosticCode": "550 no such user" }],
                "recipients": ["a@b.com"]
            }
        });
        let event = normalize(&body).unwrap();
        assert_eq!(event.email, "a@b.com");
        match event.kind {
            FeedbackEventKind::Bounce { permanent, reason } => {
                assert!(permanent);
                assert_eq!(reason, "550 no such user");
            }
            _ => panic!("expected bounce"),
        }
    }

    #[test]
    fn normalizes_click_with_url() {
        let body = json!({
            "eventType": "Click",
            "mail": { "messageId": "m-2" },
            "click": { "link": "https://example.com/x" },
            "recipients": ["c@d.com"]
        });
        let event = normalize(&body).unwrap();
        match event.kind {
            FeedbackEventKind::Click { url } => assert_eq!(url, "https://example.com/x"),
            _ => panic!("expected click"),
        }
    }

    #[test]
    fn unrecognized_event_type_errors() {
        let body = json!({ "eventType": "Mystery" });
        assert!(normalize(&body).is_err());
    }
}
