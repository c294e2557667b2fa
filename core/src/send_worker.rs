//! Email-send worker: per-job steps that take a queued EmailLog to a
//! terminal `sent`/`failed`/`dropped` outcome. Grounded on the teacher's
//! `send_with_rate_limiter` retry/error-publish shape, generalized from
//! "retry loop inside one call" to "classify and let the durable queue own
//! retries", since retries here need to survive a worker crash.

use chrono::Utc;
use entity::email_log;
use entity::email_log_event;
use entity::enums::EmailLogStatus;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter, Statement};
use serde_json::json;
use shared::dto::provider::{OutboundEmail, ProviderErrorKind};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dispatcher::SendJob;
use crate::provider::EmailProvider;
use crate::rate_limit::RateLimitChain;
use crate::suppression_cache::SuppressionCache;

pub enum SendJobOutcome {
    Sent,
    Dropped,
    FailedPermanently,
    /// Caller should propagate an error so the job queue schedules a retry.
    RetryNeeded(String),
}

async fn push_event(
    db: &DatabaseConnection,
    email_log_id: i32,
    kind: &str,
    details: serde_json::Value,
) -> anyhow::Result<()> {
    let event = email_log_event::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        email_log_id: Set(email_log_id),
        kind: Set(kind.to_owned()),
        occurred_at: Set(Utc::now()),
        details: Set(details),
    };
    event.insert(db).await?;
    Ok(())
}

/// Runs one send-worker job against `job`. `worker_job_id` is the durable
/// queue's job id, recorded on the `processing` event for traceability.
#[instrument(skip(db, provider, rate_limits, suppression, job), fields(tracking_id = %job.tracking_id))]
pub async fn process_send_job(
    db: &DatabaseConnection,
    provider: &dyn EmailProvider,
    rate_limits: &RateLimitChain,
    suppression: &SuppressionCache,
    job: &SendJob,
    worker_job_id: Uuid,
) -> anyhow::Result<SendJobOutcome> {
    let Some(mut log) = email_log::Entity::find()
        .filter(email_log::Column::TrackingId.eq(job.tracking_id.clone()))
        .one(db)
        .await?
    else {
        return Ok(SendJobOutcome::FailedPermanently);
    };

    push_event(db, log.id, "processing", json!({ "jobId": worker_job_id.to_string() })).await?;

    if suppression.is_suppressed(db, log.org_id, &job.to_email).await? {
        return drop_with_reason(db, &mut log, "SUPPRESSED").await;
    }

    rate_limits.acquire(uuid_from_org(log.org_id)).await;

    let sender = format!("{} <{}>", job.from_name, job.from_email);
    let outbound = OutboundEmail {
        tracking_id: uuid::Uuid::parse_str(&log.tracking_id).unwrap_or_else(|_| Uuid::new_v4()),
        sender,
        to: job.to_email.clone(),
        reply_to: job.reply_to.clone(),
        subject: job.subject.clone(),
        html: job.html.clone(),
        text: Some(job.text.clone()),
    };

    match provider.send(&outbound).await {
        Ok(outcome) => {
            let mut active: email_log::ActiveModel = log.clone().into();
            active.message_id = Set(Some(outcome.message_id));
            if !log.would_regress(&EmailLogStatus::Sent) {
                active.status = Set(EmailLogStatus::Sent);
            }
            active.update(db).await?;

            push_event(db, log.id, "sent", json!({})).await?;
            bump_campaign_counters(
                db,
                log.campaign_id,
                CounterBump {
                    analytics_sent: 1,
                    progress_processed: 1,
                    ..Default::default()
                },
            )
            .await?;

            Ok(SendJobOutcome::Sent)
        }
        Err(failure) => {
            let attempt = log.delivery_attempts + 1;
            let mut active: email_log::ActiveModel = log.clone().into();
            active.delivery_attempts = Set(attempt);
            active.update(db).await?;

            push_event(
                db,
                log.id,
                "failed",
                json!({ "attempt": attempt, "message": failure.message, "kind": failure.kind.to_string() }),
            )
            .await?;

            if failure.kind.is_retryable() {
                warn!(tracking_id = %log.tracking_id, attempt, "send failed, retryable");
                Ok(SendJobOutcome::RetryNeeded(failure.message))
            } else {
                fail_permanently(db, &mut log, &failure.kind, &failure.message).await?;
                Ok(SendJobOutcome::FailedPermanently)
            }
        }
    }
}

/// After the queue exhausts retries for a retryable failure, this promotes
/// the EmailLog identically to the non-retryable branch (step 8).
#[instrument(skip(db, last_message))]
pub async fn promote_exhausted_retries(
    db: &DatabaseConnection,
    tracking_id: &str,
    last_message: &str,
) -> anyhow::Result<()> {
    let Some(mut log) = email_log::Entity::find()
        .filter(email_log::Column::TrackingId.eq(tracking_id))
        .one(db)
        .await?
    else {
        return Ok(());
    };

    fail_permanently(db, &mut log, &ProviderErrorKind::Unknown, last_message).await
}

async fn fail_permanently(
    db: &DatabaseConnection,
    log: &mut email_log::Model,
    kind: &ProviderErrorKind,
    message: &str,
) -> anyhow::Result<()> {
    let mut active: email_log::ActiveModel = log.clone().into();
    if !log.would_regress(&EmailLogStatus::Failed) {
        active.status = Set(EmailLogStatus::Failed);
    }
    active.update(db).await?;

    push_event(
        db,
        log.id,
        "failed",
        json!({ "message": message, "code": kind.to_string(), "permanent": true }),
    )
    .await?;

    bump_campaign_counters(
        db,
        log.campaign_id,
        CounterBump {
            progress_failed: 1,
            ..Default::default()
        },
    )
    .await?;

    info!(tracking_id = %log.tracking_id, kind = %kind, "email permanently failed");
    Ok(())
}

async fn drop_with_reason(
    db: &DatabaseConnection,
    log: &mut email_log::Model,
    reason: &str,
) -> anyhow::Result<SendJobOutcome> {
    let mut active: email_log::ActiveModel = log.clone().into();
    active.status = Set(EmailLogStatus::Dropped);
    active.update(db).await?;

    push_event(db, log.id, "dropped", json!({ "errKind": reason })).await?;
    Ok(SendJobOutcome::Dropped)
}

/// Atomic `UPDATE ... SET col = col + n` bump, never a read-then-write —
/// several send workers can land on the same campaign's counters in the
/// same instant and a compute-in-Rust-then-write would lose updates.
#[instrument(skip(db, bump))]
async fn bump_campaign_counters(db: &DatabaseConnection, campaign_id: Option<i32>, bump: CounterBump) -> anyhow::Result<()> {
    let Some(campaign_id) = campaign_id else {
        return Ok(());
    };

    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        update "campaign" set
            analytics_sent = analytics_sent + $1,
            progress_processed = progress_processed + $2,
            progress_failed = progress_failed + $3
        where id = $4
        "#,
        [
            bump.analytics_sent.into(),
            bump.progress_processed.into(),
            bump.progress_failed.into(),
            campaign_id.into(),
        ],
    );
    db.execute(stmt).await?;
    Ok(())
}

#[derive(Default)]
struct CounterBump {
    analytics_sent: i32,
    progress_processed: i32,
    progress_failed: i32,
}

fn uuid_from_org(org_id: i32) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[12..16].copy_from_slice(&org_id.to_be_bytes());
    Uuid::from_bytes(bytes)
}
