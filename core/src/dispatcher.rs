//! Campaign dispatcher worker: turns a queued campaign into a stream of
//! per-recipient send jobs. Grounded on the batch/progress-update shape of
//! the teacher's `send_emails` fan-out loop in `services/mailer/src/mailer.rs`,
//! generalized from "send everything now" to "stream, dedup, batch-enqueue,
//! and leave progress visible between batches".

use chrono::Utc;
use entity::campaign;
use entity::enums::CampaignStatus;
use entity::{email_log, organization, template};
use futures::StreamExt;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use serde::{Deserialize, Serialize};
use shared::constants::{CAMPAIGN_ERROR_LOG_CAP, EMAIL_LOG_TTL_DAYS, QUEUE_EMAIL};
use tracing::{info, instrument, warn};

use crate::queue::{EnqueueOptions, JobQueue};
use crate::render::{build_context, render, RenderInput, TemplateVariable};
use crate::resolver::{count_recipients, resolve_recipients, RecipientSelectors};

/// Number of recipients accumulated before a bulk-enqueue + progress update.
pub const BATCH_SIZE: usize = 100;

/// The payload enqueued onto the `email` queue. Carries the already-rendered
/// message so the send worker never has to re-run the renderer (and so a
/// retry resends the exact bytes that were tracked, even if the template
/// changes in between).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendJob {
    pub email_log_id: i32,
    pub tracking_id: String,
    pub org_id: i32,
    pub campaign_id: Option<i32>,
    pub to_email: String,
    pub from_name: String,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// The payload enqueued onto the `campaign` queue; `is_retry` is set by
/// the scheduler's stalled sweep so the worker can log/prioritize
/// differently, not because dispatch itself behaves differently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub campaign_id: i32,
    #[serde(default)]
    pub is_retry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignErrorEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub count: u32,
    pub last_occurred_at: chrono::DateTime<Utc>,
}

pub struct DispatchOutcome {
    pub dispatched: bool,
    pub reason: Option<&'static str>,
}

/// Runs the full dispatcher operation for one campaign job. Returns
/// `Ok(DispatchOutcome{dispatched: false, ..})` for the "not actionable,
/// don't fail the job" case (step 1); returns `Err` only for unrecoverable
/// errors that should cause the queue to retry the dispatcher job itself.
#[instrument(skip(db, base_url))]
pub async fn dispatch_campaign(
    db: &DatabaseConnection,
    base_url: &str,
    campaign_id: i32,
) -> anyhow::Result<DispatchOutcome> {
    let Some(mut campaign) = campaign::Entity::find_by_id(campaign_id).one(db).await? else {
        return Ok(DispatchOutcome {
            dispatched: false,
            reason: Some("campaign not found"),
        });
    };

    if !matches!(
        campaign.status,
        CampaignStatus::Queued | CampaignStatus::Sending
    ) {
        return Ok(DispatchOutcome {
            dispatched: false,
            reason: Some("campaign not in queued/sending status"),
        });
    }

    if campaign.status == CampaignStatus::Queued {
        let mut active: campaign::ActiveModel = campaign.clone().into();
        active.status = Set(CampaignStatus::Sending);
        if campaign.started_at.is_none() {
            active.started_at = Set(Some(Utc::now()));
        }
        campaign = active.update(db).await?;
    }

    match run_dispatch_loop(db, base_url, &campaign).await {
        Ok(()) => Ok(DispatchOutcome {
            dispatched: true,
            reason: None,
        }),
        Err(err) => {
            record_campaign_error(db, campaign.id, "dispatch_error", &err.to_string()).await?;
            let mut active: campaign::ActiveModel = campaign.into();
            active.status = Set(CampaignStatus::Failed);
            active.update(db).await?;
            Err(err)
        }
    }
}

#[instrument(skip(db, base_url, campaign), fields(campaign_id = campaign.id))]
async fn run_dispatch_loop(
    db: &DatabaseConnection,
    base_url: &str,
    campaign: &campaign::Model,
) -> anyhow::Result<()> {
    let org = organization::Entity::find_by_id(campaign.org_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("organization {} not found", campaign.org_id))?;

    let (subject, html, text, variables) = resolve_content(db, campaign).await?;

    let selectors: RecipientSelectors = serde_json::from_value(campaign.selectors.clone())?;

    if campaign.progress_total == 0 {
        let total = count_recipients(db, campaign.org_id, &selectors).await?;
        if let Some(row) = campaign::Entity::find_by_id(campaign.id).one(db).await? {
            let mut active: campaign::ActiveModel = row.into();
            active.progress_total = Set(total);
            active.update(db).await?;
        }
    }

    let mut recipients = resolve_recipients(db, campaign.org_id, &selectors).await?;

    let org_ctx = {
        let mut v = shared::value::Value::object();
        v.set("name", org.name.clone());
        v
    };

    let queue = JobQueue::new(db, QUEUE_EMAIL);
    let mut batch: Vec<SendJob> = Vec::with_capacity(BATCH_SIZE);
    let mut processed: i32 = 0;

    while let Some(recipient) = recipients.next().await {
        let existing = email_log::Entity::find()
            .filter(email_log::Column::CampaignId.eq(campaign.id))
            .filter(email_log::Column::ContactId.eq(recipient.contact_id))
            .one(db)
            .await?;

        if existing.is_some() {
            processed += 1;
            continue;
        }

        let tracking_id = email_log::Model::generate_tracking_id();
        let tracking_uuid = uuid::Uuid::parse_str(&tracking_id).unwrap_or_else(|_| uuid::Uuid::new_v4());

        let mut contact_ctx = shared::value::Value::object();
        contact_ctx.set("email", recipient.email.clone());
        if let Some(f) = &recipient.first_name {
            contact_ctx.set("firstName", f.clone());
        }
        if let Some(l) = &recipient.last_name {
            contact_ctx.set("lastName", l.clone());
        }
        contact_ctx.set("profile", recipient.profile.clone());

        let context = build_context(contact_ctx, org_ctx.clone(), Default::default());

        let rendered = render(&RenderInput {
            subject: &subject,
            html: &html,
            text: text.as_deref(),
            context: &context,
            variables: &variables,
            base_url,
            tracking_id: tracking_uuid,
            track_clicks: campaign.track_clicks,
            track_opens: campaign.track_opens,
        })?;

        let tracked_links: serde_json::Map<String, serde_json::Value> = rendered
            .links
            .iter()
            .map(|l| (l.index.to_string(), serde_json::Value::String(l.original_url.clone())))
            .collect();

        let log = email_log::ActiveModel {
            id: NotSet,
            created_at: Set(Utc::now()),
            org_id: Set(campaign.org_id),
            contact_id: Set(recipient.contact_id),
            campaign_id: Set(Some(campaign.id)),
            automation_id: Set(None),
            tracking_id: Set(tracking_id.clone()),
            message_id: Set(None),
            status: Set(entity::enums::EmailLogStatus::Queued),
            opened: Set(false),
            clicked: Set(false),
            unsubscribed: Set(false),
            complained: Set(false),
            first_opened_at: Set(None),
            first_clicked_at: Set(None),
            open_count: Set(0),
            click_count: Set(0),
            delivery_attempts: Set(0),
            tracked_links: Set(serde_json::Value::Object(tracked_links)),
            expires_at: Set(Utc::now() + chrono::Duration::days(EMAIL_LOG_TTL_DAYS)),
        };

        let log = log.insert(db).await?;

        batch.push(SendJob {
            email_log_id: log.id,
            tracking_id,
            org_id: campaign.org_id,
            campaign_id: Some(campaign.id),
            to_email: recipient.email.clone(),
            from_name: campaign.from_name.clone(),
            from_email: campaign.from_email.clone(),
            reply_to: campaign.reply_to.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        });

        processed += 1;

        if batch.len() >= BATCH_SIZE {
            flush_batch(db, &queue, &mut batch, campaign.id, processed).await?;

            let refreshed = campaign::Entity::find_by_id(campaign.id).one(db).await?;
            if let Some(refreshed) = refreshed {
                if matches!(
                    refreshed.status,
                    CampaignStatus::Paused | CampaignStatus::Cancelled
                ) {
                    info!(campaign_id = campaign.id, "dispatch paused/cancelled mid-stream");
                    return Ok(());
                }
            }
        }
    }

    flush_batch(db, &queue, &mut batch, campaign.id, processed).await?;

    let total = campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await?
        .map(|c| c.progress_total)
        .unwrap_or(processed);

    let mut active: campaign::ActiveModel = campaign::Entity::find_by_id(campaign.id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("campaign disappeared mid-dispatch"))?
        .into();

    active.status = Set(CampaignStatus::Sent);
    active.completed_at = Set(Some(Utc::now()));
    active.progress_percentage = Set(if total > 0 { 100 } else { 0 });
    active.update(db).await?;

    Ok(())
}

#[instrument(skip(db, queue, batch), fields(campaign_id, batch_len = batch.len()))]
async fn flush_batch(
    db: &DatabaseConnection,
    queue: &JobQueue<'_>,
    batch: &mut Vec<SendJob>,
    campaign_id: i32,
    processed: i32,
) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    queue.enqueue_bulk(batch, &EnqueueOptions::default()).await?;
    batch.clear();

    if let Some(campaign_row) = campaign::Entity::find_by_id(campaign_id).one(db).await? {
        let total = campaign_row.progress_total.max(1);
        let percentage = ((processed as f64 / total as f64) * 100.0).round() as i16;

        let mut active: campaign::ActiveModel = campaign_row.into();
        active.progress_processed = Set(processed);
        active.progress_percentage = Set(percentage.min(100));
        active.update(db).await?;
    }

    Ok(())
}

async fn resolve_content(
    db: &DatabaseConnection,
    campaign: &campaign::Model,
) -> anyhow::Result<(String, String, Option<String>, Vec<TemplateVariable>)> {
    if let Some(template_id) = campaign.template_id {
        let tpl = template::Entity::find_by_id(template_id)
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("template {} not found", template_id))?;
        let variables: Vec<TemplateVariable> = serde_json::from_value(tpl.variables).unwrap_or_default();
        Ok((tpl.subject, tpl.html, tpl.text, variables))
    } else {
        Ok((
            campaign.subject.clone(),
            campaign.inline_html.clone().unwrap_or_default(),
            None,
            Vec::new(),
        ))
    }
}

async fn record_campaign_error(
    db: &DatabaseConnection,
    campaign_id: i32,
    kind: &str,
    message: &str,
) -> anyhow::Result<()> {
    let Some(campaign) = campaign::Entity::find_by_id(campaign_id).one(db).await? else {
        return Ok(());
    };

    let mut errors: Vec<CampaignErrorEntry> =
        serde_json::from_value(campaign.errors.clone()).unwrap_or_default();

    if let Some(existing) = errors.iter_mut().find(|e| e.kind == kind && e.message == message) {
        existing.count += 1;
        existing.last_occurred_at = Utc::now();
    } else {
        errors.push(CampaignErrorEntry {
            kind: kind.to_owned(),
            message: message.to_owned(),
            count: 1,
            last_occurred_at: Utc::now(),
        });
    }

    if errors.len() > CAMPAIGN_ERROR_LOG_CAP {
        let overflow = errors.len() - CAMPAIGN_ERROR_LOG_CAP;
        errors.drain(0..overflow);
    }

    let mut active: campaign::ActiveModel = campaign.into();
    active.errors = Set(serde_json::to_value(errors)?);
    active.update(db).await?;

    warn!(campaign_id, kind, message, "campaign dispatch error recorded");

    Ok(())
}
