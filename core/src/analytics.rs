//! Analytics reducer: applies one `FeedbackLog` row's counter updates to
//! `EmailLog`, `Campaign`, and `Contact`, then marks the row processed.
//!
//! Idempotent by construction: a job is a no-op once `processed_at` is
//! set, so a redelivered `process-event` job (at-least-once queue
//! semantics) never double-counts.

use chrono::Utc;
use entity::enums::{ContactStatus, EmailLogStatus, EngagementLevel, ListMembershipStatus};
use entity::{contact, contact_list_membership, email_log, email_log_event, feedback_log, suppression};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, Statement,
};
use serde_json::json;
use shared::dto::feedback::FeedbackEventKind;
use tracing::instrument;

use crate::suppression_cache::SuppressionCache;

/// Processes the `FeedbackLog` row named by `feedback_log_id`. Returns
/// `Ok(())` immediately (without re-applying anything) if the row is
/// already marked processed.
#[instrument(skip(db, suppression_cache))]
pub async fn process_event(
    db: &DatabaseConnection,
    suppression_cache: &SuppressionCache,
    feedback_log_id: i32,
) -> anyhow::Result<()> {
    let Some(log) = feedback_log::Entity::find_by_id(feedback_log_id).one(db).await? else {
        anyhow::bail!("feedback log {feedback_log_id} not found");
    };

    if log.processed_at.is_some() {
        return Ok(());
    }

    let kind: FeedbackEventKind = serde_json::from_value(log.details.clone())?;

    let email_log = match log.email_log_id {
        Some(id) => email_log::Entity::find_by_id(id).one(db).await?,
        None => None,
    };

    match &kind {
        FeedbackEventKind::Delivery => apply_delivery(db, email_log.as_ref()).await?,
        FeedbackEventKind::Open => apply_open(db, email_log.as_ref()).await?,
        FeedbackEventKind::Click { url } => apply_click(db, email_log.as_ref(), url).await?,
        FeedbackEventKind::Bounce { permanent, reason } => {
            apply_bounce(db, email_log.as_ref(), &log.email, *permanent, reason).await?
        }
        FeedbackEventKind::Complaint => {
            apply_complaint(db, log.org_id, suppression_cache, email_log.as_ref(), &log.email).await?
        }
        FeedbackEventKind::Unsubscribe { reason } => {
            apply_unsubscribe(db, email_log.as_ref(), &log.email, reason.as_deref()).await?
        }
        // `send` and `reject` are recorded in FeedbackLog for the audit trail
        // but carry no further counter updates per the event-type table.
        FeedbackEventKind::Send | FeedbackEventKind::Reject => {}
    }

    let mut active: feedback_log::ActiveModel = log.into();
    active.processed_at = Set(Some(Utc::now()));
    active.update(db).await?;

    Ok(())
}

async fn push_event(db: &DatabaseConnection, email_log_id: i32, kind: &str, details: serde_json::Value) -> anyhow::Result<()> {
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

/// Atomic `UPDATE ... SET col = col + n` bump of one or more `campaign`
/// counter columns — never a SELECT-then-compute-then-UPDATE, since these
/// counters are contended across every concurrently running analytics and
/// send worker touching the same campaign.
async fn bump_campaign_counters(db: &DatabaseConnection, campaign_id: Option<i32>, deltas: &[(&str, i32)]) -> anyhow::Result<()> {
    let Some(campaign_id) = campaign_id else { return Ok(()) };
    if deltas.is_empty() {
        return Ok(());
    }

    let set_clause = deltas
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{col} = {col} + ${}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(r#"update "campaign" set {set_clause} where id = ${}"#, deltas.len() + 1);

    let mut values: Vec<sea_orm::Value> = deltas.iter().map(|(_, delta)| (*delta).into()).collect();
    values.push(campaign_id.into());

    db.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)).await?;
    Ok(())
}

/// Click counters plus the per-link `link_clicks` tally in one atomic
/// statement — `jsonb_set` reads and rewrites the column within the same
/// `UPDATE`, so two concurrent clicks on the same link can't clobber each
/// other the way a fetch-merge-write in Rust would.
async fn bump_campaign_click(db: &DatabaseConnection, campaign_id: Option<i32>, url: &str, first_click: bool) -> anyhow::Result<()> {
    let Some(campaign_id) = campaign_id else { return Ok(()) };

    let unique_clause = if first_click { ", analytics_unique_clicks = analytics_unique_clicks + 1" } else { "" };
    let sql = format!(
        r#"
        update "campaign" set
            analytics_clicks = analytics_clicks + 1{unique_clause},
            link_clicks = jsonb_set(
                coalesce(link_clicks, '{{}}'::jsonb),
                array[$1],
                to_jsonb(coalesce((link_clicks->>$1)::int, 0) + 1)
            )
        where id = $2
        "#
    );

    db.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, [url.into(), campaign_id.into()])).await?;
    Ok(())
}

/// Atomic `UPDATE ... SET col = col + 1[, timestamp_col = now()]` bump of a
/// single `contact` engagement counter.
async fn bump_contact_counter(db: &DatabaseConnection, contact_id: i32, column: &str, timestamp_column: Option<&str>) -> anyhow::Result<()> {
    let sql = match timestamp_column {
        Some(ts) => format!(r#"update "contact" set {column} = {column} + 1, {ts} = now() where id = $1"#),
        None => format!(r#"update "contact" set {column} = {column} + 1 where id = $1"#),
    };
    db.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, [contact_id.into()])).await?;
    Ok(())
}

#[instrument(skip(db, email_log))]
async fn apply_delivery(db: &DatabaseConnection, email_log: Option<&email_log::Model>) -> anyhow::Result<()> {
    let Some(log) = email_log else { return Ok(()) };
    if !log.would_regress(&EmailLogStatus::Delivered) {
        let mut active: email_log::ActiveModel = log.clone().into();
        active.status = Set(EmailLogStatus::Delivered);
        active.update(db).await?;
    }
    bump_campaign_counters(db, log.campaign_id, &[("analytics_delivered", 1)]).await
}

#[instrument(skip(db, email_log))]
async fn apply_open(db: &DatabaseConnection, email_log: Option<&email_log::Model>) -> anyhow::Result<()> {
    let Some(log) = email_log else { return Ok(()) };
    let first_open = !log.opened;

    push_event(db, log.id, "open", json!({})).await?;

    let mut active: email_log::ActiveModel = log.clone().into();
    active.open_count = Set(log.open_count + 1);
    if first_open {
        active.opened = Set(true);
        active.first_opened_at = Set(Some(Utc::now()));
    }
    active.update(db).await?;

    let mut deltas = vec![("analytics_opens", 1)];
    if first_open {
        deltas.push(("analytics_unique_opens", 1));
    }
    bump_campaign_counters(db, log.campaign_id, &deltas).await?;

    bump_contact_counter(db, log.contact_id, "engagement_opened", Some("last_opened_at")).await?;

    Ok(())
}

#[instrument(skip(db, email_log))]
async fn apply_click(db: &DatabaseConnection, email_log: Option<&email_log::Model>, url: &str) -> anyhow::Result<()> {
    let Some(log) = email_log else { return Ok(()) };
    let first_click = !log.clicked;

    push_event(db, log.id, "click", json!({ "url": url })).await?;

    let mut active: email_log::ActiveModel = log.clone().into();
    active.click_count = Set(log.click_count + 1);
    if first_click {
        active.clicked = Set(true);
        active.first_clicked_at = Set(Some(Utc::now()));
    }
    active.update(db).await?;

    bump_campaign_click(db, log.campaign_id, url, first_click).await?;

    bump_contact_counter(db, log.contact_id, "engagement_clicked", Some("last_clicked_at")).await?;

    Ok(())
}

#[instrument(skip(db, email_log, reason))]
async fn apply_bounce(
    db: &DatabaseConnection,
    email_log: Option<&email_log::Model>,
    email: &str,
    permanent: bool,
    reason: &str,
) -> anyhow::Result<()> {
    let bounce_type = if permanent { entity::enums::BounceType::Hard } else { entity::enums::BounceType::Soft };

    if let Some(log) = email_log {
        push_event(db, log.id, "bounce", json!({ "permanent": permanent, "reason": reason })).await?;
        if !log.would_regress(&EmailLogStatus::Bounced) {
            let mut active: email_log::ActiveModel = log.clone().into();
            active.status = Set(EmailLogStatus::Bounced);
            active.update(db).await?;
        }
        let mut deltas = vec![("analytics_bounced", 1)];
        if permanent {
            deltas.push(("analytics_hard_bounced", 1));
        } else {
            deltas.push(("analytics_soft_bounced", 1));
        }
        bump_campaign_counters(db, log.campaign_id, &deltas).await?;
    }

    if permanent {
        if let Some(contact) = find_contact_by_email(db, email_log, email).await? {
            let mut active: contact::ActiveModel = contact.clone().into();
            active.status = Set(ContactStatus::Cleaned);
            active.last_bounce_type = Set(Some(bounce_type));
            active.update(db).await?;
            bump_contact_counter(db, contact.id, "bounce_count", Some("last_bounce_at")).await?;
        }
    }

    Ok(())
}

#[instrument(skip(db, suppression_cache, email_log))]
async fn apply_complaint(
    db: &DatabaseConnection,
    org_id: i32,
    suppression_cache: &SuppressionCache,
    email_log: Option<&email_log::Model>,
    email: &str,
) -> anyhow::Result<()> {
    if let Some(log) = email_log {
        push_event(db, log.id, "complaint", json!({})).await?;
        if !log.would_regress(&EmailLogStatus::Complained) {
            let mut active: email_log::ActiveModel = log.clone().into();
            active.status = Set(EmailLogStatus::Complained);
            active.update(db).await?;
        }
        bump_campaign_counters(db, log.campaign_id, &[("analytics_complained", 1)]).await?;
    }

    if let Some(contact) = find_contact_by_email(db, email_log, email).await? {
        let mut active: contact::ActiveModel = contact.clone().into();
        active.status = Set(ContactStatus::Unsubscribed);
        active.update(db).await?;
        bump_contact_counter(db, contact.id, "complaint_count", None).await?;
    }

    suppress(db, org_id, email, "complaint").await?;
    suppression_cache.invalidate(org_id, email);

    Ok(())
}

/// Inserts a suppression row for `email` under `org_id` if one doesn't
/// already exist. A complaint has no bounce classification, so
/// `bounce_type` is left unset.
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
        bounce_type: Set(None),
        created_at: Set(Utc::now()),
    };
    row.insert(db).await?;
    Ok(())
}

#[instrument(skip(db, email_log, reason))]
async fn apply_unsubscribe(
    db: &DatabaseConnection,
    email_log: Option<&email_log::Model>,
    email: &str,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let campaign_id = email_log.and_then(|log| log.campaign_id);

    if let Some(log) = email_log {
        push_event(db, log.id, "unsubscribe", json!({ "reason": reason })).await?;
        bump_campaign_counters(db, log.campaign_id, &[("analytics_unsubscribed", 1)]).await?;
    }

    let Some(contact) = find_contact_by_email(db, email_log, email).await? else {
        return Ok(());
    };

    let mut active: contact::ActiveModel = contact.clone().into();
    active.status = Set(ContactStatus::Unsubscribed);
    active.unsubscribe_reason = Set(reason.map(|r| r.to_owned()));
    active.unsubscribed_from_campaign_id = Set(campaign_id);
    active.engagement_level = Set(EngagementLevel::Cold);
    active.update(db).await?;

    let memberships = contact_list_membership::Entity::find()
        .filter(contact_list_membership::Column::ContactId.eq(contact.id))
        .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Active))
        .all(db)
        .await?;

    for membership in memberships {
        let mut active: contact_list_membership::ActiveModel = membership.into();
        active.status = Set(ListMembershipStatus::Unsubscribed);
        active.update(db).await?;
    }

    Ok(())
}

async fn find_contact_by_email(
    db: &DatabaseConnection,
    email_log: Option<&email_log::Model>,
    email: &str,
) -> anyhow::Result<Option<contact::Model>> {
    if let Some(log) = email_log {
        if let Some(row) = contact::Entity::find_by_id(log.contact_id).one(db).await? {
            return Ok(Some(row));
        }
    }
    Ok(contact::Entity::find().filter(contact::Column::Email.eq(email.to_lowercase())).one(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_json_round_trips_through_feedback_event_kind() {
        let kind = FeedbackEventKind::Bounce { permanent: true, reason: "550".into() };
        let stored = serde_json::to_value(&kind).unwrap();
        let parsed: FeedbackEventKind = serde_json::from_value(stored).unwrap();
        match parsed {
            FeedbackEventKind::Bounce { permanent, reason } => {
                assert!(permanent);
                assert_eq!(reason, "550");
            }
            _ => panic!("expected bounce"),
        }
    }
}
