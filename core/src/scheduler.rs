//! Periodic sweeps: due-campaign promotion and stalled-campaign recovery.
//! Both use a conditional `UPDATE ... WHERE status = $expected` so that
//! multiple scheduler instances running the same sweep concurrently never
//! enqueue the same campaign twice for the same transition.

use chrono::{Duration, Utc};
use entity::enums::{CampaignStatus, ListMembershipStatus};
use entity::{campaign, contact_list_membership, email_log, feedback_log, list};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use shared::constants::FEEDBACK_LOG_TTL_DAYS;
use tracing::{info, instrument};

use crate::dispatcher::DispatchJob;
use crate::queue::{EnqueueOptions, JobQueue};

/// A campaign `sending` longer than this with no completion is considered
/// stalled (dispatcher worker likely died mid-run) and gets re-enqueued.
const STALLED_AFTER_HOURS: i64 = 2;

/// `status = scheduled AND scheduledAt <= now` campaigns are promoted to
/// `queued` one at a time via a conditional update, then get a dispatcher
/// job. Returns the number promoted.
#[instrument(skip(db))]
pub async fn run_due_campaign_sweep(db: &DatabaseConnection) -> anyhow::Result<usize> {
    let now = Utc::now();

    let due = campaign::Entity::find()
        .filter(campaign::Column::Status.eq(CampaignStatus::Scheduled))
        .filter(campaign::Column::ScheduledAt.lte(now))
        .all(db)
        .await?;

    let queue = JobQueue::new(db, shared::constants::QUEUE_CAMPAIGN);
    let mut promoted = 0usize;

    for row in due {
        let update = campaign::Entity::update_many()
            .col_expr(campaign::Column::Status, sea_orm::sea_query::Expr::value(CampaignStatus::Queued))
            .filter(campaign::Column::Id.eq(row.id))
            .filter(campaign::Column::Status.eq(CampaignStatus::Scheduled))
            .exec(db)
            .await?;

        if update.rows_affected == 0 {
            continue;
        }

        queue
            .enqueue(
                &DispatchJob { campaign_id: row.id, is_retry: false },
                &EnqueueOptions::default(),
            )
            .await?;
        promoted += 1;
        info!(campaign_id = row.id, "due-campaign sweep queued campaign");
    }

    Ok(promoted)
}

/// `status = sending AND startedAt < now - 2h AND progress < 100%`
/// campaigns get a fresh, higher-priority dispatcher job; the status stays
/// `sending` (the conditional check is on the `(campaign_id, is_retry)`
/// re-enqueue, not a status swap, since the campaign never left `sending`).
/// Returns the number re-enqueued.
#[instrument(skip(db))]
pub async fn run_stalled_campaign_sweep(db: &DatabaseConnection) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - Duration::hours(STALLED_AFTER_HOURS);

    let stalled = campaign::Entity::find()
        .filter(campaign::Column::Status.eq(CampaignStatus::Sending))
        .filter(campaign::Column::StartedAt.lt(cutoff))
        .filter(campaign::Column::ProgressPercentage.lt(100))
        .all(db)
        .await?;

    let queue = JobQueue::new(db, shared::constants::QUEUE_CAMPAIGN);
    let mut requeued = 0usize;

    for row in stalled {
        let mut opts = EnqueueOptions::default();
        opts.priority = 10;

        queue
            .enqueue(&DispatchJob { campaign_id: row.id, is_retry: true }, &opts)
            .await?;
        requeued += 1;
        info!(campaign_id = row.id, "stalled-campaign sweep re-queued campaign");
    }

    Ok(requeued)
}

/// Recomputes each list's denormalized member counts from
/// `contact_list_membership`. Run on the slower (15-minute) cadence since
/// it scans a table rather than following an index on a due timestamp.
#[instrument(skip(db))]
pub async fn run_list_stats_sweep(db: &DatabaseConnection) -> anyhow::Result<usize> {
    let lists = list::Entity::find().all(db).await?;
    let mut refreshed = 0usize;

    for row in lists {
        let active = contact_list_membership::Entity::find()
            .filter(contact_list_membership::Column::ListId.eq(row.id))
            .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Active))
            .count(db)
            .await?;
        let unsubscribed = contact_list_membership::Entity::find()
            .filter(contact_list_membership::Column::ListId.eq(row.id))
            .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Unsubscribed))
            .count(db)
            .await?;
        let removed = contact_list_membership::Entity::find()
            .filter(contact_list_membership::Column::ListId.eq(row.id))
            .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Removed))
            .count(db)
            .await?;

        let mut active_model: list::ActiveModel = row.into();
        active_model.stats_active_count = Set(active as i32);
        active_model.stats_unsubscribed_count = Set(unsubscribed as i32);
        active_model.stats_removed_count = Set(removed as i32);
        active_model.stats_refreshed_at = Set(Some(Utc::now()));
        active_model.update(db).await?;
        refreshed += 1;
    }

    Ok(refreshed)
}

/// Deletes `EmailLog` rows past `expiresAt` and `FeedbackLog` rows older
/// than `FEEDBACK_LOG_TTL_DAYS`, mirroring the teacher's
/// `start_clear_sessions_cronjob`. Returns `(email_logs, feedback_logs)`
/// deleted.
#[instrument(skip(db))]
pub async fn run_cleanup_sweep(db: &DatabaseConnection) -> anyhow::Result<(u64, u64)> {
    let now = Utc::now();
    let feedback_cutoff = now - Duration::days(FEEDBACK_LOG_TTL_DAYS);

    let email_logs = email_log::Entity::delete_many()
        .filter(email_log::Column::ExpiresAt.lt(now))
        .exec(db)
        .await?
        .rows_affected;

    let feedback_logs = feedback_log::Entity::delete_many()
        .filter(feedback_log::Column::Timestamp.lt(feedback_cutoff))
        .exec(db)
        .await?
        .rows_affected;

    if email_logs > 0 || feedback_logs > 0 {
        info!(email_logs, feedback_logs, "cleanup sweep deleted expired rows");
    }

    Ok((email_logs, feedback_logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalled_cutoff_is_two_hours() {
        assert_eq!(STALLED_AFTER_HOURS, 2);
    }
}
