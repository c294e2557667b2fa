//! Recipient resolver: turns a campaign's selectors into a lazy
//! deduplicated stream of contacts, applying exclusions, suppression, and
//! recent-recipient filtering before the dispatcher ever sees a row.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use entity::{contact, contact_list_membership, email_log, segment, suppression};
use futures::stream::{self, BoxStream, StreamExt};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use shared::value::Value;
use tracing::instrument;

use crate::predicate::{evaluate, Condition};

/// Number of contact rows fetched per page when a selector is paginated.
/// Keeps any single selector's memory footprint bounded regardless of how
/// many contacts it ultimately matches.
const PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipientSelectors {
    #[serde(default)]
    pub lists: Vec<i32>,
    #[serde(default)]
    pub segments: Vec<i32>,
    #[serde(default)]
    pub exclude_lists: Vec<i32>,
    #[serde(default)]
    pub exclude_segments: Vec<i32>,
    #[serde(default)]
    pub exclude_recent_recipients: ExcludeRecentRecipients,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExcludeRecentRecipients {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub days: i32,
}

/// Minimal per-contact data the dispatcher and renderer need; avoids loading
/// the full `contact` row (profile JSON, counters) for every yielded
/// recipient.
#[derive(Debug, Clone)]
pub struct RecipientRef {
    pub contact_id: i32,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile: Value,
}

fn contact_as_context(model: &contact::Model) -> Value {
    let mut ctx = Value::object();
    ctx.set("email", model.email.clone());
    if let Some(first) = &model.first_name {
        ctx.set("firstName", first.clone());
    }
    if let Some(last) = &model.last_name {
        ctx.set("lastName", last.clone());
    }
    ctx.set("engagementOpened", model.engagement_opened as i64);
    ctx.set("engagementClicked", model.engagement_clicked as i64);
    let profile: Value = model.profile.clone().into();
    ctx.set("profile", profile);
    let tags: Value = model.tags.clone().into();
    ctx.set("tags", tags);
    ctx
}

async fn list_member_ids(db: &DatabaseConnection, list_id: i32) -> anyhow::Result<Vec<i32>> {
    use entity::enums::ListMembershipStatus;

    Ok(contact_list_membership::Entity::find()
        .filter(contact_list_membership::Column::ListId.eq(list_id))
        .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Active))
        .select_only()
        .column(contact_list_membership::Column::ContactId)
        .into_tuple::<i32>()
        .all(db)
        .await?)
}

async fn segment_predicate(db: &DatabaseConnection, segment_id: i32) -> anyhow::Result<Option<Condition>> {
    let Some(row) = segment::Entity::find_by_id(segment_id).one(db).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_value(row.predicate)?))
}

/// Pages through `contact` rows matching `ids`, `PAGE_SIZE` at a time. A
/// list's membership can run into the tens of thousands of contacts; this
/// keeps at most one page of full contact rows (profile JSON included) in
/// memory at once instead of the whole list.
fn paginate_contacts_by_ids(
    db: DatabaseConnection,
    org_id: i32,
    ids: Vec<i32>,
) -> BoxStream<'static, anyhow::Result<contact::Model>> {
    use entity::enums::ContactStatus;

    if ids.is_empty() {
        return stream::empty().boxed();
    }

    stream::try_unfold((db, Arc::new(ids), 0usize), move |(db, ids, offset)| async move {
        if offset >= ids.len() {
            return Ok(None);
        }
        let end = (offset + PAGE_SIZE as usize).min(ids.len());
        let page_ids = ids[offset..end].to_vec();

        let rows = contact::Entity::find()
            .filter(contact::Column::OrgId.eq(org_id))
            .filter(contact::Column::Id.is_in(page_ids))
            .filter(contact::Column::Status.eq(ContactStatus::Subscribed))
            .all(&db)
            .await?;

        anyhow::Ok(Some((stream::iter(rows.into_iter().map(anyhow::Ok)), (db, ids, end))))
    })
    .try_flatten()
    .boxed()
}

/// Pages through every subscribed contact in the org, evaluating `predicate`
/// page by page and yielding only the matches. Segment membership can't be
/// pushed down into SQL (predicates are evaluated against the same
/// `Value` context the automation engine uses), so this is the one place a
/// full org scan happens — but it happens one page at a time, not as a
/// single eager `.all()`.
fn paginate_segment(
    db: DatabaseConnection,
    org_id: i32,
    predicate: Condition,
) -> BoxStream<'static, anyhow::Result<contact::Model>> {
    use entity::enums::ContactStatus;

    stream::try_unfold(Some(0u64), move |page| {
        let db = db.clone();
        let predicate = predicate.clone();
        async move {
            let Some(page) = page else {
                return anyhow::Ok(None);
            };

            let rows = contact::Entity::find()
                .filter(contact::Column::OrgId.eq(org_id))
                .filter(contact::Column::Status.eq(ContactStatus::Subscribed))
                .order_by_asc(contact::Column::Id)
                .paginate(&db, PAGE_SIZE)
                .fetch_page(page)
                .await?;

            if rows.is_empty() {
                return anyhow::Ok(None);
            }
            let next = if (rows.len() as u64) < PAGE_SIZE { None } else { Some(page + 1) };

            let matched: Vec<anyhow::Result<contact::Model>> = rows
                .into_iter()
                .filter(|c| evaluate(&predicate, &contact_as_context(c)))
                .map(anyhow::Ok)
                .collect();

            anyhow::Ok(Some((stream::iter(matched), next)))
        }
    })
    .try_flatten()
    .boxed()
}

/// Same page-at-a-time evaluation as `paginate_segment`, but collapsed
/// straight into a set of ids — used for `exclude_segments`, where we only
/// need membership, not the full row.
async fn segment_contact_ids(db: &DatabaseConnection, org_id: i32, predicate: &Condition) -> anyhow::Result<HashSet<i32>> {
    use entity::enums::ContactStatus;

    let mut ids = HashSet::new();
    let mut page = 0u64;
    loop {
        let rows = contact::Entity::find()
            .filter(contact::Column::OrgId.eq(org_id))
            .filter(contact::Column::Status.eq(ContactStatus::Subscribed))
            .order_by_asc(contact::Column::Id)
            .paginate(db, PAGE_SIZE)
            .fetch_page(page)
            .await?;

        if rows.is_empty() {
            break;
        }
        let done = (rows.len() as u64) < PAGE_SIZE;
        ids.extend(rows.into_iter().filter(|c| evaluate(predicate, &contact_as_context(c))).map(|c| c.id));
        if done {
            break;
        }
        page += 1;
    }
    Ok(ids)
}

async fn load_suppressed_emails(db: &DatabaseConnection, org_id: i32) -> anyhow::Result<HashSet<String>> {
    let rows = suppression::Entity::find()
        .filter(suppression::Column::OrgId.eq(org_id))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.email.to_lowercase()).collect())
}

async fn load_recent_recipient_ids(db: &DatabaseConnection, org_id: i32, days: i32) -> anyhow::Result<HashSet<i32>> {
    let since = Utc::now() - Duration::days(days.max(0) as i64);

    let rows = email_log::Entity::find()
        .filter(email_log::Column::OrgId.eq(org_id))
        .filter(email_log::Column::CreatedAt.gte(since))
        .select_only()
        .column(email_log::Column::ContactId)
        .into_tuple::<i32>()
        .all(db)
        .await?;

    Ok(rows.into_iter().collect())
}

/// Resolves `selectors` into a deduplicated, exclusion-filtered stream of
/// recipients. Exclusion/suppression/recent-recipient sets are loaded
/// eagerly as they're bounded id/email sets, but the included lists and
/// segments themselves are streamed lazily, page by page, straight from the
/// database — the dispatcher can consume the result in bounded batches
/// (default 100) without ever holding the full recipient set in memory.
#[instrument(skip(db, selectors), fields(org_id))]
pub async fn resolve_recipients(
    db: &DatabaseConnection,
    org_id: i32,
    selectors: &RecipientSelectors,
) -> anyhow::Result<BoxStream<'static, RecipientRef>> {
    let mut included_streams: Vec<BoxStream<'static, anyhow::Result<contact::Model>>> = Vec::new();

    for &list_id in &selectors.lists {
        let ids = list_member_ids(db, list_id).await?;
        included_streams.push(paginate_contacts_by_ids(db.clone(), org_id, ids));
    }
    for &segment_id in &selectors.segments {
        if let Some(predicate) = segment_predicate(db, segment_id).await? {
            included_streams.push(paginate_segment(db.clone(), org_id, predicate));
        }
    }

    let mut excluded_ids: HashSet<i32> = HashSet::new();
    for &list_id in &selectors.exclude_lists {
        excluded_ids.extend(list_member_ids(db, list_id).await?);
    }
    for &segment_id in &selectors.exclude_segments {
        if let Some(predicate) = segment_predicate(db, segment_id).await? {
            excluded_ids.extend(segment_contact_ids(db, org_id, &predicate).await?);
        }
    }

    let suppressed_emails = load_suppressed_emails(db, org_id).await?;
    let recent_ids = if selectors.exclude_recent_recipients.enabled {
        load_recent_recipient_ids(db, org_id, selectors.exclude_recent_recipients.days).await?
    } else {
        HashSet::new()
    };

    let excluded_ids = Arc::new(excluded_ids);
    let suppressed_emails = Arc::new(suppressed_emails);
    let recent_ids = Arc::new(recent_ids);
    let seen: Arc<Mutex<HashSet<i32>>> = Arc::new(Mutex::new(HashSet::new()));

    let merged = stream::select_all(included_streams);

    let out = merged.filter_map(move |result| {
        let excluded_ids = excluded_ids.clone();
        let suppressed_emails = suppressed_emails.clone();
        let recent_ids = recent_ids.clone();
        let seen = seen.clone();
        async move {
            let c = result.ok()?;

            if excluded_ids.contains(&c.id) {
                return None;
            }
            if suppressed_emails.contains(&c.email.to_lowercase()) {
                return None;
            }
            if recent_ids.contains(&c.id) {
                return None;
            }
            if !seen.lock().unwrap().insert(c.id) {
                return None;
            }

            Some(RecipientRef {
                contact_id: c.id,
                email: c.email.clone(),
                first_name: c.first_name.clone(),
                last_name: c.last_name.clone(),
                profile: c.profile.clone().into(),
            })
        }
    });

    Ok(out.boxed())
}

/// Cheap count of how many recipients `resolve_recipients` would yield,
/// without materializing the stream — used to seed a campaign's
/// `progress_total` before dispatch starts.
#[instrument(skip(db, selectors), fields(org_id))]
pub async fn count_recipients(db: &DatabaseConnection, org_id: i32, selectors: &RecipientSelectors) -> anyhow::Result<i32> {
    let mut stream = resolve_recipients(db, org_id, selectors).await?;
    let mut count = 0i32;
    while stream.next().await.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_default_to_empty() {
        let selectors = RecipientSelectors::default();
        assert!(selectors.lists.is_empty());
        assert!(selectors.segments.is_empty());
        assert!(!selectors.exclude_recent_recipients.enabled);
    }

    #[test]
    fn contact_as_context_carries_engagement_counters() {
        let model = contact::Model {
            id: 1,
            created_at: Utc::now(),
            org_id: 1,
            email: "a@example.com".into(),
            first_name: None,
            last_name: None,
            profile: serde_json::json!({}),
            status: entity::enums::ContactStatus::Subscribed,
            tags: serde_json::json!([]),
            engagement_received: 4,
            engagement_opened: 2,
            engagement_clicked: 1,
            engagement_score: 0,
            engagement_level: entity::enums::EngagementLevel::New,
            last_opened_at: None,
            last_clicked_at: None,
            bounce_count: 0,
            complaint_count: 0,
            last_bounce_type: None,
            last_bounce_at: None,
            unsubscribe_reason: None,
            unsubscribed_from_campaign_id: None,
        };

        let ctx = contact_as_context(&model);
        assert_eq!(ctx.lookup_path("engagementOpened").and_then(|v| v.as_f64()), Some(2.0));
        assert_eq!(ctx.lookup_path("engagementClicked").and_then(|v| v.as_f64()), Some(1.0));
    }
}
