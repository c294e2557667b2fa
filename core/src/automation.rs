//! Automation engine: per-contact enrollment tick. Runs once a minute
//! across every active automation, advancing each due enrollment by at
//! most one step so a single slow contact can't block the batch.

use chrono::{DateTime, Timelike, Utc};
use entity::enums::{AutomationEnrollmentStatus, ListMembershipStatus};
use entity::{automation, automation_enrollment, contact, contact_list_membership, email_log, template};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement,
};
use serde::Deserialize;
use serde_json::Value as Json;
use shared::constants::{EMAIL_LOG_TTL_DAYS, QUEUE_EMAIL, QUEUE_WEBHOOK};
use shared::value::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dispatcher::SendJob;
use crate::predicate::{evaluate, Condition};
use crate::queue::{EnqueueOptions, JobQueue};
use crate::render::{build_context, render, RenderInput, TemplateVariable};

pub const BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
enum StepAction {
    Email {
        #[serde(default)]
        template_id: Option<i32>,
        #[serde(default)]
        inline_html: Option<String>,
        #[serde(default)]
        subject: Option<String>,
    },
    Delay {
        value: i64,
        unit: DelayUnit,
    },
    UpdateContact {
        field: String,
        value: Json,
    },
    AddTag {
        tag: String,
    },
    RemoveTag {
        tag: String,
    },
    AddToList {
        list_id: i32,
    },
    RemoveFromList {
        list_id: i32,
    },
    Webhook {
        url: String,
        #[serde(default)]
        payload: Json,
    },
    /// Internal notification delivery is out of core scope; recorded so the
    /// step still advances rather than stalling the enrollment.
    Notify {
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DelayUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DelayUnit {
    fn to_duration(self, value: i64) -> chrono::Duration {
        match self {
            DelayUnit::Minutes => chrono::Duration::minutes(value),
            DelayUnit::Hours => chrono::Duration::hours(value),
            DelayUnit::Days => chrono::Duration::days(value),
            DelayUnit::Weeks => chrono::Duration::weeks(value),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutomationStep {
    #[serde(flatten)]
    action: StepAction,
    condition: Option<Condition>,
    #[serde(default = "default_policy")]
    policy: StepPolicy,
}

fn default_policy() -> StepPolicy {
    StepPolicy::Skip
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum StepPolicy {
    Skip,
    Exit,
}

/// Minute-of-day window (UTC) an email step is allowed to fire in, plus
/// which weekdays (`0=Sunday..6=Saturday`) it's allowed on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendWindow {
    #[serde(default)]
    days: Vec<u32>,
    start_minute: u32,
    end_minute: u32,
}

impl SendWindow {
    fn allows(&self, now: DateTime<Utc>) -> bool {
        use chrono::Datelike;
        let weekday = now.weekday().num_days_from_sunday();
        if !self.days.is_empty() && !self.days.contains(&weekday) {
            return false;
        }
        let minute_of_day = now.hour() * 60 + now.minute();
        minute_of_day >= self.start_minute && minute_of_day < self.end_minute
    }

    /// The next instant (today or a later day) this window opens.
    fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = now;
        for _ in 0..8 {
            let start_of_day = candidate.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
            let open_at = start_of_day + chrono::Duration::minutes(self.start_minute as i64);
            use chrono::Datelike;
            let weekday_ok = self.days.is_empty() || self.days.contains(&open_at.weekday().num_days_from_sunday());
            if weekday_ok && open_at > now {
                return open_at;
            }
            if weekday_ok && self.allows(now) {
                return now;
            }
            candidate = start_of_day + chrono::Duration::days(1);
        }
        now + chrono::Duration::days(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AutomationSettings {
    goal: Option<Condition>,
    exit_conditions: Vec<Condition>,
    send_window: Option<SendWindow>,
    allow_reentry: bool,
    reentry_wait_days: i64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        AutomationSettings {
            goal: None,
            exit_conditions: Vec::new(),
            send_window: None,
            allow_reentry: false,
            reentry_wait_days: 0,
        }
    }
}

/// Runs one tick across every active automation. Returns the number of
/// enrollments advanced.
#[instrument(skip(db, base_url))]
pub async fn run_tick(db: &DatabaseConnection, base_url: &str) -> anyhow::Result<usize> {
    let automations = automation::Entity::find()
        .filter(automation::Column::Active.eq(true))
        .all(db)
        .await?;

    let mut advanced = 0usize;
    for automation in automations {
        advanced += process_automation(db, base_url, &automation).await?;
    }
    Ok(advanced)
}

#[instrument(skip(db, base_url, automation), fields(automation_id = automation.id))]
async fn process_automation(db: &DatabaseConnection, base_url: &str, automation: &automation::Model) -> anyhow::Result<usize> {
    let now = Utc::now();

    let due = automation_enrollment::Entity::find()
        .filter(automation_enrollment::Column::AutomationId.eq(automation.id))
        .filter(automation_enrollment::Column::Status.eq(AutomationEnrollmentStatus::Active))
        .filter(automation_enrollment::Column::NextActionAt.lte(now))
        .order_by_asc(automation_enrollment::Column::NextActionAt)
        .limit(BATCH_SIZE)
        .all(db)
        .await?;

    let steps: Vec<AutomationStep> = serde_json::from_value(automation.steps.clone()).unwrap_or_default();
    let settings: AutomationSettings = serde_json::from_value(automation.settings.clone()).unwrap_or_default();

    let mut advanced = 0usize;
    for enrollment in due {
        if let Err(err) = process_enrollment(db, base_url, automation, &steps, &settings, enrollment).await {
            warn!(automation_id = automation.id, error = %err, "automation step failed");
        } else {
            advanced += 1;
        }
    }
    Ok(advanced)
}

#[instrument(skip(db, base_url, automation, steps, settings, enrollment), fields(automation_id = automation.id, enrollment_id = enrollment.id))]
async fn process_enrollment(
    db: &DatabaseConnection,
    base_url: &str,
    automation: &automation::Model,
    steps: &[AutomationStep],
    settings: &AutomationSettings,
    enrollment: automation_enrollment::Model,
) -> anyhow::Result<()> {
    let now = Utc::now();

    let Some(contact) = contact::Entity::find_by_id(enrollment.contact_id).one(db).await? else {
        return terminate(db, automation, enrollment, AutomationEnrollmentStatus::Exited).await;
    };

    let ctx = contact_context(&contact);

    if let Some(goal) = &settings.goal {
        if evaluate(goal, &ctx) {
            return terminate(db, automation, enrollment, AutomationEnrollmentStatus::Completed).await;
        }
    }

    if settings.exit_conditions.iter().any(|c| evaluate(c, &ctx)) {
        return terminate(db, automation, enrollment, AutomationEnrollmentStatus::Exited).await;
    }

    let idx = enrollment.current_step_index as usize;
    let Some(step) = steps.get(idx) else {
        return terminate(db, automation, enrollment, AutomationEnrollmentStatus::Completed).await;
    };

    if let Some(condition) = &step.condition {
        if !evaluate(condition, &ctx) {
            return match step.policy {
                StepPolicy::Skip => advance(db, enrollment, now).await,
                StepPolicy::Exit => terminate(db, automation, enrollment, AutomationEnrollmentStatus::Exited).await,
            };
        }
    }

    if let StepAction::Email { .. } = &step.action {
        if let Some(window) = &settings.send_window {
            if !window.allows(now) {
                let mut active: automation_enrollment::ActiveModel = enrollment.into();
                active.next_action_at = Set(Some(window.next_open(now)));
                active.update(db).await?;
                return Ok(());
            }
        }
    }

    let next_delay = execute_step(db, base_url, automation, &contact, &step.action).await?;

    let next_index = enrollment.current_step_index + 1;
    let mut active: automation_enrollment::ActiveModel = enrollment.into();
    active.current_step_index = Set(next_index);
    active.next_action_at = Set(Some(now + next_delay.unwrap_or_else(chrono::Duration::zero)));
    active.update(db).await?;

    Ok(())
}

async fn advance(db: &DatabaseConnection, enrollment: automation_enrollment::Model, now: DateTime<Utc>) -> anyhow::Result<()> {
    let next_index = enrollment.current_step_index + 1;
    let mut active: automation_enrollment::ActiveModel = enrollment.into();
    active.current_step_index = Set(next_index);
    active.next_action_at = Set(Some(now));
    active.update(db).await?;
    Ok(())
}

#[instrument(skip(db, automation, enrollment), fields(automation_id = automation.id, enrollment_id = enrollment.id))]
async fn terminate(
    db: &DatabaseConnection,
    automation: &automation::Model,
    enrollment: automation_enrollment::Model,
    status: AutomationEnrollmentStatus,
) -> anyhow::Result<()> {
    let mut active: automation_enrollment::ActiveModel = enrollment.into();
    active.status = Set(status.clone());
    active.terminated_at = Set(Some(Utc::now()));
    active.next_action_at = Set(None);
    active.update(db).await?;

    let column = match status {
        AutomationEnrollmentStatus::Completed => "stats_completed",
        AutomationEnrollmentStatus::Exited => "stats_exited",
        _ => return Ok(()),
    };

    bump_automation_counter(db, automation.id, column).await
}

/// Atomic `UPDATE ... SET col = col + 1` bump of an `automation` enrollment
/// counter — contended across every automation tick running concurrently
/// against the same automation.
async fn bump_automation_counter(db: &DatabaseConnection, automation_id: i32, column: &str) -> anyhow::Result<()> {
    let sql = format!(r#"update "automation" set {column} = {column} + 1 where id = $1"#);
    db.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, [automation_id.into()])).await?;
    Ok(())
}

/// Executes one step; returns the delay to apply before the next step
/// becomes due (`None` means "immediately", i.e. next tick).
#[instrument(skip(db, base_url, automation, contact, action), fields(automation_id = automation.id, contact_id = contact.id))]
async fn execute_step(
    db: &DatabaseConnection,
    base_url: &str,
    automation: &automation::Model,
    contact: &contact::Model,
    action: &StepAction,
) -> anyhow::Result<Option<chrono::Duration>> {
    match action {
        StepAction::Email { template_id, inline_html, subject } => {
            send_automation_email(db, base_url, automation, contact, *template_id, inline_html.as_deref(), subject.as_deref()).await?;
            Ok(None)
        }
        StepAction::Delay { value, unit } => Ok(Some(unit.to_duration(*value))),
        StepAction::UpdateContact { field, value } => {
            update_contact_field(db, contact, field, value).await?;
            Ok(None)
        }
        StepAction::AddTag { tag } => {
            mutate_tags(db, contact, tag, true).await?;
            Ok(None)
        }
        StepAction::RemoveTag { tag } => {
            mutate_tags(db, contact, tag, false).await?;
            Ok(None)
        }
        StepAction::AddToList { list_id } => {
            mutate_membership(db, contact, *list_id, ListMembershipStatus::Active).await?;
            Ok(None)
        }
        StepAction::RemoveFromList { list_id } => {
            mutate_membership(db, contact, *list_id, ListMembershipStatus::Removed).await?;
            Ok(None)
        }
        StepAction::Webhook { url, payload } => {
            let queue = JobQueue::new(db, QUEUE_WEBHOOK);
            queue
                .enqueue(&serde_json::json!({ "url": url, "payload": payload }), &EnqueueOptions::default())
                .await?;
            Ok(None)
        }
        StepAction::Notify { message } => {
            info!(contact_id = contact.id, message, "automation notify step (stub)");
            Ok(None)
        }
    }
}

#[instrument(skip(db, base_url, automation, contact, inline_html, subject_override), fields(automation_id = automation.id, contact_id = contact.id))]
async fn send_automation_email(
    db: &DatabaseConnection,
    base_url: &str,
    automation: &automation::Model,
    contact: &contact::Model,
    template_id: Option<i32>,
    inline_html: Option<&str>,
    subject_override: Option<&str>,
) -> anyhow::Result<()> {
    let (subject, html, text, variables) = match template_id {
        Some(id) => {
            let tpl = template::Entity::find_by_id(id)
                .one(db)
                .await?
                .ok_or_else(|| anyhow::anyhow!("template {id} not found"))?;
            let variables: Vec<TemplateVariable> = serde_json::from_value(tpl.variables).unwrap_or_default();
            (subject_override.map(str::to_owned).unwrap_or(tpl.subject), tpl.html, tpl.text, variables)
        }
        None => (
            subject_override.unwrap_or_default().to_owned(),
            inline_html.unwrap_or_default().to_owned(),
            None,
            Vec::new(),
        ),
    };

    let org = entity::organization::Entity::find_by_id(contact.org_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("organization {} not found", contact.org_id))?;

    let tracking_id = email_log::Model::generate_tracking_id();
    let tracking_uuid = Uuid::parse_str(&tracking_id).unwrap_or_else(|_| Uuid::new_v4());

    let mut org_ctx = Value::object();
    org_ctx.set("name", org.name.clone());
    let ctx = build_context(contact_context(contact), org_ctx, Default::default());

    let rendered = render(&RenderInput {
        subject: &subject,
        html: &html,
        text: text.as_deref(),
        context: &ctx,
        variables: &variables,
        base_url,
        tracking_id: tracking_uuid,
        track_clicks: true,
        track_opens: true,
    })?;

    let tracked_links: serde_json::Map<String, serde_json::Value> = rendered
        .links
        .iter()
        .map(|l| (l.index.to_string(), serde_json::Value::String(l.original_url.clone())))
        .collect();

    let log = email_log::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(contact.org_id),
        contact_id: Set(contact.id),
        campaign_id: Set(None),
        automation_id: Set(Some(automation.id)),
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

    let queue = JobQueue::new(db, QUEUE_EMAIL);
    queue
        .enqueue(
            &SendJob {
                email_log_id: log.id,
                tracking_id,
                org_id: contact.org_id,
                campaign_id: None,
                to_email: contact.email.clone(),
                from_name: org.default_from_name.clone(),
                from_email: org.default_from_email.clone(),
                reply_to: None,
                subject: rendered.subject,
                html: rendered.html,
                text: rendered.text,
            },
            &EnqueueOptions::default(),
        )
        .await?;

    Ok(())
}

fn contact_context(contact: &contact::Model) -> Value {
    let mut ctx = Value::object();
    ctx.set("id", contact.id as i64);
    ctx.set("email", contact.email.clone());
    if let Some(f) = &contact.first_name {
        ctx.set("firstName", f.clone());
    }
    if let Some(l) = &contact.last_name {
        ctx.set("lastName", l.clone());
    }
    ctx.set("engagementOpened", contact.engagement_opened as i64);
    ctx.set("engagementClicked", contact.engagement_clicked as i64);
    if let Ok(profile) = serde_json::from_value::<Value>(contact.profile.clone()) {
        ctx.set("profile", profile);
    }
    if let Ok(tags) = serde_json::from_value::<Value>(contact.tags.clone()) {
        ctx.set("tags", tags);
    }
    ctx
}

async fn update_contact_field(db: &DatabaseConnection, contact: &contact::Model, field: &str, value: &Json) -> anyhow::Result<()> {
    let mut active: contact::ActiveModel = contact.clone().into();
    match field {
        "firstName" => active.first_name = Set(value.as_str().map(str::to_owned)),
        "lastName" => active.last_name = Set(value.as_str().map(str::to_owned)),
        _ => {
            let mut profile = contact.profile.as_object().cloned().unwrap_or_default();
            profile.insert(field.to_owned(), value.clone());
            active.profile = Set(serde_json::Value::Object(profile));
        }
    }
    active.update(db).await?;
    Ok(())
}

async fn mutate_tags(db: &DatabaseConnection, contact: &contact::Model, tag: &str, add: bool) -> anyhow::Result<()> {
    let mut tags: Vec<String> = serde_json::from_value(contact.tags.clone()).unwrap_or_default();
    let lowered = tag.to_lowercase();
    if add {
        if !tags.contains(&lowered) {
            tags.push(lowered);
        }
    } else {
        tags.retain(|t| t != &lowered);
    }
    let mut active: contact::ActiveModel = contact.clone().into();
    active.tags = Set(serde_json::to_value(tags)?);
    active.update(db).await?;
    Ok(())
}

async fn mutate_membership(db: &DatabaseConnection, contact: &contact::Model, list_id: i32, status: ListMembershipStatus) -> anyhow::Result<()> {
    let existing = contact_list_membership::Entity::find()
        .filter(contact_list_membership::Column::ContactId.eq(contact.id))
        .filter(contact_list_membership::Column::ListId.eq(list_id))
        .one(db)
        .await?;

    match existing {
        Some(row) => {
            let mut active: contact_list_membership::ActiveModel = row.into();
            active.status = Set(status);
            active.update(db).await?;
        }
        None => {
            let row = contact_list_membership::ActiveModel {
                id: NotSet,
                contact_id: Set(contact.id),
                list_id: Set(list_id),
                status: Set(status),
                added_at: Set(Utc::now()),
            };
            row.insert(db).await?;
        }
    }
    Ok(())
}

/// Enrolls `contact_id` into `automation_id`, honoring re-entry policy
/// against the contact's most recent terminated enrollment (if any).
#[instrument(skip(db, automation), fields(automation_id = automation.id, contact_id))]
pub async fn enroll(db: &DatabaseConnection, automation: &automation::Model, contact_id: i32) -> anyhow::Result<Option<automation_enrollment::Model>> {
    let settings: AutomationSettings = serde_json::from_value(automation.settings.clone()).unwrap_or_default();

    let prior = automation_enrollment::Entity::find()
        .filter(automation_enrollment::Column::AutomationId.eq(automation.id))
        .filter(automation_enrollment::Column::ContactId.eq(contact_id))
        .order_by_desc(automation_enrollment::Column::EnrolledAt)
        .one(db)
        .await?;

    if let Some(prior) = &prior {
        let still_running = matches!(
            prior.status,
            AutomationEnrollmentStatus::Active | AutomationEnrollmentStatus::Waiting
        );
        if still_running {
            return Ok(None);
        }
        if let Some(terminated_at) = prior.terminated_at {
            if !automation_enrollment::Model::can_reenter(terminated_at, settings.allow_reentry, settings.reentry_wait_days, Utc::now()) {
                return Ok(None);
            }
        }
    }

    let row = automation_enrollment::ActiveModel {
        id: NotSet,
        automation_id: Set(automation.id),
        contact_id: Set(contact_id),
        current_step_index: Set(0),
        status: Set(AutomationEnrollmentStatus::Active),
        next_action_at: Set(Some(Utc::now())),
        enrolled_at: Set(Utc::now()),
        terminated_at: Set(None),
    };
    let row = row.insert(db).await?;

    bump_automation_counter(db, automation.id, "stats_active").await?;

    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_window_rejects_minute_outside_range() {
        let window = SendWindow { days: vec![], start_minute: 9 * 60, end_minute: 17 * 60 };
        let noon = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let midnight = Utc::now().date_naive().and_hms_opt(0, 30, 0).unwrap().and_utc();
        assert!(window.allows(noon));
        assert!(!window.allows(midnight));
    }

    #[test]
    fn delay_unit_converts_to_duration() {
        assert_eq!(DelayUnit::Days.to_duration(2), chrono::Duration::days(2));
        assert_eq!(DelayUnit::Hours.to_duration(3), chrono::Duration::hours(3));
    }
}
