//! Campaign CRUD and lifecycle actions. Grounded on the teacher's own
//! `vehicle::routes` shape (`create_router` building a sub-`Router<AppState>`,
//! `AclLayer` + `attach_request_context` as the protecting layer pair) with
//! the action handlers (`schedule`/`send`/`pause`/`resume`/`cancel`) driven
//! by `core_lib::campaign_state`'s transition functions instead of ad-hoc
//! status writes.

use axum::extract::Path;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use core_lib::campaign_state;
use core_lib::dispatcher::DispatchJob;
use core_lib::queue::{EnqueueOptions, JobQueue};
use entity::{campaign, enums::CampaignStatus};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, ColumnTrait};
use serde_json::json;
use shared::error::CoreError;
use shared::Permission;

use super::dto::{CancelCampaignDto, CreateCampaignDto, UpdateCampaignDto};
use crate::modules::auth::middleware::{attach_request_context, AclLayer};
use crate::modules::common::dto::Pagination;
use crate::modules::common::error_codes::{INVALID_CAMPAIGN_STATE, NOT_EDITABLE, NOT_FOUND};
use crate::modules::common::extractors::{DbConnection, OrganizationId, ValidatedJson, ValidatedQuery};
use crate::modules::common::responses::{ApiResponse, PaginationMeta};
use crate::server::controller::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(list_campaigns))
        .route("/:id", get(get_campaign));

    let writes = Router::new()
        .route("/", post(create_campaign))
        .route_layer(AclLayer::single(Permission::CreateCampaign))
        .merge(
            Router::new()
                .route("/:id", put(update_campaign))
                .route("/:id/duplicate", post(duplicate_campaign))
                .route_layer(AclLayer::single(Permission::UpdateCampaign)),
        )
        .merge(
            Router::new()
                .route("/:id", axum::routing::delete(delete_campaign))
                .route_layer(AclLayer::single(Permission::DeleteCampaign)),
        )
        .merge(
            Router::new()
                .route("/:id/schedule", post(schedule_campaign))
                .route("/:id/send", post(send_campaign_now))
                .route("/:id/pause", post(pause_campaign))
                .route("/:id/resume", post(resume_campaign))
                .route("/:id/cancel", post(cancel_campaign))
                .route_layer(AclLayer::single(Permission::SendCampaign)),
        );

    reads
        .merge(writes)
        .layer(from_fn(attach_request_context))
        .with_state(state)
}

async fn list_campaigns(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedQuery(pagination): ValidatedQuery<Pagination>,
) -> Result<ApiResponse<Vec<campaign::Model>>, CoreError> {
    let paginator = campaign::Entity::find()
        .filter(campaign::Column::OrgId.eq(org_id))
        .order_by_desc(campaign::Column::CreatedAt)
        .paginate(&db, pagination.page_size);

    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(pagination.page - 1).await?;

    Ok(ApiResponse::paginated(
        rows,
        PaginationMeta::new(pagination.page, pagination.page_size, total),
    ))
}

async fn create_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedJson(dto): ValidatedJson<CreateCampaignDto>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let model = campaign::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(org_id),
        name: Set(dto.name),
        selectors: Set(dto.selectors),
        template_id: Set(dto.template_id),
        inline_html: Set(dto.inline_html),
        subject: Set(dto.subject),
        from_name: Set(dto.from_name),
        from_email: Set(dto.from_email),
        reply_to: Set(dto.reply_to),
        schedule_kind: Set(dto.schedule_kind),
        scheduled_at: Set(dto.scheduled_at),
        timezone: Set(dto.timezone),
        track_opens: Set(dto.track_opens),
        track_clicks: Set(dto.track_clicks),
        ab_test: Set(dto.ab_test),
        status: Set(CampaignStatus::Draft),
        started_at: Set(None),
        completed_at: Set(None),
        progress_total: Set(0),
        progress_processed: Set(0),
        progress_failed: Set(0),
        progress_percentage: Set(0),
        analytics_sent: Set(0),
        analytics_delivered: Set(0),
        analytics_opens: Set(0),
        analytics_unique_opens: Set(0),
        analytics_clicks: Set(0),
        analytics_unique_clicks: Set(0),
        analytics_bounced: Set(0),
        analytics_soft_bounced: Set(0),
        analytics_hard_bounced: Set(0),
        analytics_complained: Set(0),
        analytics_unsubscribed: Set(0),
        link_clicks: Set(json!({})),
        errors: Set(json!([])),
    };

    let created = model.insert(&db).await?;
    Ok(ApiResponse::ok(created))
}

async fn find_owned(db: &sea_orm::DatabaseConnection, org_id: i32, id: i32) -> Result<campaign::Model, CoreError> {
    campaign::Entity::find_by_id(id)
        .filter(campaign::Column::OrgId.eq(org_id))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, format!("campaign {id} not found")))
}

async fn get_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    Ok(ApiResponse::ok(find_owned(&db, org_id, id).await?))
}

async fn update_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    ValidatedJson(dto): ValidatedJson<UpdateCampaignDto>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;

    if !campaign_state::can_edit(row.status) {
        return Err(CoreError::new(
            shared::error::ErrorKind::Conflict,
            NOT_EDITABLE,
            format!("campaign in status {:?} can't be edited", row.status),
        ));
    }

    let mut active: campaign::ActiveModel = row.into();
    if let Some(name) = dto.name {
        active.name = Set(name);
    }
    if let Some(selectors) = dto.selectors {
        active.selectors = Set(selectors);
    }
    if dto.template_id.is_some() {
        active.template_id = Set(dto.template_id);
    }
    if dto.inline_html.is_some() {
        active.inline_html = Set(dto.inline_html);
    }
    if let Some(subject) = dto.subject {
        active.subject = Set(subject);
    }
    if let Some(from_name) = dto.from_name {
        active.from_name = Set(from_name);
    }
    if let Some(from_email) = dto.from_email {
        active.from_email = Set(from_email);
    }
    if dto.reply_to.is_some() {
        active.reply_to = Set(dto.reply_to);
    }
    if dto.scheduled_at.is_some() {
        active.scheduled_at = Set(dto.scheduled_at);
    }
    if dto.timezone.is_some() {
        active.timezone = Set(dto.timezone);
    }
    if let Some(track_opens) = dto.track_opens {
        active.track_opens = Set(track_opens);
    }
    if let Some(track_clicks) = dto.track_clicks {
        active.track_clicks = Set(track_clicks);
    }

    let updated = active.update(&db).await?;
    Ok(ApiResponse::ok(updated))
}

async fn delete_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<()>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;

    if !campaign_state::can_edit(row.status) {
        return Err(CoreError::new(
            shared::error::ErrorKind::Conflict,
            NOT_EDITABLE,
            format!("campaign in status {:?} can't be deleted", row.status),
        ));
    }

    campaign::Entity::delete_by_id(id).exec(&db).await?;
    Ok(ApiResponse::message("campaign deleted"))
}

async fn duplicate_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;

    let model = campaign::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(org_id),
        name: Set(format!("{} (copy)", row.name)),
        selectors: Set(row.selectors),
        template_id: Set(row.template_id),
        inline_html: Set(row.inline_html),
        subject: Set(row.subject),
        from_name: Set(row.from_name),
        from_email: Set(row.from_email),
        reply_to: Set(row.reply_to),
        schedule_kind: Set(row.schedule_kind),
        scheduled_at: Set(None),
        timezone: Set(row.timezone),
        track_opens: Set(row.track_opens),
        track_clicks: Set(row.track_clicks),
        ab_test: Set(row.ab_test),
        status: Set(CampaignStatus::Draft),
        started_at: Set(None),
        completed_at: Set(None),
        progress_total: Set(0),
        progress_processed: Set(0),
        progress_failed: Set(0),
        progress_percentage: Set(0),
        analytics_sent: Set(0),
        analytics_delivered: Set(0),
        analytics_opens: Set(0),
        analytics_unique_opens: Set(0),
        analytics_clicks: Set(0),
        analytics_unique_clicks: Set(0),
        analytics_bounced: Set(0),
        analytics_soft_bounced: Set(0),
        analytics_hard_bounced: Set(0),
        analytics_complained: Set(0),
        analytics_unsubscribed: Set(0),
        link_clicks: Set(json!({})),
        errors: Set(json!([])),
    };

    let created = model.insert(&db).await?;
    Ok(ApiResponse::ok(created))
}

async fn apply_transition(
    db: &sea_orm::DatabaseConnection,
    row: campaign::Model,
    next: CampaignStatus,
) -> Result<campaign::Model, CoreError> {
    let mut active: campaign::ActiveModel = row.into();
    active.status = Set(next);
    if next == CampaignStatus::Sending {
        active.started_at = Set(Some(Utc::now()));
    }
    Ok(active.update(db).await?)
}

fn transition_error(err: campaign_state::TransitionError) -> CoreError {
    CoreError::new(shared::error::ErrorKind::Conflict, INVALID_CAMPAIGN_STATE, err.to_string())
}

async fn schedule_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next = campaign_state::schedule(row.status).map_err(transition_error)?;
    Ok(ApiResponse::ok(apply_transition(&db, row, next).await?))
}

async fn send_campaign_now(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next = campaign_state::send_now(row.status).map_err(transition_error)?;
    let updated = apply_transition(&db, row, next).await?;

    let queue = JobQueue::new(&db, shared::constants::QUEUE_CAMPAIGN);
    queue
        .enqueue(&DispatchJob { campaign_id: updated.id, is_retry: false }, &EnqueueOptions::default())
        .await?;

    Ok(ApiResponse::ok(updated))
}

async fn pause_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next = campaign_state::pause(row.status).map_err(transition_error)?;
    Ok(ApiResponse::ok(apply_transition(&db, row, next).await?))
}

async fn resume_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next = campaign_state::resume(row.status).map_err(transition_error)?;
    let updated = apply_transition(&db, row, next).await?;

    let queue = JobQueue::new(&db, shared::constants::QUEUE_CAMPAIGN);
    queue
        .enqueue(&DispatchJob { campaign_id: updated.id, is_retry: true }, &EnqueueOptions::default())
        .await?;

    Ok(ApiResponse::ok(updated))
}

async fn cancel_campaign(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    body: Option<axum::Json<CancelCampaignDto>>,
) -> Result<ApiResponse<campaign::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next = campaign_state::cancel(row.status).map_err(transition_error)?;

    let mut active: campaign::ActiveModel = row.into();
    active.status = Set(next);
    active.completed_at = Set(Some(Utc::now()));
    if let Some(axum::Json(dto)) = body {
        if let Some(reason) = dto.reason {
            active.errors = Set(json!([{ "type": "cancelled", "reason": reason, "at": Utc::now() }]));
        }
    }

    let updated = active.update(&db).await?;
    Ok(ApiResponse::ok(updated))
}
