//! Automation CRUD plus enable/disable toggles.

use axum::extract::Path;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use entity::automation;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use shared::error::CoreError;
use shared::Permission;

use super::dto::{CreateAutomationDto, UpdateAutomationDto};
use crate::modules::auth::middleware::attach_request_context;
use crate::modules::auth::middleware::AclLayer;
use crate::modules::common::dto::Pagination;
use crate::modules::common::error_codes::NOT_FOUND;
use crate::modules::common::extractors::{DbConnection, OrganizationId, ValidatedJson, ValidatedQuery};
use crate::modules::common::responses::{ApiResponse, PaginationMeta};
use crate::server::controller::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(list_automations))
        .route("/:id", get(get_automation));

    let writes = Router::new()
        .route("/", post(create_automation))
        .route_layer(AclLayer::single(Permission::CreateAutomation))
        .merge(
            Router::new()
                .route("/:id", put(update_automation))
                .route("/:id/enable", post(enable_automation))
                .route("/:id/disable", post(disable_automation))
                .route_layer(AclLayer::single(Permission::UpdateAutomation)),
        )
        .merge(
            Router::new()
                .route("/:id", axum::routing::delete(delete_automation))
                .route_layer(AclLayer::single(Permission::DeleteAutomation)),
        );

    reads
        .merge(writes)
        .layer(from_fn(attach_request_context))
        .with_state(state)
}

async fn list_automations(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedQuery(pagination): ValidatedQuery<Pagination>,
) -> Result<ApiResponse<Vec<automation::Model>>, CoreError> {
    let paginator = automation::Entity::find()
        .filter(automation::Column::OrgId.eq(org_id))
        .order_by_desc(automation::Column::CreatedAt)
        .paginate(&db, pagination.page_size);

    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(pagination.page - 1).await?;

    Ok(ApiResponse::paginated(
        rows,
        PaginationMeta::new(pagination.page, pagination.page_size, total),
    ))
}

async fn find_owned(db: &sea_orm::DatabaseConnection, org_id: i32, id: i32) -> Result<automation::Model, CoreError> {
    automation::Entity::find_by_id(id)
        .filter(automation::Column::OrgId.eq(org_id))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, format!("automation {id} not found")))
}

async fn get_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<automation::Model>, CoreError> {
    Ok(ApiResponse::ok(find_owned(&db, org_id, id).await?))
}

async fn create_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedJson(dto): ValidatedJson<CreateAutomationDto>,
) -> Result<ApiResponse<automation::Model>, CoreError> {
    let model = automation::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(org_id),
        name: Set(dto.name),
        active: Set(false),
        trigger: Set(dto.trigger),
        steps: Set(dto.steps),
        settings: Set(dto.settings),
        stats_active: Set(0),
        stats_completed: Set(0),
        stats_exited: Set(0),
    };

    let created = model.insert(&db).await?;
    Ok(ApiResponse::ok(created))
}

async fn update_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    ValidatedJson(dto): ValidatedJson<UpdateAutomationDto>,
) -> Result<ApiResponse<automation::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let mut active: automation::ActiveModel = row.into();

    if let Some(name) = dto.name {
        active.name = Set(name);
    }
    if let Some(trigger) = dto.trigger {
        active.trigger = Set(trigger);
    }
    if let Some(steps) = dto.steps {
        active.steps = Set(steps);
    }
    if let Some(settings) = dto.settings {
        active.settings = Set(settings);
    }

    let updated = active.update(&db).await?;
    Ok(ApiResponse::ok(updated))
}

async fn delete_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<()>, CoreError> {
    find_owned(&db, org_id, id).await?;
    automation::Entity::delete_by_id(id).exec(&db).await?;
    Ok(ApiResponse::message("automation deleted"))
}

async fn enable_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<automation::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let mut active: automation::ActiveModel = row.into();
    active.active = Set(true);
    Ok(ApiResponse::ok(active.update(&db).await?))
}

async fn disable_automation(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<automation::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let mut active: automation::ActiveModel = row.into();
    active.active = Set(false);
    Ok(ApiResponse::ok(active.update(&db).await?))
}
