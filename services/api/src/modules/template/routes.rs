//! Template CRUD. Every create/update runs the saved subject/html through
//! `core_lib::render::extract_variables` and appends a capped version-history
//! row, grounded on the `template`/`template_version` doc comments'
//! "append-only, capped history" contract.

use axum::extract::Path;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use core_lib::render::{extract_variables, merge_variables};
use entity::{template, template_version};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::json;
use shared::constants::TEMPLATE_VERSION_HISTORY_CAP;
use shared::error::CoreError;
use shared::Permission;

use super::dto::{CreateTemplateDto, UpdateTemplateDto};
use crate::modules::auth::middleware::attach_request_context;
use crate::modules::auth::middleware::AclLayer;
use crate::modules::common::dto::Pagination;
use crate::modules::common::error_codes::NOT_FOUND;
use crate::modules::common::extractors::{DbConnection, OrganizationId, ValidatedJson, ValidatedQuery};
use crate::modules::common::responses::{ApiResponse, PaginationMeta};
use crate::server::controller::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(list_templates))
        .route("/:id", get(get_template))
        .route("/:id/versions", get(list_versions));

    let writes = Router::new()
        .route("/", post(create_template))
        .route_layer(AclLayer::single(Permission::CreateTemplate))
        .merge(
            Router::new()
                .route("/:id", put(update_template))
                .route_layer(AclLayer::single(Permission::UpdateTemplate)),
        )
        .merge(
            Router::new()
                .route("/:id", axum::routing::delete(delete_template))
                .route_layer(AclLayer::single(Permission::DeleteTemplate)),
        );

    reads
        .merge(writes)
        .layer(from_fn(attach_request_context))
        .with_state(state)
}

async fn list_templates(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedQuery(pagination): ValidatedQuery<Pagination>,
) -> Result<ApiResponse<Vec<template::Model>>, CoreError> {
    let paginator = template::Entity::find()
        .filter(template::Column::OrgId.eq(org_id))
        .order_by_desc(template::Column::CreatedAt)
        .paginate(&db, pagination.page_size);

    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(pagination.page - 1).await?;

    Ok(ApiResponse::paginated(
        rows,
        PaginationMeta::new(pagination.page, pagination.page_size, total),
    ))
}

async fn find_owned(db: &sea_orm::DatabaseConnection, org_id: i32, id: i32) -> Result<template::Model, CoreError> {
    template::Entity::find_by_id(id)
        .filter(template::Column::OrgId.eq(org_id))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, format!("template {id} not found")))
}

async fn get_template(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<template::Model>, CoreError> {
    Ok(ApiResponse::ok(find_owned(&db, org_id, id).await?))
}

async fn list_versions(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Vec<template_version::Model>>, CoreError> {
    find_owned(&db, org_id, id).await?;

    let versions = template_version::Entity::find()
        .filter(template_version::Column::TemplateId.eq(id))
        .order_by_desc(template_version::Column::Version)
        .all(&db)
        .await?;

    Ok(ApiResponse::ok(versions))
}

async fn create_template(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedJson(dto): ValidatedJson<CreateTemplateDto>,
) -> Result<ApiResponse<template::Model>, CoreError> {
    let extracted = extract_variables(&dto.subject, &dto.html);
    let variables = merge_variables(&extracted, &json!([]), &dto.variable_defaults);

    let model = template::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(org_id),
        name: Set(dto.name),
        subject: Set(dto.subject.clone()),
        html: Set(dto.html.clone()),
        text: Set(dto.text.clone()),
        variables: Set(json!(variables)),
        current_version: Set(1),
    };

    let created = model.insert(&db).await?;
    write_version(&db, created.id, 1, &dto.subject, &dto.html, dto.text.as_deref()).await?;

    Ok(ApiResponse::ok(created))
}

async fn update_template(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    ValidatedJson(dto): ValidatedJson<UpdateTemplateDto>,
) -> Result<ApiResponse<template::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let next_version = row.current_version + 1;

    let subject = dto.subject.unwrap_or_else(|| row.subject.clone());
    let html = dto.html.unwrap_or_else(|| row.html.clone());
    let text = dto.text.or_else(|| row.text.clone());
    let extracted = extract_variables(&subject, &html);
    let variables = merge_variables(&extracted, &row.variables, &dto.variable_defaults);

    let mut active: template::ActiveModel = row.into();
    if let Some(name) = dto.name {
        active.name = Set(name);
    }
    active.subject = Set(subject.clone());
    active.html = Set(html.clone());
    active.text = Set(text.clone());
    active.variables = Set(json!(variables));
    active.current_version = Set(next_version);

    let updated = active.update(&db).await?;
    write_version(&db, updated.id, next_version, &subject, &html, text.as_deref()).await?;

    Ok(ApiResponse::ok(updated))
}

async fn delete_template(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<()>, CoreError> {
    find_owned(&db, org_id, id).await?;
    template::Entity::delete_by_id(id).exec(&db).await?;
    Ok(ApiResponse::message("template deleted"))
}

async fn write_version(
    db: &sea_orm::DatabaseConnection,
    template_id: i32,
    version: i32,
    subject: &str,
    html: &str,
    text: Option<&str>,
) -> Result<(), CoreError> {
    template_version::ActiveModel {
        id: NotSet,
        template_id: Set(template_id),
        version: Set(version),
        created_at: Set(Utc::now()),
        subject: Set(subject.to_owned()),
        html: Set(html.to_owned()),
        text: Set(text.map(str::to_owned)),
    }
    .insert(db)
    .await?;

    let count = template_version::Entity::find()
        .filter(template_version::Column::TemplateId.eq(template_id))
        .count(db)
        .await?;

    if count as usize > TEMPLATE_VERSION_HISTORY_CAP {
        if let Some(oldest) = template_version::Entity::find()
            .filter(template_version::Column::TemplateId.eq(template_id))
            .order_by_asc(template_version::Column::Version)
            .one(db)
            .await?
        {
            template_version::Entity::delete_by_id(oldest.id).exec(db).await?;
        }
    }

    Ok(())
}
