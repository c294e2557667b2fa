//! Contact CRUD, list membership, and unsubscribe actions.

use axum::extract::Path;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use entity::enums::{ContactStatus, EngagementLevel, ListMembershipStatus};
use entity::{contact, contact_list_membership};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::json;
use shared::error::CoreError;
use shared::Permission;

use super::dto::{CreateContactDto, SetListMembershipDto, UnsubscribeContactDto, UpdateContactDto};
use crate::modules::auth::middleware::attach_request_context;
use crate::modules::auth::middleware::AclLayer;
use crate::modules::common::dto::Pagination;
use crate::modules::common::error_codes::{DUPLICATE_VALUE, NOT_FOUND};
use crate::modules::common::extractors::{DbConnection, OrganizationId, ValidatedJson, ValidatedQuery};
use crate::modules::common::responses::{ApiResponse, PaginationMeta};
use crate::server::controller::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(list_contacts))
        .route("/:id", get(get_contact));

    let writes = Router::new()
        .route("/", post(create_contact))
        .route_layer(AclLayer::single(Permission::CreateContact))
        .merge(
            Router::new()
                .route("/:id", put(update_contact))
                .route("/:id/lists", put(set_list_membership))
                .route("/:id/unsubscribe", post(unsubscribe_contact))
                .route_layer(AclLayer::single(Permission::UpdateContact)),
        )
        .merge(
            Router::new()
                .route("/:id", axum::routing::delete(delete_contact))
                .route_layer(AclLayer::single(Permission::DeleteContact)),
        );

    reads
        .merge(writes)
        .layer(from_fn(attach_request_context))
        .with_state(state)
}

async fn list_contacts(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedQuery(pagination): ValidatedQuery<Pagination>,
) -> Result<ApiResponse<Vec<contact::Model>>, CoreError> {
    let paginator = contact::Entity::find()
        .filter(contact::Column::OrgId.eq(org_id))
        .order_by_desc(contact::Column::CreatedAt)
        .paginate(&db, pagination.page_size);

    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(pagination.page - 1).await?;

    Ok(ApiResponse::paginated(
        rows,
        PaginationMeta::new(pagination.page, pagination.page_size, total),
    ))
}

async fn find_owned(db: &sea_orm::DatabaseConnection, org_id: i32, id: i32) -> Result<contact::Model, CoreError> {
    contact::Entity::find_by_id(id)
        .filter(contact::Column::OrgId.eq(org_id))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, format!("contact {id} not found")))
}

async fn get_contact(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<contact::Model>, CoreError> {
    Ok(ApiResponse::ok(find_owned(&db, org_id, id).await?))
}

async fn create_contact(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    ValidatedJson(dto): ValidatedJson<CreateContactDto>,
) -> Result<ApiResponse<contact::Model>, CoreError> {
    let existing = contact::Entity::find()
        .filter(contact::Column::OrgId.eq(org_id))
        .filter(contact::Column::Email.eq(dto.email.to_lowercase()))
        .one(&db)
        .await?;

    if existing.is_some() {
        return Err(CoreError::new(
            shared::error::ErrorKind::Conflict,
            DUPLICATE_VALUE,
            "a contact with this email already exists",
        ));
    }

    let model = contact::ActiveModel {
        id: NotSet,
        created_at: Set(Utc::now()),
        org_id: Set(org_id),
        email: Set(dto.email.to_lowercase()),
        first_name: Set(dto.first_name),
        last_name: Set(dto.last_name),
        profile: Set(dto.profile),
        status: Set(ContactStatus::Subscribed),
        tags: Set(json!(dto.tags)),
        engagement_received: Set(0),
        engagement_opened: Set(0),
        engagement_clicked: Set(0),
        engagement_score: Set(0),
        engagement_level: Set(EngagementLevel::New),
        last_opened_at: Set(None),
        last_clicked_at: Set(None),
        bounce_count: Set(0),
        complaint_count: Set(0),
        last_bounce_type: Set(None),
        last_bounce_at: Set(None),
        unsubscribe_reason: Set(None),
        unsubscribed_from_campaign_id: Set(None),
    };

    let created = model.insert(&db).await?;

    if let Some(list_ids) = dto.list_ids {
        add_to_lists(&db, created.id, &list_ids).await?;
    }

    Ok(ApiResponse::ok(created))
}

async fn update_contact(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    ValidatedJson(dto): ValidatedJson<UpdateContactDto>,
) -> Result<ApiResponse<contact::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let mut active: contact::ActiveModel = row.into();

    if dto.first_name.is_some() {
        active.first_name = Set(dto.first_name);
    }
    if dto.last_name.is_some() {
        active.last_name = Set(dto.last_name);
    }
    if let Some(profile) = dto.profile {
        active.profile = Set(profile);
    }
    if let Some(tags) = dto.tags {
        active.tags = Set(json!(tags));
    }
    if let Some(status) = dto.status {
        active.status = Set(status);
    }

    let updated = active.update(&db).await?;
    Ok(ApiResponse::ok(updated))
}

async fn delete_contact(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
) -> Result<ApiResponse<()>, CoreError> {
    find_owned(&db, org_id, id).await?;
    contact::Entity::delete_by_id(id).exec(&db).await?;
    Ok(ApiResponse::message("contact deleted"))
}

async fn add_to_lists(db: &sea_orm::DatabaseConnection, contact_id: i32, list_ids: &[i32]) -> Result<(), CoreError> {
    for list_id in list_ids {
        let existing = contact_list_membership::Entity::find()
            .filter(contact_list_membership::Column::ContactId.eq(contact_id))
            .filter(contact_list_membership::Column::ListId.eq(*list_id))
            .one(db)
            .await?;

        match existing {
            Some(row) => {
                let mut active: contact_list_membership::ActiveModel = row.into();
                active.status = Set(ListMembershipStatus::Active);
                active.update(db).await?;
            }
            None => {
                contact_list_membership::ActiveModel {
                    id: NotSet,
                    contact_id: Set(contact_id),
                    list_id: Set(*list_id),
                    status: Set(ListMembershipStatus::Active),
                    added_at: Set(Utc::now()),
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(())
}

async fn set_list_membership(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    ValidatedJson(dto): ValidatedJson<SetListMembershipDto>,
) -> Result<ApiResponse<()>, CoreError> {
    let contact = find_owned(&db, org_id, id).await?;

    let current = contact_list_membership::Entity::find()
        .filter(contact_list_membership::Column::ContactId.eq(contact.id))
        .all(&db)
        .await?;

    for membership in current {
        if !dto.list_ids.contains(&membership.list_id) && membership.status == ListMembershipStatus::Active {
            let mut active: contact_list_membership::ActiveModel = membership.into();
            active.status = Set(ListMembershipStatus::Removed);
            active.update(&db).await?;
        }
    }

    add_to_lists(&db, contact.id, &dto.list_ids).await?;

    Ok(ApiResponse::message("list membership updated"))
}

async fn unsubscribe_contact(
    DbConnection(db): DbConnection,
    OrganizationId(org_id): OrganizationId,
    Path(id): Path<i32>,
    body: Option<axum::Json<UnsubscribeContactDto>>,
) -> Result<ApiResponse<contact::Model>, CoreError> {
    let row = find_owned(&db, org_id, id).await?;
    let reason = body.and_then(|axum::Json(dto)| dto.reason);

    let mut active: contact::ActiveModel = row.into();
    active.status = Set(ContactStatus::Unsubscribed);
    active.unsubscribe_reason = Set(reason);

    let updated = active.update(&db).await?;

    let mut list_memberships = contact_list_membership::Entity::find()
        .filter(contact_list_membership::Column::ContactId.eq(updated.id))
        .filter(contact_list_membership::Column::Status.eq(ListMembershipStatus::Active))
        .all(&db)
        .await?;

    for membership in list_memberships.drain(..) {
        let mut active: contact_list_membership::ActiveModel = membership.into();
        active.status = Set(ListMembershipStatus::Unsubscribed);
        active.update(&db).await?;
    }

    Ok(ApiResponse::ok(updated))
}
