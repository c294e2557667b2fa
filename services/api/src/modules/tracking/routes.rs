//! Public tracking endpoints: open pixel, click redirect, unsubscribe,
//! view-in-browser. Unlike every other module these routes carry no
//! `attach_request_context`/`AclLayer` pair — they're hit by mail clients
//! and browsers with no session, so "the tracking id in the URL is the
//! authorization" the same way the teacher's public webhook endpoints
//! never required a session either.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use core_lib::feedback::ingest;
use core_lib::render::{build_context, render, tracking_pixel_gif_bytes, RenderInput, TemplateVariable};
use entity::{campaign, contact, email_log, organization, template};
use http::{header, StatusCode};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use shared::config::app_config;
use shared::error::CoreError;

use crate::modules::common::error_codes::NOT_FOUND;
use crate::server::controller::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/o/:tracking_id", get(track_open))
        .route("/c/:tracking_id/:link_index", get(track_click))
        .route("/u/:tracking_id", get(track_unsubscribe))
        .route("/v/:tracking_id", get(view_in_browser))
        .with_state(state)
}

async fn load_email_log(db: &DatabaseConnection, tracking_id: &str) -> Result<email_log::Model, CoreError> {
    email_log::Entity::find()
        .filter(email_log::Column::TrackingId.eq(tracking_id))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, "unknown tracking id"))
}

/// request metadata is logged for operational visibility only; neither
/// `FeedbackEvent` nor `FeedbackLog` has a slot to persist it per event.
fn log_request_metadata(tracking_id: &str, kind: &str, headers: &http::HeaderMap) {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
    tracing::debug!(
        tracking_id,
        kind,
        ip = %get("x-forwarded-for"),
        user_agent = %get("user-agent"),
        referer = %get("referer"),
        "tracking event received"
    );
}

/// Fire-and-forget: runs `ingest`'s FeedbackLog insert + queue-enqueue (and,
/// on a bounce, suppression insert) on a detached task so the HTTP response
/// never waits on the database writes.
fn spawn_ingest(state: AppState, org_id: i32, event: shared::dto::feedback::FeedbackEvent) {
    tokio::spawn(async move {
        if let Err(err) = ingest(&state.db, &state.suppression, org_id, &event).await {
            tracing::warn!(?err, feedback_id = %event.feedback_id, "async feedback ingest failed");
        }
    });
}

async fn track_open(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    headers: http::HeaderMap,
) -> Response {
    let db = &state.db;
    log_request_metadata(&tracking_id, "open", &headers);

    if let Ok(log) = load_email_log(db, &tracking_id).await {
        let event = shared::dto::feedback::FeedbackEvent {
            feedback_id: format!("{}:open:{}", tracking_id, uuid::Uuid::new_v4()),
            tracking_id: uuid::Uuid::parse_str(&tracking_id).ok(),
            message_id: None,
            email: contact_email(db, log.contact_id).await.unwrap_or_default(),
            kind: shared::dto::feedback::FeedbackEventKind::Open,
            timestamp: chrono::Utc::now(),
        };
        spawn_ingest(state.clone(), log.org_id, event);
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, private"),
        ],
        tracking_pixel_gif_bytes(),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ClickQuery {
    url: Option<String>,
}

async fn track_click(
    State(state): State<AppState>,
    Path((tracking_id, link_index)): Path<(String, usize)>,
    Query(query): Query<ClickQuery>,
    headers: http::HeaderMap,
) -> Result<Response, CoreError> {
    let db = &state.db;
    log_request_metadata(&tracking_id, "click", &headers);
    let log = load_email_log(db, &tracking_id).await?;

    let target = query.url.or_else(|| {
        log.tracked_links
            .get(link_index.to_string())
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    });

    let Some(target) = target else {
        return Err(CoreError::not_found(NOT_FOUND, "unknown tracked link"));
    };

    let event = shared::dto::feedback::FeedbackEvent {
        feedback_id: format!("{}:click:{}:{}", tracking_id, link_index, uuid::Uuid::new_v4()),
        tracking_id: uuid::Uuid::parse_str(&tracking_id).ok(),
        message_id: None,
        email: contact_email(db, log.contact_id).await.unwrap_or_default(),
        kind: shared::dto::feedback::FeedbackEventKind::Click { url: target.clone() },
        timestamp: chrono::Utc::now(),
    };
    spawn_ingest(state.clone(), log.org_id, event);

    Ok(Redirect::temporary(&target).into_response())
}

#[derive(Deserialize)]
struct UnsubscribeQuery {
    reason: Option<String>,
}

async fn track_unsubscribe(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Query(query): Query<UnsubscribeQuery>,
    headers: http::HeaderMap,
) -> Result<Response, CoreError> {
    let db = &state.db;
    log_request_metadata(&tracking_id, "unsubscribe", &headers);
    let log = load_email_log(db, &tracking_id).await?;

    let email = contact_email(db, log.contact_id).await.unwrap_or_default();

    let event = shared::dto::feedback::FeedbackEvent {
        feedback_id: format!("{}:unsubscribe", tracking_id),
        tracking_id: uuid::Uuid::parse_str(&tracking_id).ok(),
        message_id: None,
        email,
        kind: shared::dto::feedback::FeedbackEventKind::Unsubscribe { reason: query.reason },
        timestamp: chrono::Utc::now(),
    };
    let _ = ingest(db, &state.suppression, log.org_id, &event).await;

    if let Some(contact_row) = contact::Entity::find_by_id(log.contact_id).one(db).await? {
        let mut active: contact::ActiveModel = contact_row.into();
        active.status = Set(entity::enums::ContactStatus::Unsubscribed);
        active.unsubscribed_from_campaign_id = Set(log.campaign_id);
        active.update(db).await?;
    }

    Ok((StatusCode::OK, "you have been unsubscribed").into_response())
}

async fn contact_email(db: &DatabaseConnection, contact_id: i32) -> Option<String> {
    contact::Entity::find_by_id(contact_id).one(db).await.ok().flatten().map(|c| c.email)
}

async fn view_in_browser(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<Response, CoreError> {
    let db = &state.db;
    let log = load_email_log(db, &tracking_id).await?;

    let Some(campaign_id) = log.campaign_id else {
        return Err(CoreError::not_found(NOT_FOUND, "this message has no viewable campaign"));
    };

    let campaign_row = campaign::Entity::find_by_id(campaign_id)
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, "campaign no longer exists"))?;

    let org = organization::Entity::find_by_id(campaign_row.org_id)
        .one(db)
        .await?
        .ok_or_else(|| CoreError::internal("organization missing for campaign"))?;

    let contact_row = contact::Entity::find_by_id(log.contact_id)
        .one(db)
        .await?
        .ok_or_else(|| CoreError::not_found(NOT_FOUND, "contact no longer exists"))?;

    let (subject, html, text, variables) = match campaign_row.template_id {
        Some(template_id) => {
            let tpl = template::Entity::find_by_id(template_id)
                .one(db)
                .await?
                .ok_or_else(|| CoreError::internal("template missing for campaign"))?;
            let variables: Vec<TemplateVariable> = serde_json::from_value(tpl.variables).unwrap_or_default();
            (tpl.subject, tpl.html, tpl.text, variables)
        }
        None => (
            campaign_row.subject.clone(),
            campaign_row.inline_html.clone().unwrap_or_default(),
            None,
            Vec::new(),
        ),
    };

    let event = shared::dto::feedback::FeedbackEvent {
        feedback_id: format!("{}:open:{}", tracking_id, uuid::Uuid::new_v4()),
        tracking_id: uuid::Uuid::parse_str(&tracking_id).ok(),
        message_id: None,
        email: contact_row.email.clone(),
        kind: shared::dto::feedback::FeedbackEventKind::Open,
        timestamp: chrono::Utc::now(),
    };
    spawn_ingest(state.clone(), log.org_id, event);

    let mut contact_ctx = shared::value::Value::object();
    contact_ctx.set("email", contact_row.email.clone());
    if let Some(f) = &contact_row.first_name {
        contact_ctx.set("firstName", f.clone());
    }
    if let Some(l) = &contact_row.last_name {
        contact_ctx.set("lastName", l.clone());
    }
    contact_ctx.set("profile", contact_row.profile.clone());

    let mut org_ctx = shared::value::Value::object();
    org_ctx.set("name", org.name.clone());

    let context = build_context(contact_ctx, org_ctx, Default::default());
    let tracking_uuid = uuid::Uuid::parse_str(&tracking_id).unwrap_or_else(|_| uuid::Uuid::new_v4());

    let rendered = render(&RenderInput {
        subject: &subject,
        html: &html,
        text: text.as_deref(),
        context: &context,
        variables: &variables,
        base_url: &app_config().app_url,
        tracking_id: tracking_uuid,
        track_clicks: false,
        track_opens: false,
    })
    .map_err(|e| CoreError::internal(e.to_string()))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], rendered.html).into_response())
}
