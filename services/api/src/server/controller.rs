//! Main axum router/controller, grounded on the teacher's own
//! `server::controller::new` — same `AppState`, CORS layer and tracing
//! layer wiring, generalized from the teacher's socket.io/vehicle-tracking
//! router to the campaign control plane.

use std::sync::Arc;

use axum::{routing::get, Router};
use core_lib::suppression_cache::SuppressionCache;
use http::{header, HeaderValue, Method};
use sea_orm::DatabaseConnection;
use shared::config::app_config;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::modules::{automation, campaign, contact, template, tracking, webhook};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub suppression: Arc<SuppressionCache>,
}

pub fn new(db: DatabaseConnection) -> Router {
    let suppression = Arc::new(SuppressionCache::new(app_config().suppression_cache_ttl_secs));
    let state = AppState { db, suppression };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(
            app_config()
                .app_url
                .parse::<HeaderValue>()
                .expect("failed to parse APP_URL as a CORS origin"),
        )
        .allow_credentials(true)
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE]);

    let tracing_layer = TraceLayer::new_for_http()
        .on_request(|request: &http::Request<axum::body::Body>, _span: &tracing::Span| {
            info!("{} {}", request.method(), request.uri().path())
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let global_middlewares = ServiceBuilder::new().layer(tracing_layer).layer(cors);

    Router::new()
        .route("/healthcheck", get(healthcheck))
        .nest("/t", tracking::routes::create_router(state.clone()))
        .nest("/webhooks", webhook::routes::create_router(state.clone()))
        .nest("/campaigns", campaign::routes::create_router(state.clone()))
        .nest("/contacts", contact::routes::create_router(state.clone()))
        .nest("/templates", template::routes::create_router(state.clone()))
        .nest("/automations", automation::routes::create_router(state.clone()))
        .layer(global_middlewares)
        .with_state(state)
}

async fn healthcheck() -> http::StatusCode {
    http::StatusCode::OK
}
