//! Provider webhook intake. A single `POST /webhooks/ses` endpoint that
//! accepts an SNS envelope, either confirming a subscription inline or
//! verifying and enqueueing the wrapped notification for the analytics
//! worker. Public like the tracking routes: the provider has no session
//! to attach, so there's no `attach_request_context`/`AclLayer` here.

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use core_lib::feedback::WebhookJob;
use core_lib::queue::JobQueue;
use core_lib::sns::{self, SnsEnvelope};
use http::StatusCode;
use shared::config::app_config;
use shared::constants::QUEUE_WEBHOOK;
use shared::error::CoreError;

use crate::server::controller::AppState;

/// SNS envelopes for bounce/complaint notifications are small; this caps
/// the raw body axum will buffer before rejecting the request outright.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/ses",
            post(handle_ses_webhook).layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn handle_ses_webhook(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<StatusCode, CoreError> {
    let envelope: SnsEnvelope = serde_json::from_slice(&body)
        .map_err(|e| CoreError::validation(format!("invalid SNS envelope: {e}")))?;

    if envelope.is_subscription_confirmation() {
        sns::confirm_subscription(&envelope)
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?;
        return Ok(StatusCode::OK);
    }

    let skip_verification = app_config().skip_sns_verification && !app_config().is_production();
    sns::verify_signature(&envelope, skip_verification)
        .await
        .map_err(|_| CoreError::new(shared::error::ErrorKind::Auth, "INVALID_SIGNATURE", "SNS signature verification failed"))?;

    let message_body = sns::parse_message_body(&envelope).map_err(|e| CoreError::internal(e.to_string()))?;

    let queue = JobQueue::new(&state.db, QUEUE_WEBHOOK);
    queue
        .enqueue(&WebhookJob { body: message_body }, &core_lib::queue::EnqueueOptions::default())
        .await?;

    Ok(StatusCode::OK)
}
