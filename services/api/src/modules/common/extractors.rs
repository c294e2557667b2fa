//! Request extractors shared by every domain route. Grounded on the
//! teacher's own `ValidatedJson`/`ValidatedQuery`/`OrganizationId`/
//! `DbConnection` quartet — same shape, `CoreError` standing in for
//! `SimpleError` as the rejection type.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Query},
    Json,
};
use http::request::Parts;
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;
use shared::error::CoreError;
use validator::Validate;

use crate::modules::auth::middleware::RequestContext;
use crate::server::controller::AppState;

#[derive(Clone, Copy)]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let payload = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| CoreError::validation(rejection.to_string()))?;

        payload.validate()?;
        Ok(ValidatedQuery(payload.0))
    }
}

#[derive(Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for ValidatedJson<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    T: Validate,
    B: Send + 'static,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request(req: http::Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let payload = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| CoreError::validation(rejection.to_string()))?;

        payload.validate()?;
        Ok(ValidatedJson(payload.0))
    }
}

/// Extracts the caller's organization id, rejecting routes called by a
/// context with no organization (platform-admin callers).
#[derive(Clone, Copy)]
pub struct OrganizationId(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for OrganizationId
where
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .ok_or_else(|| CoreError::new(shared::error::ErrorKind::Auth, "NO_TOKEN", "missing authentication context"))?;

        Ok(OrganizationId(ctx.require_org_id()?))
    }
}

pub struct DbConnection(pub DatabaseConnection);

#[async_trait]
impl FromRequestParts<AppState> for DbConnection {
    type Rejection = CoreError;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(DbConnection(state.db.clone()))
    }
}
