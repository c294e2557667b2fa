//! Authentication and authorization are handled by an external
//! collaborator (see §6 of the spec this crate implements); this module
//! only defines the contract routes rely on: a `RequestContext` extension
//! the collaborating layer is expected to attach to the request, and an
//! `AclLayer` that checks it against a route's required permissions.
//!
//! Grounded on the teacher's own `AclLayer`/`AclMiddleware` pair — same
//! `tower::Layer`/`Service` shape — generalized from a DB-backed session
//! lookup (`require_user`) to reading an already-authenticated context off
//! the request, since validating credentials is out of scope here.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use http::{HeaderMap, Request};
use shared::Permission;
use tower::{Layer, Service};

use crate::modules::common::error_codes::MISSING_PERMISSIONS;
use shared::error::CoreError;

/// The authenticated caller, attached to the request by the collaborating
/// auth middleware before it reaches this service's router. `org_id` is
/// `None` for platform-admin callers acting outside any single tenant.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub org_id: Option<i32>,
    pub user_id: i32,
    pub permissions: Vec<String>,
}

impl RequestContext {
    pub fn has_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.permissions.contains(&p.to_string()))
    }

    pub fn missing(&self, required: &[Permission]) -> Vec<String> {
        required
            .iter()
            .map(|p| p.to_string())
            .filter(|p| !self.permissions.contains(p))
            .collect()
    }

    /// Tenant id for a request, or a `CoreError` if the caller isn't
    /// scoped to an organization. Every domain route is tenant-scoped, so
    /// this is what handlers call first.
    pub fn require_org_id(&self) -> Result<i32, CoreError> {
        self.org_id.ok_or_else(|| CoreError::new(shared::error::ErrorKind::Forbidden, "NO_ORGANIZATION", "caller is not scoped to an organization"))
    }
}

/// Reads the `RequestContext` the collaborating auth layer attaches as a
/// request extension. In this standalone crate (no collaborator wired up)
/// it's populated straight from headers so routes are exercisable on their
/// own; a real deployment replaces this with the actual auth service's
/// middleware, which performs the same `req.extensions_mut().insert(...)`.
pub async fn attach_request_context(
    mut req: http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let headers = req.headers().clone();

    match context_from_headers(&headers) {
        Some(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        None => CoreError::new(shared::error::ErrorKind::Auth, "NO_TOKEN", "missing authentication context").into_response(),
    }
}

fn context_from_headers(headers: &HeaderMap) -> Option<RequestContext> {
    let user_id: i32 = headers.get("x-user-id")?.to_str().ok()?.parse().ok()?;
    let org_id = headers
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok());
    let permissions = headers
        .get("x-permissions")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default();

    Some(RequestContext { org_id, user_id, permissions })
}

/// Layer that rejects a request unless its `RequestContext` (attached by
/// [`attach_request_context`]) carries every required permission.
#[derive(Clone)]
pub struct AclLayer {
    required: Vec<Permission>,
}

impl AclLayer {
    pub fn single(permission: Permission) -> Self {
        AclLayer { required: vec![permission] }
    }

    pub fn all(required: Vec<Permission>) -> Self {
        AclLayer { required }
    }
}

impl<S> Layer<S> for AclLayer {
    type Service = AclMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AclMiddleware { inner, required: self.required.clone() }
    }
}

#[derive(Clone)]
pub struct AclMiddleware<S> {
    inner: S,
    required: Vec<Permission>,
}

impl<S> Service<Request<axum::body::Body>> for AclMiddleware<S>
where
    S: Service<Request<axum::body::Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<axum::body::Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let required = self.required.clone();

        Box::pin(async move {
            let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
                return Ok(CoreError::new(shared::error::ErrorKind::Auth, "NO_TOKEN", "missing authentication context").into_response());
            };

            let missing = ctx.missing(&required);

            if missing.is_empty() {
                return inner.call(req).await;
            }

            let message = format!("missing permissions: {}", missing.join(", "));
            let err = CoreError::new(shared::error::ErrorKind::Forbidden, MISSING_PERMISSIONS, message);
            Ok(err.into_response())
        })
    }
}
