//! The `{ success, data?, message?, pagination? }` envelope every route
//! handler returns on the happy path. Errors go through
//! `shared::error::CoreError`'s own `IntoResponse`, which wraps
//! `{ success: false, error: {...} }` the same shape expects.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        PaginationMeta { page, limit, total, pages }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<PaginationMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse { success: true, data: Some(data), message: None, pagination: None }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        ApiResponse { success: true, data: Some(data), message: Some(message.into()), pagination: None }
    }

    pub fn paginated(data: T, pagination: PaginationMeta) -> Self {
        ApiResponse { success: true, data: Some(data), message: None, pagination: Some(pagination) }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse { success: true, data: None, message: Some(message.into()), pagination: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
