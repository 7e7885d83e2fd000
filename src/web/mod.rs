pub mod auth;
pub mod extract;
pub mod profile;
pub mod resumes;
pub mod sessions;
pub mod statistics;

use crate::blob::BlobError;
use crate::domain::models::Page;
use crate::error::StoreError;
use crate::state::SharedState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_PAGE_SIZE: i64 = 10;

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    let api = Router::new()
        .merge(profile::router(state.clone()))
        .merge(resumes::router(state.clone()))
        .merge(sessions::router(state.clone()))
        .merge(statistics::router(state));

    Router::new()
        .route("/health", get(health))
        .nest("/api/db", api)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("{0}")]
    BadRequest(String),
}

pub fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::Authorization(_) => StatusCode::FORBIDDEN,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Referential(_) => StatusCode::CONFLICT,
        StoreError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(err) => store_status(err),
            ApiError::Blob(BlobError::UnsupportedType | BlobError::Empty) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Blob(_) => StatusCode::BAD_GATEWAY,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            if status.is_server_error() {
                tracing::error!(error = %self, "request failed");
            }
            self.to_string()
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        Page::new(
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            self.offset.unwrap_or(0),
        )
    }
}
