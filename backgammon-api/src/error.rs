use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing x-seat-token header")]
    MissingToken,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
pub struct ErrorModel {
    pub code: &'static str,
    pub detail: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingToken | ApiError::Store(StoreError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            ApiError::Store(StoreError::RoomNotFound(_)) => (StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
            ApiError::Store(StoreError::RoomFull(_)) => (StatusCode::CONFLICT, "ROOM_FULL"),
            ApiError::Store(StoreError::Conflict { .. }) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Store(StoreError::Rejected(err)) => (StatusCode::UNPROCESSABLE_ENTITY, err.code()),
            ApiError::Store(StoreError::Database(_) | StoreError::Corrupt(_) | StoreError::Poisoned) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(err = %self, "request failed");
        }
        let body = ErrorModel {
            code,
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
