// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn length_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::LENGTH_REQUIRED, message)
    }

    pub fn insufficient_storage(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INSUFFICIENT_STORAGE, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => Self::not_found(format!("Not found: {what}")),
            StorageError::Forbidden(why) => Self::forbidden(why),
            StorageError::InsufficientStorage(why) => Self::insufficient_storage(why),
            StorageError::BadRequest(why) => Self::bad_request(why),
            StorageError::LengthRequired => Self::length_required("Content-Length is required"),
            StorageError::Busy { .. } => {
                tracing::warn!(error = %error, "Storage busy");
                Self::unavailable("Storage is busy, try again")
            }
            StorageError::Io(_) | StorageError::Json(_) | StorageError::Crypto(_) => {
                tracing::error!(error = %error, "Storage failure");
                Self::internal("Internal storage error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let len = ApiError::length_required("no length");
        assert_eq!(len.status, StatusCode::LENGTH_REQUIRED);
        assert_eq!(len.message, "no length");
    }

    #[test]
    fn storage_errors_map_to_contract_statuses() {
        let cases = [
            (StorageError::not_found("x"), StatusCode::NOT_FOUND),
            (StorageError::forbidden("x"), StatusCode::FORBIDDEN),
            (
                StorageError::insufficient_storage("x"),
                StatusCode::INSUFFICIENT_STORAGE,
            ),
            (StorageError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (StorageError::LengthRequired, StatusCode::LENGTH_REQUIRED),
            (
                StorageError::Busy { attempts: 3 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StorageError::Io(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(StorageError::Io(std::io::Error::other("/secret/path")));
        assert!(!err.message.contains("/secret/path"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
