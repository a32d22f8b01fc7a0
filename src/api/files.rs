// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::io;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;

use crate::{
    error::ApiError,
    models::FileQuery,
    state::AppState,
    storage::repository::files::OCTET_STREAM,
};

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Stream a stored file, decrypted when the container is encrypted.
#[utoipa::path(
    get,
    path = "/v1/file/{container_id}/",
    params(
        ("container_id" = String, Path, description = "Container identifier"),
        FileQuery
    ),
    tag = "Files",
    responses(
        (status = 200, description = "File content with its stored MIME type", content_type = "application/octet-stream"),
        (status = 403, description = "Missing or wrong password"),
        (status = 404, description = "Unknown container or path")
    )
)]
pub async fn get_file(
    Path(container_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let download = state
        .storage
        .files()
        .download(&container_id, &params.path, params.password.as_deref())
        .await?;
    Ok((
        [(header::CONTENT_TYPE, download.meta.mime)],
        Body::from_stream(download.body),
    )
        .into_response())
}

/// Create or replace a file. Reads exactly `Content-Length` bytes at most.
///
/// Container access is checked before the `Content-Length` requirement.
#[utoipa::path(
    put,
    path = "/v1/file/{container_id}/",
    params(
        ("container_id" = String, Path, description = "Container identifier"),
        FileQuery
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    tag = "Files",
    responses(
        (status = 201, description = "Stored"),
        (status = 403, description = "Missing or wrong password"),
        (status = 404, description = "Unknown container"),
        (status = 411, description = "Missing Content-Length"),
        (status = 507, description = "Storage quota or file count exceeded")
    )
)]
pub async fn put_file(
    Path(container_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<FileQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let declared_len = content_length(&headers);
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(OCTET_STREAM);

    let stream = body.into_data_stream().map_err(io::Error::other);
    state
        .storage
        .files()
        .upload(
            &container_id,
            &params.path,
            params.password.as_deref(),
            declared_len,
            mime,
            stream,
        )
        .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/v1/file/{container_id}/",
    params(
        ("container_id" = String, Path, description = "Container identifier"),
        FileQuery
    ),
    tag = "Files",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Missing or wrong password"),
        (status = 404, description = "Unknown container or path")
    )
)]
pub async fn delete_file(
    Path(container_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<FileQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .storage
        .files()
        .delete(&container_id, &params.path, params.password.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn content_length_must_parse() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(content_length(&headers), Some(1234));
    }
}
