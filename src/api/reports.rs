// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use futures::TryStreamExt;

use crate::{
    error::ApiError,
    models::{FileReportQuery, ListReportsQuery, Report, ReportInfo},
    state::AppState,
};

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

#[utoipa::path(
    get,
    path = "/v1/report/",
    params(ListReportsQuery),
    tag = "Reports",
    responses((status = 200, body = [ReportInfo]))
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<ListReportsQuery>,
) -> Result<Json<Vec<ReportInfo>>, ApiError> {
    let storage = &state.storage;
    let reports = match params.container_id {
        Some(container_id) => {
            storage
                .reports
                .list_for(&storage.containers, &container_id, params.path.as_deref())
                .await?
        }
        None => {
            storage
                .reports
                .list_all(&storage.containers)
                .try_collect::<Vec<_>>()
                .await?
        }
    };
    Ok(Json(reports))
}

/// File an abuse report against a container.
///
/// The container must be accessible with the given password. Access is
/// checked before the body is parsed.
#[utoipa::path(
    post,
    path = "/v1/report/",
    params(FileReportQuery),
    request_body = Report,
    tag = "Reports",
    responses(
        (status = 200, body = ReportInfo),
        (status = 400, description = "Body is not a JSON report"),
        (status = 403, description = "Missing or wrong password"),
        (status = 404, description = "Unknown container")
    )
)]
pub async fn file_report(
    State(state): State<AppState>,
    Query(params): Query<FileReportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReportInfo>, ApiError> {
    let storage = &state.storage;
    let password = params.password.as_deref();
    let access = storage
        .containers
        .open_for_files(&params.container_id, password)
        .await?;

    if !is_json(&headers) {
        return Err(ApiError::bad_request("Expected an application/json body"));
    }
    let report: Report = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid report: {e}")))?;

    let info = storage.reports.file(&access, password, report).await?;
    Ok(Json(info))
}
