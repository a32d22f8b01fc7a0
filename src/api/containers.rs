// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{ContainerInfoResponse, ContainerView, CreateContainerQuery, PasswordQuery, PublicContainerView},
    state::AppState,
    storage::ContainerAccess,
};

/// Container info.
///
/// An encrypted container asked for without a password only reveals that it
/// is encrypted.
#[utoipa::path(
    get,
    path = "/v1/container/{container_id}/",
    params(
        ("container_id" = String, Path, description = "Container identifier"),
        PasswordQuery
    ),
    tag = "Containers",
    responses(
        (status = 200, body = ContainerInfoResponse),
        (status = 403, description = "Wrong password, or password for an unencrypted container"),
        (status = 404, description = "Unknown container")
    )
)]
pub async fn get_container(
    Path(container_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<PasswordQuery>,
) -> Result<Json<ContainerInfoResponse>, ApiError> {
    let access = state
        .storage
        .containers
        .open(&container_id, params.password.as_deref())
        .await?;
    let response = match access {
        ContainerAccess::Locked { id } => ContainerInfoResponse::Public(PublicContainerView {
            id,
            encrypted: true,
        }),
        ContainerAccess::Unlocked(unlocked) => {
            let container = unlocked.handle.lock().await;
            ContainerInfoResponse::Full(ContainerView::from(&*container))
        }
    };
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/v1/container/",
    params(CreateContainerQuery),
    tag = "Containers",
    responses(
        (status = 200, description = "Created container", body = ContainerView),
        (status = 403, description = "Token missing, expired, unlimited or exhausted")
    )
)]
pub async fn create_container(
    State(state): State<AppState>,
    Query(params): Query<CreateContainerQuery>,
) -> Result<Json<ContainerView>, ApiError> {
    let storage = &state.storage;
    let container = storage
        .containers
        .create(&storage.tokens, &params.token, params.password.as_deref())
        .await?;
    Ok(Json(ContainerView::from(&container)))
}
