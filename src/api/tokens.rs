// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{MintQuery, Token},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/token/{token_id}/",
    params(
        ("token_id" = String, Path, description = "Token identifier")
    ),
    tag = "Tokens",
    responses(
        (status = 200, body = Token),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn get_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Token>, ApiError> {
    let handle = state.storage.tokens.require(&token_id).await?;
    let token = handle.lock().await.clone();
    Ok(Json(token))
}

#[utoipa::path(
    get,
    path = "/v1/token/{token_id}/new",
    params(
        ("token_id" = String, Path, description = "Parent token identifier"),
        MintQuery
    ),
    tag = "Tokens",
    responses(
        (status = 200, description = "Minted child token", body = Token),
        (status = 404, description = "Unknown parent token"),
        (status = 507, description = "Parent is expired or cannot grant these limits")
    )
)]
pub async fn mint_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<MintQuery>,
) -> Result<Json<Token>, ApiError> {
    let child = state
        .storage
        .tokens
        .mint(&token_id, params.token_limit, params.storage_limit, params.hint)
        .await?;
    Ok(Json(child))
}
