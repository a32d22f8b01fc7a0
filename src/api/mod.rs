// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{ContainerInfoResponse, ContainerView, PublicContainerView, Report, ReportInfo, Token},
    state::AppState,
    storage::FileMeta,
};

pub mod containers;
pub mod files;
pub mod health;
pub mod reports;
pub mod tokens;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/container/", post(containers::create_container))
        .route("/container/{container_id}/", get(containers::get_container))
        .route(
            "/file/{container_id}/",
            get(files::get_file)
                .put(files::put_file)
                .delete(files::delete_file),
        )
        .route(
            "/report/",
            get(reports::list_reports).post(reports::file_report),
        )
        .route("/token/{token_id}/", get(tokens::get_token))
        .route("/token/{token_id}/new", get(tokens::mint_token));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    // Path only: the query carries passwords
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        containers::get_container,
        containers::create_container,
        files::get_file,
        files::put_file,
        files::delete_file,
        reports::list_reports,
        reports::file_report,
        tokens::get_token,
        tokens::mint_token,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            Token,
            ContainerView,
            PublicContainerView,
            ContainerInfoResponse,
            FileMeta,
            Report,
            ReportInfo,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Tokens", description = "Capability tokens and minting"),
        (name = "Containers", description = "Quota-scoped containers"),
        (name = "Files", description = "File upload, download and deletion"),
        (name = "Reports", description = "Abuse reports"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;
