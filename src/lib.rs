// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Quota Vault - Capability-Scoped Encrypted Object Store
//!
//! This crate provides a self-hosted HTTP object store. Capability tokens form
//! a quota tree, tokens pay for containers, and containers hold files that are
//! optionally encrypted at rest with a password-derived key.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `config` - Environment configuration
//! - `crypto` - Key derivation and streaming AES-256-CBC
//! - `storage` - File-backed record stores and repositories

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;

use config::{Config, LogFormat, DEFAULT_LOG_FILTER};
use state::AppState;
use storage::{Storage, StorageError, StoragePaths};

/// Grace period for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("server I/O: {0}")]
    Io(#[from] io::Error),
}

/// Install the global tracing subscriber.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Open the data directory, bootstrap the root token and serve until
/// Ctrl-C / SIGTERM.
pub async fn serve(config: Config) -> Result<(), ServerError> {
    let storage = Storage::open(StoragePaths::new(&config.data_dir), config.retry).await?;
    let root = storage.tokens.root_token().await?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        root_token = %root.id,
        "Storage ready"
    );

    let app = api::router(AppState::new(storage));
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    match &config.tls {
        Some(tls) => {
            // Err means a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            tracing::info!(addr = %config.bind, "Listening on https (docs at /docs)");
            axum_server::bind_rustls(config.bind, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(addr = %config.bind, "Listening on http (docs at /docs)");
            axum_server::bind(config.bind)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutting down");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
