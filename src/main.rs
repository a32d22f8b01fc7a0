// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use quota_vault::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    quota_vault::init_tracing(LogFormat::from_env());

    let config = Config::from_env();
    match quota_vault::serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}
