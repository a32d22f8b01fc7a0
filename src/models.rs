// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Query parameters and response bodies of the REST API. Persisted records
//! ([`Token`], [`FileMeta`], [`ReportInfo`]) are returned as stored; containers
//! go through a view so encryption material never leaves the server.
//!
//! ## Empty Parameters
//!
//! `password=` and `hint=` with an empty value mean the same as leaving the
//! parameter out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::storage::{Container, FileMeta};

pub use crate::storage::{Report, ReportInfo, Token};

/// Treat `?name=` as if the parameter was absent.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PasswordQuery {
    /// Container password
    #[serde(default, deserialize_with = "empty_as_none")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CreateContainerQuery {
    /// Token paying for the container
    pub token: String,
    /// Protects the container and encrypts its files
    #[serde(default, deserialize_with = "empty_as_none")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FileQuery {
    /// Logical path of the file inside the container
    pub path: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MintQuery {
    /// Mint budget of the new token
    pub token_limit: u64,
    /// Storage ceiling in bytes of the new token
    pub storage_limit: u64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListReportsQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub container_id: Option<String>,
    /// Only reports naming this file path
    #[serde(default, deserialize_with = "empty_as_none")]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FileReportQuery {
    pub container_id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub password: Option<String>,
}

// =============================================================================
// Container Views
// =============================================================================

/// Everything a caller with full access sees of a container.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ContainerView {
    pub id: String,
    pub encrypted: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub storage_limit: u64,
    pub files: Vec<FileMeta>,
}

impl From<&Container> for ContainerView {
    fn from(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            encrypted: container.is_encrypted(),
            created: container.created,
            modified: container.modified,
            storage_limit: container.storage_limit,
            files: container.files.clone(),
        }
    }
}

/// What an encrypted container reveals without its password.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PublicContainerView {
    pub id: String,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ContainerInfoResponse {
    Full(ContainerView),
    Public(PublicContainerView),
}
