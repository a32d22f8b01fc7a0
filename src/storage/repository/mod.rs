// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the record stores.
//!
//! Each repository owns the store for one entity kind and enforces its
//! business rules: token quotas, container access and storage accounting,
//! payload encryption.

pub mod containers;
pub mod files;
pub mod reports;
pub mod tokens;

pub use containers::{Container, ContainerAccess, ContainerRepository, FileMeta, UnlockedContainer};
pub use files::{normalize_mime, FileDownload, FileRepository};
pub use reports::{Report, ReportInfo, ReportRepository};
pub use tokens::{Token, TokenRepository};
