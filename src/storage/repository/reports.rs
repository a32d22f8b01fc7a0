// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Abuse reports filed against containers.
//!
//! Reports are append-only and live next to the container they concern:
//! `{data}/container/{container_id}/reports/{report_id}.json`. All report
//! directories share one in-process cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use utoipa::ToSchema;

use super::super::record_cache::{RecordCache, RecordHandle};
use super::super::record_store::{Layout, Record, RecordStore, RetryPolicy};
use super::super::{StoragePaths, StorageError, StorageResult};
use super::containers::{ContainerRepository, UnlockedContainer};

/// Random bytes behind a report id.
pub const REPORT_ID_BYTES: usize = 30;

/// What the reporter submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Report {
    #[serde(default)]
    pub reason: String,
    /// Logical paths of the offending files
    #[serde(default)]
    pub files: Vec<String>,
}

/// Stored report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReportInfo {
    pub id: String,
    pub container_id: String,
    pub created: DateTime<Utc>,
    pub report: Report,
}

impl Record for ReportInfo {
    const ID_BYTES: usize = REPORT_ID_BYTES;
    const LAYOUT: Layout = Layout::Flat;
    type Sidecar = ();

    fn id(&self) -> &str {
        &self.id
    }
}

/// Repository for abuse reports.
pub struct ReportRepository {
    paths: StoragePaths,
    retry: RetryPolicy,
    cache: Arc<RecordCache<ReportInfo>>,
}

impl ReportRepository {
    pub fn new(paths: &StoragePaths, retry: RetryPolicy) -> Self {
        Self {
            paths: paths.clone(),
            retry,
            cache: Arc::new(RecordCache::new()),
        }
    }

    fn store_for(&self, container_id: &str) -> RecordStore<ReportInfo> {
        RecordStore::with_cache(
            self.paths.reports_dir(container_id),
            self.retry,
            Arc::clone(&self.cache),
        )
    }

    /// File a report against a container the caller has unlocked.
    ///
    /// A supplied password is left in plain text beside the container so
    /// moderators can inspect the reported files.
    pub async fn file(
        &self,
        access: &UnlockedContainer,
        password: Option<&str>,
        report: Report,
    ) -> StorageResult<ReportInfo> {
        let container_id = access.id.as_str();
        let handle = self
            .store_for(container_id)
            .create(|id| ReportInfo {
                id,
                container_id: container_id.to_string(),
                created: Utc::now(),
                report,
            })
            .await?;
        let info = handle.lock().await.clone();

        if let Some(password) = password {
            fs::write(self.paths.report_password(container_id), password).await?;
        }

        tracing::info!(
            container = %container_id,
            report = %info.id,
            files = info.report.files.len(),
            "Filed abuse report"
        );
        Ok(info)
    }

    /// Reports of one container, optionally only those naming `path`.
    ///
    /// An unknown container has no reports.
    pub async fn list_for(
        &self,
        containers: &ContainerRepository,
        container_id: &str,
        path: Option<&str>,
    ) -> StorageResult<Vec<ReportInfo>> {
        if containers.get(container_id).await?.is_none() {
            return Ok(Vec::new());
        }
        let reports = snapshot_all(&self.store_for(container_id)).await?;
        Ok(reports
            .into_iter()
            .filter(|r| path.is_none_or(|p| r.report.files.iter().any(|f| f == p)))
            .collect())
    }

    /// Every report of every container, one container at a time.
    pub fn list_all<'a>(
        &'a self,
        containers: &'a ContainerRepository,
    ) -> impl Stream<Item = StorageResult<ReportInfo>> + Send + 'a {
        containers
            .list()
            .and_then(move |handle| async move {
                let container_id = handle.lock().await.id.clone();
                let reports = snapshot_all(&self.store_for(&container_id)).await?;
                Ok::<_, StorageError>(stream::iter(reports.into_iter().map(Ok::<_, StorageError>)))
            })
            .try_flatten()
    }
}

async fn snapshot_all(store: &RecordStore<ReportInfo>) -> StorageResult<Vec<ReportInfo>> {
    let handles: Vec<RecordHandle<ReportInfo>> = store.list().try_collect().await?;
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.lock().await.clone());
    }
    reports.sort_by(|a, b| a.created.cmp(&b.created));
    Ok(reports)
}
