// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token repository: the capability tree.
//!
//! ## Storage Layout
//!
//! ```text
//! {data}/root-token.txt        # id of the root token
//! {data}/token/{token_id}.json
//! ```
//!
//! ## Quota Rules
//!
//! - Minting a child with `token_limit = n` costs the parent `1 + n` from a
//!   finite `token_limit`.
//! - A child's `storage_limit` may not exceed a finite parent `storage_limit`,
//!   but the parent's storage limit is not reduced: siblings may each be
//!   granted the full amount. It is a ceiling per lineage, not a partition.
//! - Spending a token on a container costs 1 from a finite `token_limit`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use utoipa::ToSchema;

use super::super::record_cache::RecordHandle;
use super::super::record_store::{Layout, Record, RecordStore, RetryPolicy};
use super::super::{StoragePaths, StorageError, StorageResult};

/// Random bytes behind a token id.
pub const TOKEN_ID_BYTES: usize = 30;

/// Capability token stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Token {
    /// Unique token identifier
    pub id: String,
    /// Token that minted this one; `None` for the root
    pub parent: Option<String>,
    /// Tokens minted from this one, in mint order
    #[serde(default)]
    pub child_tokens: Vec<String>,
    /// Containers created with this token, in creation order
    #[serde(default, alias = "child_container")]
    pub child_containers: Vec<String>,
    /// Storage ceiling in bytes handed to containers; unlimited when absent
    pub storage_limit: Option<u64>,
    /// Remaining mint/spend budget; unlimited when absent
    pub token_limit: Option<u64>,
    /// Revoked tokens can neither mint nor spend
    #[serde(default)]
    pub expired: bool,
    pub created: DateTime<Utc>,
    /// Last time this token minted a child
    pub used: DateTime<Utc>,
    /// Free-form label chosen by the minter
    pub hint: Option<String>,
}

impl Record for Token {
    const ID_BYTES: usize = TOKEN_ID_BYTES;
    const LAYOUT: Layout = Layout::Flat;
    type Sidecar = ();

    fn id(&self) -> &str {
        &self.id
    }
}

impl Token {
    fn new(
        id: String,
        parent: Option<String>,
        token_limit: Option<u64>,
        storage_limit: Option<u64>,
        hint: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent,
            child_tokens: Vec::new(),
            child_containers: Vec::new(),
            storage_limit,
            token_limit,
            expired: false,
            created: now,
            used: now,
            hint,
        }
    }

    /// Check this token may pay for a child with `token_limit`/`storage_limit`.
    ///
    /// Returns the cost to deduct from a finite budget.
    pub fn check_mint(&self, token_limit: u64, storage_limit: u64) -> StorageResult<u64> {
        let cost = token_limit.checked_add(1).ok_or_else(|| {
            StorageError::insufficient_storage("Requested token limit is out of range")
        })?;
        if self.expired {
            return Err(StorageError::insufficient_storage(format!(
                "Token {} is expired",
                self.id
            )));
        }
        if self.token_limit.is_some_and(|budget| cost > budget) {
            return Err(StorageError::insufficient_storage(format!(
                "Token {} cannot grant a token limit of {token_limit}",
                self.id
            )));
        }
        if self.storage_limit.is_some_and(|ceiling| storage_limit > ceiling) {
            return Err(StorageError::insufficient_storage(format!(
                "Token {} cannot grant a storage limit of {storage_limit}",
                self.id
            )));
        }
        Ok(cost)
    }

    /// Check this token may create a container; returns the storage limit
    /// the container inherits.
    pub fn check_spend(&self) -> StorageResult<u64> {
        if self.expired {
            return Err(StorageError::forbidden(format!("Token {} is expired", self.id)));
        }
        let Some(storage_limit) = self.storage_limit else {
            return Err(StorageError::forbidden(format!(
                "Token {} has no storage limit",
                self.id
            )));
        };
        if self.token_limit == Some(0) {
            return Err(StorageError::forbidden(format!(
                "Token {} has no budget left",
                self.id
            )));
        }
        Ok(storage_limit)
    }
}

/// Repository for token operations.
pub struct TokenRepository {
    store: RecordStore<Token>,
    paths: StoragePaths,
}

impl TokenRepository {
    pub fn new(paths: &StoragePaths, retry: RetryPolicy) -> Self {
        Self {
            store: RecordStore::new(paths.tokens_dir(), retry),
            paths: paths.clone(),
        }
    }

    /// Get a token by ID.
    pub async fn get(&self, token_id: &str) -> StorageResult<Option<RecordHandle<Token>>> {
        self.store.get(token_id).await
    }

    /// Get a token by ID, `NotFound` if it does not exist.
    pub async fn require(&self, token_id: &str) -> StorageResult<RecordHandle<Token>> {
        self.get(token_id)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("Token {token_id}")))
    }

    /// Persist a token the caller holds locked.
    pub async fn save(&self, token: &Token) -> StorageResult<()> {
        self.store.save(token).await
    }

    /// Mint a child token under `parent_id`.
    ///
    /// The parent stays locked for the whole check-create-save span.
    pub async fn mint(
        &self,
        parent_id: &str,
        token_limit: u64,
        storage_limit: u64,
        hint: Option<String>,
    ) -> StorageResult<Token> {
        let parent_handle = self.require(parent_id).await?;
        let mut parent = parent_handle.lock().await;
        let cost = parent.check_mint(token_limit, storage_limit)?;

        let parent_ref = parent.id.clone();
        let child_handle = self
            .store
            .create(|id| Token::new(id, Some(parent_ref), Some(token_limit), Some(storage_limit), hint))
            .await?;
        let child = child_handle.lock().await.clone();

        parent.child_tokens.push(child.id.clone());
        if let Some(budget) = parent.token_limit.as_mut() {
            *budget -= cost;
        }
        parent.used = child.used;
        self.store.save(&parent).await?;

        tracing::info!(
            parent = %parent.id,
            child = %child.id,
            token_limit,
            storage_limit,
            "Minted token"
        );
        Ok(child)
    }

    /// Charge a token for a new container and record it as a child.
    ///
    /// The caller holds the token locked across creation of the container.
    pub async fn spend_for_container(&self, token: &mut Token, container_id: &str) -> StorageResult<()> {
        token.check_spend()?;
        if let Some(budget) = token.token_limit.as_mut() {
            *budget -= 1;
        }
        token.child_containers.push(container_id.to_string());
        self.store.save(token).await
    }

    /// Load the root token, minting a new unlimited one on first start or
    /// when the stored one is gone or expired.
    pub async fn root_token(&self) -> StorageResult<Token> {
        let marker = self.paths.root_token_marker();
        match fs::read_to_string(&marker).await {
            Ok(id) => match self.get(id.trim()).await? {
                Some(handle) => {
                    let token = handle.lock().await.clone();
                    if !token.expired {
                        return Ok(token);
                    }
                    tracing::warn!("Root token is expired, minting a new one");
                }
                None => tracing::warn!("Root token marker points at a missing token, minting a new one"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No root token yet, minting one");
            }
            Err(e) => return Err(e.into()),
        }

        let handle = self
            .store
            .create(|id| Token::new(id, None, None, None, None))
            .await?;
        let root = handle.lock().await.clone();
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&marker, &root.id).await?;
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> (TempDir, TokenRepository) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repo = TokenRepository::new(&StoragePaths::new(dir.path()), RetryPolicy::default());
        (dir, repo)
    }

    async fn snapshot(repo: &TokenRepository, id: &str) -> Token {
        repo.require(id).await.unwrap().lock().await.clone()
    }

    #[tokio::test]
    async fn root_token_is_unlimited_and_stable() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();
        assert_eq!(root.parent, None);
        assert_eq!(root.token_limit, None);
        assert_eq!(root.storage_limit, None);
        assert_eq!(root.id.len(), 40);

        let again = repo.root_token().await.unwrap();
        assert_eq!(again.id, root.id);
    }

    #[tokio::test]
    async fn expired_root_is_replaced() {
        let (dir, repo) = repo();
        let root = repo.root_token().await.unwrap();
        {
            let handle = repo.require(&root.id).await.unwrap();
            let mut token = handle.lock().await;
            token.expired = true;
            repo.save(&token).await.unwrap();
        }

        let fresh = repo.root_token().await.unwrap();
        assert_ne!(fresh.id, root.id);
        let marker = std::fs::read_to_string(dir.path().join("root-token.txt")).unwrap();
        assert_eq!(marker, fresh.id);
    }

    #[tokio::test]
    async fn mint_links_parent_and_child() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();

        let child = repo
            .mint(&root.id, 2, 1000, Some("team-a".into()))
            .await
            .unwrap();
        assert_eq!(child.parent.as_deref(), Some(root.id.as_str()));
        assert_eq!(child.token_limit, Some(2));
        assert_eq!(child.storage_limit, Some(1000));
        assert_eq!(child.hint.as_deref(), Some("team-a"));

        let parent = snapshot(&repo, &root.id).await;
        assert_eq!(parent.child_tokens, vec![child.id.clone()]);
        assert_eq!(parent.token_limit, None);
        assert_eq!(parent.used, child.used);
    }

    #[tokio::test]
    async fn minting_to_exhaustion_then_forbidden() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();
        let parent = repo.mint(&root.id, 5, 100, None).await.unwrap();

        // 1 + 1 and 1 + 2 use the whole budget of 5
        repo.mint(&parent.id, 1, 10, None).await.unwrap();
        repo.mint(&parent.id, 2, 10, None).await.unwrap();
        assert_eq!(snapshot(&repo, &parent.id).await.token_limit, Some(0));

        let err = repo.mint(&parent.id, 0, 10, None).await.unwrap_err();
        assert!(matches!(err, StorageError::InsufficientStorage(_)));
        assert_eq!(snapshot(&repo, &parent.id).await.child_tokens.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_mints_never_overspend_the_parent() {
        const ATTEMPTS: usize = 16;
        let (_dir, repo) = repo();
        let repo = std::sync::Arc::new(repo);
        let root = repo.root_token().await.unwrap();
        let parent = repo.mint(&root.id, 10, 1000, None).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..ATTEMPTS {
            let repo = std::sync::Arc::clone(&repo);
            let parent = parent.id.clone();
            // each child costs 1 + 1 from a budget of 10
            tasks.spawn(async move { repo.mint(&parent, 1, 100, None).await });
        }
        let mut minted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(child) => minted.push(child.id),
                Err(e) => assert!(matches!(e, StorageError::InsufficientStorage(_)), "{e}"),
            }
        }
        assert_eq!(minted.len(), 10 / (1 + 1));

        let raw = std::fs::read_to_string(repo.paths.token(&parent.id)).unwrap();
        let on_disk: Token = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.token_limit, Some(0));
        assert_eq!(on_disk.child_tokens.len(), minted.len());
        for id in &minted {
            assert!(on_disk.child_tokens.contains(id));
        }
    }

    #[tokio::test]
    async fn mint_respects_storage_ceiling_without_partitioning() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();
        let parent = repo.mint(&root.id, 10, 1000, None).await.unwrap();

        let err = repo.mint(&parent.id, 0, 1001, None).await.unwrap_err();
        assert!(matches!(err, StorageError::InsufficientStorage(_)));

        repo.mint(&parent.id, 0, 1000, None).await.unwrap();
        repo.mint(&parent.id, 0, 1000, None).await.unwrap();
        assert_eq!(snapshot(&repo, &parent.id).await.storage_limit, Some(1000));
    }

    #[tokio::test]
    async fn mint_rejects_overflow_expired_and_missing() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();

        let err = repo.mint(&root.id, u64::MAX, 1, None).await.unwrap_err();
        assert!(matches!(err, StorageError::InsufficientStorage(_)));

        let child = repo.mint(&root.id, 3, 1, None).await.unwrap();
        {
            let handle = repo.require(&child.id).await.unwrap();
            let mut token = handle.lock().await;
            token.expired = true;
            repo.save(&token).await.unwrap();
        }
        let err = repo.mint(&child.id, 0, 1, None).await.unwrap_err();
        assert!(matches!(err, StorageError::InsufficientStorage(_)));

        let err = repo.mint("doesnotexist", 0, 1, None).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn spend_decrements_and_records_container() {
        let (_dir, repo) = repo();
        let root = repo.root_token().await.unwrap();
        let token = repo.mint(&root.id, 1, 500, None).await.unwrap();

        let handle = repo.require(&token.id).await.unwrap();
        let mut locked = handle.lock().await;
        repo.spend_for_container(&mut locked, "container-1")
            .await
            .unwrap();
        assert_eq!(locked.token_limit, Some(0));
        assert_eq!(locked.child_containers, vec!["container-1".to_string()]);

        let err = repo
            .spend_for_container(&mut locked, "container-2")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden(_)));
    }

    #[test]
    fn unlimited_storage_cannot_spend() {
        let token = Token::new("root".into(), None, None, None, None);
        assert!(matches!(token.check_spend(), Err(StorageError::Forbidden(_))));
    }

    #[test]
    fn legacy_child_container_field_is_accepted() {
        let json = r#"{
            "id": "t1", "parent": null, "child_tokens": [],
            "child_container": ["c1"], "storage_limit": 10, "token_limit": null,
            "expired": false, "created": "2024-01-01T00:00:00Z",
            "used": "2024-01-01T00:00:00Z", "hint": null
        }"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token.child_containers, vec!["c1".to_string()]);
    }
}
