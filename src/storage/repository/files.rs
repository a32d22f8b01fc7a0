// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File payloads inside containers.
//!
//! Metadata changes happen under the container lock and are saved before any
//! payload byte is written. Payload I/O happens afterwards under the lock of
//! the backing file only, so other files of the same container stay usable.
//!
//! Nothing is rolled back across the two phases. A delete that lands between
//! an upload's metadata save and its payload write removes the entry first,
//! and the upload then leaves an unreferenced `files/{id}` payload behind.

use std::io;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::super::bounded::BoundedStream;
use super::super::file_locks::GuardedStream;
use super::super::{StorageError, StorageResult};
use super::containers::{ContainerRepository, FileMeta};
use crate::crypto::{decrypt_stream, StreamDecryptor, StreamEncryptor};

/// Fallback MIME type for payloads nobody could classify.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Refine wildcard and generic MIME types from the path's extension.
pub fn normalize_mime(path: &str, mime: &str) -> String {
    if mime.contains('*') || mime == OCTET_STREAM {
        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string()
    } else {
        mime.to_string()
    }
}

/// A payload ready to be streamed to a client.
pub struct FileDownload {
    pub meta: FileMeta,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

/// File operations on top of the container repository.
pub struct FileRepository<'a> {
    containers: &'a ContainerRepository,
}

impl<'a> FileRepository<'a> {
    pub fn new(containers: &'a ContainerRepository) -> Self {
        Self { containers }
    }

    /// Store `body` at `path`, reading at most `declared_len` bytes from it.
    ///
    /// Access is checked before the length, so an unknown container or a bad
    /// password wins over a missing `declared_len`.
    pub async fn upload<S>(
        &self,
        container_id: &str,
        path: &str,
        password: Option<&str>,
        declared_len: Option<u64>,
        mime: &str,
        body: S,
    ) -> StorageResult<FileMeta>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
    {
        let unlocked = self.containers.open_for_files(container_id, password).await?;
        let declared_len = declared_len.ok_or(StorageError::LengthRequired)?;

        let (meta, encryptor) = {
            let mut container = unlocked.handle.lock().await;
            let mut draft = container.clone();
            let meta = draft.reserve_file(path, declared_len, normalize_mime(path, mime))?;
            let encryptor = match (&unlocked.key, draft.encryption.as_mut()) {
                (Some(key), Some(encryption)) => {
                    let (iv, created) = encryption.ensure_iv(&meta.id)?;
                    if created {
                        tracing::debug!(container = %container_id, file = %meta.id, "New file IV");
                    }
                    Some(StreamEncryptor::new(key, &iv))
                }
                (Some(_), None) => {
                    return Err(StorageError::forbidden("Container is not encrypted"));
                }
                (None, Some(_)) => {
                    return Err(StorageError::forbidden("Container requires a password"));
                }
                (None, None) => None,
            };
            self.containers.save(&draft).await?;
            *container = draft;
            (meta, encryptor)
        };

        let target = self.containers.paths().container_file(container_id, &meta.id);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).await?;
        }
        let _guard = self.containers.file_locks().acquire(&target).await;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)
            .await?;

        let mut source = BoundedStream::new(body, declared_len);
        let mut encryptor = encryptor;
        while let Some(chunk) = source.try_next().await? {
            match encryptor.as_mut() {
                Some(encryptor) => file.write_all(&encryptor.update(&chunk)).await?,
                None => file.write_all(&chunk).await?,
            }
        }
        if let Some(encryptor) = encryptor {
            file.write_all(&encryptor.finish()?).await?;
        }
        file.flush().await?;
        file.sync_data().await?;

        if source.produced() < declared_len {
            tracing::warn!(
                container = %container_id,
                file = %meta.id,
                declared = declared_len,
                received = source.produced(),
                "Upload ended before its declared length"
            );
        }
        tracing::info!(
            container = %container_id,
            file = %meta.id,
            size = declared_len,
            "Stored file"
        );
        Ok(meta)
    }

    /// Open the payload at `path` for streaming, decrypting on the fly.
    pub async fn download(
        &self,
        container_id: &str,
        path: &str,
        password: Option<&str>,
    ) -> StorageResult<FileDownload> {
        let unlocked = self.containers.open_for_files(container_id, password).await?;

        let (meta, decryptor) = {
            let container = unlocked.handle.lock().await;
            let meta = container
                .file_by_path(path)
                .cloned()
                .ok_or_else(|| StorageError::not_found(format!("File {path}")))?;
            let decryptor = match (&container.encryption, &unlocked.key) {
                (Some(encryption), Some(key)) => {
                    let iv = encryption
                        .iv(&meta.id)?
                        .ok_or_else(|| StorageError::not_found(format!("File {path}")))?;
                    Some(StreamDecryptor::new(key, &iv))
                }
                (Some(_), None) => {
                    return Err(StorageError::forbidden("Container requires a password"))
                }
                (None, _) => None,
            };
            (meta, decryptor)
        };

        let target = self.containers.paths().container_file(container_id, &meta.id);
        let guard = self.containers.file_locks().acquire(&target).await;
        let file = match File::open(&target).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(format!("File {path}")))
            }
            Err(e) => return Err(e.into()),
        };

        let raw = GuardedStream::new(ReaderStream::new(file), guard);
        let body = match decryptor {
            Some(decryptor) => decrypt_stream(raw, decryptor).boxed(),
            None => raw.boxed(),
        };
        Ok(FileDownload { meta, body })
    }

    /// Remove the entry at `path` and its payload. A missing payload is fine.
    pub async fn delete(&self, container_id: &str, path: &str, password: Option<&str>) -> StorageResult<FileMeta> {
        let unlocked = self.containers.open_for_files(container_id, password).await?;

        let meta = {
            let mut container = unlocked.handle.lock().await;
            let mut draft = container.clone();
            let meta = draft
                .remove_file(path)
                .ok_or_else(|| StorageError::not_found(format!("File {path}")))?;
            self.containers.save(&draft).await?;
            *container = draft;
            meta
        };

        let target = self.containers.paths().container_file(container_id, &meta.id);
        let _guard = self.containers.file_locks().acquire(&target).await;
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(container = %container_id, file = %meta.id, "Payload was already gone");
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(container = %container_id, file = %meta.id, "Deleted file");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record_store::RetryPolicy;
    use crate::storage::repository::TokenRepository;
    use crate::storage::StoragePaths;
    use futures::stream;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        tokens: TokenRepository,
        containers: ContainerRepository,
        token: String,
    }

    async fn fixture(storage_limit: u64) -> Fixture {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let paths = StoragePaths::new(dir.path());
        let tokens = TokenRepository::new(&paths, RetryPolicy::default());
        let containers = ContainerRepository::new(&paths, RetryPolicy::default());
        let root = tokens.root_token().await.unwrap();
        let token = tokens.mint(&root.id, 10, storage_limit, None).await.unwrap().id;
        Fixture {
            _dir: dir,
            tokens,
            containers,
            token,
        }
    }

    impl Fixture {
        async fn container(&self, password: Option<&str>) -> String {
            self.containers
                .create(&self.tokens, &self.token, password)
                .await
                .unwrap()
                .id
        }

        fn files(&self) -> FileRepository<'_> {
            FileRepository::new(&self.containers)
        }
    }

    fn body(data: &[u8], chunk: usize) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks)
    }

    async fn read_all(download: FileDownload) -> io::Result<Vec<u8>> {
        let chunks: Vec<Bytes> = download.body.try_collect().await?;
        Ok(chunks.concat())
    }

    #[test]
    fn mime_is_refined_only_when_generic() {
        assert_eq!(normalize_mime("/a.png", OCTET_STREAM), "image/png");
        assert_eq!(normalize_mime("/a.txt", "*/*"), "text/plain");
        assert_eq!(normalize_mime("/noext", OCTET_STREAM), OCTET_STREAM);
        assert_eq!(normalize_mime("/a.png", "text/markdown"), "text/markdown");
    }

    #[tokio::test]
    async fn plain_round_trip() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        let data = b"hello plain world".to_vec();

        let meta = f
            .files()
            .upload(&cid, "/a.txt", None, Some(data.len() as u64), OCTET_STREAM, body(&data, 4))
            .await
            .unwrap();
        assert_eq!(meta.mime, "text/plain");
        assert_eq!(meta.size, data.len() as u64);

        let on_disk = std::fs::read(f.containers.paths().container_file(&cid, &meta.id)).unwrap();
        assert_eq!(on_disk, data);

        let download = f.files().download(&cid, "/a.txt", None).await.unwrap();
        assert_eq!(download.meta.id, meta.id);
        assert_eq!(read_all(download).await.unwrap(), data);
    }

    #[tokio::test]
    async fn encrypted_round_trip_and_access() {
        let f = fixture(100_000).await;
        let cid = f.container(Some("pw1")).await;
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let meta = f
            .files()
            .upload(&cid, "/blob.bin", Some("pw1"), Some(data.len() as u64), OCTET_STREAM, body(&data, 333))
            .await
            .unwrap();

        let on_disk = std::fs::read(f.containers.paths().container_file(&cid, &meta.id)).unwrap();
        assert_ne!(on_disk, data);
        assert_eq!(on_disk.len() % 16, 0);

        let download = f.files().download(&cid, "/blob.bin", Some("pw1")).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), data);

        assert!(matches!(
            f.files().download(&cid, "/blob.bin", Some("pw2")).await,
            Err(StorageError::Forbidden(_))
        ));
        assert!(matches!(
            f.files().download(&cid, "/blob.bin", None).await,
            Err(StorageError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn overwrite_keeps_id_and_iv() {
        let f = fixture(100_000).await;
        let cid = f.container(Some("pw")).await;

        let first = f
            .files()
            .upload(&cid, "/doc", Some("pw"), Some(5), "text/plain", body(b"first", 2))
            .await
            .unwrap();
        let iv_before = {
            let handle = f.containers.get(&cid).await.unwrap().unwrap();
            let container = handle.lock().await;
            container.encryption.as_ref().unwrap().iv(&first.id).unwrap()
        };

        let second = f
            .files()
            .upload(&cid, "/doc", Some("pw"), Some(12), "application/json", body(b"second, more", 5))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.size, 12);
        assert_eq!(second.mime, "application/json");
        assert!(second.modified >= first.modified);

        let handle = f.containers.get(&cid).await.unwrap().unwrap();
        let container = handle.lock().await;
        assert_eq!(container.files.len(), 1);
        assert_eq!(container.encryption.as_ref().unwrap().iv(&first.id).unwrap(), iv_before);
        drop(container);

        let download = f.files().download(&cid, "/doc", Some("pw")).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), b"second, more");
    }

    #[tokio::test]
    async fn shorter_overwrite_leaves_no_stale_bytes() {
        let f = fixture(100_000).await;
        let cid = f.container(None).await;
        f.files()
            .upload(&cid, "/a", None, Some(10), "text/plain", body(b"0123456789", 3))
            .await
            .unwrap();
        f.files()
            .upload(&cid, "/a", None, Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();

        let download = f.files().download(&cid, "/a", None).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn upload_is_cut_at_declared_length() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        let meta = f
            .files()
            .upload(&cid, "/a", None, Some(4), "text/plain", body(b"abcdefgh", 3))
            .await
            .unwrap();
        assert_eq!(meta.size, 4);

        let download = f.files().download(&cid, "/a", None).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn short_body_keeps_declared_size() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        let meta = f
            .files()
            .upload(&cid, "/a", None, Some(100), "text/plain", body(b"abc", 3))
            .await
            .unwrap();
        assert_eq!(meta.size, 100);

        let download = f.files().download(&cid, "/a", None).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn quota_scenario() {
        let f = fixture(1000).await;
        let cid = f.container(None).await;
        let data = vec![7u8; 500];

        f.files()
            .upload(&cid, "/a.txt", None, Some(500), "text/plain", body(&data, 100))
            .await
            .unwrap();

        let second = vec![1u8; 600];
        let err = f
            .files()
            .upload(&cid, "/b.txt", None, Some(600), "text/plain", body(&second, 100))
            .await
            .unwrap_err();
        // max(500, 1024) + 600 > 1000
        assert!(matches!(err, StorageError::InsufficientStorage(_)));

        let handle = f.containers.get(&cid).await.unwrap().unwrap();
        assert_eq!(handle.lock().await.files.len(), 1);
    }

    #[tokio::test]
    async fn missing_length_is_checked_after_access() {
        let f = fixture(10_000).await;
        let plain = f.container(None).await;
        let locked = f.container(Some("pw")).await;

        let err = f
            .files()
            .upload("doesnotexist", "/a", None, None, "text/plain", body(b"abc", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = f
            .files()
            .upload(&locked, "/a", Some("wrong"), None, "text/plain", body(b"abc", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden(_)));

        let err = f
            .files()
            .upload(&plain, "/a", None, None, "text/plain", body(b"abc", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LengthRequired));
        let handle = f.containers.get(&plain).await.unwrap().unwrap();
        assert!(handle.lock().await.files.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_uploads_keep_every_entry_and_iv() {
        const UPLOADS: usize = 32;
        let f = std::sync::Arc::new(fixture(1_000_000).await);
        let cid = f.container(Some("pw")).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..UPLOADS {
            let f = std::sync::Arc::clone(&f);
            let cid = cid.clone();
            tasks.spawn(async move {
                let data = format!("payload {i}").into_bytes();
                f.files()
                    .upload(
                        &cid,
                        &format!("/f{i}"),
                        Some("pw"),
                        Some(data.len() as u64),
                        "text/plain",
                        body(&data, 3),
                    )
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let info: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(f.containers.paths().container_info(&cid)).unwrap(),
        )
        .unwrap();
        assert_eq!(info["files"].as_array().unwrap().len(), UPLOADS);
        let encryption: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(f.containers.paths().container_encryption(&cid)).unwrap(),
        )
        .unwrap();
        assert_eq!(encryption["file_iv"].as_object().unwrap().len(), UPLOADS);

        let download = f.files().download(&cid, "/f7", Some("pw")).await.unwrap();
        assert_eq!(read_all(download).await.unwrap(), b"payload 7");
    }

    #[tokio::test]
    async fn metadata_is_saved_to_disk() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        f.files()
            .upload(&cid, "/a", None, Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(f.containers.paths().container_info(&cid)).unwrap();
        assert!(raw.contains("\"/a\""));
    }

    #[tokio::test]
    async fn delete_removes_entry_payload_and_iv() {
        let f = fixture(10_000).await;
        let cid = f.container(Some("pw")).await;
        let meta = f
            .files()
            .upload(&cid, "/a", Some("pw"), Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();
        let payload = f.containers.paths().container_file(&cid, &meta.id);
        assert!(payload.exists());

        f.files().delete(&cid, "/a", Some("pw")).await.unwrap();
        assert!(!payload.exists());

        let handle = f.containers.get(&cid).await.unwrap().unwrap();
        let container = handle.lock().await;
        assert!(container.files.is_empty());
        assert!(container.encryption.as_ref().unwrap().file_iv.is_empty());
        drop(container);

        let raw = std::fs::read_to_string(f.containers.paths().container_info(&cid)).unwrap();
        assert!(!raw.contains("\"/a\""));

        assert!(matches!(
            f.files().delete(&cid, "/a", Some("pw")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_payload() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        let meta = f
            .files()
            .upload(&cid, "/a", None, Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();
        std::fs::remove_file(f.containers.paths().container_file(&cid, &meta.id)).unwrap();

        f.files().delete(&cid, "/a", None).await.unwrap();
    }

    #[tokio::test]
    async fn missing_path_or_payload_is_not_found() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        assert!(matches!(
            f.files().download(&cid, "/nope", None).await,
            Err(StorageError::NotFound(_))
        ));

        let meta = f
            .files()
            .upload(&cid, "/a", None, Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();
        std::fs::remove_file(f.containers.paths().container_file(&cid, &meta.id)).unwrap();
        assert!(matches!(
            f.files().download(&cid, "/a", None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn download_holds_the_file_lock_until_dropped() {
        let f = fixture(10_000).await;
        let cid = f.container(None).await;
        let meta = f
            .files()
            .upload(&cid, "/a", None, Some(3), "text/plain", body(b"abc", 3))
            .await
            .unwrap();
        let payload = f.containers.paths().container_file(&cid, &meta.id);

        let download = f.files().download(&cid, "/a", None).await.unwrap();
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            f.containers.file_locks().acquire(&payload),
        )
        .await;
        assert!(blocked.is_err());

        drop(download);
        let _guard = f.containers.file_locks().acquire(&payload).await;
    }
}
