//! The upload/download pipeline shared by every backend.
//!
//! Upload: buffer the source → resolve the name (probing the store) →
//! write under the retry policy → verify, removing the destination again if
//! a started write fails or is cancelled. Download: check the source →
//! resolve the local destination → read, verify against the sidecar and
//! write under the retry policy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::integrity::{content_hash, metadata_path, IntegrityValidator};
use super::naming::{NamingPolicy, NamingResolver};
use super::store::{join_path, run_blocking, RawStore, StoreHandle};
use super::{
    format_size, DownloadOptions, FileOperationResult, UploadOptions, UploadedInfo,
    STREAM_DESTINATION,
};
use crate::config::StorageSettings;
use crate::errors::TransferError;
use crate::retry::RetryExecutor;

/// Backend-independent transfer logic over a [`StoreHandle`].
pub(crate) struct TransferEngine<H: StoreHandle> {
    handle: H,
    root: String,
    settings: StorageSettings,
    retry: RetryExecutor,
    integrity: IntegrityValidator,
}

impl<H: StoreHandle> TransferEngine<H> {
    pub(crate) fn new(handle: H, root: String, settings: StorageSettings) -> Self {
        Self {
            retry: RetryExecutor::new(settings.retry.clone()),
            integrity: IntegrityValidator::from_settings(&settings),
            handle,
            root,
            settings,
        }
    }

    pub(crate) fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    pub(crate) fn absolute(&self, relative: &str) -> String {
        join_path(&self.root, relative)
    }

    pub(crate) async fn exists(&self, path: &str) -> bool {
        self.probe(path, false).await
    }

    pub(crate) async fn directory_exists(&self, path: &str) -> bool {
        self.probe(path, true).await
    }

    async fn probe(&self, path: &str, directory: bool) -> bool {
        let absolute = self.absolute(path);
        let result = run_blocking(&self.handle, move |store| {
            if directory {
                store.dir_exists(&absolute)
            } else {
                store.file_exists(&absolute)
            }
        })
        .await;

        match result {
            Ok(found) => found,
            Err(e) => {
                warn!(path, error = %e, "existence probe failed");
                false
            }
        }
    }

    pub(crate) async fn create_directory_if_not_exists(
        &self,
        path: &str,
    ) -> Result<(), TransferError> {
        let absolute = self.absolute(path);
        run_blocking(&self.handle, move |store| store.create_dir_all(&absolute)).await
    }

    pub(crate) async fn delete_file_if_exists(&self, path: &str) -> Result<bool, TransferError> {
        let absolute = self.absolute(path);
        run_blocking(&self.handle, move |store| remove_if_exists(store, &absolute)).await
    }

    pub(crate) async fn upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        file_name: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        match self.try_upload(source, file_name, options, cancel).await {
            Ok(info) => {
                info!(
                    path = %info.relative_path,
                    size = info.size_bytes,
                    hash = %info.hash,
                    "upload complete"
                );
                FileOperationResult::uploaded(info)
            }
            Err(e) => {
                warn!(file = file_name, container = %options.container, error = %e, "upload failed");
                FileOperationResult::failure(Some(file_name), None, e)
            }
        }
    }

    async fn try_upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        file_name: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<UploadedInfo, TransferError> {
        if file_name.trim().is_empty() {
            return Err(TransferError::InvalidArgument(
                "file name must not be empty".to_string(),
            ));
        }

        let content = Arc::new(read_source(source, self.settings.buffer_size, cancel).await?);
        let hash = content_hash(&content);
        check_cancelled(cancel)?;

        let resolved = {
            let root = self.root.clone();
            let directory = options.directory();
            let name = file_name.to_string();
            let content = Arc::clone(&content);
            let resolver = NamingResolver::new(options.policy(&self.settings));
            run_blocking(&self.handle, move |store| {
                store.create_dir_all(&join_path(&root, &directory))?;
                resolver.resolve(&directory, &name, &content, |relative| {
                    store.file_exists(&join_path(&root, relative))
                })
            })
            .await?
        };
        let absolute = self.absolute(&resolved.relative_path);
        debug!(path = %resolved.relative_path, "resolved upload destination");

        let written = WriteGuard::default();
        if let Err(e) = self
            .write_verified(&absolute, &content, &hash, &written, cancel)
            .await
        {
            if self.integrity.cleanup_on_failure {
                self.discard_failed_upload(&absolute, written).await;
            }
            return Err(e);
        }

        let size_bytes = content.len() as u64;
        Ok(UploadedInfo {
            hash,
            original_file_name: file_name.to_string(),
            resolved_file_name: resolved.file_name,
            relative_path: resolved.relative_path,
            absolute_path: absolute,
            size_bytes,
            formatted_size: format_size(size_bytes),
        })
    }

    /// Write under the retry policy, then verify. Every attempt runs under
    /// `written` and skips the write once `cancel` fires, so an attempt still
    /// running on the blocking pool after cancellation is ordered before any
    /// cleanup.
    async fn write_verified(
        &self,
        absolute: &str,
        content: &Arc<Vec<u8>>,
        hash: &str,
        written: &WriteGuard,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let integrity = self.integrity;
        self.retry
            .execute(
                "upload",
                || {
                    let handle = self.handle.clone();
                    let content = Arc::clone(content);
                    let path = absolute.to_string();
                    let hash = hash.to_string();
                    let written = written.clone();
                    let cancel = cancel.clone();
                    async move {
                        run_blocking(&handle, move |store| {
                            let _turn = written.turn()?;
                            check_cancelled(&cancel)?;
                            written.mark();
                            store.write(&path, &content)?;
                            integrity.write_metadata(store, &path, &hash)
                        })
                        .await
                    }
                },
                cancel,
            )
            .await?;

        if integrity.verify_writes {
            let path = absolute.to_string();
            let expected = hash.to_string();
            run_blocking(&self.handle, move |store| {
                integrity.verify_written(store, &path, &expected)
            })
            .await?;
        }
        Ok(())
    }

    /// Best-effort removal of whatever a failed upload left at `absolute`.
    /// Nothing is removed unless a write attempt started.
    async fn discard_failed_upload(&self, absolute: &str, written: WriteGuard) {
        let path = absolute.to_string();
        let result = run_blocking(&self.handle, move |store| {
            let _turn = written.turn()?;
            if !written.started() {
                return Ok(false);
            }
            remove_if_exists(store, &path)
        })
        .await;

        match result {
            Ok(true) => debug!(path = absolute, "removed partial upload"),
            Ok(false) => {}
            Err(e) => warn!(path = absolute, error = %e, "failed to remove partial upload"),
        }
    }

    pub(crate) async fn download(
        &self,
        path: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        match self.try_download(path, destination, options, cancel).await {
            Ok((target, size, hash)) => {
                let target = target.display().to_string();
                info!(path, destination = %target, size, "download complete");
                FileOperationResult::transferred(path, &target, size, Some(hash))
            }
            Err(e) => {
                let destination = destination.display().to_string();
                warn!(path, destination = %destination, error = %e, "download failed");
                FileOperationResult::failure(Some(path), Some(&destination), e)
            }
        }
    }

    async fn try_download(
        &self,
        path: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, u64, String), TransferError> {
        check_cancelled(cancel)?;
        let source = self.absolute(path);
        self.require_file(path, &source).await?;

        let target =
            resolve_local_destination(destination.to_path_buf(), options.policy(&self.settings))
                .await?;

        let integrity = self.integrity;
        let (size, hash) = self
            .retry
            .execute(
                "download",
                || {
                    let handle = self.handle.clone();
                    let source = source.clone();
                    let target = target.clone();
                    async move {
                        run_blocking(&handle, move |store| {
                            let data = store.read(&source)?;
                            let hash = integrity.verify_downloaded(store, &source, &data)?;
                            std::fs::write(&target, &data).map_err(|e| {
                                TransferError::from_io(e, &target.display().to_string())
                            })?;
                            Ok((data.len() as u64, hash))
                        })
                        .await
                    }
                },
                cancel,
            )
            .await?;

        Ok((target, size, hash))
    }

    pub(crate) async fn download_to_stream(
        &self,
        path: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        match self.try_download_to_stream(path, output, cancel).await {
            Ok((size, hash)) => {
                debug!(path, size, "streamed download complete");
                FileOperationResult::transferred(path, STREAM_DESTINATION, size, Some(hash))
            }
            Err(e) => {
                warn!(path, error = %e, "streamed download failed");
                FileOperationResult::failure(Some(path), Some(STREAM_DESTINATION), e)
            }
        }
    }

    async fn try_download_to_stream(
        &self,
        path: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<(u64, String), TransferError> {
        check_cancelled(cancel)?;
        let source = self.absolute(path);
        self.require_file(path, &source).await?;

        let integrity = self.integrity;
        let (data, hash) = self
            .retry
            .execute(
                "download",
                || {
                    let handle = self.handle.clone();
                    let source = source.clone();
                    async move {
                        run_blocking(&handle, move |store| {
                            let data = store.read(&source)?;
                            let hash = integrity.verify_downloaded(store, &source, &data)?;
                            Ok((data, hash))
                        })
                        .await
                    }
                },
                cancel,
            )
            .await?;

        write_output(output, &data, self.settings.buffer_size, cancel).await?;
        Ok((data.len() as u64, hash))
    }

    pub(crate) async fn delete(&self, path: &str, cancel: &CancellationToken) -> FileOperationResult {
        let absolute = self.absolute(path);
        let result = self
            .retry
            .execute(
                "delete",
                || {
                    let handle = self.handle.clone();
                    let absolute = absolute.clone();
                    async move {
                        run_blocking(&handle, move |store| remove_if_exists(store, &absolute)).await
                    }
                },
                cancel,
            )
            .await;

        match result {
            Ok(removed) => {
                debug!(path, removed, "delete complete");
                FileOperationResult::completed(path)
            }
            Err(e) => {
                warn!(path, error = %e, "delete failed");
                FileOperationResult::failure(Some(path), None, e)
            }
        }
    }

    async fn require_file(&self, path: &str, absolute: &str) -> Result<(), TransferError> {
        let absolute = absolute.to_string();
        let found = run_blocking(&self.handle, move |store| store.file_exists(&absolute)).await?;
        if found {
            Ok(())
        } else {
            Err(TransferError::NotFound(path.to_string()))
        }
    }
}

/// Serializes upload write attempts with their cleanup and records whether
/// any attempt reached the store.
#[derive(Clone, Default)]
struct WriteGuard {
    lock: Arc<Mutex<()>>,
    started: Arc<AtomicBool>,
}

impl WriteGuard {
    fn turn(&self) -> Result<MutexGuard<'_, ()>, TransferError> {
        self.lock
            .lock()
            .map_err(|_| TransferError::OperationFailed("upload write lock poisoned".into()))
    }

    fn mark(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(())
    }
}

/// Remove `path` and its sidecar hash if present.
pub(crate) fn remove_if_exists(store: &dyn RawStore, path: &str) -> Result<bool, TransferError> {
    if !store.file_exists(path)? {
        return Ok(false);
    }
    match store.remove_file(path) {
        Ok(()) => {}
        Err(TransferError::NotFound(_)) => return Ok(false),
        Err(e) => return Err(e),
    }

    let sidecar = metadata_path(path);
    if store.file_exists(&sidecar).unwrap_or(false) {
        if let Err(e) = store.remove_file(&sidecar) {
            warn!(path = %sidecar, error = %e, "failed to remove metadata hash");
        }
    }
    Ok(true)
}

/// Buffer all of `source` in memory, `buffer_size` bytes at a time.
async fn read_source(
    source: &mut (dyn AsyncRead + Unpin + Send),
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, TransferError> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; buffer_size.max(1)];
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            read = source.read(&mut chunk) => read?,
        };
        if read == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&chunk[..read]);
    }
}

/// Write `data` to `output` in `buffer_size` chunks and flush.
async fn write_output(
    output: &mut (dyn AsyncWrite + Unpin + Send),
    data: &[u8],
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    for piece in data.chunks(buffer_size.max(1)) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            written = output.write_all(piece) => written?,
        }
    }
    output.flush().await?;
    Ok(())
}

/// Apply the literal collision policy to a local download destination,
/// creating its parent directory.
async fn resolve_local_destination(
    destination: PathBuf,
    policy: NamingPolicy,
) -> Result<PathBuf, TransferError> {
    tokio::task::spawn_blocking(move || {
        let file_name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::InvalidArgument(format!(
                    "download destination has no file name: {}",
                    destination.display()
                ))
            })?;
        let parent = destination.parent().map(Path::to_path_buf).unwrap_or_default();
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(&parent)
                .map_err(|e| TransferError::from_io(e, &parent.display().to_string()))?;
        }

        let resolved = NamingResolver::new(policy).resolve("", &file_name, &[], |candidate| {
            Ok(parent.join(candidate).exists())
        })?;
        Ok(parent.join(resolved.file_name))
    })
    .await
    .map_err(|e| TransferError::OperationFailed(format!("Task join failed: {e}")))?
}
