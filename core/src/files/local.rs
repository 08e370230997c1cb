//! Local disk backend.
//!
//! Disk I/O is synchronous and runs on the blocking thread pool via
//! `tokio::task::spawn_blocking`. The `*_sync` methods expose the same
//! probes for callers outside an async context.

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::store::{join_path, RawStore, StoreHandle};
use super::transfer::{remove_if_exists, TransferEngine};
use super::{DownloadOptions, FileOperationResult, FileSystemOperations, UploadOptions};
use crate::config::{LocalConfig, StorageSettings};
use crate::errors::TransferError;

/// [`RawStore`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl RawStore for LocalStore {
    fn file_exists(&self, path: &str) -> Result<bool, TransferError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(!meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TransferError::from_io(e, path)),
        }
    }

    fn dir_exists(&self, path: &str) -> Result<bool, TransferError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TransferError::from_io(e, path)),
        }
    }

    fn create_dir(&self, path: &str) -> Result<(), TransferError> {
        std::fs::create_dir(path).map_err(|e| TransferError::from_io(e, path))
    }

    fn create_dir_all(&self, path: &str) -> Result<(), TransferError> {
        std::fs::create_dir_all(path).map_err(|e| TransferError::from_io(e, path))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, TransferError> {
        std::fs::read(path).map_err(|e| TransferError::from_io(e, path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), TransferError> {
        let mut file = std::fs::File::create(path).map_err(|e| TransferError::from_io(e, path))?;
        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|e| TransferError::from_io(e, path))
    }

    fn remove_file(&self, path: &str) -> Result<(), TransferError> {
        std::fs::remove_file(path).map_err(|e| TransferError::from_io(e, path))
    }
}

impl StoreHandle for LocalStore {
    fn with_store<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&dyn RawStore) -> Result<T, TransferError>,
    {
        f(self)
    }
}

/// File system operations rooted at a local directory.
pub struct LocalFileSystem {
    engine: TransferEngine<LocalStore>,
}

impl LocalFileSystem {
    pub fn new(root: impl AsRef<Path>, settings: StorageSettings) -> Self {
        let root = root
            .as_ref()
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            engine: TransferEngine::new(LocalStore, root, settings),
        }
    }

    pub fn from_config(config: &LocalConfig, settings: StorageSettings) -> Self {
        Self::new(&config.root, settings)
    }

    pub fn settings(&self) -> &StorageSettings {
        self.engine.settings()
    }

    /// Blocking form of [`FileSystemOperations::exists`].
    pub fn exists_sync(&self, path: &str) -> bool {
        let absolute = self.engine.absolute(path);
        LocalStore.file_exists(&absolute).unwrap_or_else(|e| {
            warn!(path, error = %e, "existence probe failed");
            false
        })
    }

    /// Blocking form of [`FileSystemOperations::directory_exists`].
    pub fn directory_exists_sync(&self, path: &str) -> bool {
        let absolute = self.engine.absolute(path);
        LocalStore.dir_exists(&absolute).unwrap_or_else(|e| {
            warn!(path, error = %e, "existence probe failed");
            false
        })
    }

    /// Blocking form of [`FileSystemOperations::create_directory_if_not_exists`].
    pub fn create_directory_if_not_exists_sync(&self, path: &str) -> Result<(), TransferError> {
        LocalStore.create_dir_all(&self.engine.absolute(path))
    }

    /// Blocking form of [`FileSystemOperations::delete_file_if_exists`].
    pub fn delete_file_if_exists_sync(&self, path: &str) -> Result<bool, TransferError> {
        remove_if_exists(&LocalStore, &self.engine.absolute(path))
    }

    /// Absolute path of a root-relative `path`.
    pub fn absolute_path(&self, path: &str) -> String {
        join_path(self.engine.root(), path)
    }
}

#[async_trait::async_trait]
impl FileSystemOperations for LocalFileSystem {
    fn root(&self) -> &str {
        self.engine.root()
    }

    async fn exists(&self, path: &str) -> bool {
        self.engine.exists(path).await
    }

    async fn directory_exists(&self, path: &str) -> bool {
        self.engine.directory_exists(path).await
    }

    async fn create_directory_if_not_exists(&self, path: &str) -> Result<(), TransferError> {
        self.engine.create_directory_if_not_exists(path).await
    }

    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, TransferError> {
        self.engine.delete_file_if_exists(path).await
    }

    async fn upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        file_name: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.engine.upload(source, file_name, options, cancel).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.engine.download(path, destination, options, cancel).await
    }

    async fn download_to_stream(
        &self,
        path: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.engine.download_to_stream(path, output, cancel).await
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> FileOperationResult {
        self.engine.delete(path, cancel).await
    }
}
