//! SFTP backend implementing [`FileSystemOperations`].
//!
//! All operations share one SSH session per [`SftpFileSystem`]. Each public
//! call enters a [`ConnectionScope`]: a closed session is opened for that
//! call and closed afterwards, while a session opened with
//! [`SftpFileSystem::connect`] stays open across calls.
//!
//! An `SftpFileSystem` is not safe for concurrent use by independent
//! callers. libssh2 calls are serialized by a mutex, but one caller's scope
//! can close the session while another caller is between steps. Serialize
//! calls on one instance, or `connect()` first and `disconnect()` once the
//! batch is done.

pub mod auth;
pub mod connection;
pub mod store;

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, TryLockError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{SftpConfig, StorageSettings};
use crate::connection::{lock_connection, Connectable, ConnectionScope, ConnectionStatus};
use crate::errors::TransferError;
use crate::files::transfer::TransferEngine;
use crate::files::{DownloadOptions, FileOperationResult, FileSystemOperations, UploadOptions};

pub use self::connection::SftpConnection;
use self::store::SftpHandle;

/// File system operations rooted at a directory on an SFTP server.
pub struct SftpFileSystem {
    connection: Arc<Mutex<SftpConnection>>,
    engine: TransferEngine<SftpHandle>,
}

impl SftpFileSystem {
    /// Create a backend; no network I/O happens until the first call.
    pub fn new(config: SftpConfig, settings: StorageSettings) -> Self {
        let root = config.root.trim_end_matches('/').to_string();
        let root = if root.is_empty() { "/".to_string() } else { root };
        let connection = Arc::new(Mutex::new(SftpConnection::new(config)));
        let handle = SftpHandle::new(Arc::clone(&connection), settings.buffer_size);
        Self {
            engine: TransferEngine::new(handle, root, settings),
            connection,
        }
    }

    pub fn settings(&self) -> &StorageSettings {
        self.engine.settings()
    }

    /// Open the session and keep it open until [`disconnect`](Self::disconnect).
    pub async fn connect(&self) -> Result<(), TransferError> {
        let connection = Arc::clone(&self.connection);
        blocking(move || lock_connection(&connection)?.open()).await
    }

    /// Close the session. Closing a closed session is a no-op.
    pub async fn disconnect(&self) -> Result<(), TransferError> {
        let connection = Arc::clone(&self.connection);
        blocking(move || {
            lock_connection(&connection)?.close();
            Ok(())
        })
        .await
    }

    /// Current session state, or `None` while another call holds the
    /// session. Never blocks, so it is safe to call from async code.
    pub fn status(&self) -> Option<ConnectionStatus> {
        match self.connection.try_lock() {
            Ok(guard) => Some(guard.status()),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().status()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Run `op` with the session open, releasing it afterwards.
    async fn scoped<T, Fut>(&self, op: Fut) -> Result<T, TransferError>
    where
        Fut: Future<Output = T>,
    {
        let connection = Arc::clone(&self.connection);
        let scope = blocking(move || ConnectionScope::enter(&connection)).await?;
        let output = op.await;
        // Closing the session talks to the server.
        blocking(move || {
            drop(scope);
            Ok(())
        })
        .await?;
        Ok(output)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, TransferError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::OperationFailed(format!("Task join failed: {e}")))?
}

#[async_trait::async_trait]
impl FileSystemOperations for SftpFileSystem {
    fn root(&self) -> &str {
        self.engine.root()
    }

    async fn exists(&self, path: &str) -> bool {
        self.scoped(self.engine.exists(path))
            .await
            .unwrap_or_else(|e| {
                warn!(path, error = %e, "existence probe failed");
                false
            })
    }

    async fn directory_exists(&self, path: &str) -> bool {
        self.scoped(self.engine.directory_exists(path))
            .await
            .unwrap_or_else(|e| {
                warn!(path, error = %e, "existence probe failed");
                false
            })
    }

    async fn create_directory_if_not_exists(&self, path: &str) -> Result<(), TransferError> {
        self.scoped(self.engine.create_directory_if_not_exists(path))
            .await?
    }

    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, TransferError> {
        self.scoped(self.engine.delete_file_if_exists(path)).await?
    }

    async fn upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        file_name: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.scoped(self.engine.upload(source, file_name, options, cancel))
            .await
            .unwrap_or_else(|e| FileOperationResult::failure(Some(file_name), None, e))
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.scoped(self.engine.download(path, destination, options, cancel))
            .await
            .unwrap_or_else(|e| {
                let dest = destination.to_string_lossy();
                FileOperationResult::failure(Some(path), Some(dest.as_ref()), e)
            })
    }

    async fn download_to_stream(
        &self,
        path: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> FileOperationResult {
        self.scoped(self.engine.download_to_stream(path, output, cancel))
            .await
            .unwrap_or_else(|e| {
                FileOperationResult::failure(Some(path), Some(crate::files::STREAM_DESTINATION), e)
            })
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> FileOperationResult {
        self.scoped(self.engine.delete(path, cancel))
            .await
            .unwrap_or_else(|e| FileOperationResult::failure(Some(path), None, e))
    }
}
