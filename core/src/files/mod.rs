//! Backend-agnostic file transfer contract.
//!
//! [`FileSystemOperations`] is implemented once for local disk
//! ([`LocalFileSystem`](local::LocalFileSystem)) and once for SFTP
//! (`SftpFileSystem`, behind the `sftp` feature). Both compose the same
//! collaborators: [`NamingResolver`](naming::NamingResolver),
//! [`IntegrityValidator`](integrity::IntegrityValidator) and
//! [`RetryExecutor`](crate::retry::RetryExecutor).

pub mod integrity;
pub mod local;
pub mod naming;
pub mod store;
pub(crate) mod transfer;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::config::StorageSettings;
use crate::errors::TransferError;
use naming::{NamingPolicy, NamingRule};

/// Destination label reported by [`FileSystemOperations::download_to_stream`].
pub const STREAM_DESTINATION: &str = "<stream>";

/// Details of a successfully uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedInfo {
    /// Lowercase hex MD5 of the stored bytes.
    pub hash: String,
    pub original_file_name: String,
    pub resolved_file_name: String,
    /// Path below the backend root.
    pub relative_path: String,
    pub absolute_path: String,
    pub size_bytes: u64,
    /// Human readable size, e.g. `"1.50 KB"`.
    pub formatted_size: String,
}

/// Terminal value of every public transfer operation.
///
/// Built only through its constructors, which keep two invariants: a
/// successful result always names the path it acted on, and a failed result
/// always carries an error message and never a hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationResult {
    success: bool,
    source_path: Option<String>,
    dest_path: Option<String>,
    size_bytes: Option<u64>,
    hash: Option<String>,
    error_message: Option<String>,
    #[serde(skip)]
    error: Option<TransferError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uploaded: Option<UploadedInfo>,
}

impl FileOperationResult {
    /// A completed upload.
    pub fn uploaded(info: UploadedInfo) -> Self {
        Self {
            success: true,
            source_path: Some(info.original_file_name.clone()),
            dest_path: Some(info.relative_path.clone()),
            size_bytes: Some(info.size_bytes),
            hash: Some(info.hash.clone()),
            error_message: None,
            error: None,
            uploaded: Some(info),
        }
    }

    /// A completed transfer from `source` to `dest`.
    pub fn transferred(source: &str, dest: &str, size_bytes: u64, hash: Option<String>) -> Self {
        Self {
            success: true,
            source_path: Some(source.to_string()),
            dest_path: Some(dest.to_string()),
            size_bytes: Some(size_bytes),
            hash,
            error_message: None,
            error: None,
            uploaded: None,
        }
    }

    /// A completed operation on a single path (delete, probe).
    pub fn completed(source: &str) -> Self {
        Self {
            success: true,
            source_path: Some(source.to_string()),
            dest_path: None,
            size_bytes: None,
            hash: None,
            error_message: None,
            error: None,
            uploaded: None,
        }
    }

    /// A failed operation.
    pub fn failure(source: Option<&str>, dest: Option<&str>, error: TransferError) -> Self {
        Self {
            success: false,
            source_path: source.map(str::to_string),
            dest_path: dest.map(str::to_string),
            size_bytes: None,
            hash: None,
            error_message: Some(error.to_string()),
            error: Some(error),
            uploaded: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn dest_path(&self) -> Option<&str> {
        self.dest_path.as_deref()
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error(&self) -> Option<&TransferError> {
        self.error.as_ref()
    }

    /// Upload details, present only on successful uploads.
    pub fn uploaded_info(&self) -> Option<&UploadedInfo> {
        self.uploaded.as_ref()
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Self, TransferError> {
        if self.success {
            return Ok(self);
        }
        Err(self.error.unwrap_or_else(|| {
            TransferError::OperationFailed(self.error_message.unwrap_or_default())
        }))
    }
}

/// Per-call upload options. Unset fields fall back to the backend's
/// [`StorageSettings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    /// Top-level directory below the backend root.
    pub container: String,
    /// Optional sub-path below the container.
    pub dest_path: Option<String>,
    pub naming_rule: Option<NamingRule>,
    pub overwrite: Option<bool>,
    pub use_sequenced_name: Option<bool>,
}

impl UploadOptions {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Default::default()
        }
    }

    pub fn with_dest_path(mut self, dest_path: impl Into<String>) -> Self {
        self.dest_path = Some(dest_path.into());
        self
    }

    pub fn with_naming_rule(mut self, rule: NamingRule) -> Self {
        self.naming_rule = Some(rule);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn with_sequenced_name(mut self, use_sequenced_name: bool) -> Self {
        self.use_sequenced_name = Some(use_sequenced_name);
        self
    }

    pub(crate) fn policy(&self, settings: &StorageSettings) -> NamingPolicy {
        NamingPolicy {
            rule: self.naming_rule.unwrap_or(settings.naming_rule),
            overwrite: self.overwrite.unwrap_or(settings.overwrite),
            use_sequenced_name: self.use_sequenced_name.unwrap_or(settings.use_sequenced_name),
        }
    }

    /// Directory the file lands in, relative to the backend root.
    pub(crate) fn directory(&self) -> String {
        store::join_segments(&[&self.container, self.dest_path.as_deref().unwrap_or("")])
    }
}

/// Per-call download options for the local destination file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub overwrite: Option<bool>,
    pub use_sequenced_name: Option<bool>,
}

impl DownloadOptions {
    pub fn overwriting() -> Self {
        Self {
            overwrite: Some(true),
            use_sequenced_name: None,
        }
    }

    pub(crate) fn policy(&self, settings: &StorageSettings) -> NamingPolicy {
        NamingPolicy::literal(
            self.overwrite.unwrap_or(settings.overwrite),
            self.use_sequenced_name.unwrap_or(settings.use_sequenced_name),
        )
    }
}

/// Operations every storage backend provides.
///
/// Paths are relative to the backend root. Probes never fail: connectivity
/// or permission problems are logged and reported as `false`. Transfers
/// never return `Err`; every failure is folded into a
/// [`FileOperationResult`].
#[async_trait::async_trait]
pub trait FileSystemOperations: Send + Sync {
    /// Root every relative path is resolved against.
    fn root(&self) -> &str;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> bool;

    /// Whether a directory exists at `path`.
    async fn directory_exists(&self, path: &str) -> bool;

    /// Create `path` and missing parents. Existing directories are fine.
    async fn create_directory_if_not_exists(&self, path: &str) -> Result<(), TransferError>;

    /// Remove the file at `path` if present. Returns whether a file was removed.
    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, TransferError>;

    /// Buffer `source`, name it per `options`, write and verify it.
    async fn upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        file_name: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult;

    /// Copy the file at `path` to the local file `destination`.
    async fn download(
        &self,
        path: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> FileOperationResult;

    /// Copy the file at `path` into a caller-owned stream.
    async fn download_to_stream(
        &self,
        path: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> FileOperationResult;

    /// Delete the file at `path`. A missing file counts as success.
    async fn delete(&self, path: &str, cancel: &CancellationToken) -> FileOperationResult;
}

/// Format a byte count with binary units and two decimals.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
