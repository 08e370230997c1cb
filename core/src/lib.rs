//! Backend-agnostic file transfer core.
//!
//! Uploads, downloads and deletes files on a local directory or an SFTP
//! server through one [`FileSystemOperations`] contract, with collision-safe
//! naming, MD5 integrity verification and retry with exponential backoff.

pub mod backends;
pub mod config;
pub mod connection;
pub mod errors;
pub mod files;
pub mod retry;

pub use config::{BackendConfig, StorageSettings, TransferConfig};
pub use errors::{CoreError, TransferError};
pub use files::local::LocalFileSystem;
pub use files::{
    DownloadOptions, FileOperationResult, FileSystemOperations, UploadOptions, UploadedInfo,
};
pub use retry::{RetryExecutor, RetryOptions};

#[cfg(feature = "sftp")]
pub use backends::ssh::SftpFileSystem;
