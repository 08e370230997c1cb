//! Unified error types for the filexfer core crate.
//!
//! [`TransferError`] is the taxonomy every backend reports through. Public
//! transfer operations fold it into a
//! [`FileOperationResult`](crate::files::FileOperationResult); only the retry
//! layer hands it back to its immediate caller as an `Err`.

use thiserror::Error;

/// Top-level error type encompassing all core error categories.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A file-transfer error.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// A configuration error (invalid values, missing fields, parse failures).
    #[error("Config error: {0}")]
    Config(String),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by naming, integrity, retry and backend operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The caller supplied an unusable argument (e.g. an empty file name).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A literal-named file already exists and neither overwrite nor
    /// sequencing was allowed.
    #[error("File already exists: {0}")]
    DuplicateFile(String),

    /// The bytes read back after a write do not hash to the source hash.
    #[error("Integrity check failed for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// The stored sidecar hash disagrees with the content hash.
    #[error("Metadata hash mismatch for {path}: expected {expected}, stored {actual}")]
    MetadataMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Every retry attempt failed; wraps the last failure.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<TransferError>,
    },

    /// The requested file or directory was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Permission was denied for the requested operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The remote session could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A transient transport failure on an open remote session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// A file operation failed for a reason that fits no other category.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// This is the default predicate used by
    /// [`RetryExecutor`](crate::retry::RetryExecutor).
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            TransferError::Transport(_) => true,
            TransferError::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::WouldBlock
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Map an `std::io::Error` for `path` to the matching variant.
    pub fn from_io(e: std::io::Error, path: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => TransferError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                TransferError::PermissionDenied(path.to_string())
            }
            _ => TransferError::Io(e),
        }
    }
}
