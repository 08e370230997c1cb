//! Content hashing and post-write verification.

use md5::{Digest, Md5};
use tracing::{debug, warn};

use super::store::RawStore;
use crate::config::StorageSettings;
use crate::errors::TransferError;

/// Suffix of the sidecar file holding a stored content hash.
pub const METADATA_SUFFIX: &str = ".md5";

/// Lowercase hex MD5 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Path of the sidecar hash file for `path`.
pub fn metadata_path(path: &str) -> String {
    format!("{path}{METADATA_SUFFIX}")
}

/// Verifies that bytes on the backend match the bytes the caller supplied.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityValidator {
    /// Re-read and hash every written file.
    pub verify_writes: bool,
    /// Delete a destination that failed verification.
    pub cleanup_on_failure: bool,
    /// Maintain and check `<file>.md5` sidecars.
    pub use_metadata_hash: bool,
}

impl IntegrityValidator {
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self {
            verify_writes: settings.validate_integrity,
            cleanup_on_failure: settings.cleanup_on_failure,
            use_metadata_hash: settings.write_metadata_hash,
        }
    }

    /// Store `hash` in the sidecar of `path` when sidecars are enabled.
    pub fn write_metadata(
        &self,
        store: &dyn RawStore,
        path: &str,
        hash: &str,
    ) -> Result<(), TransferError> {
        if self.use_metadata_hash {
            store.write(&metadata_path(path), hash.as_bytes())?;
        }
        Ok(())
    }

    /// Re-read `path` and compare its hash (and sidecar) against `expected`.
    ///
    /// On an integrity failure the destination is removed when
    /// `cleanup_on_failure` is set. Removal errors are logged and dropped so
    /// the integrity error is what the caller sees.
    pub fn verify_written(
        &self,
        store: &dyn RawStore,
        path: &str,
        expected: &str,
    ) -> Result<(), TransferError> {
        if !self.verify_writes {
            return Ok(());
        }

        let result = self.check_written(store, path, expected);
        match &result {
            Err(TransferError::IntegrityMismatch { .. })
            | Err(TransferError::MetadataMismatch { .. })
                if self.cleanup_on_failure =>
            {
                self.discard(store, path);
            }
            Ok(()) => debug!(path, hash = expected, "integrity verified"),
            _ => {}
        }
        result
    }

    /// Hash downloaded `data` and check it against the sidecar of `path`.
    pub fn verify_downloaded(
        &self,
        store: &dyn RawStore,
        path: &str,
        data: &[u8],
    ) -> Result<String, TransferError> {
        let hash = content_hash(data);
        self.check_metadata(store, path, &hash)?;
        Ok(hash)
    }

    fn check_written(
        &self,
        store: &dyn RawStore,
        path: &str,
        expected: &str,
    ) -> Result<(), TransferError> {
        let written = store.read(path)?;
        let actual = content_hash(&written);
        if actual != expected {
            return Err(TransferError::IntegrityMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        self.check_metadata(store, path, expected)
    }

    fn check_metadata(
        &self,
        store: &dyn RawStore,
        path: &str,
        expected: &str,
    ) -> Result<(), TransferError> {
        if !self.use_metadata_hash {
            return Ok(());
        }
        let sidecar = metadata_path(path);
        if !store.file_exists(&sidecar)? {
            return Ok(());
        }
        let stored = String::from_utf8_lossy(&store.read(&sidecar)?)
            .trim()
            .to_ascii_lowercase();
        if stored != expected {
            return Err(TransferError::MetadataMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                actual: stored,
            });
        }
        Ok(())
    }

    fn discard(&self, store: &dyn RawStore, path: &str) {
        warn!(path, "removing file that failed integrity verification");
        if let Err(e) = store.remove_file(path) {
            warn!(path, error = %e, "failed to remove corrupted file");
        }
        if self.use_metadata_hash {
            let _ = store.remove_file(&metadata_path(path));
        }
    }
}
