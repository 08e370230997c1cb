//! [`RawStore`] over an open SFTP channel.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::connection::with_live_connection;
use crate::errors::TransferError;
use crate::files::store::{RawStore, StoreHandle};

use super::connection::SftpConnection;

// SSH_FX_* status codes from the SFTP draft.
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_FAILURE: i32 = 4;
const FX_NO_CONNECTION: i32 = 6;
const FX_CONNECTION_LOST: i32 = 7;
const FX_NO_SUCH_PATH: i32 = 10;

/// Map a libssh2 error on `path` to a transfer error.
pub(crate) fn map_sftp_error(e: ssh2::Error, path: &str) -> TransferError {
    match e.code() {
        ssh2::ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => {
            TransferError::NotFound(path.to_string())
        }
        ssh2::ErrorCode::SFTP(FX_PERMISSION_DENIED) => {
            TransferError::PermissionDenied(path.to_string())
        }
        ssh2::ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST) | ssh2::ErrorCode::Session(_) => {
            TransferError::Transport(format!("{path}: {e}"))
        }
        ssh2::ErrorCode::SFTP(_) => TransferError::OperationFailed(format!("{path}: {e}")),
    }
}

/// Byte-stream errors on an open remote file travel over the session.
fn map_stream_error(e: std::io::Error, path: &str) -> TransferError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            TransferError::from_io(e, path)
        }
        _ => TransferError::Transport(format!("{path}: {e}")),
    }
}

/// Blocking primitives against one SFTP channel.
pub struct SftpStore<'a> {
    sftp: &'a ssh2::Sftp,
    buffer_size: usize,
}

impl<'a> SftpStore<'a> {
    pub fn new(sftp: &'a ssh2::Sftp, buffer_size: usize) -> Self {
        Self {
            sftp,
            buffer_size: buffer_size.max(1),
        }
    }

    fn stat(&self, path: &str) -> Result<Option<ssh2::FileStat>, TransferError> {
        match self.sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(stat)),
            Err(e) => match map_sftp_error(e, path) {
                TransferError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }
}

impl RawStore for SftpStore<'_> {
    fn file_exists(&self, path: &str) -> Result<bool, TransferError> {
        Ok(self.stat(path)?.is_some_and(|stat| !stat.is_dir()))
    }

    fn dir_exists(&self, path: &str) -> Result<bool, TransferError> {
        Ok(self.stat(path)?.is_some_and(|stat| stat.is_dir()))
    }

    fn create_dir(&self, path: &str) -> Result<(), TransferError> {
        match self.sftp.mkdir(Path::new(path), 0o755) {
            Ok(()) => Ok(()),
            // Servers report an existing directory as a generic failure.
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(FX_FAILURE) && self.dir_exists(path)? => {
                Ok(())
            }
            Err(e) => Err(map_sftp_error(e, path)),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, TransferError> {
        let mut file = self
            .sftp
            .open(Path::new(path))
            .map_err(|e| map_sftp_error(e, path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| map_stream_error(e, path))?;
        Ok(data)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), TransferError> {
        let mut file = self
            .sftp
            .create(Path::new(path))
            .map_err(|e| map_sftp_error(e, path))?;
        for chunk in data.chunks(self.buffer_size) {
            file.write_all(chunk)
                .map_err(|e| map_stream_error(e, path))?;
        }
        file.flush().map_err(|e| map_stream_error(e, path))
    }

    fn remove_file(&self, path: &str) -> Result<(), TransferError> {
        self.sftp
            .unlink(Path::new(path))
            .map_err(|e| map_sftp_error(e, path))
    }
}

/// [`StoreHandle`] that borrows the shared connection for each call.
#[derive(Clone)]
pub struct SftpHandle {
    connection: Arc<Mutex<SftpConnection>>,
    buffer_size: usize,
}

impl SftpHandle {
    pub fn new(connection: Arc<Mutex<SftpConnection>>, buffer_size: usize) -> Self {
        Self {
            connection,
            buffer_size,
        }
    }
}

impl StoreHandle for SftpHandle {
    fn with_store<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&dyn RawStore) -> Result<T, TransferError>,
    {
        with_live_connection(&*self.connection, |connection| {
            let sftp = connection.sftp().ok_or_else(|| {
                TransferError::ConnectionFailed("SFTP connection is not open".to_string())
            })?;
            f(&SftpStore::new(sftp, self.buffer_size))
        })
    }
}
