//! Blocking storage primitives shared by every backend.
//!
//! A backend exposes its filesystem as a [`RawStore`]: a handful of
//! synchronous, absolute-path operations. The naming, integrity and transfer
//! logic is written once against this trait. A [`StoreHandle`] is the
//! cloneable, thread-safe way to reach a store from a blocking task.

use crate::errors::TransferError;

/// Synchronous file primitives over absolute, `/`-separated paths.
pub trait RawStore {
    /// `true` if `path` exists and is not a directory.
    fn file_exists(&self, path: &str) -> Result<bool, TransferError>;

    /// `true` if `path` exists and is a directory.
    fn dir_exists(&self, path: &str) -> Result<bool, TransferError>;

    /// Create a single directory whose parent already exists.
    fn create_dir(&self, path: &str) -> Result<(), TransferError>;

    /// Create `path` and any missing parents, one segment at a time.
    ///
    /// Segments that already exist (or appear concurrently) are tolerated.
    fn create_dir_all(&self, path: &str) -> Result<(), TransferError> {
        let mut current = String::new();
        if path.starts_with('/') {
            current.push('/');
        }
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(segment);

            if self.dir_exists(&current)? {
                continue;
            }
            if let Err(e) = self.create_dir(&current) {
                if !self.dir_exists(&current)? {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Read a whole file into memory.
    fn read(&self, path: &str) -> Result<Vec<u8>, TransferError>;

    /// Create or truncate `path` and write `data` to it.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), TransferError>;

    /// Remove a file.
    fn remove_file(&self, path: &str) -> Result<(), TransferError>;
}

/// Cloneable access to a [`RawStore`] from blocking worker threads.
pub trait StoreHandle: Clone + Send + Sync + 'static {
    /// Run `f` against the store. Blocks the calling thread.
    fn with_store<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&dyn RawStore) -> Result<T, TransferError>;
}

/// Run `f` against `handle`'s store on the blocking thread pool.
pub(crate) async fn run_blocking<H, T, F>(handle: &H, f: F) -> Result<T, TransferError>
where
    H: StoreHandle,
    T: Send + 'static,
    F: FnOnce(&dyn RawStore) -> Result<T, TransferError> + Send + 'static,
{
    let handle = handle.clone();
    tokio::task::spawn_blocking(move || handle.with_store(f))
        .await
        .map_err(|e| TransferError::OperationFailed(format!("Task join failed: {e}")))?
}

/// Join non-empty path segments with `/`, trimming stray separators.
pub fn join_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches(|c: char| c == '/' || c == '\\'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a root-relative path against `root`.
pub fn join_path(root: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches(|c: char| c == '/' || c == '\\');
    if relative.is_empty() {
        return root.to_string();
    }
    if root.is_empty() {
        return relative.to_string();
    }
    format!("{}/{}", root.trim_end_matches(|c: char| c == '/' || c == '\\'), relative)
}
