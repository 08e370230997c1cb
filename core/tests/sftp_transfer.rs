//! SFTP backend integration tests.
//!
//! Container: `sftp` on port 2222 (`tests/docker/docker-compose.yml`), user
//! `testuser` / `testpass` with a writable `/upload` directory. Override the
//! endpoint with `FILEXFER_SFTP_HOST` / `FILEXFER_SFTP_PORT`.
//!
//! Skips gracefully if the container is not running.

#![cfg(feature = "sftp")]

mod common;

use common::require_sftp;
use filexfer_core::config::SftpConfig;
use filexfer_core::connection::ConnectionStatus;
use filexfer_core::files::integrity::content_hash;
use filexfer_core::files::naming::NamingRule;
use filexfer_core::{
    DownloadOptions, FileOperationResult, FileSystemOperations, SftpFileSystem, TransferError,
    UploadOptions,
};
use tokio_util::sync::CancellationToken;

fn backend() -> SftpFileSystem {
    SftpFileSystem::new(common::sftp_config(), common::fast_settings())
}

async fn upload(
    fs: &SftpFileSystem,
    content: &[u8],
    name: &str,
    options: &UploadOptions,
) -> FileOperationResult {
    let mut source = content;
    fs.upload(&mut source, name, options, &CancellationToken::new())
        .await
}

async fn read_back(fs: &SftpFileSystem, path: &str) -> Vec<u8> {
    let mut sink = Vec::new();
    let result = fs
        .download_to_stream(path, &mut sink, &CancellationToken::new())
        .await;
    assert!(result.is_success(), "{:?}", result.error_message());
    sink
}

#[tokio::test]
async fn probes_on_absent_paths_are_false() {
    require_sftp!();
    let fs = backend();

    for _ in 0..2 {
        assert!(!fs.exists("no/such/file.txt").await);
        assert!(!fs.directory_exists("no/such/dir").await);
    }
    assert_eq!(fs.status(), Some(ConnectionStatus::Closed));
}

#[tokio::test]
async fn literal_uploads_are_sequenced() {
    require_sftp!();
    let fs = backend();
    let container = common::unique_container("seq");
    let options = UploadOptions::new(container.as_str());

    let first = upload(&fs, b"one", "a.txt", &options).await;
    let second = upload(&fs, b"two", "a.txt", &options).await;

    assert!(first.is_success(), "{:?}", first.error_message());
    assert!(second.is_success(), "{:?}", second.error_message());
    assert_eq!(first.uploaded_info().unwrap().resolved_file_name, "a.txt");
    assert_eq!(second.uploaded_info().unwrap().resolved_file_name, "a[1].txt");
    assert_eq!(read_back(&fs, &format!("{container}/a.txt")).await, b"one");
    assert_eq!(read_back(&fs, &format!("{container}/a[1].txt")).await, b"two");
}

#[tokio::test]
async fn duplicate_is_rejected() {
    require_sftp!();
    let fs = backend();
    let container = common::unique_container("dup");
    let options = UploadOptions::new(container.as_str()).with_sequenced_name(false);

    assert!(upload(&fs, b"keep", "a.txt", &options).await.is_success());
    let result = upload(&fs, b"drop", "a.txt", &options).await;

    assert!(matches!(result.error(), Some(TransferError::DuplicateFile(_))));
    assert_eq!(read_back(&fs, &format!("{container}/a.txt")).await, b"keep");
}

#[tokio::test]
async fn nested_upload_download_and_delete() {
    require_sftp!();
    let fs = backend();
    let container = common::unique_container("round");
    let out = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let content = common::patterned_bytes(3 * 1024 * 1024 + 5);

    let options = UploadOptions::new(container.as_str()).with_dest_path("2024/q1");
    let result = upload(&fs, &content, "data.bin", &options).await;
    assert!(result.is_success(), "{:?}", result.error_message());
    let path = result.dest_path().unwrap().to_string();
    assert_eq!(path, format!("{container}/2024/q1/data.bin"));
    assert!(fs.directory_exists(&format!("{container}/2024/q1")).await);

    let destination = out.path().join("data.bin");
    let download = fs
        .download(&path, &destination, &DownloadOptions::default(), &cancel)
        .await;
    assert!(download.is_success(), "{:?}", download.error_message());
    let downloaded = std::fs::read(&destination).unwrap();
    assert_eq!(downloaded, content);
    assert_eq!(Some(content_hash(&downloaded).as_str()), result.hash());

    assert!(fs.delete(&path, &cancel).await.is_success());
    assert!(!fs.exists(&path).await);
    assert!(fs.delete(&path, &cancel).await.is_success());
}

#[tokio::test]
async fn content_hash_naming_is_stable() {
    require_sftp!();
    let fs = backend();
    let options = UploadOptions::new(common::unique_container("hash"))
        .with_naming_rule(NamingRule::ContentHash);

    let first = upload(&fs, b"test", "note.txt", &options).await;
    let second = upload(&fs, b"test", "note.txt", &options).await;

    assert!(first.is_success() && second.is_success());
    assert_eq!(
        first.uploaded_info().unwrap().resolved_file_name,
        second.uploaded_info().unwrap().resolved_file_name
    );
}

#[tokio::test]
async fn missing_file_download_reports_not_found() {
    require_sftp!();
    let fs = backend();
    let out = tempfile::tempdir().unwrap();

    let result = fs
        .download(
            "missing.txt",
            &out.path().join("out.txt"),
            &DownloadOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.is_success());
    assert!(result
        .error_message()
        .unwrap()
        .to_lowercase()
        .contains("not found"));
}

#[tokio::test]
async fn preopened_session_serves_a_batch() {
    require_sftp!();
    let fs = backend();
    let container = common::unique_container("batch");
    let options = UploadOptions::new(container.as_str());

    fs.connect().await.unwrap();
    assert_eq!(fs.status(), Some(ConnectionStatus::Open));

    for name in ["a.txt", "b.txt", "c.txt"] {
        assert!(upload(&fs, name.as_bytes(), name, &options).await.is_success());
        // Scopes borrow the caller's session and leave it open.
        assert_eq!(fs.status(), Some(ConnectionStatus::Open));
    }
    assert!(fs.exists(&format!("{container}/b.txt")).await);

    fs.disconnect().await.unwrap();
    assert_eq!(fs.status(), Some(ConnectionStatus::Closed));
}

#[tokio::test]
async fn wrong_password_is_a_connection_failure() {
    require_sftp!();
    let fs = SftpFileSystem::new(
        SftpConfig {
            password: Some("not-the-password".to_string()),
            ..common::sftp_config()
        },
        common::fast_settings(),
    );

    let result = upload(&fs, b"x", "a.txt", &UploadOptions::new("c1")).await;
    assert!(matches!(
        result.error(),
        Some(TransferError::ConnectionFailed(_))
    ));
    assert_eq!(fs.status(), Some(ConnectionStatus::Closed));
}
