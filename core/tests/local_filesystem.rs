//! Local backend integration tests.
//!
//! Every test works in its own temporary root.

mod common;

use std::path::Path;

use filexfer_core::config::StorageSettings;
use filexfer_core::files::integrity::content_hash;
use filexfer_core::files::naming::NamingRule;
use filexfer_core::{
    DownloadOptions, FileOperationResult, FileSystemOperations, LocalFileSystem, TransferError,
    UploadOptions,
};
use tokio_util::sync::CancellationToken;

fn backend(root: &Path) -> LocalFileSystem {
    LocalFileSystem::new(root, common::fast_settings())
}

async fn upload(
    fs: &dyn FileSystemOperations,
    content: &[u8],
    name: &str,
    options: &UploadOptions,
) -> FileOperationResult {
    let mut source = content;
    fs.upload(&mut source, name, options, &CancellationToken::new())
        .await
}

fn resolved_name(result: &FileOperationResult) -> &str {
    &result
        .uploaded_info()
        .expect("successful upload carries its details")
        .resolved_file_name
}

#[tokio::test]
async fn probes_on_absent_paths_are_false_and_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());

    for _ in 0..3 {
        assert!(!fs.exists("nothing/here.txt").await);
        assert!(!fs.directory_exists("nothing").await);
    }
}

#[tokio::test]
async fn directory_helpers_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());

    fs.create_directory_if_not_exists("c1/a/b").await.unwrap();
    fs.create_directory_if_not_exists("c1/a/b").await.unwrap();
    assert!(fs.directory_exists("c1/a/b").await);
    assert!(!fs.exists("c1/a/b").await);

    std::fs::write(dir.path().join("c1/a/b/f.txt"), b"x").unwrap();
    assert!(fs.delete_file_if_exists("c1/a/b/f.txt").await.unwrap());
    assert!(!fs.delete_file_if_exists("c1/a/b/f.txt").await.unwrap());
}

#[tokio::test]
async fn repeated_literal_uploads_are_sequenced() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let options = UploadOptions::new("container1");

    let expected = ["a.txt", "a[1].txt", "a[2].txt", "a[3].txt"];
    for (i, name) in expected.iter().enumerate() {
        let content = format!("version {i}");
        let result = upload(&fs, content.as_bytes(), "a.txt", &options).await;
        assert!(result.is_success(), "{:?}", result.error_message());
        assert_eq!(resolved_name(&result), *name);
        assert_eq!(result.dest_path(), Some(format!("container1/{name}").as_str()));
    }

    for (i, name) in expected.iter().enumerate() {
        let stored = std::fs::read(dir.path().join("container1").join(name)).unwrap();
        assert_eq!(stored, format!("version {i}").as_bytes());
    }
}

#[tokio::test]
async fn overwrite_replaces_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let options = UploadOptions::new("c1").with_overwrite(true);

    for content in [&b"first"[..], b"second, longer", b"3"] {
        let result = upload(&fs, content, "report.csv", &options).await;
        assert!(result.is_success());
        assert_eq!(resolved_name(&result), "report.csv");
        assert_eq!(std::fs::read(dir.path().join("c1/report.csv")).unwrap(), content);
    }
}

#[tokio::test]
async fn duplicate_is_rejected_and_original_kept() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let options = UploadOptions::new("c1")
        .with_overwrite(false)
        .with_sequenced_name(false);

    assert!(upload(&fs, b"original", "a.txt", &options).await.is_success());
    let result = upload(&fs, b"intruder", "a.txt", &options).await;

    assert!(!result.is_success());
    assert!(matches!(result.error(), Some(TransferError::DuplicateFile(_))));
    assert!(result.hash().is_none());
    assert_eq!(std::fs::read(dir.path().join("c1/a.txt")).unwrap(), b"original");
}

#[tokio::test]
async fn empty_and_large_payloads_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let cancel = CancellationToken::new();

    let large = common::patterned_bytes(10 * 1024 * 1024 + 17);
    for (name, content) in [("empty.bin", Vec::new()), ("large.bin", large)] {
        let result = upload(&fs, &content, name, &UploadOptions::new("blobs")).await;
        assert!(result.is_success(), "{:?}", result.error_message());
        let uploaded_hash = result.hash().unwrap().to_string();
        assert_eq!(result.size_bytes(), Some(content.len() as u64));

        let destination = out.path().join(name);
        let download = fs
            .download(
                result.dest_path().unwrap(),
                &destination,
                &DownloadOptions::default(),
                &cancel,
            )
            .await;
        assert!(download.is_success(), "{:?}", download.error_message());

        let downloaded = std::fs::read(&destination).unwrap();
        assert_eq!(downloaded, content);
        assert_eq!(content_hash(&downloaded), uploaded_hash);
        assert_eq!(download.hash(), Some(uploaded_hash.as_str()));
    }
}

#[tokio::test]
async fn content_hash_naming_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let options = UploadOptions::new("c1").with_naming_rule(NamingRule::ContentHash);

    let first = upload(&fs, b"test", "note.txt", &options).await;
    let second = upload(&fs, b"test", "note.txt", &options).await;

    assert!(first.is_success() && second.is_success());
    assert_eq!(resolved_name(&first), resolved_name(&second));
    assert_eq!(
        resolved_name(&first),
        "note-098f6bcd4621d373cade4e832627b4f6.txt"
    );
}

#[tokio::test]
async fn random_id_names_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let options = UploadOptions::new("c1").with_naming_rule(NamingRule::RandomId);

    let first = upload(&fs, b"same", "photo.jpg", &options).await;
    let second = upload(&fs, b"same", "photo.jpg", &options).await;
    assert_ne!(resolved_name(&first), resolved_name(&second));
    assert!(resolved_name(&first).ends_with(".jpg"));
}

#[tokio::test]
async fn download_of_missing_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());

    let result = fs
        .download(
            "missing.txt",
            &dir.path().join("out.txt"),
            &DownloadOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.is_success());
    let message = result.error_message().unwrap().to_lowercase();
    assert!(message.contains("not found"), "{message}");
    assert!(!dir.path().join("out.txt").exists());
}

#[tokio::test]
async fn download_respects_local_collision_policy() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let cancel = CancellationToken::new();
    assert!(upload(&fs, b"remote", "a.txt", &UploadOptions::new("c1")).await.is_success());

    let destination = out.path().join("a.txt");
    std::fs::write(&destination, b"local").unwrap();

    let result = fs
        .download("c1/a.txt", &destination, &DownloadOptions::default(), &cancel)
        .await;
    assert!(result.is_success());
    assert_eq!(std::fs::read(&destination).unwrap(), b"local");
    assert_eq!(std::fs::read(out.path().join("a[1].txt")).unwrap(), b"remote");

    let result = fs
        .download("c1/a.txt", &destination, &DownloadOptions::overwriting(), &cancel)
        .await;
    assert!(result.is_success());
    assert_eq!(std::fs::read(&destination).unwrap(), b"remote");
}

#[tokio::test]
async fn download_to_stream_writes_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    assert!(upload(&fs, b"streamed", "s.txt", &UploadOptions::new("c1")).await.is_success());

    let mut sink: Vec<u8> = Vec::new();
    let result = fs
        .download_to_stream("c1/s.txt", &mut sink, &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(sink, b"streamed");
    assert_eq!(result.hash(), Some(content_hash(b"streamed").as_str()));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let cancel = CancellationToken::new();
    assert!(upload(&fs, b"x", "d.txt", &UploadOptions::new("c1")).await.is_success());

    assert!(fs.delete("c1/d.txt", &cancel).await.is_success());
    assert!(!fs.exists("c1/d.txt").await);
    assert!(fs.delete("c1/d.txt", &cancel).await.is_success());
}

#[tokio::test]
async fn cancelled_token_aborts_upload() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backend(dir.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut source: &[u8] = b"never written";
    let result = fs
        .upload(&mut source, "c.txt", &UploadOptions::new("c1"), &cancel)
        .await;

    assert!(!result.is_success());
    assert!(matches!(result.error(), Some(TransferError::Cancelled)));
    assert!(!dir.path().join("c1/c.txt").exists());
}

#[tokio::test]
async fn metadata_sidecar_follows_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings {
        write_metadata_hash: true,
        ..common::fast_settings()
    };
    let fs = LocalFileSystem::new(dir.path(), settings);
    let cancel = CancellationToken::new();

    let result = upload(&fs, b"test", "m.txt", &UploadOptions::new("c1")).await;
    assert!(result.is_success());
    let sidecar = dir.path().join("c1/m.txt.md5");
    assert_eq!(
        std::fs::read_to_string(&sidecar).unwrap(),
        "098f6bcd4621d373cade4e832627b4f6"
    );

    std::fs::write(dir.path().join("c1/m.txt"), b"tampered").unwrap();
    let mut sink: Vec<u8> = Vec::new();
    let tampered = fs.download_to_stream("c1/m.txt", &mut sink, &cancel).await;
    assert!(matches!(
        tampered.error(),
        Some(TransferError::MetadataMismatch { .. })
    ));

    assert!(fs.delete("c1/m.txt", &cancel).await.is_success());
    assert!(!sidecar.exists());
}

#[tokio::test]
async fn backends_are_usable_as_trait_objects() {
    let dir = tempfile::tempdir().unwrap();
    let fs: Box<dyn FileSystemOperations> = Box::new(backend(dir.path()));

    let result = upload(fs.as_ref(), b"boxed", "b.txt", &UploadOptions::new("c1")).await;
    assert!(result.is_success());
    assert!(fs.exists("c1/b.txt").await);
    assert_eq!(fs.root(), dir.path().to_string_lossy().replace('\\', "/"));
}
