use std::fs;

use catalog_core::OutputPath;
use catalog_engine::{
    ensure_output_dir, unique_target, AtomicFileWriter, DownloadError, FailureKind, FetchSettings,
    FsStorage, PersistError, Storage,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manifest_path() -> OutputPath {
    OutputPath::new(["cameras", "Dome", "a", "files_a.txt"])
}

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_creates_nested_folders_and_replaces() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write(&manifest_path(), "placeholder", true).unwrap();
    assert_eq!(first, temp.path().join("cameras/Dome/a/files_a.txt"));
    assert_eq!(fs::read_to_string(&first).unwrap(), "placeholder");

    let second = writer.write(&manifest_path(), "doc.pdf -> x", true).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "doc.pdf -> x");
}

#[test]
fn write_without_overwrite_keeps_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    let target = writer.write(&manifest_path(), "first", false).unwrap();

    let result = writer.write(&manifest_path(), "second", false);
    assert!(matches!(result, Err(PersistError::AlreadyExists(_))));
    assert_eq!(fs::read_to_string(target).unwrap(), "first");
}

#[test]
fn traversal_segments_are_rejected() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("out"));
    let result = writer.write(&OutputPath::new(["..", "escape.txt"]), "x", true);
    assert!(matches!(result, Err(PersistError::InvalidPath(_))));
    assert!(!temp.path().join("escape.txt").exists());
}

#[test]
fn unique_target_counts_up_past_existing_files() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("manual.pdf");
    assert_eq!(unique_target(&target), target);

    fs::write(&target, "a").unwrap();
    fs::write(temp.path().join("manual (1).pdf"), "b").unwrap();
    assert_eq!(unique_target(&target), temp.path().join("manual (2).pdf"));

    let bare = temp.path().join("README");
    fs::write(&bare, "c").unwrap();
    assert_eq!(unique_target(&bare), temp.path().join("README (1)"));
}

#[tokio::test]
async fn save_text_goes_through_the_atomic_writer() {
    let temp = TempDir::new().unwrap();
    let storage = FsStorage::new(temp.path().to_path_buf(), &FetchSettings::default()).unwrap();

    let written = storage
        .save_text(&manifest_path(), "hello", true)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(written).unwrap(), "hello");
    assert_eq!(storage.root(), temp.path());
}

#[tokio::test]
async fn download_streams_body_and_never_overwrites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/manual.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let storage = FsStorage::new(temp.path().to_path_buf(), &FetchSettings::default()).unwrap();
    let url = format!("{}/files/manual.pdf", server.uri());
    let destination = OutputPath::new(["cameras", "Dome", "a", "manual.pdf"]);

    let first = storage.download(&url, &destination).await.unwrap();
    assert_eq!(first, temp.path().join("cameras/Dome/a/manual.pdf"));
    assert_eq!(fs::read(&first).unwrap(), b"%PDF-1.7");

    let second = storage.download(&url, &destination).await.unwrap();
    assert_eq!(second, temp.path().join("cameras/Dome/a/manual (1).pdf"));
    assert_eq!(fs::read(&first).unwrap(), b"%PDF-1.7");
}

#[tokio::test]
async fn failed_download_leaves_no_file_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let storage = FsStorage::new(temp.path().to_path_buf(), &FetchSettings::default()).unwrap();
    let url = format!("{}/files/missing.pdf", server.uri());
    let destination = OutputPath::new(["cameras", "missing.pdf"]);

    let err = storage.download(&url, &destination).await.unwrap_err();
    match err {
        DownloadError::Fetch(fetch) => assert_eq!(fetch.kind, FailureKind::HttpStatus(404)),
        other => panic!("unexpected error: {other}"),
    }
    let leftovers = fs::read_dir(temp.path().join("cameras")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn oversized_download_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/big.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "application/zip"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let settings = FetchSettings {
        max_download_bytes: 16,
        ..FetchSettings::default()
    };
    let storage = FsStorage::new(temp.path().to_path_buf(), &settings).unwrap();
    let url = format!("{}/files/big.zip", server.uri());

    let err = storage
        .download(&url, &OutputPath::new(["big.zip"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Fetch(ref fetch) if matches!(fetch.kind, FailureKind::TooLarge { .. })
    ));
    assert!(!temp.path().join("big.zip").exists());
}
