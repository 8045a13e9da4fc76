use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use bytes::Bytes;
use catalog_core::OutputPath;
use catalog_logging::catalog_debug;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::fetch::map_reqwest_error;
use crate::{AtomicFileWriter, FailureKind, FetchError, FetchSettings, PageFetcher, PersistError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Where the crawl writes manifests and downloaded files.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn save_text(
        &self,
        path: &OutputPath,
        content: &str,
        overwrite: bool,
    ) -> Result<PathBuf, PersistError>;

    /// Fetches `url` into `path`; an existing file is never replaced.
    async fn download(&self, url: &str, path: &OutputPath) -> Result<PathBuf, DownloadError>;
}

/// Filesystem storage rooted at the output directory.
pub struct FsStorage {
    writer: AtomicFileWriter,
    client: reqwest::Client,
    max_download_bytes: u64,
}

impl FsStorage {
    pub fn new(root: PathBuf, settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = PageFetcher::build_client(settings, Arc::new(AtomicUsize::new(0)))?;
        Ok(Self {
            writer: AtomicFileWriter::new(root),
            client,
            max_download_bytes: settings.max_download_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        self.writer.root()
    }
}

#[async_trait::async_trait]
impl Storage for FsStorage {
    async fn save_text(
        &self,
        path: &OutputPath,
        content: &str,
        overwrite: bool,
    ) -> Result<PathBuf, PersistError> {
        let writer = self.writer.clone();
        let path = path.clone();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || writer.write(&path, &content, overwrite))
            .await
            .map_err(|err| PersistError::Io(io::Error::other(err)))?
    }

    async fn download(&self, url: &str, path: &OutputPath) -> Result<PathBuf, DownloadError> {
        let target = self.writer.resolve(path)?;
        let dir = target
            .parent()
            .ok_or_else(|| PersistError::InvalidPath(path.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            )
            .into());
        }
        if let Some(content_len) = response.content_length() {
            if content_len > self.max_download_bytes {
                return Err(too_large(self.max_download_bytes, content_len).into());
            }
        }

        // The temp file lives next to the target and is removed on any early return.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone()?);
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(map_reqwest_error)?;
            written += chunk.len() as u64;
            if written > self.max_download_bytes {
                return Err(too_large(self.max_download_bytes, written).into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        loop {
            let destination = unique_target(&target);
            match tmp.persist_noclobber(&destination) {
                Ok(_) => {
                    catalog_debug!("Saved {} ({} bytes) to {:?}", url, written, destination);
                    return Ok(destination);
                }
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => tmp = err.file,
                Err(err) => return Err(err.error.into()),
            }
        }
    }
}

/// First free name among `name.ext`, `name (1).ext`, `name (2).ext`, …
pub fn unique_target(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|n| target.with_file_name(format!("{stem} ({n}){extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| target.to_path_buf())
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "download too large",
    )
}
