use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use catalog_core::OutputPath;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("refusing to write outside the output root: {0}")]
    InvalidPath(String),
    #[error("{0} exists and overwrite was not requested")]
    AlreadyExists(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Atomically writes files under a root directory: temp file in the target
/// folder, then rename.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    root: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `path` under the root.
    pub fn resolve(&self, path: &OutputPath) -> Result<PathBuf, PersistError> {
        let segments = path.segments();
        if segments.is_empty()
            || segments
                .iter()
                .any(|s| s.is_empty() || s == "." || s == ".." || s.contains(['/', '\\']))
        {
            return Err(PersistError::InvalidPath(path.to_string()));
        }
        Ok(segments.iter().fold(self.root.clone(), |acc, s| acc.join(s)))
    }

    pub fn write(
        &self,
        path: &OutputPath,
        content: &str,
        overwrite: bool,
    ) -> Result<PathBuf, PersistError> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .ok_or_else(|| PersistError::InvalidPath(path.to_string()))?;
        ensure_output_dir(dir)?;

        if target.exists() && !overwrite {
            return Err(PersistError::AlreadyExists(path.to_string()));
        }

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // Replace existing file if present to keep determinism.
        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
