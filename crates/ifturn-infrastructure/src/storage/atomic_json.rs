//! Atomic JSON file operations.
//!
//! Writes go to a temporary file in the same directory, are fsynced, and are
//! then renamed over the target, so readers only ever see the old or the new
//! content.

use ifturn_core::TurnError;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during atomic JSON operations.
#[derive(Debug, Error)]
pub enum AtomicJsonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<AtomicJsonError> for TurnError {
    fn from(err: AtomicJsonError) -> Self {
        match err {
            AtomicJsonError::Io(e) => TurnError::from(e),
            other => TurnError::io(other.to_string()),
        }
    }
}

/// A handle to a JSON file that is only ever replaced atomically.
pub struct AtomicJsonFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: loaded
    /// - `Ok(None)`: the file does not exist or is empty
    /// - `Err`: the file could not be read or parsed
    pub fn load(&self) -> Result<Option<T>, AtomicJsonError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Serializes `data` and atomically replaces the file with it.
    pub fn save(&self, data: &T) -> Result<(), AtomicJsonError> {
        let json = serde_json::to_vec_pretty(data)?;
        write_atomic(&self.path, &json)
    }
}

/// Atomically replaces `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AtomicJsonError> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path)?;
    let result = write_then_rename(&tmp_path, path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<(), AtomicJsonError> {
    let mut tmp_file = File::create(tmp_path)?;
    tmp_file.write_all(bytes)?;
    tmp_file.sync_all()?;
    drop(tmp_file);
    fs::rename(tmp_path, path)?;
    sync_parent(path);
    Ok(())
}

/// The temporary sibling a write to `path` goes through.
pub fn temp_path(path: &Path) -> Result<PathBuf, AtomicJsonError> {
    let invalid = |msg: &str| {
        AtomicJsonError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg.to_string()))
    };
    let parent = path.parent().ok_or_else(|| invalid("Path has no parent directory"))?;
    let file_name = path.file_name().ok_or_else(|| invalid("Path has no file name"))?;
    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// Makes the rename itself durable. Best effort: not every platform can open directories.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    #[cfg(not(unix))]
    let _ = path;
}
