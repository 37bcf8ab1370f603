//! Persistence of the ban list.
//!
//! The store holds the serialized committed mapping only. A missing or
//! unreadable-by-permission state file is treated as an empty ban list, any
//! other failure propagates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::state::State;

/// Filesystem operations used by [`FileStateStore`], mockable in tests.
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Replace the file contents in one step (tempfile in the same directory, then rename).
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Production implementation backed by std::fs and tempfile.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(contents)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Load and save the persisted ban list
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the committed mapping; an absent object yields an empty state.
    async fn fetch_state(&self) -> Result<State>;

    /// Replace the stored mapping with the state's committed entries.
    async fn upload(&self, state: &State) -> Result<()>;
}

/// State store backed by a single JSON file
pub struct FileStateStore<F: FileSystem = RealFileSystem> {
    path: PathBuf,
    fs: F,
}

impl FileStateStore<RealFileSystem> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, RealFileSystem)
    }
}

impl<F: FileSystem> FileStateStore<F> {
    pub fn with_fs(path: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<F: FileSystem> StateStore for FileStateStore<F> {
    async fn fetch_state(&self) -> Result<State> {
        let content = match self.fs.read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!("No state at {:?} ({}), starting empty", self.path, e);
                return Ok(State::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read state file: {:?}", self.path))
            }
        };

        if content.trim().is_empty() {
            return Ok(State::default());
        }

        let state = State::from_json(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", self.path))?;
        debug!("Loaded {} entries from {:?}", state.len(), self.path);
        Ok(state)
    }

    async fn upload(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }

        let json = state.to_json().context("Failed to serialize state")?;
        self.fs
            .write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write state file: {:?}", self.path))?;

        info!("Saved {} entries to {:?}", state.len(), self.path);
        Ok(())
    }
}
