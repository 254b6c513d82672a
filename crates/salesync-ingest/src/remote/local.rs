//! Mounted-directory backend
//!
//! Treats a local directory as the remote drop location. Used for shares
//! mounted on the host and by the integration tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{prepare_local_file, RemoteConnector, RemoteFileDescriptor, RemoteFileSystem};
use crate::error::{IngestError, IngestResult};

pub struct LocalDirConnector {
    root: PathBuf,
}

impl LocalDirConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl RemoteConnector for LocalDirConnector {
    async fn connect(&self) -> IngestResult<Box<dyn RemoteFileSystem>> {
        let remote = LocalDirRemote::open(&self.root).await?;
        Ok(Box::new(remote))
    }
}

pub struct LocalDirRemote {
    root: PathBuf,
}

impl LocalDirRemote {
    /// Open `root`, failing if it is not a readable directory
    pub async fn open(root: impl AsRef<Path>) -> IngestResult<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| IngestError::Connectivity {
                target: "remote directory",
                message: format!("{}: {}", root.display(), e),
            })?;
        if !metadata.is_dir() {
            return Err(IngestError::Connectivity {
                target: "remote directory",
                message: format!("{} is not a directory", root.display()),
            });
        }
        Ok(Self { root })
    }
}

#[async_trait]
impl RemoteFileSystem for LocalDirRemote {
    async fn list(&self) -> IngestResult<Vec<RemoteFileDescriptor>> {
        let listing_error = |e: std::io::Error| IngestError::Listing {
            path: self.root.display().to_string(),
            message: e.to_string(),
        };

        let mut dir = tokio::fs::read_dir(&self.root).await.map_err(listing_error)?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(listing_error)? {
            let metadata = entry.metadata().await.map_err(listing_error)?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(listing_error)?;
            entries.push(RemoteFileDescriptor {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: DateTime::<Utc>::from(modified),
                size: metadata.len(),
            });
        }

        debug!(path = %self.root.display(), files = entries.len(), "Listed local directory");
        Ok(entries)
    }

    fn remote_path(&self, filename: &str) -> String {
        self.root.join(filename).display().to_string()
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> IngestResult<u64> {
        let transfer_error = |e: std::io::Error| IngestError::Transfer {
            path: remote_path.to_string(),
            message: e.to_string(),
        };

        let mut source = tokio::fs::File::open(remote_path)
            .await
            .map_err(transfer_error)?;
        let target = prepare_local_file(local_path).map_err(transfer_error)?;
        let mut target = tokio::fs::File::from_std(target);
        let bytes = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(transfer_error)?;
        tokio::io::AsyncWriteExt::flush(&mut target)
            .await
            .map_err(transfer_error)?;

        debug!("Copied {} ({} bytes) to {}", remote_path, bytes, local_path.display());
        Ok(bytes)
    }

    async fn close(&self) -> IngestResult<()> {
        Ok(())
    }
}
