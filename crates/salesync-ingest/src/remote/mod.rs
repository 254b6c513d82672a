//! Remote file access
//!
//! - **locator**: newest-file-by-prefix selection
//! - **sftp**: SFTP backend (`ssh2`), password authentication
//! - **ftp**: FTP backend (`suppaftp`), one control connection per run
//! - **local**: mounted-directory backend
//!
//! A run obtains one [`RemoteFileSystem`] session from a [`RemoteConnector`],
//! uses it for every prefix, and closes it at the end of the run.

pub mod ftp;
pub mod local;
pub mod locator;
pub mod sftp;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{RemoteConfig, RemoteKind};
use crate::error::IngestResult;

pub use ftp::{FtpConnector, FtpRemote};
pub use local::{LocalDirConnector, LocalDirRemote};
pub use locator::{find_latest_by_prefix, locate_latest};
pub use sftp::{SftpConnector, SftpRemote};

/// A file as seen in a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileDescriptor {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// An open session against the remote directory
#[async_trait]
pub trait RemoteFileSystem: Send + Sync {
    /// List the regular files in the configured root directory, in server order
    async fn list(&self) -> IngestResult<Vec<RemoteFileDescriptor>>;

    /// Full remote path of `filename` inside the root directory
    fn remote_path(&self, filename: &str) -> String;

    /// Stream `remote_path` into `local_path`, returning the bytes copied
    ///
    /// The local parent directory is created if needed and an existing local
    /// file is truncated.
    async fn download(&self, remote_path: &str, local_path: &Path) -> IngestResult<u64>;

    /// Release the session
    async fn close(&self) -> IngestResult<()>;
}

/// Opens one session per run
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> IngestResult<Box<dyn RemoteFileSystem>>;
}

/// Build the connector selected by configuration
pub fn connector_for(config: &RemoteConfig) -> Box<dyn RemoteConnector> {
    match config.kind {
        RemoteKind::Sftp => Box::new(SftpConnector::new(config.clone())),
        RemoteKind::Ftp => Box::new(FtpConnector::new(config.clone())),
        RemoteKind::Local => Box::new(LocalDirConnector::new(&config.root_path)),
    }
}

/// Create the parent directory of `local_path` and open it for writing, truncated
pub(crate) fn prepare_local_file(local_path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = local_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::File::create(local_path)
}
