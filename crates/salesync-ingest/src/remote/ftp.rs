//! FTP backend
//!
//! `suppaftp` is synchronous, so every call on the control connection runs on
//! the blocking pool. One [`FtpRemote`] owns one logged-in control connection
//! for the lifetime of a run; calls are serialised through a mutex.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, info, warn};

use super::{prepare_local_file, RemoteConnector, RemoteFileDescriptor, RemoteFileSystem};
use crate::config::RemoteConfig;
use crate::error::{IngestError, IngestResult};

/// Opens an authenticated FTP session per run
pub struct FtpConnector {
    config: RemoteConfig,
}

impl FtpConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for FtpConnector {
    async fn connect(&self) -> IngestResult<Box<dyn RemoteFileSystem>> {
        let remote = FtpRemote::connect(self.config.clone()).await?;
        Ok(Box::new(remote))
    }
}

/// A logged-in FTP control connection rooted at the configured directory
pub struct FtpRemote {
    stream: Arc<Mutex<FtpStream>>,
    config: RemoteConfig,
}

impl FtpRemote {
    /// Connect, log in and switch to passive binary transfers
    pub async fn connect(config: RemoteConfig) -> IngestResult<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let username = config.username.clone();
        let password = config.password.clone();

        debug!("Connecting to FTP server: {}", address);
        let stream = tokio::task::spawn_blocking(move || -> Result<FtpStream, String> {
            let mut stream = FtpStream::connect(&address).map_err(|e| e.to_string())?;

            // Extended passive mode copes with NAT between us and the server
            stream.set_mode(suppaftp::Mode::ExtendedPassive);

            stream
                .login(&username, &password)
                .map_err(|e| format!("login as {} failed: {}", username, e))?;
            stream
                .transfer_type(suppaftp::types::FileType::Binary)
                .map_err(|e| format!("failed to set binary mode: {}", e))?;
            Ok(stream)
        })
        .await
        .map_err(|e| IngestError::Connectivity {
            target: "ftp",
            message: format!("connect task panicked: {}", e),
        })?
        .map_err(|message| IngestError::Connectivity {
            target: "ftp",
            message,
        })?;

        info!(host = %config.host, port = config.port, "Connected to FTP server");

        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            config,
        })
    }

    /// Run `op` against the control connection on the blocking pool
    async fn with_stream<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, String> + Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| "FTP connection lock poisoned".to_string())?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| format!("FTP task panicked: {}", e))?
    }
}

#[async_trait]
impl RemoteFileSystem for FtpRemote {
    async fn list(&self) -> IngestResult<Vec<RemoteFileDescriptor>> {
        let path = self.config.root_path.clone();
        let listed = path.clone();
        let lines = self
            .with_stream(move |ftp| ftp.list(Some(listed.as_str())).map_err(|e| e.to_string()))
            .await
            .map_err(|message| IngestError::Listing {
                path: path.clone(),
                message,
            })?;

        let entries = parse_listing(&lines);
        debug!(path = %path, lines = lines.len(), files = entries.len(), "Parsed FTP listing");
        Ok(entries)
    }

    fn remote_path(&self, filename: &str) -> String {
        self.config.path_for(filename)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> IngestResult<u64> {
        let source = remote_path.to_string();
        let target: PathBuf = local_path.to_path_buf();

        let bytes = self
            .with_stream(move |ftp| {
                // The local file is only created once the server accepts RETR
                ftp.retr(&source, |reader| {
                    let mut file = prepare_local_file(&target).map_err(FtpError::ConnectionError)?;
                    let bytes = io::copy(reader, &mut file).map_err(FtpError::ConnectionError)?;
                    file.flush().map_err(FtpError::ConnectionError)?;
                    Ok(bytes)
                })
                .map_err(|e| format!("RETR into {} failed: {}", target.display(), e))
            })
            .await
            .map_err(|message| IngestError::Transfer {
                path: remote_path.to_string(),
                message,
            })?;

        info!("Downloaded {} ({} bytes) to {}", remote_path, bytes, local_path.display());
        Ok(bytes)
    }

    async fn close(&self) -> IngestResult<()> {
        if let Err(e) = self
            .with_stream(|ftp| ftp.quit().map_err(|e| e.to_string()))
            .await
        {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }
        Ok(())
    }
}

/// Turn raw LIST lines into regular-file descriptors, keeping server order
///
/// Lines that are not parseable (totals, banners) and non-file entries are dropped.
fn parse_listing(lines: &[String]) -> Vec<RemoteFileDescriptor> {
    lines
        .iter()
        .filter_map(|line| match line.parse::<suppaftp::list::File>() {
            Ok(file) if file.is_file() => Some(RemoteFileDescriptor {
                name: file.name().to_string(),
                modified: DateTime::<Utc>::from(file.modified()),
                size: file.size() as u64,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping unparseable LIST line {:?}: {}", line, e);
                None
            },
        })
        .collect()
}
