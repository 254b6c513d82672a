//! SFTP backend
//!
//! Password authentication over SSH with `ssh2`. Like the FTP backend, the
//! session is blocking, so every call runs on the blocking pool behind a
//! mutex and one [`SftpRemote`] serves a whole run. Host keys are not
//! verified.

use std::io::{self, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::{FileStat, Session, Sftp};
use tracing::{debug, info, warn};

use super::{prepare_local_file, RemoteConnector, RemoteFileDescriptor, RemoteFileSystem};
use crate::config::RemoteConfig;
use crate::error::{IngestError, IngestResult};

/// Opens an authenticated SFTP session per run
pub struct SftpConnector {
    config: RemoteConfig,
}

impl SftpConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    async fn connect(&self) -> IngestResult<Box<dyn RemoteFileSystem>> {
        let remote = SftpRemote::connect(self.config.clone()).await?;
        Ok(Box::new(remote))
    }
}

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

/// An SSH session with an open SFTP channel
pub struct SftpRemote {
    inner: Arc<Mutex<SftpSession>>,
    config: RemoteConfig,
}

impl SftpRemote {
    /// Dial, handshake, authenticate with the password and open the SFTP subsystem
    pub async fn connect(config: RemoteConfig) -> IngestResult<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let username = config.username.clone();
        let password = config.password.clone();

        debug!("Connecting to SSH server: {}", address);
        let inner = tokio::task::spawn_blocking(move || -> Result<SftpSession, String> {
            let tcp = TcpStream::connect(&address).map_err(|e| e.to_string())?;

            let mut session = Session::new().map_err(|e| e.to_string())?;
            session.set_tcp_stream(tcp);
            session
                .handshake()
                .map_err(|e| format!("SSH handshake failed: {}", e))?;
            session
                .userauth_password(&username, &password)
                .map_err(|e| format!("login as {} failed: {}", username, e))?;
            if !session.authenticated() {
                return Err(format!("login as {} was not accepted", username));
            }

            let sftp = session
                .sftp()
                .map_err(|e| format!("failed to open SFTP subsystem: {}", e))?;
            Ok(SftpSession { session, sftp })
        })
        .await
        .map_err(|e| IngestError::Connectivity {
            target: "sftp",
            message: format!("connect task panicked: {}", e),
        })?
        .map_err(|message| IngestError::Connectivity {
            target: "sftp",
            message,
        })?;

        info!(host = %config.host, port = config.port, "Connected to SFTP server");

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            config,
        })
    }

    async fn with_session<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&SftpSession) -> Result<T, String> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| "SFTP session lock poisoned".to_string())?;
            op(&guard)
        })
        .await
        .map_err(|e| format!("SFTP task panicked: {}", e))?
    }
}

#[async_trait]
impl RemoteFileSystem for SftpRemote {
    async fn list(&self) -> IngestResult<Vec<RemoteFileDescriptor>> {
        let path = self.config.root_path.clone();
        let listed = PathBuf::from(&path);
        let entries = self
            .with_session(move |s| s.sftp.readdir(&listed).map_err(|e| e.to_string()))
            .await
            .map_err(|message| IngestError::Listing {
                path: path.clone(),
                message,
            })?;

        let total = entries.len();
        let files: Vec<RemoteFileDescriptor> = entries
            .iter()
            .filter_map(|(entry, stat)| descriptor_for(entry, stat))
            .collect();
        debug!(path = %path, entries = total, files = files.len(), "Read SFTP directory");
        Ok(files)
    }

    fn remote_path(&self, filename: &str) -> String {
        self.config.path_for(filename)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> IngestResult<u64> {
        let source = PathBuf::from(remote_path);
        let target: PathBuf = local_path.to_path_buf();

        let bytes = self
            .with_session(move |s| {
                let mut remote = s
                    .sftp
                    .open(&source)
                    .map_err(|e| format!("cannot open remote file: {}", e))?;
                let mut file = prepare_local_file(&target)
                    .map_err(|e| format!("cannot open {}: {}", target.display(), e))?;
                let bytes = io::copy(&mut remote, &mut file)
                    .map_err(|e| format!("copy into {} failed: {}", target.display(), e))?;
                file.flush()
                    .map_err(|e| format!("flush of {} failed: {}", target.display(), e))?;
                Ok(bytes)
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
            .with_session(|s| {
                s.session
                    .disconnect(None, "ingestion run complete", None)
                    .map_err(|e| e.to_string())
            })
            .await
        {
            warn!("Failed to close SSH session gracefully: {}", e);
        }
        Ok(())
    }
}

/// Regular files only; the name is the last path component
fn descriptor_for(entry: &Path, stat: &FileStat) -> Option<RemoteFileDescriptor> {
    if !stat.is_file() {
        return None;
    }
    let name = entry.file_name()?.to_string_lossy().into_owned();
    let modified = stat
        .mtime
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH);
    Some(RemoteFileDescriptor {
        name,
        modified,
        size: stat.size.unwrap_or(0),
    })
}
