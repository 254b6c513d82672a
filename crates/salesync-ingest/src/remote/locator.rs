//! Newest-file-by-prefix selection

use tracing::debug;

use super::{RemoteFileDescriptor, RemoteFileSystem};
use crate::error::{IngestError, IngestResult};

/// Pick the most recently modified entry whose name starts with `prefix`
///
/// When several matches share the newest timestamp, the one listed first wins.
pub fn find_latest_by_prefix<'a>(
    entries: &'a [RemoteFileDescriptor],
    prefix: &str,
) -> Option<&'a RemoteFileDescriptor> {
    entries
        .iter()
        .filter(|entry| entry.name.starts_with(prefix))
        .fold(None, |latest: Option<&RemoteFileDescriptor>, entry| match latest {
            Some(current) if current.modified >= entry.modified => Some(current),
            _ => Some(entry),
        })
}

/// List the remote root and locate the newest file for `prefix`
pub async fn locate_latest(
    remote: &dyn RemoteFileSystem,
    prefix: &str,
) -> IngestResult<RemoteFileDescriptor> {
    let entries = remote.list().await?;
    debug!(prefix, entries = entries.len(), "Listed remote directory");

    find_latest_by_prefix(&entries, prefix)
        .cloned()
        .ok_or_else(|| IngestError::NotFound(prefix.to_string()))
}
