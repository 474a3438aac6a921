//! File transfer over the SFTP subsystem
//!
//! The transfer channel is opened on first use over the live session and
//! reused by later calls. It is reopened when the session changes or when
//! an operation finds the channel broken.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::Handle;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::connection::SessionManager;
use super::handler::SshHandler;
use crate::audit::AuditAction;
use crate::config::CONNECTION_TIMEOUT_SECS;
use crate::error::{GatewayError, Result};

/// Kind of a remote directory entry, rendered like `ls -l`'s first column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "d")]
    Directory,
    #[serde(rename = "-")]
    File,
    #[serde(rename = "l")]
    Symlink,
}

/// Permission triplets for owner, group and others
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    pub user: String,
    pub group: String,
    pub other: String,
}

impl Rights {
    /// Render the low nine permission bits as `rwx` triplets
    pub fn from_mode(mode: u32) -> Self {
        let triplet = |bits: u32| {
            let mut s = String::with_capacity(3);
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
            s
        };
        Self {
            user: triplet(mode >> 6),
            group: triplet(mode >> 3),
            other: triplet(mode),
        }
    }
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub name: String,
    pub size: u64,
    /// Milliseconds since the epoch
    pub modify_time: Option<u64>,
    /// Milliseconds since the epoch
    pub access_time: Option<u64>,
    pub rights: Option<Rights>,
    pub owner: Option<u32>,
    pub group: Option<u32>,
}

/// Open transfer channel and the session it was opened on
pub(crate) struct TransferChannel {
    handle: Arc<Handle<SshHandler>>,
    sftp: Arc<SftpSession>,
}

impl TransferChannel {
    /// Close the SFTP subsystem
    pub(crate) async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            debug!("SFTP close failed: {}", e);
        }
    }
}

/// Failure of an SFTP operation
#[derive(Debug)]
struct TransferFault {
    error: GatewayError,
    /// The channel itself is unusable and must be reopened
    channel_lost: bool,
}

impl TransferFault {
    /// Local filesystem fault; the channel is unaffected
    fn local(msg: String) -> Self {
        Self {
            error: GatewayError::transfer(msg),
            channel_lost: false,
        }
    }

    /// Fault reported by the SFTP client. Status replies come from a healthy
    /// server; anything else means the channel is gone or out of sync.
    fn remote(context: String, e: SftpError) -> Self {
        let channel_lost = !matches!(e, SftpError::Status(_));
        Self {
            error: GatewayError::transfer(format!("{}: {}", context, e)),
            channel_lost,
        }
    }

    /// Fault while streaming through a remote file handle
    fn stream(context: &str, e: std::io::Error) -> Self {
        Self {
            error: GatewayError::transfer(format!("{}: {}", context, e)),
            channel_lost: true,
        }
    }
}

impl SessionManager {
    /// Shared transfer channel, opened on first use
    ///
    /// A channel opened on an earlier session is discarded and reopened on
    /// the current one. The slot lock is held across the open, so concurrent
    /// first callers wait for one attempt instead of opening several
    /// channels. A failed open leaves the slot empty for the next caller.
    pub(crate) async fn transfer_channel(&self) -> Result<Arc<SftpSession>> {
        let handle = self.session_handle().await?;

        let mut slot = self.transfer.lock().await;
        if let Some(ref cached) = *slot {
            if Arc::ptr_eq(&cached.handle, &handle) {
                return Ok(Arc::clone(&cached.sftp));
            }
        }
        if let Some(stale) = slot.take() {
            debug!("Discarding SFTP channel from a previous session");
            stale.close().await;
        }

        debug!("Opening SFTP channel");
        let sftp = timeout(
            Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            open_sftp(&handle),
        )
        .await
        .map_err(|_| {
            GatewayError::transfer(format!(
                "Timed out opening SFTP channel after {}s",
                CONNECTION_TIMEOUT_SECS
            ))
        })??;

        let sftp = Arc::new(sftp);
        *slot = Some(TransferChannel {
            handle,
            sftp: Arc::clone(&sftp),
        });
        info!("SFTP channel established");
        Ok(sftp)
    }

    /// Drop the cached channel if it is still `sftp`, so the next call reopens
    async fn discard_transfer_channel(&self, sftp: &Arc<SftpSession>) {
        let mut slot = self.transfer.lock().await;
        if slot
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(&cached.sftp, sftp))
        {
            warn!("SFTP channel lost, it will be reopened on next use");
            *slot = None;
        }
    }

    /// Convert an operation outcome, invalidating the channel when it broke
    async fn settle<T>(
        &self,
        sftp: &Arc<SftpSession>,
        outcome: std::result::Result<T, TransferFault>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(fault) => {
                if fault.channel_lost {
                    self.discard_transfer_channel(sftp).await;
                }
                Err(fault.error)
            }
        }
    }

    /// Run a transfer on the shared channel and audit the attempt.
    /// `NotConnected` is returned without an audit entry.
    async fn audited_transfer<F, Fut>(
        &self,
        action: AuditAction,
        details: serde_json::Value,
        transfer: F,
    ) -> Result<u64>
    where
        F: FnOnce(Arc<SftpSession>) -> Fut,
        Fut: Future<Output = std::result::Result<u64, TransferFault>>,
    {
        let outcome = match self.transfer_channel().await {
            Ok(sftp) => {
                let result = transfer(Arc::clone(&sftp)).await;
                self.settle(&sftp, result).await
            }
            Err(GatewayError::NotConnected) => return Err(GatewayError::NotConnected),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(bytes) => {
                self.audit.log(action, details, true, None).await;
                Ok(bytes)
            }
            Err(e) => {
                error!("{} failed: {}", action.as_str(), e);
                self.audit
                    .log(action, details, false, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Copy a local file to the remote host
    pub async fn upload_file(&self, local_path: &str, remote_path: &str) -> Result<()> {
        let details = json!({ "localPath": local_path, "remotePath": remote_path });
        let bytes = self
            .audited_transfer(AuditAction::UploadFile, details, |sftp| async move {
                upload(&sftp, Path::new(local_path), remote_path).await
            })
            .await?;
        info!("File uploaded: {} -> {} ({} bytes)", local_path, remote_path, bytes);
        Ok(())
    }

    /// Copy a remote file to the local filesystem
    pub async fn download_file(&self, remote_path: &str, local_path: &str) -> Result<()> {
        let details = json!({ "remotePath": remote_path, "localPath": local_path });
        let bytes = self
            .audited_transfer(AuditAction::DownloadFile, details, |sftp| async move {
                download(&sftp, remote_path, Path::new(local_path)).await
            })
            .await?;
        info!("File downloaded: {} -> {} ({} bytes)", remote_path, local_path, bytes);
        Ok(())
    }

    /// List a remote directory in server order, without `.` and `..`
    pub async fn list_directory(&self, remote_path: &str) -> Result<Vec<RemoteEntry>> {
        let sftp = self.transfer_channel().await?;

        let listed = sftp
            .read_dir(remote_path)
            .await
            .map_err(|e| TransferFault::remote(format!("Failed to list {}", remote_path), e));
        let dir = self.settle(&sftp, listed).await.map_err(|e| {
            error!("Directory listing failed: {}", e);
            e
        })?;

        let entries: Vec<RemoteEntry> = dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let metadata = entry.metadata();
                let file_type = entry.file_type();
                let kind = if file_type.is_dir() {
                    EntryType::Directory
                } else if file_type.is_symlink() {
                    EntryType::Symlink
                } else {
                    EntryType::File
                };

                RemoteEntry {
                    kind,
                    name: entry.file_name(),
                    size: metadata.size.unwrap_or(0),
                    modify_time: metadata.mtime.map(|t| u64::from(t) * 1000),
                    access_time: metadata.atime.map(|t| u64::from(t) * 1000),
                    rights: metadata.permissions.map(Rights::from_mode),
                    owner: metadata.uid,
                    group: metadata.gid,
                }
            })
            .collect();

        info!("Directory listed: {} ({} entries)", remote_path, entries.len());
        Ok(entries)
    }
}

/// Start the SFTP subsystem on a new channel of `handle`
async fn open_sftp(handle: &Handle<SshHandler>) -> Result<SftpSession> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| GatewayError::transfer(format!("Failed to open SSH channel: {}", e)))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| GatewayError::transfer(format!("Failed to request SFTP subsystem: {}", e)))?;
    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| GatewayError::transfer(format!("Failed to start SFTP session: {}", e)))
}

/// Stream a local file into a new remote file, returning bytes copied
async fn upload(
    sftp: &SftpSession,
    local_path: &Path,
    remote_path: &str,
) -> std::result::Result<u64, TransferFault> {
    let mut local = tokio::fs::File::open(local_path).await.map_err(|e| {
        TransferFault::local(format!(
            "Failed to open local file {}: {}",
            local_path.display(),
            e
        ))
    })?;

    let mut remote = sftp.create(remote_path).await.map_err(|e| {
        TransferFault::remote(format!("Failed to create remote file {}", remote_path), e)
    })?;

    let bytes = tokio::io::copy(&mut local, &mut remote)
        .await
        .map_err(|e| TransferFault::stream("Upload interrupted", e))?;

    remote
        .shutdown()
        .await
        .map_err(|e| TransferFault::stream("Failed to close remote file", e))?;

    Ok(bytes)
}

/// Stream a remote file into a local file, returning bytes copied
async fn download(
    sftp: &SftpSession,
    remote_path: &str,
    local_path: &Path,
) -> std::result::Result<u64, TransferFault> {
    let mut remote = sftp.open(remote_path).await.map_err(|e| {
        TransferFault::remote(format!("Failed to open remote file {}", remote_path), e)
    })?;

    let mut local = tokio::fs::File::create(local_path).await.map_err(|e| {
        TransferFault::local(format!(
            "Failed to create local file {}: {}",
            local_path.display(),
            e
        ))
    })?;

    let bytes = tokio::io::copy(&mut remote, &mut local)
        .await
        .map_err(|e| TransferFault::stream("Download interrupted", e))?;

    local
        .flush()
        .await
        .map_err(|e| TransferFault::local(format!("Failed to flush local file: {}", e)))?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::config::SshConfig;
    use crate::ssh::connection::tests::test_manager;
    use russh_sftp::protocol::{Status, StatusCode};

    #[test]
    fn test_rights_from_mode() {
        let rights = Rights::from_mode(0o100754);
        assert_eq!(rights.user, "rwx");
        assert_eq!(rights.group, "r-x");
        assert_eq!(rights.other, "r--");

        let none = Rights::from_mode(0);
        assert_eq!(none.user, "---");
    }

    #[test]
    fn test_remote_entry_wire_format() {
        let entry = RemoteEntry {
            kind: EntryType::Directory,
            name: "logs".into(),
            size: 4096,
            modify_time: Some(1_700_000_000_000),
            access_time: None,
            rights: Some(Rights::from_mode(0o755)),
            owner: Some(0),
            group: Some(0),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "d");
        assert_eq!(value["name"], "logs");
        assert_eq!(value["modifyTime"], 1_700_000_000_000u64);
        assert_eq!(value["rights"]["group"], "r-x");
    }

    fn status(code: StatusCode) -> SftpError {
        SftpError::Status(Status {
            id: 7,
            status_code: code,
            error_message: "No such file".into(),
            language_tag: "en-US".into(),
        })
    }

    #[test]
    fn test_status_reply_keeps_channel() {
        let fault = TransferFault::remote(
            "Failed to open remote file /srv/a".into(),
            status(StatusCode::NoSuchFile),
        );
        assert!(!fault.channel_lost);
        assert!(matches!(fault.error, GatewayError::Transfer(_)));
        assert!(fault.error.to_string().contains("/srv/a"));
    }

    #[test]
    fn test_broken_channel_is_discarded() {
        for e in [
            SftpError::Timeout,
            SftpError::IO("broken pipe".into()),
            SftpError::UnexpectedBehavior("RecvError: channel closed".into()),
        ] {
            assert!(TransferFault::remote("Failed to list /srv".into(), e).channel_lost);
        }

        let interrupted = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert!(TransferFault::stream("Upload interrupted", interrupted).channel_lost);
    }

    #[test]
    fn test_local_fault_keeps_channel() {
        let fault = TransferFault::local("Failed to open local file /tmp/missing".into());
        assert!(!fault.channel_lost);
    }

    #[tokio::test]
    async fn test_transfers_require_session() {
        let manager = test_manager(SshConfig::new("localhost", "testuser").with_password("pw"));

        assert!(matches!(
            manager.upload_file("/tmp/a", "/srv/a").await,
            Err(GatewayError::NotConnected)
        ));
        assert!(matches!(
            manager.download_file("/srv/a", "/tmp/a").await,
            Err(GatewayError::NotConnected)
        ));
        assert!(matches!(
            manager.list_directory("/srv").await,
            Err(GatewayError::NotConnected)
        ));
    }
}
