//! Audit trail of privileged session actions
//!
//! Every connect, command execution, upload and download produces one
//! [`AuditEntry`]. Entries are emitted as JSON on the `audit` tracing target
//! and, when a file is configured, appended to it as JSON lines. Recording is
//! fire-and-forget: a failing sink is logged and never fails the operation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Kind of privileged action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "ssh_connect")]
    Connect,
    #[serde(rename = "execute_command")]
    ExecuteCommand,
    #[serde(rename = "upload_file")]
    UploadFile,
    #[serde(rename = "download_file")]
    DownloadFile,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Connect => "ssh_connect",
            AuditAction::ExecuteCommand => "execute_command",
            AuditAction::UploadFile => "upload_file",
            AuditAction::DownloadFile => "download_file",
        }
    }
}

/// One recorded action outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Action-specific context: host, command, exit code, paths
    pub details: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(action: AuditAction, details: Value, success: bool, error: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            details,
            success,
            error,
        }
    }
}

/// Append-only audit sink
#[derive(Debug, Default)]
pub struct AuditLog {
    file: Option<Mutex<tokio::fs::File>>,
}

impl AuditLog {
    /// Audit log that only emits on the `audit` tracing target
    pub fn tracing_only() -> Self {
        Self { file: None }
    }

    /// Audit log that also appends JSON lines to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be created.
    pub async fn with_file(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    /// Build from the optional configured destination
    pub async fn from_config(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => Self::with_file(path).await,
            None => Ok(Self::tracing_only()),
        }
    }

    /// Record an action outcome
    pub async fn log(
        &self,
        action: AuditAction,
        details: Value,
        success: bool,
        error: Option<String>,
    ) {
        self.record(&AuditEntry::new(action, details, success, error))
            .await;
    }

    /// Record a prepared entry
    pub async fn record(&self, entry: &AuditEntry) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize audit entry: {}", e);
                return;
            }
        };

        if entry.success {
            info!(target: "audit", action = entry.action.as_str(), "{}", json);
        } else {
            warn!(target: "audit", action = entry.action.as_str(), "{}", json);
        }

        if let Some(ref file) = self.file {
            let mut f = file.lock().await;
            let line = format!("{}\n", json);
            if let Err(e) = f.write_all(line.as_bytes()).await {
                error!("failed to write audit log: {}", e);
                return;
            }
            if let Err(e) = f.flush().await {
                error!("failed to flush audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn read_entries(path: &Path) -> Vec<AuditEntry> {
        let content = tokio::fs::read_to_string(path).await.unwrap();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn audit_entry_serialization() {
        let entry = AuditEntry::new(
            AuditAction::ExecuteCommand,
            json!({"command": "uptime", "exitCode": 0}),
            true,
            None,
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"action\":\"execute_command\""));
        assert!(json.contains("\"command\":\"uptime\""));
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn audit_failure_carries_error() {
        let entry = AuditEntry::new(
            AuditAction::Connect,
            json!({"host": "10.0.0.5"}),
            false,
            Some("connection refused".into()),
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"action\":\"ssh_connect\""));
        assert!(json.contains("\"error\":\"connection refused\""));
    }

    #[tokio::test]
    async fn audit_log_tracing_only() {
        let log = AuditLog::tracing_only();
        log.log(AuditAction::UploadFile, json!({}), true, None).await;
    }

    #[tokio::test]
    async fn audit_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::with_file(&path).await.unwrap();

        log.log(
            AuditAction::UploadFile,
            json!({"localPath": "/tmp/a", "remotePath": "/srv/a"}),
            true,
            None,
        )
        .await;
        log.log(
            AuditAction::DownloadFile,
            json!({"remotePath": "/srv/missing", "localPath": "/tmp/b"}),
            false,
            Some("no such file".into()),
        )
        .await;

        let entries = read_entries(&path).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::UploadFile);
        assert!(entries[0].success);
        assert_eq!(entries[1].action, AuditAction::DownloadFile);
        assert_eq!(entries[1].error.as_deref(), Some("no such file"));
        assert_eq!(entries[1].details["remotePath"], "/srv/missing");
    }

    #[tokio::test]
    async fn audit_log_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("audit.log");
        let log = AuditLog::from_config(Some(&path)).await.unwrap();
        log.log(AuditAction::Connect, json!({"host": "h"}), true, None)
            .await;
        assert_eq!(read_entries(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn audit_log_reopen_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        {
            let log = AuditLog::with_file(&path).await.unwrap();
            log.log(AuditAction::Connect, json!({}), true, None).await;
        }
        let log = AuditLog::with_file(&path).await.unwrap();
        log.log(AuditAction::Connect, json!({}), false, Some("x".into()))
            .await;
        assert_eq!(read_entries(&path).await.len(), 2);
    }
}
