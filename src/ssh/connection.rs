//! SSH Session Manager
//!
//! Owns the single authenticated SSH connection to the remote host and the
//! lazily opened SFTP transfer channel. Command execution lives in
//! `command.rs` and file transfer in `sftp.rs`; both are `impl` blocks on
//! [`SessionManager`].
//!
//! Lifecycle: `Disconnected → Connecting → Connected → Disconnected`.
//! Transitions are serialized by a lifecycle lock. There is no implicit
//! reconnect: any operation issued while not connected fails with
//! [`GatewayError::NotConnected`].

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::{AuthMethod, SshConfig};
use super::handler::SshHandler;
use super::policy::CommandPolicy;
use super::sftp::TransferChannel;
use crate::audit::{AuditAction, AuditLog};
use crate::config::{Config, CONNECTION_TIMEOUT_SECS, DEFAULT_TIMEOUT_MS};
use crate::error::{GatewayError, Result};

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Default)]
struct SessionState {
    connecting: bool,
    handle: Option<Arc<Handle<SshHandler>>>,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        match self.handle {
            Some(ref handle) if !handle.is_closed() => SessionStatus::Connected,
            _ if self.connecting => SessionStatus::Connecting,
            _ => SessionStatus::Disconnected,
        }
    }
}

/// SSH Session Manager
///
/// Created once at startup and shared (behind an `Arc`) by the front-ends.
/// Command executions and transfers run concurrently over independent
/// channels of the one connection.
pub struct SessionManager {
    /// Connection credentials
    config: SshConfig,

    /// Whitelist and dangerous-pattern gate
    pub(crate) policy: CommandPolicy,

    /// Timeout applied when a call gives no override
    pub(crate) default_timeout: Duration,

    /// Maximum command length (None = unlimited)
    pub(crate) max_chars: Option<usize>,

    /// Audit sink for privileged actions
    pub(crate) audit: Arc<AuditLog>,

    /// Serializes connect/disconnect
    lifecycle: Mutex<()>,

    /// Current session; held only briefly
    state: RwLock<SessionState>,

    /// Lazily opened SFTP channel. Holding this lock across the open makes
    /// concurrent first users share a single attempt.
    pub(crate) transfer: Mutex<Option<TransferChannel>>,
}

impl SessionManager {
    /// Create a new Session Manager
    ///
    /// Does not establish the connection; call `connect()`.
    pub fn new(config: SshConfig, policy: CommandPolicy, audit: Arc<AuditLog>) -> Self {
        Self {
            config,
            policy,
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_chars: None,
            audit,
            lifecycle: Mutex::new(()),
            state: RwLock::new(SessionState::default()),
            transfer: Mutex::new(None),
        }
    }

    /// Build a manager from the validated gateway configuration
    pub fn from_config(config: &Config, audit: Arc<AuditLog>) -> Self {
        Self::new(
            SshConfig::from_config(config),
            CommandPolicy::from_config(&config.security),
            audit,
        )
        .with_default_timeout(Duration::from_millis(
            config.security.max_command_timeout_ms,
        ))
        .with_max_chars(config.security.max_chars)
    }

    /// Set the timeout used when a command has no override
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the maximum accepted command length
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Connection credentials this manager uses
    pub fn ssh_config(&self) -> &SshConfig {
        &self.config
    }

    /// Current lifecycle state
    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status()
    }

    /// Check if the session is usable
    pub async fn is_connected(&self) -> bool {
        self.status().await == SessionStatus::Connected
    }

    /// Establish the SSH session
    ///
    /// Calling this while already connected logs a warning and returns `Ok`
    /// without touching the live session. Concurrent callers are serialized;
    /// the second one observes the first one's session.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut state = self.state.write().await;
            if state.status() == SessionStatus::Connected {
                warn!(
                    "connect() called while already connected to {}:{}, ignoring",
                    self.config.host, self.config.port
                );
                return Ok(());
            }
            // A session the peer closed is replaced, not reused
            state.handle = None;
            state.connecting = true;
        }
        self.close_transfer_channel().await;

        let result = self.do_connect().await;
        let details = json!({
            "host": self.config.host,
            "port": self.config.port,
            "username": self.config.username,
        });

        let mut state = self.state.write().await;
        state.connecting = false;
        match result {
            Ok(handle) => {
                state.handle = Some(Arc::new(handle));
                drop(state);
                info!(
                    "SSH connection established to {}@{}:{}",
                    self.config.username, self.config.host, self.config.port
                );
                self.audit
                    .log(AuditAction::Connect, details, true, None)
                    .await;
                Ok(())
            }
            Err(e) => {
                drop(state);
                error!("SSH connection error: {}", e);
                self.audit
                    .log(AuditAction::Connect, details, false, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Internal connection logic
    async fn do_connect(&self) -> Result<Handle<SshHandler>> {
        let auth = self.config.auth_method().ok_or_else(|| {
            GatewayError::auth("No authentication method available (require private key or password)")
        })?;

        // Read the key before touching the network so a bad key fails fast
        let key = match auth {
            AuthMethod::Key { path, passphrase } => {
                info!("Using SSH private key authentication");
                Some(load_private_key(path, passphrase).await?)
            }
            AuthMethod::Password(_) => {
                info!("Using SSH password authentication");
                None
            }
        };

        info!(
            "Connecting to SSH server {}:{}...",
            self.config.host, self.config.port
        );

        let ssh_config = Arc::new(client::Config::default());
        let addr = (self.config.host.as_str(), self.config.port);
        let connect_result = timeout(
            Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            client::connect(ssh_config, addr, SshHandler::new(&self.config.host)),
        )
        .await;

        let mut session = match connect_result {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(GatewayError::connection(e.to_string())),
            Err(_) => {
                return Err(GatewayError::connection(format!(
                    "Connection timeout after {}s",
                    CONNECTION_TIMEOUT_SECS
                )))
            }
        };

        match key {
            Some(key) => {
                debug!(
                    "Attempting key authentication for user '{}'",
                    self.config.username
                );
                let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);
                let auth_result = session
                    .authenticate_publickey(&self.config.username, key_with_alg)
                    .await
                    .map_err(|e| GatewayError::auth(e.to_string()))?;
                if !auth_result.success() {
                    return Err(GatewayError::auth("Key authentication rejected"));
                }
            }
            None => {
                let password = self.config.password.as_deref().unwrap_or_default();
                debug!(
                    "Attempting password authentication for user '{}'",
                    self.config.username
                );
                let auth_result = session
                    .authenticate_password(&self.config.username, password)
                    .await
                    .map_err(|e| GatewayError::auth(e.to_string()))?;
                if !auth_result.success() {
                    return Err(GatewayError::auth("Password authentication rejected"));
                }
            }
        }

        Ok(session)
    }

    /// Live session handle, or `NotConnected`
    pub(crate) async fn session_handle(&self) -> Result<Arc<Handle<SshHandler>>> {
        let state = self.state.read().await;
        match state.handle {
            Some(ref handle) if !handle.is_closed() => Ok(Arc::clone(handle)),
            _ => Err(GatewayError::NotConnected),
        }
    }

    /// Close the transfer channel if one is open
    pub(crate) async fn close_transfer_channel(&self) {
        let channel = self.transfer.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
            debug!("SFTP channel closed");
        }
    }

    /// Tear down the transfer channel and the session
    ///
    /// Best-effort and idempotent: always ends `Disconnected`.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        // Unpublish first so no new operation picks up the handle
        let handle = {
            let mut state = self.state.write().await;
            state.connecting = false;
            state.handle.take()
        };

        self.close_transfer_channel().await;

        if let Some(handle) = handle {
            if let Err(e) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "English")
                .await
            {
                debug!("SSH disconnect failed: {}", e);
            }
            info!("SSH connection closed");
        }
    }
}

/// Read and decode a private key file
async fn load_private_key(
    path: &std::path::Path,
    passphrase: Option<&str>,
) -> Result<russh::keys::PrivateKey> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GatewayError::auth(format!(
            "Failed to read private key {}: {}",
            path.display(),
            e
        ))
    })?;

    russh::keys::decode_secret_key(&content, passphrase)
        .map_err(|e| GatewayError::auth(format!("Failed to decode private key: {}", e)))
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("username", &self.config.username)
            .field("whitelist", &self.policy.whitelist_enabled())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
