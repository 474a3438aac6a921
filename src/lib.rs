//! VPS Gateway - Remote shell and filesystem access over REST and MCP
//!
//! This crate keeps a single authenticated SSH session to one remote host and
//! exposes it through two front-ends: a JSON REST API and an MCP server on
//! stdio. Both front-ends drive the same [`SessionManager`], so command
//! policy, timeouts and auditing behave identically regardless of caller.
//!
//! # Features
//!
//! - Shell command execution with per-call timeouts and remote termination
//! - Command policy: optional base-command whitelist plus dangerous-pattern denylist
//! - File upload, download and directory listing over SFTP
//! - System information and process listing presets
//! - Structured audit trail of connects, commands and transfers
//!
//! # MCP Tools
//!
//! - `execute_command` - Run a shell command on the remote host
//! - `upload_file` / `download_file` - Transfer files over SFTP
//! - `list_directory` - List a remote directory
//! - `get_system_info` - Hostname, uptime, load, memory and disk usage
//! - `list_processes` - Top 20 processes by CPU usage
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! vps-gateway api --host=192.168.1.100 --username=admin --password=secret --api-key=s3cret
//! vps-gateway mcp --host=192.168.1.100 --username=admin --private-key=~/.ssh/id_ed25519
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod server;
pub mod ssh;
pub mod tools;

// Re-exports for convenience
pub use api::ApiServer;
pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use config::{Args, Config, Mode};
pub use error::{GatewayError, Result};
pub use server::GatewayMcpServer;
pub use ssh::{
    CommandPolicy, CommandResult, RemoteEntry, SessionManager, SessionStatus, SshConfig,
    SystemInfo,
};
