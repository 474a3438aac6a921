//! SSH session management module
//!
//! This module owns the single SSH session to the remote host: connection
//! lifecycle, command policy, command execution with timeouts, and SFTP file
//! transfer.

pub mod command;
pub mod config;
pub mod connection;
pub mod handler;
pub mod policy;
pub mod sanitize;
pub mod sftp;

// Re-exports
pub use command::{CommandResult, SystemInfo, PROCESS_LIST_COMMAND, SYSTEM_INFO_COMMANDS};
pub use config::{AuthMethod, SshConfig};
pub use connection::{SessionManager, SessionStatus};
pub use handler::SshHandler;
pub use policy::CommandPolicy;
pub use sanitize::{escape_command_for_shell, sanitize_command};
pub use sftp::{EntryType, RemoteEntry, Rights};
