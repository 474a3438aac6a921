//! Configuration and CLI argument parsing for the gateway

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::error::{GatewayError, Result};

/// Default timeout for command execution in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000; // 5 minutes

/// Connection timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// API key used when none is configured
pub const DEFAULT_API_KEY: &str = "change-this-secret-key";

/// Front-end to run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// REST API over HTTP
    Api,
    /// MCP server over stdio
    Mcp,
}

/// Gateway CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "vps-gateway")]
#[command(version)]
#[command(about = "Expose a remote host's shell and filesystem over REST and MCP via SSH")]
pub struct Args {
    /// Front-end to run
    #[arg(value_enum, default_value = "api")]
    pub mode: Mode,

    /// SSH host to connect to
    #[arg(long, env = "SSH_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, default_value = "22", env = "SSH_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, env = "SSH_USERNAME")]
    pub username: String,

    /// SSH password (alternative to key)
    #[arg(long, env = "SSH_PASSWORD")]
    pub password: Option<String>,

    /// Path to SSH private key file (takes precedence over password)
    #[arg(long, env = "SSH_PRIVATE_KEY_PATH")]
    pub private_key: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long, env = "SSH_PRIVATE_KEY_PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Address the REST API listens on
    #[arg(long, default_value = "localhost", env = "API_HOST")]
    pub api_host: String,

    /// Port the REST API listens on
    #[arg(long, default_value = "3000", env = "API_PORT")]
    pub api_port: u16,

    /// Secret key REST callers must present
    #[arg(long, default_value = DEFAULT_API_KEY, env = "API_KEY")]
    pub api_key: String,

    /// Only allow commands whose base name is in --allowed-commands
    #[arg(long, default_value = "false", env = "ENABLE_COMMAND_WHITELIST")]
    pub enable_command_whitelist: bool,

    /// Comma-separated list of allowed base commands
    #[arg(long, value_delimiter = ',', env = "ALLOWED_COMMANDS")]
    pub allowed_commands: Vec<String>,

    /// Default command execution timeout in milliseconds
    #[arg(long, default_value = "300000", env = "MAX_COMMAND_TIMEOUT")]
    pub max_command_timeout: u64,

    /// Maximum characters for command length.
    /// Use "none", "0", or negative value to disable limit.
    #[arg(long, env = "MAX_COMMAND_CHARS")]
    pub max_chars: Option<String>,

    /// Rate limit window in milliseconds
    #[arg(long, default_value = "60000", env = "RATE_LIMIT_WINDOW_MS")]
    pub rate_limit_window_ms: u64,

    /// Maximum requests per client per window (0 disables rate limiting)
    #[arg(long, default_value = "100", env = "RATE_LIMIT_MAX_REQUESTS")]
    pub rate_limit_max_requests: u32,

    /// Name the MCP server reports to clients
    #[arg(long, default_value = "vps-execute-mcp", env = "MCP_SERVER_NAME")]
    pub server_name: String,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Append audit entries as JSON lines to this file
    #[arg(long, env = "AUDIT_LOG_FILE")]
    pub audit_log: Option<PathBuf>,
}

/// Command policy settings
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// Whether the whitelist check applies
    pub enable_command_whitelist: bool,

    /// Allowed base commands, in configured order
    pub allowed_commands: Vec<String>,

    /// Default command timeout in milliseconds
    pub max_command_timeout_ms: u64,

    /// Maximum command length (None = unlimited)
    pub max_chars: Option<usize>,
}

/// REST API settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Shared secret for callers
    pub api_key: String,

    /// Rate limit window in milliseconds
    pub rate_limit_window_ms: u64,

    /// Requests allowed per window (0 = unlimited)
    pub rate_limit_max_requests: u32,
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Front-end to run
    pub mode: Mode,

    /// SSH host
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH username
    pub username: String,

    /// SSH password
    pub password: Option<String>,

    /// Path to SSH private key
    pub private_key: Option<PathBuf>,

    /// Passphrase for the private key
    pub passphrase: Option<String>,

    /// Command policy settings
    pub security: SecurityConfig,

    /// REST API settings
    pub api: ApiConfig,

    /// MCP server name
    pub server_name: String,

    /// Log level filter
    pub log_level: String,

    /// Audit file destination
    pub audit_log: Option<PathBuf>,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        let max_chars = parse_max_chars(args.max_chars.as_deref());
        let allowed_commands = args
            .allowed_commands
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Ok(Config {
            mode: args.mode,
            host: args.host,
            port: args.port,
            username: args.username,
            password: sanitize_password(args.password),
            private_key: args.private_key,
            passphrase: sanitize_password(args.passphrase),
            security: SecurityConfig {
                enable_command_whitelist: args.enable_command_whitelist,
                allowed_commands,
                max_command_timeout_ms: args.max_command_timeout,
                max_chars,
            },
            api: ApiConfig {
                host: args.api_host,
                port: args.api_port,
                api_key: args.api_key,
                rate_limit_window_ms: args.rate_limit_window_ms,
                rate_limit_max_requests: args.rate_limit_max_requests,
            },
            server_name: args.server_name,
            log_level: args.log_level,
            audit_log: args.audit_log,
        })
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    if args.host.is_empty() {
        errors.push("Missing required --host (SSH_HOST)".to_string());
    }

    if args.username.is_empty() {
        errors.push("Missing required --username (SSH_USERNAME)".to_string());
    }

    // Must have either password or key
    let has_password = args.password.as_deref().is_some_and(|p| !p.is_empty());
    if !has_password && args.private_key.is_none() {
        errors.push(
            "Either --private-key (SSH_PRIVATE_KEY_PATH) or --password (SSH_PASSWORD) must be provided"
                .to_string(),
        );
    }

    // If key is provided, check if file exists
    if let Some(ref key_path) = args.private_key {
        if !key_path.exists() {
            errors.push(format!("SSH key file not found: {}", key_path.display()));
        }
    }

    if args.max_command_timeout == 0 {
        errors.push("--max-command-timeout must be greater than 0".to_string());
    }

    if args.rate_limit_window_ms == 0 {
        errors.push("--rate-limit-window-ms must be greater than 0".to_string());
    }

    if !errors.is_empty() {
        return Err(GatewayError::Config(format!(
            "Configuration error:\n{}",
            errors.join("\n")
        )));
    }

    Ok(())
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) or unparseable → None
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    let s = value?;
    if s.eq_ignore_ascii_case("none") {
        return None;
    }

    match s.parse::<i64>() {
        Ok(n) if n > 0 => Some(n as usize),
        _ => None,
    }
}

/// Sanitize password: return None if empty
fn sanitize_password(password: Option<String>) -> Option<String> {
    password.filter(|p| !p.is_empty())
}
