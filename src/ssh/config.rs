//! SSH configuration types
//!
//! Connection credentials for the single remote endpoint.

use std::path::PathBuf;

use crate::config::Config;

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote hostname or IP address
    pub host: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for password authentication
    pub password: Option<String>,

    /// Path to the private key file; read at connect time
    pub private_key_path: Option<PathBuf>,

    /// Passphrase protecting the private key
    pub passphrase: Option<String>,
}

/// The authentication method a connect attempt will use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod<'a> {
    /// Private key file with optional passphrase
    Key {
        path: &'a std::path::Path,
        passphrase: Option<&'a str>,
    },
    /// Password authentication
    Password(&'a str),
}

impl SshConfig {
    /// Create a new SSH configuration with minimal required fields
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: None,
            private_key_path: None,
            passphrase: None,
        }
    }

    /// Build the SSH credentials from the validated gateway configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            private_key_path: config.private_key.clone(),
            passphrase: config.passphrase.clone(),
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password authentication
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set private key authentication (path to the key file)
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set the passphrase for the private key
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Pick the authentication method; the key wins when both are configured.
    pub fn auth_method(&self) -> Option<AuthMethod<'_>> {
        if let Some(ref path) = self.private_key_path {
            return Some(AuthMethod::Key {
                path,
                passphrase: self.passphrase.as_deref(),
            });
        }
        self.password.as_deref().map(AuthMethod::Password)
    }
}
