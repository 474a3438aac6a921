//! Command policy filter
//!
//! Decides whether a command may run on the remote host. Two checks apply in
//! order: the optional base-command whitelist, then the fixed dangerous-pattern
//! rules, which apply regardless of whitelist state.
//!
//! The whitelist only looks at the first whitespace-delimited token. Pipes,
//! `;`, `&&` and subshells are not parsed, so this is a coarse guardrail and
//! not a security boundary.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SecurityConfig;
use crate::error::{GatewayError, Result};

/// Fixed dangerous-pattern rules with a short label for rejection messages
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // `rm -rf /` where the slash is not followed by another path segment
        (r"rm\s+-rf\s+/(?:\s|$)", "recursive deletion of /"),
        (
            r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
            "fork bomb",
        ),
        (r"mkfs", "filesystem formatting"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid dangerous pattern"), label))
    .collect()
});

/// Whitelist and dangerous-pattern gate applied before any command execution
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    whitelist_enabled: bool,
    allowed_commands: Vec<String>,
}

impl CommandPolicy {
    /// Create a policy; `allowed_commands` only matters when the whitelist is enabled
    pub fn new(whitelist_enabled: bool, allowed_commands: Vec<String>) -> Self {
        Self {
            whitelist_enabled,
            allowed_commands,
        }
    }

    /// Build the policy from the security section of the configuration
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(
            security.enable_command_whitelist,
            security.allowed_commands.clone(),
        )
    }

    /// Whether the whitelist check applies
    pub fn whitelist_enabled(&self) -> bool {
        self.whitelist_enabled
    }

    /// Allowed base commands in configured order
    pub fn allowed_commands(&self) -> &[String] {
        &self.allowed_commands
    }

    /// Check a command against the whitelist and the dangerous patterns.
    ///
    /// # Returns
    /// * `Ok(())` - The command may run
    /// * `Err(GatewayError::PolicyViolation)` - With a human-readable reason
    ///
    /// # Example
    /// ```
    /// use vps_gateway::ssh::policy::CommandPolicy;
    ///
    /// let policy = CommandPolicy::new(true, vec!["uptime".into(), "df".into()]);
    /// assert!(policy.check("uptime").is_ok());
    /// assert!(policy.check("rm -rf /tmp").is_err());
    /// ```
    pub fn check(&self, command: &str) -> Result<()> {
        if self.whitelist_enabled {
            let base = base_command(command);
            if !self.allowed_commands.iter().any(|allowed| allowed == base) {
                return Err(GatewayError::policy(format!(
                    "Command '{}' is not in the whitelist",
                    base
                )));
            }
        }

        if let Some(label) = dangerous_pattern(command) {
            return Err(GatewayError::policy(format!(
                "Command contains potentially dangerous pattern ({})",
                label
            )));
        }

        Ok(())
    }
}

/// First whitespace-delimited token of the trimmed command
pub fn base_command(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

/// Label of the first dangerous pattern the command matches, if any
pub fn dangerous_pattern(command: &str) -> Option<&'static str> {
    DANGEROUS_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(command))
        .map(|(_, label)| *label)
}
