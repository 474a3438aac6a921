//! Command validation and escaping utilities
//!
//! Shape checks applied to every command before the policy filter, plus the
//! quoting used when a timed-out command has to be referenced from another
//! shell command.

use crate::error::{GatewayError, Result};

/// Validate and normalize a command before execution
///
/// Trims surrounding whitespace and rejects commands that are empty, contain
/// NUL bytes, or exceed `max_chars`.
///
/// # Examples
/// ```
/// use vps_gateway::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  df -h  ", None).unwrap();
/// assert_eq!(cmd, "df -h");
///
/// assert!(sanitize_command("a".repeat(100).as_str(), Some(50)).is_err());
/// ```
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(GatewayError::invalid_params("Command cannot be empty"));
    }

    if trimmed.contains('\0') {
        return Err(GatewayError::invalid_params(
            "Command cannot contain NUL bytes",
        ));
    }

    if let Some(max) = max_chars {
        let len = trimmed.chars().count();
        if len > max {
            return Err(GatewayError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max, len
            )));
        }
    }

    Ok(trimmed.to_string())
}

/// Escape a string for use inside a single-quoted shell argument
///
/// # Example
/// ```
/// use vps_gateway::ssh::sanitize::escape_command_for_shell;
///
/// assert_eq!(escape_command_for_shell("echo 'hi'"), "echo '\"'\"'hi'\"'\"'");
/// ```
pub fn escape_command_for_shell(command: &str) -> String {
    // 'word' becomes '"'"'word'"'"': close quote, literal quote, reopen
    command.replace('\'', "'\"'\"'")
}
