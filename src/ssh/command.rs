//! Command execution over SSH
//!
//! Provides [`CommandResult`], `execute_command` with policy enforcement and
//! per-call timeouts, and the two fixed diagnostic operations built on it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Sig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::connection::SessionManager;
use super::handler::SshHandler;
use super::sanitize::{escape_command_for_shell, sanitize_command};
use crate::audit::AuditAction;
use crate::error::{GatewayError, Result};

/// Commands run by `get_system_info`, keyed by output field
pub const SYSTEM_INFO_COMMANDS: [(&str, &str); 5] = [
    ("hostname", "hostname"),
    ("uptime", "uptime"),
    ("loadAverage", "cat /proc/loadavg"),
    ("memoryUsage", "free -h"),
    ("diskUsage", "df -h"),
];

/// Command run by `list_processes`
pub const PROCESS_LIST_COMMAND: &str = "ps aux --sort=-%cpu | head -20";

/// Outcome of a completed remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Standard output, trimmed
    pub stdout: String,

    /// Standard error, trimmed
    pub stderr: String,

    /// Exit code of the command (None if the remote reported none)
    pub exit_code: Option<u32>,

    /// Wall-clock milliseconds since the call began
    pub execution_time: u64,
}

impl CommandResult {
    /// Check if the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Diagnostic snapshot of the remote host
///
/// A field whose command failed holds `Error: <message>` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    pub uptime: String,
    pub load_average: String,
    pub memory_usage: String,
    pub disk_usage: String,
}

impl SystemInfo {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "hostname" => self.hostname = value,
            "uptime" => self.uptime = value,
            "loadAverage" => self.load_average = value,
            "memoryUsage" => self.memory_usage = value,
            "diskUsage" => self.disk_usage = value,
            _ => {}
        }
    }
}

/// Streams gathered from an exec channel
#[derive(Debug, Default)]
struct RawOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
}

impl SessionManager {
    /// Execute a command on the remote host
    ///
    /// 1. Requires a live session (`NotConnected` otherwise, not audited)
    /// 2. Validates the command shape and runs the policy filter; a rejection
    ///    is audited and no channel is opened
    /// 3. Runs the command on a fresh exec channel, racing a timer of
    ///    `timeout_ms` (or the configured default when `None` or 0)
    /// 4. On timeout, signals the remote process and returns `Timeout`
    ///
    /// # Returns
    /// * `Ok(CommandResult)` - Trimmed output, exit code and elapsed time
    /// * `Err(GatewayError::PolicyViolation)` - Rejected by the policy filter
    /// * `Err(GatewayError::Timeout)` - Did not finish in time
    /// * `Err(GatewayError::Transport)` - Channel could not be opened or used
    pub async fn execute_command(
        &self,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<CommandResult> {
        let handle = self.session_handle().await?;
        let command = sanitize_command(command, self.max_chars)?;

        if let Err(e) = self.policy.check(&command) {
            warn!("Command rejected by policy: {}", e);
            self.audit
                .log(
                    AuditAction::ExecuteCommand,
                    json!({ "command": command }),
                    false,
                    Some(e.to_string()),
                )
                .await;
            return Err(e);
        }

        let timeout_duration = self.effective_timeout(timeout_ms);
        let started = Instant::now();
        let outcome = exec_via_channel(handle, &command, timeout_duration, started).await;

        match outcome {
            Ok(ref result) => {
                self.audit
                    .log(
                        AuditAction::ExecuteCommand,
                        json!({ "command": command, "exitCode": result.exit_code }),
                        result.success(),
                        None,
                    )
                    .await;
            }
            Err(ref e) => {
                error!("Command execution failed: {}", e);
                self.audit
                    .log(
                        AuditAction::ExecuteCommand,
                        json!({ "command": command }),
                        false,
                        Some(e.to_string()),
                    )
                    .await;
            }
        }

        outcome
    }

    /// Timeout for a call: the override when given and non-zero, else the default
    pub fn effective_timeout(&self, timeout_ms: Option<u64>) -> Duration {
        match timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.default_timeout,
        }
    }

    /// Collect hostname, uptime, load, memory and disk usage
    ///
    /// Runs each command sequentially through `execute_command`; a failing
    /// command yields `Error: <message>` for its field and never aborts the
    /// whole call.
    pub async fn get_system_info(&self) -> SystemInfo {
        let mut info = SystemInfo::default();
        for (key, cmd) in SYSTEM_INFO_COMMANDS {
            let value = match self.execute_command(cmd, None).await {
                Ok(result) => result.stdout,
                Err(e) => format!("Error: {}", e),
            };
            info.set(key, value);
        }
        info
    }

    /// Top 20 processes by CPU usage as raw `ps` output
    pub async fn list_processes(&self) -> Result<String> {
        let result = self.execute_command(PROCESS_LIST_COMMAND, None).await?;
        Ok(result.stdout)
    }
}

/// Run a command on a new exec channel and race it against the timer.
///
/// The deadline covers opening the channel, starting the command and
/// collecting its output. `tokio::time::timeout` yields exactly one outcome:
/// either the collected output or the elapsed timer, never both.
async fn exec_via_channel(
    handle: Arc<Handle<SshHandler>>,
    command: &str,
    timeout_duration: Duration,
    started: Instant,
) -> Result<CommandResult> {
    let mut opened: Option<Channel<Msg>> = None;

    let run = async {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to open channel: {}", e)))?;
        let channel = opened.insert(channel);

        channel
            .exec(true, command)
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to exec command: {}", e)))?;

        Ok::<_, GatewayError>(collect_channel_output(channel).await)
    };

    let collected = timeout(timeout_duration, run).await;
    match collected {
        Ok(Ok(output)) => {
            let result = CommandResult {
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                exit_code: output.exit_code,
                execution_time: started.elapsed().as_millis() as u64,
            };
            debug!(
                "Command completed: exit_code={:?}, stdout_len={}, stderr_len={}",
                result.exit_code,
                result.stdout.len(),
                result.stderr.len()
            );
            Ok(result)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let ms = timeout_duration.as_millis() as u64;
            match opened.take() {
                Some(channel) => {
                    warn!("Command timed out after {}ms, aborting remote process", ms);
                    // Cleanup must not delay the caller's error
                    tokio::spawn(abort_command(handle, channel, command.to_string()));
                }
                None => warn!("Command timed out after {}ms before a channel opened", ms),
            }
            Err(GatewayError::Timeout(ms))
        }
    }
}

/// Read a channel until the remote closes it
async fn collect_channel_output(channel: &mut Channel<Msg>) -> RawOutput {
    let mut output = RawOutput::default();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
            // ext == 1 is stderr
            ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                output.stderr.extend_from_slice(data)
            }
            ChannelMsg::ExitStatus { exit_status } => output.exit_code = Some(exit_status),
            ChannelMsg::ExitSignal { signal_name, .. } => {
                debug!("Remote process terminated by signal {:?}", signal_name);
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    output
}

/// Terminate a timed-out command
///
/// Sends `KILL` on the command's own channel and closes it, then runs
/// `pkill -f` for servers that ignore channel signals.
async fn abort_command(handle: Arc<Handle<SshHandler>>, channel: Channel<Msg>, command: String) {
    if let Err(e) = channel.signal(Sig::KILL).await {
        debug!("Failed to signal timed-out command: {}", e);
    }
    if let Err(e) = channel.close().await {
        debug!("Failed to close timed-out channel: {}", e);
    }

    let mut abort_channel = match handle.channel_open_session().await {
        Ok(ch) => ch,
        Err(e) => {
            error!("Failed to open channel for abort: {}", e);
            return;
        }
    };

    let abort_cmd = abort_command_line(&command);
    debug!("Sending abort command: {}", abort_cmd);

    if let Err(e) = abort_channel.exec(true, abort_cmd.as_str()).await {
        error!("Failed to exec abort command: {}", e);
        return;
    }

    let _ = timeout(Duration::from_secs(5), async {
        while let Some(msg) = abort_channel.wait().await {
            if matches!(msg, ChannelMsg::Close) {
                break;
            }
        }
    })
    .await;

    debug!("Abort command completed");
}

/// Remote `pkill` invocation matching exactly `command`
///
/// `pkill -f` takes an extended regex, so the command is regex-escaped
/// before being quoted for the shell.
fn abort_command_line(command: &str) -> String {
    format!(
        "timeout 3s pkill -f '{}' 2>/dev/null || true",
        escape_command_for_shell(&regex::escape(command))
    )
}
