//! MCP Server implementation
//!
//! Serves the session manager's operations as MCP tools over stdio. Each
//! tool call maps onto exactly one [`SessionManager`] operation; core errors
//! come back as tool results flagged `isError`, while unknown tools and
//! malformed arguments are protocol errors.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::GatewayError;
use crate::ssh::SessionManager;
use crate::tools::{
    input_schema, DownloadFileParams, ExecuteCommandParams, ListDirectoryParams, NoParams,
    UploadFileParams,
};

/// MCP front-end over a shared [`SessionManager`]
#[derive(Clone)]
pub struct GatewayMcpServer {
    /// Shared session
    session: Arc<SessionManager>,

    /// Name reported to clients
    server_name: String,
}

impl GatewayMcpServer {
    /// Create the MCP front-end; the session is connected by the caller
    pub fn new(session: Arc<SessionManager>, server_name: impl Into<String>) -> Self {
        Self {
            session,
            server_name: server_name.into(),
        }
    }

    /// Get a reference to the session manager
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Close the session and cleanup resources
    pub async fn shutdown(&self) {
        info!("Shutting down MCP server...");
        self.session.disconnect().await;
    }

    /// Tool definitions served by `list_tools`
    fn tools() -> Vec<Tool> {
        vec![
            tool::<ExecuteCommandParams>(
                "execute_command",
                "Execute a shell command on the remote host via SSH. Returns stdout, stderr, exit code, and execution time.",
            ),
            tool::<UploadFileParams>(
                "upload_file",
                "Upload a file from the local system to the remote host via SFTP.",
            ),
            tool::<DownloadFileParams>(
                "download_file",
                "Download a file from the remote host to the local system via SFTP.",
            ),
            tool::<ListDirectoryParams>(
                "list_directory",
                "List contents of a directory on the remote host.",
            ),
            tool::<NoParams>(
                "get_system_info",
                "Get system information from the remote host including hostname, uptime, load average, memory usage, and disk usage.",
            ),
            tool::<NoParams>(
                "list_processes",
                "List running processes on the remote host, sorted by CPU usage (top 20).",
            ),
        ]
    }

    /// Route a tool call to the session manager
    async fn dispatch(
        &self,
        tool_name: &str,
        args: JsonObject,
    ) -> std::result::Result<CallToolResult, McpError> {
        let outcome = match tool_name {
            "execute_command" => {
                let params: ExecuteCommandParams = parse_args(args)?;
                debug!("execute_command: {}", params.command);
                match self
                    .session
                    .execute_command(&params.command, params.timeout)
                    .await
                {
                    Ok(result) => json_text(&result),
                    Err(e) => Err(e),
                }
            }
            "upload_file" => {
                let params: UploadFileParams = parse_args(args)?;
                self.session
                    .upload_file(&params.local_path, &params.remote_path)
                    .await
                    .map(|()| {
                        format!(
                            "File uploaded successfully from {} to {}",
                            params.local_path, params.remote_path
                        )
                    })
            }
            "download_file" => {
                let params: DownloadFileParams = parse_args(args)?;
                self.session
                    .download_file(&params.remote_path, &params.local_path)
                    .await
                    .map(|()| {
                        format!(
                            "File downloaded successfully from {} to {}",
                            params.remote_path, params.local_path
                        )
                    })
            }
            "list_directory" => {
                let params: ListDirectoryParams = parse_args(args)?;
                match self.session.list_directory(&params.remote_path).await {
                    Ok(entries) => json_text(&entries),
                    Err(e) => Err(e),
                }
            }
            "get_system_info" => json_text(&self.session.get_system_info().await),
            "list_processes" => self.session.list_processes().await,
            _ => {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", tool_name),
                    None,
                ))
            }
        };

        match outcome {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => {
                error!("Tool {} failed: {}", tool_name, e);
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error: {}",
                    e
                ))]))
            }
        }
    }
}

/// Build a tool definition whose input schema comes from `T`
fn tool<T: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    Tool::new(name, description, Arc::new(input_schema::<T>()))
}

/// Deserialize tool arguments into their parameter type
fn parse_args<T: DeserializeOwned>(args: JsonObject) -> std::result::Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {}", e), None))
}

/// Pretty-printed JSON body for a tool result
fn json_text<T: Serialize>(value: &T) -> crate::error::Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| GatewayError::transport(format!("Failed to encode result: {}", e)))
}

impl ServerHandler for GatewayMcpServer {
    /// Return server information
    fn get_info(&self) -> ServerInfo {
        let ssh = self.session.ssh_config();
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "{} v{} - Shell and file access on {}@{}:{}",
                self.server_name,
                env!("CARGO_PKG_VERSION"),
                ssh.username,
                ssh.host,
                ssh.port,
            )),
        }
    }

    /// List available tools
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        debug!("list_tools called");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Call a tool
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let tool_name: &str = request.name.as_ref();
        debug!("call_tool called: {:?}", tool_name);

        let args = request.arguments.unwrap_or_default();
        self.dispatch(tool_name, args).await
    }
}
