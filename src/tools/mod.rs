//! MCP tool parameters
//!
//! Argument types for the tools served in `server.rs`. Each type doubles as
//! the source of the tool's JSON input schema.
//!
//! Available tools:
//! - `execute_command` - Run a shell command on the remote host
//! - `upload_file` / `download_file` - Transfer files over SFTP
//! - `list_directory` - List a remote directory
//! - `get_system_info` - Hostname, uptime, load, memory and disk usage
//! - `list_processes` - Top 20 processes by CPU usage

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters for the execute_command tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ExecuteCommandParams {
    /// The shell command to execute on the remote host
    pub command: String,

    /// Command timeout in milliseconds (default: configured maximum)
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Parameters for the upload_file tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileParams {
    /// Local file path to upload
    pub local_path: String,

    /// Remote destination path
    pub remote_path: String,
}

/// Parameters for the download_file tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFileParams {
    /// Remote file path to download
    pub remote_path: String,

    /// Local destination path
    pub local_path: String,
}

/// Parameters for the list_directory tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryParams {
    /// Remote directory path to list
    pub remote_path: String,
}

/// Tools that take no arguments
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct NoParams {}

/// JSON schema object for a parameter type
pub fn input_schema<T: JsonSchema>() -> Map<String, Value> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("type".into(), Value::String("object".into()));
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_params_deserialize() {
        let params: ExecuteCommandParams =
            serde_json::from_str(r#"{"command": "uptime"}"#).unwrap();
        assert_eq!(params.command, "uptime");
        assert_eq!(params.timeout, None);

        let params: ExecuteCommandParams =
            serde_json::from_str(r#"{"command": "sleep 1", "timeout": 50}"#).unwrap();
        assert_eq!(params.timeout, Some(50));
    }

    #[test]
    fn test_transfer_params_use_camel_case() {
        let params: UploadFileParams =
            serde_json::from_str(r#"{"localPath": "/tmp/a", "remotePath": "/srv/a"}"#).unwrap();
        assert_eq!(params.local_path, "/tmp/a");
        assert_eq!(params.remote_path, "/srv/a");

        assert!(serde_json::from_str::<DownloadFileParams>(r#"{"remote_path": "/srv/a"}"#).is_err());
    }

    #[test]
    fn test_input_schema_required_fields() {
        let schema = input_schema::<ExecuteCommandParams>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].get("command").is_some());
        assert!(schema["properties"].get("timeout").is_some());
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![Value::String("command".into())]);

        let schema = input_schema::<ListDirectoryParams>();
        assert!(schema["properties"].get("remotePath").is_some());
    }

    #[test]
    fn test_no_params_schema_is_object() {
        let schema = input_schema::<NoParams>();
        assert_eq!(schema["type"], "object");
    }
}
