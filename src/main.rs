//! VPS Gateway - Entry point
//!
//! Parses CLI arguments, opens the SSH session, then serves either the REST
//! API or the MCP server on stdio until the front-end stops or a shutdown
//! signal arrives.

use std::sync::Arc;

use clap::Parser;
use rmcp::service::ServiceExt;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vps_gateway::api::ApiServer;
use vps_gateway::audit::AuditLog;
use vps_gateway::config::{Args, Config, Mode, DEFAULT_API_KEY};
use vps_gateway::error::{GatewayError, Result};
use vps_gateway::server::GatewayMcpServer;
use vps_gateway::ssh::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Logging goes to stderr; stdout carries MCP JSON-RPC
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_args(args)?;

    info!("VPS Gateway v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Connecting to {}@{}:{}",
        config.username, config.host, config.port
    );
    info!(
        "Timeout: {}ms, Max chars: {}, Whitelist: {}",
        config.security.max_command_timeout_ms,
        config
            .security
            .max_chars
            .map_or("unlimited".to_string(), |n| n.to_string()),
        if config.security.enable_command_whitelist {
            "enabled"
        } else {
            "disabled"
        }
    );

    if config.mode == Mode::Api && config.api.api_key == DEFAULT_API_KEY {
        warn!("API key is the built-in default; set --api-key or API_KEY before exposing the API");
    }

    let audit = Arc::new(AuditLog::from_config(config.audit_log.as_deref()).await?);
    let session = Arc::new(SessionManager::from_config(&config, audit));

    if let Err(e) = session.connect().await {
        error!("Failed to establish SSH connection: {}", e);
        return Err(e);
    }

    let outcome = match config.mode {
        Mode::Api => run_api(&config, Arc::clone(&session)).await,
        Mode::Mcp => run_mcp(&config, Arc::clone(&session)).await,
    };

    session.disconnect().await;
    info!("VPS Gateway stopped");
    outcome
}

/// Serve the REST API until a shutdown signal
async fn run_api(config: &Config, session: Arc<SessionManager>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let outcome = ApiServer::from_config(&config.api, session, shutdown_rx)
        .serve()
        .await;

    signal_handle.abort();
    outcome
}

/// Serve MCP on stdio until the transport closes or a shutdown signal
async fn run_mcp(config: &Config, session: Arc<SessionManager>) -> Result<()> {
    let server = GatewayMcpServer::new(session, config.server_name.clone());

    info!("{} running on stdio", config.server_name);

    let running = server
        .clone()
        .serve(rmcp::transport::io::stdio())
        .await
        .map_err(|e| {
            error!("Failed to start MCP server: {}", e);
            GatewayError::Io(std::io::Error::other(e.to_string()))
        })?;

    tokio::select! {
        outcome = running.waiting() => {
            if let Err(e) = outcome {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    server.shutdown().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
