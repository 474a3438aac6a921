//! HTTP listener with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::router::build_router;
use crate::config::ApiConfig;
use crate::error::Result;
use crate::ssh::SessionManager;

/// Default request body limit (1 MiB)
const MAX_BODY_SIZE: usize = 1_048_576;

#[derive(Clone)]
pub(crate) struct AppState {
    pub session: Arc<SessionManager>,
}

/// HTTP listener serving the REST routes
pub struct ApiServer {
    addr: SocketAddr,
    api_key: String,
    rate_limit: u32,
    rate_window: Duration,
    max_body_size: usize,
    session: Arc<SessionManager>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        session: Arc<SessionManager>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let host = if bind == "localhost" { "127.0.0.1" } else { bind };
        let addr: SocketAddr = format!("{host}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if host == "0.0.0.0" {
            tracing::warn!("API binding to 0.0.0.0, reachable from every interface");
        }

        Self {
            addr,
            api_key: crate::config::DEFAULT_API_KEY.to_string(),
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            max_body_size: MAX_BODY_SIZE,
            session,
            shutdown_rx,
        }
    }

    /// Build from the REST settings
    #[must_use]
    pub fn from_config(
        config: &ApiConfig,
        session: Arc<SessionManager>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self::new(&config.host, config.port, session, shutdown_rx)
            .with_api_key(config.api_key.clone())
            .with_rate_limit(
                config.rate_limit_max_requests,
                Duration::from_millis(config.rate_limit_window_ms),
            )
    }

    #[must_use]
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Address the server binds to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<()> {
        let state = AppState {
            session: self.session,
        };

        let router = build_router(
            state,
            self.api_key,
            self.rate_limit,
            self.rate_window,
            self.max_body_size,
        );

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("API server listening on http://{}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("API server shutting down");
        })
        .await?;

        Ok(())
    }
}
