//! MCP Server builder utilities.
//!
//! Runs an rmcp `ServerHandler` on the configured transport, waits for a
//! shutdown signal, then runs an optional teardown hook so per-server state
//! (such as media handle stores) is released when the server stops.
//!
//! # Example
//!
//! ```ignore
//! use video_edit_mcp_common::server::McpServerBuilder;
//! use video_edit_mcp_common::transport::Transport;
//!
//! let handler = MyHandler::new();
//! let teardown = handler.clone();
//! McpServerBuilder::new(handler)
//!     .with_transport(Transport::stdio())
//!     .with_teardown(async move { teardown.shutdown().await })
//!     .run()
//!     .await?;
//! ```

use crate::transport::Transport;
use rmcp::{ServerHandler, ServiceExt};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Future run once after the server stops.
type Teardown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Errors that can occur when running an MCP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("Failed to bind to {addr}: {message}")]
    BindFailed { addr: String, message: String },

    /// Transport error during communication
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for configuring and running MCP servers.
pub struct McpServerBuilder<H> {
    handler: H,
    transport: Transport,
    shutdown_rx: Option<oneshot::Receiver<()>>,
    teardown: Option<Teardown>,
}

impl<H> McpServerBuilder<H>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    /// Create a new server builder with the given handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            transport: Transport::default(),
            shutdown_rx: None,
            teardown: None,
        }
    }

    /// Set the transport mode for the server.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set a shutdown signal receiver for graceful shutdown.
    ///
    /// When the sender is dropped or a message is sent, the server
    /// will initiate graceful shutdown.
    pub fn with_shutdown(mut self, shutdown_rx: oneshot::Receiver<()>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Register a future to run after the server has stopped.
    ///
    /// The teardown runs on every exit path of [`run`](Self::run), including
    /// transport errors.
    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.teardown = Some(Box::pin(teardown));
        self
    }

    /// Run the MCP server with the configured transport.
    ///
    /// This method blocks until the server is shut down (via signal or shutdown channel).
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!(transport = %self.transport, "Starting MCP server");

        let teardown = self.teardown.take();
        let result = match self.transport.clone() {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http { host, port } => self.run_http(&host, port).await,
        };

        if let Some(teardown) = teardown {
            teardown.await;
        }
        result
    }

    /// Run the server with stdio transport.
    async fn run_stdio(self) -> Result<(), ServerError> {
        use rmcp::transport::io::stdio;

        let transport = stdio();
        let shutdown_future = shutdown_signal(self.shutdown_rx);

        let service = self
            .handler
            .serve(transport)
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tokio::select! {
            result = service.waiting() => {
                result.map_err(|e| ServerError::Transport(e.to_string()))?;
                Ok(())
            }
            _ = shutdown_future => {
                tracing::info!("Received shutdown signal, stopping server");
                Ok(())
            }
        }
    }

    /// Run the server with HTTP streamable transport.
    async fn run_http(self, host: &str, port: u16) -> Result<(), ServerError> {
        use rmcp::transport::streamable_http_server::{
            StreamableHttpService, session::local::LocalSessionManager,
        };

        let handler = self.handler.clone();
        let service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        let router = axum::Router::new().nest_service("/mcp", service);

        let bind_addr = format!("{}:{}", host, port);
        let tcp_listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                addr: bind_addr.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(addr = %bind_addr, "HTTP server listening on /mcp");

        axum::serve(tcp_listener, router)
            .with_graceful_shutdown(shutdown_signal(self.shutdown_rx))
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve when the shutdown channel fires, or on SIGTERM/SIGINT without one.
async fn shutdown_signal(shutdown_rx: Option<oneshot::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => wait_for_shutdown_signal().await,
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "Failed to register signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Received Ctrl+C");
    }
}

/// Convenience function to set up graceful shutdown handling.
///
/// Returns a sender that can be used to trigger shutdown programmatically,
/// and a receiver to pass to the server builder.
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}
