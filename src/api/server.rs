//! HTTP server

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

use crate::status::StatusReporter;
use super::handlers;

/// HTTP API Server
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server
    pub fn new(reporter: StatusReporter, addr: SocketAddr) -> Self {
        let router = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/v1/status", get(handlers::status))
            .route("/api/v1/ready", get(handlers::ready))
            .layer(TraceLayer::new_for_http())
            .with_state(reporter);

        Self { router, addr }
    }

    /// Run the server
    pub async fn run(self) -> Result<(), std::io::Error> {
        tracing::info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, stopping API server"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
