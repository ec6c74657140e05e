//! Status API server

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::StatusConfig;
use crate::session::StreamController;
use crate::ui::handlers;

/// Shared state for request handlers
pub struct AppState {
    pub controller: Arc<StreamController>,
}

/// Serves session status and a remote stop over HTTP
pub struct StatusServer {
    config: StatusConfig,
    controller: Arc<StreamController>,
}

impl StatusServer {
    pub fn new(config: StatusConfig, controller: Arc<StreamController>) -> Self {
        Self { config, controller }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            controller: self.controller.clone(),
        });

        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/channels", get(handlers::get_channels))
            .route("/api/stop", post(handlers::stop_session))
            .with_state(state)
    }

    /// Serve until the task is dropped
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Status API listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Serve on the current tokio runtime
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                tracing::error!("Status API failed: {}", e);
            }
        })
    }
}
