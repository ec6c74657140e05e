//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::protocol::{ChannelInfo, SessionStatus};
use crate::ui::server::AppState;

/// Envelope for every status API reply
///
/// `data` carries the session status or channel table; `error` is set when
/// no session has been started yet.
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful reply carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed reply with a reason for the operator
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Get the current session status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<SessionStatus>>) {
    match state.controller.status() {
        Some(status) => (StatusCode::OK, Json(ApiResponse::ok(status))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("no session started")),
        ),
    }
}

/// Get the channel layout of the current session
pub async fn get_channels(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<Vec<ChannelInfo>>>) {
    match state.controller.channels() {
        Some(channels) => (StatusCode::OK, Json(ApiResponse::ok(channels))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("no session started")),
        ),
    }
}

/// Request the running session to stop
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<SessionStatus>>) {
    state.controller.request_stop();
    match state.controller.status() {
        Some(status) => (StatusCode::ACCEPTED, Json(ApiResponse::ok(status))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("no session started")),
        ),
    }
}
