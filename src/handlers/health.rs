//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Performance logging status: "operational" or "degraded"
    pub performance_log_status: &'static str,
}

/// Health check handler
///
/// Always returns 200 OK; `performance_log_status` flips to "degraded"
/// once any performance record has been lost (queue drop or sink write
/// failure), signalling operators to check the log backend without ever
/// failing task traffic.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let performance_log_status = if state.metrics().records_lost_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            performance_log_status,
        }),
    )
}
