//! Health check handlers for service monitoring.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status.
    pub status: HealthStatus,
    /// When the check was performed.
    pub timestamp: DateTime<Utc>,
    /// Individual component checks.
    pub checks: HealthChecks,
}

/// Overall health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Critical systems failing.
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database connectivity check.
    pub database: ComponentHealth,
}

/// Health status for one component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: ComponentStatus,
    /// Error message when the component is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Check duration in milliseconds.
    pub response_time_ms: u64,
}

/// Component-level status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy.
    Up,
    /// Component is experiencing issues.
    Down,
}

/// Primary health check endpoint with component detail.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.clock.now();
    let database = match state.storage.health_check().await {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: None,
            response_time_ms: elapsed_ms(&state, started),
        },
        Err(err) => {
            error!(error = %err, "database health check failed");
            ComponentHealth {
                status: ComponentStatus::Down,
                message: Some(err.to_string()),
                response_time_ms: elapsed_ms(&state, started),
            }
        },
    };

    let healthy = matches!(database.status, ComponentStatus::Up);
    let response = HealthResponse {
        status: if healthy { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
        timestamp: state.clock.now_utc(),
        checks: HealthChecks { database },
    };

    let status_code =
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(response))
}

/// Readiness probe: can the service reach its database?
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.storage.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            error!(error = %err, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        },
    }
}

/// Liveness probe: is the process responsive at all?
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

fn elapsed_ms(state: &AppState, started: std::time::Instant) -> u64 {
    u64::try_from(state.clock.now().duration_since(started).as_millis()).unwrap_or(u64::MAX)
}
