//! Read-only handlers for the delivery attempt audit trail.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use hookpost_core::{models::DeliveryAttempt, DeliveryId, WebhookId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, AppState};

/// Query parameters for attempt list requests.
#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    /// Restrict to one webhook.
    pub webhook_id: Option<Uuid>,
    /// Restrict to one delivery.
    pub delivery_id: Option<Uuid>,
    /// Maximum number of rows to return.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Number of rows to skip.
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Response body for attempt list requests.
#[derive(Debug, Serialize)]
pub struct DeliveryAttemptList {
    /// The page of attempts.
    pub delivery_attempts: Vec<DeliveryAttempt>,
    /// Applied limit.
    pub limit: i64,
    /// Applied offset.
    pub offset: i64,
}

/// Lists delivery attempts, newest first.
pub async fn list_delivery_attempts(
    State(state): State<AppState>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<Json<DeliveryAttemptList>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let delivery_attempts = state
        .storage
        .delivery_attempts
        .list(
            query.webhook_id.map(WebhookId),
            query.delivery_id.map(DeliveryId),
            limit,
            offset,
        )
        .await?;

    Ok(Json(DeliveryAttemptList { delivery_attempts, limit, offset }))
}

/// Fetches one attempt by ID.
pub async fn get_delivery_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<DeliveryAttempt>, ApiError> {
    let attempt = state
        .storage
        .delivery_attempts
        .find_by_id(attempt_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found("delivery_attempt_not_found", "delivery attempt not found")
        })?;

    Ok(Json(attempt))
}
