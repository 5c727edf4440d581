//! Handlers for enqueueing and inspecting deliveries.
//!
//! There is deliberately no update endpoint: once enqueued, a delivery is
//! mutated only by the dispatch transaction. External deletion is allowed
//! from any state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hookpost_core::{
    models::{Delivery, DeliveryStatus},
    DeliveryId, WebhookId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, AppState};

/// Request body for enqueueing a delivery.
#[derive(Debug, Deserialize)]
pub struct DeliveryPayload {
    /// Target webhook.
    pub webhook_id: Uuid,
    /// Payload body to deliver.
    pub payload: String,
}

/// Query parameters for delivery list requests.
#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    /// Restrict to one webhook.
    pub webhook_id: Option<Uuid>,
    /// Restrict to one status.
    pub status: Option<DeliveryStatus>,
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

/// Response body for delivery list requests.
#[derive(Debug, Serialize)]
pub struct DeliveryList {
    /// The page of deliveries.
    pub deliveries: Vec<Delivery>,
    /// Applied limit.
    pub limit: i64,
    /// Applied offset.
    pub offset: i64,
}

/// Lists deliveries, newest first.
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<DeliveryList>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let deliveries = state
        .storage
        .deliveries
        .list(query.webhook_id.map(WebhookId), query.status, limit, offset)
        .await?;

    Ok(Json(DeliveryList { deliveries, limit, offset }))
}

/// Enqueues a delivery for dispatch.
///
/// The delivery starts pending, scheduled for immediate dispatch, with zero
/// attempts.
pub async fn create_delivery(
    State(state): State<AppState>,
    Json(payload): Json<DeliveryPayload>,
) -> Result<(StatusCode, Json<Delivery>), ApiError> {
    let webhook_id = WebhookId(payload.webhook_id);
    state
        .storage
        .webhooks
        .find_by_id(webhook_id)
        .await?
        .ok_or_else(|| ApiError::not_found("webhook_not_found", "webhook not found"))?;

    let delivery = Delivery::new(webhook_id, payload.payload, state.clock.now_utc());
    state.storage.deliveries.create(&delivery).await?;

    Ok((StatusCode::CREATED, Json(delivery)))
}

/// Fetches a delivery by ID.
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery = state
        .storage
        .deliveries
        .find_by_id(DeliveryId(delivery_id))
        .await?
        .ok_or_else(|| ApiError::not_found("delivery_not_found", "delivery not found"))?;

    Ok(Json(delivery))
}

/// Deletes a delivery.
pub async fn delete_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.storage.deliveries.delete(DeliveryId(delivery_id)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("delivery_not_found", "delivery not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
