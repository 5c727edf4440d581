//! CRUD handlers for webhook configuration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hookpost_core::{models::Webhook, WebhookId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, AppState};

/// Request body for creating or updating a webhook.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Human-readable webhook name.
    pub name: String,
    /// Destination URL.
    pub url: String,
    /// Content type sent with deliveries.
    pub content_type: String,
    /// Status codes counting as success.
    pub valid_status_codes: Vec<i32>,
    /// Optional signing secret.
    #[serde(default)]
    pub secret_token: Option<String>,
    /// Whether deliveries are eligible for dispatch.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Maximum delivery attempts.
    pub max_delivery_attempts: i32,
    /// Per-attempt timeout in seconds.
    pub delivery_attempt_timeout: i32,
    /// Minimum retry backoff in seconds.
    pub retry_min_backoff: i32,
    /// Maximum retry backoff in seconds.
    pub retry_max_backoff: i32,
}

fn default_active() -> bool {
    true
}

/// Query parameters for webhook list requests.
#[derive(Debug, Deserialize)]
pub struct ListWebhooksQuery {
    /// Restrict to active or inactive webhooks.
    pub active: Option<bool>,
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

/// Response body for webhook list requests.
#[derive(Debug, Serialize)]
pub struct WebhookList {
    /// The page of webhooks.
    pub webhooks: Vec<Webhook>,
    /// Applied limit.
    pub limit: i64,
    /// Applied offset.
    pub offset: i64,
}

/// Lists webhooks ordered by name.
pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<ListWebhooksQuery>,
) -> Result<Json<WebhookList>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let webhooks = state.storage.webhooks.list(query.active, limit, offset).await?;

    Ok(Json(WebhookList { webhooks, limit, offset }))
}

/// Creates a webhook.
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<(StatusCode, Json<Webhook>), ApiError> {
    let now = state.clock.now_utc();
    let webhook = Webhook {
        id: WebhookId::new(),
        name: payload.name,
        url: payload.url,
        content_type: payload.content_type,
        valid_status_codes: payload.valid_status_codes,
        secret_token: payload.secret_token,
        active: payload.active,
        max_delivery_attempts: payload.max_delivery_attempts,
        delivery_attempt_timeout: payload.delivery_attempt_timeout,
        retry_min_backoff: payload.retry_min_backoff,
        retry_max_backoff: payload.retry_max_backoff,
        created_at: now,
        updated_at: now,
    };
    webhook.validate()?;

    state.storage.webhooks.create(&webhook).await?;

    Ok((StatusCode::CREATED, Json(webhook)))
}

/// Fetches a webhook by ID.
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<Webhook>, ApiError> {
    let webhook = state
        .storage
        .webhooks
        .find_by_id(WebhookId(webhook_id))
        .await?
        .ok_or_else(|| ApiError::not_found("webhook_not_found", "webhook not found"))?;

    Ok(Json(webhook))
}

/// Replaces a webhook's configuration.
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<Webhook>, ApiError> {
    let existing = state
        .storage
        .webhooks
        .find_by_id(WebhookId(webhook_id))
        .await?
        .ok_or_else(|| ApiError::not_found("webhook_not_found", "webhook not found"))?;

    let webhook = Webhook {
        id: existing.id,
        name: payload.name,
        url: payload.url,
        content_type: payload.content_type,
        valid_status_codes: payload.valid_status_codes,
        secret_token: payload.secret_token,
        active: payload.active,
        max_delivery_attempts: payload.max_delivery_attempts,
        delivery_attempt_timeout: payload.delivery_attempt_timeout,
        retry_min_backoff: payload.retry_min_backoff,
        retry_max_backoff: payload.retry_max_backoff,
        created_at: existing.created_at,
        updated_at: state.clock.now_utc(),
    };
    webhook.validate()?;

    state.storage.webhooks.update(&webhook).await?;

    Ok(Json(webhook))
}

/// Deletes a webhook and everything attached to it.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.storage.webhooks.delete(WebhookId(webhook_id)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("webhook_not_found", "webhook not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
