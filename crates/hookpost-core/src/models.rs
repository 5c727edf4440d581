//! Core domain models and strongly-typed identifiers.
//!
//! Defines webhooks, deliveries, delivery attempts and newtype ID wrappers
//! for compile-time type safety, along with the database serialization
//! impls used by the repositories.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed webhook identifier.
///
/// Wraps a UUID to prevent mixing with delivery identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub Uuid);

impl WebhookId {
    /// Creates a new random webhook ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WebhookId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for WebhookId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Creates a new random delivery ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Delivery lifecycle status.
///
/// ```text
/// Pending -> Succeeded            (valid response)
/// Pending -> Pending              (recoverable failure, attempts below max)
/// Pending -> Failed               (failure at or beyond max attempts)
/// ```
///
/// `Succeeded` and `Failed` are terminal; the dispatch transaction never
/// selects a delivery in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Queued and waiting for a dispatch worker.
    Pending,

    /// Successfully delivered to the destination.
    Succeeded,

    /// Permanently failed after exhausting all attempts.
    Failed,
}

impl DeliveryStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

/// Content types accepted for webhook payloads.
const VALID_CONTENT_TYPES: &[&str] = &["application/json", "application/x-www-form-urlencoded"];

/// A delivery destination and its delivery policy.
///
/// Webhooks are created and updated through the CRUD API; the dispatch core
/// only reads them. An inactive webhook makes its deliveries ineligible for
/// claiming without touching the delivery rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    /// Unique identifier for this webhook.
    pub id: WebhookId,

    /// Human-readable webhook name.
    pub name: String,

    /// Destination URL for delivery requests.
    pub url: String,

    /// Content type sent with each delivery request.
    pub content_type: String,

    /// HTTP status codes that count as a successful delivery.
    ///
    /// Membership is exact: a 200 response against `[201]` is a failure.
    pub valid_status_codes: Vec<i32>,

    /// Shared secret for HMAC-SHA256 request signing.
    ///
    /// When absent or empty, requests are sent unsigned.
    pub secret_token: Option<String>,

    /// Whether deliveries for this webhook are eligible for dispatch.
    pub active: bool,

    /// Maximum delivery attempts before a delivery is marked failed.
    pub max_delivery_attempts: i32,

    /// Per-attempt HTTP timeout in seconds.
    pub delivery_attempt_timeout: i32,

    /// Minimum retry backoff in seconds.
    pub retry_min_backoff: i32,

    /// Maximum retry backoff in seconds.
    pub retry_max_backoff: i32,

    /// When this webhook was created.
    pub created_at: DateTime<Utc>,

    /// When this webhook was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Validates webhook configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.name.len() < 3 || self.name.len() > 255 {
            return Err(CoreError::InvalidInput(
                "name must be between 3 and 255 characters".to_string(),
            ));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(CoreError::InvalidInput("url must be a valid http(s) URL".to_string()));
        }
        if !VALID_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(CoreError::InvalidInput(format!(
                "content_type must be one of: {}",
                VALID_CONTENT_TYPES.join(", ")
            )));
        }
        if self.valid_status_codes.is_empty() {
            return Err(CoreError::InvalidInput(
                "valid_status_codes must not be empty".to_string(),
            ));
        }
        if self.max_delivery_attempts < 1 {
            return Err(CoreError::InvalidInput(
                "max_delivery_attempts must be >= 1".to_string(),
            ));
        }
        if self.delivery_attempt_timeout < 1 {
            return Err(CoreError::InvalidInput(
                "delivery_attempt_timeout must be >= 1".to_string(),
            ));
        }
        if self.retry_min_backoff < 1 || self.retry_max_backoff < 1 {
            return Err(CoreError::InvalidInput("retry backoff bounds must be >= 1".to_string()));
        }
        Ok(())
    }

    /// The signing secret, if one is configured and non-empty.
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret_token.as_deref().filter(|s| !s.is_empty())
    }
}

/// One unit of work: a payload destined for one webhook.
///
/// Created by the CRUD API in `Pending` status; mutated exclusively by the
/// dispatch transaction thereafter (aside from external delete).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    /// Unique identifier for this delivery.
    pub id: DeliveryId,

    /// Webhook this payload is destined for.
    pub webhook_id: WebhookId,

    /// Raw payload body sent to the destination.
    pub payload: String,

    /// Earliest eligible dispatch time.
    ///
    /// Advanced by the backoff policy on recoverable failures; left
    /// unchanged when the delivery reaches a terminal state.
    pub scheduled_at: DateTime<Utc>,

    /// Number of delivery attempts executed so far.
    pub delivery_attempts: i32,

    /// Current lifecycle status.
    pub status: DeliveryStatus,

    /// When this delivery was enqueued.
    pub created_at: DateTime<Utc>,

    /// When this delivery was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Creates a new pending delivery scheduled for immediate dispatch.
    pub fn new(webhook_id: WebhookId, payload: String, now: DateTime<Utc>) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id,
            payload,
            scheduled_at: now,
            delivery_attempts: 0,
            status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable audit record of one delivery execution.
///
/// One row is written per dispatch attempt and never updated or deleted by
/// the core, giving complete forensic visibility into every try.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryAttempt {
    /// Unique identifier for this attempt.
    pub id: Uuid,

    /// Webhook the attempt was made against.
    pub webhook_id: WebhookId,

    /// Delivery this attempt executed.
    pub delivery_id: DeliveryId,

    /// Full rendered outgoing request, headers included.
    pub raw_request: String,

    /// Full rendered response, headers and body included.
    ///
    /// Absent when the request failed before a response was received.
    pub raw_response: Option<String>,

    /// HTTP status code received, absent on transport failure.
    pub response_status_code: Option<i32>,

    /// Wall-clock execution duration in milliseconds.
    pub execution_duration: i32,

    /// Whether the response status was in the webhook's valid set.
    pub success: bool,

    /// Transport or construction error message, absent on transport success.
    pub error: Option<String>,

    /// When this attempt was made.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_webhook() -> Webhook {
        let now = Utc::now();
        Webhook {
            id: WebhookId::new(),
            name: "orders".to_string(),
            url: "https://example.com/hooks/orders".to_string(),
            content_type: "application/json".to_string(),
            valid_status_codes: vec![200, 201],
            secret_token: None,
            active: true,
            max_delivery_attempts: 5,
            delivery_attempt_timeout: 30,
            retry_min_backoff: 1,
            retry_max_backoff: 60,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn webhook_validation_accepts_valid_config() {
        assert!(valid_webhook().validate().is_ok());
    }

    #[test]
    fn webhook_validation_rejects_bad_bounds() {
        let mut webhook = valid_webhook();
        webhook.max_delivery_attempts = 0;
        assert!(webhook.validate().is_err());

        let mut webhook = valid_webhook();
        webhook.delivery_attempt_timeout = 0;
        assert!(webhook.validate().is_err());

        let mut webhook = valid_webhook();
        webhook.retry_min_backoff = 0;
        assert!(webhook.validate().is_err());

        let mut webhook = valid_webhook();
        webhook.valid_status_codes.clear();
        assert!(webhook.validate().is_err());
    }

    #[test]
    fn webhook_validation_rejects_bad_url_and_content_type() {
        let mut webhook = valid_webhook();
        webhook.url = "ftp://example.com".to_string();
        assert!(webhook.validate().is_err());

        let mut webhook = valid_webhook();
        webhook.content_type = "text/plain".to_string();
        assert!(webhook.validate().is_err());
    }

    #[test]
    fn empty_secret_means_unsigned() {
        let mut webhook = valid_webhook();
        assert!(webhook.signing_secret().is_none());

        webhook.secret_token = Some(String::new());
        assert!(webhook.signing_secret().is_none());

        webhook.secret_token = Some("s3cr3t".to_string());
        assert_eq!(webhook.signing_secret(), Some("s3cr3t"));
    }

    #[test]
    fn delivery_status_display_format() {
        assert_eq!(DeliveryStatus::Pending.to_string(), "pending");
        assert_eq!(DeliveryStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(DeliveryStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn terminal_statuses_identified() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Succeeded.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
    }

    #[test]
    fn new_delivery_starts_pending() {
        let now = Utc::now();
        let delivery = Delivery::new(WebhookId::new(), "{}".to_string(), now);

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.delivery_attempts, 0);
        assert_eq!(delivery.scheduled_at, now);
    }
}
