//! HTTP request handlers.
//!
//! Handlers follow a consistent pattern: deserialize and validate input,
//! call the repository, map `CoreError` onto a standardized error response.
//! No dispatch logic lives here.

pub mod deliveries;
pub mod delivery_attempts;
pub mod health;
pub mod webhooks;

pub use deliveries::{create_delivery, delete_delivery, get_delivery, list_deliveries};
pub use delivery_attempts::{get_delivery_attempt, list_delivery_attempts};
pub use health::{health_check, liveness_check, readiness_check};
pub use webhooks::{create_webhook, delete_webhook, get_webhook, list_webhooks, update_webhook};
