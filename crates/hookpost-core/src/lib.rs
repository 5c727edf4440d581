//! Core domain models, error taxonomy, clock abstraction and PostgreSQL
//! repositories for the hookpost webhook delivery service.
//!
//! All other crates depend on these foundational types. The dispatch core
//! composes the repositories' `_in_tx` variants into its claim-and-dispatch
//! transaction; the HTTP API calls the pool-level variants directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{Delivery, DeliveryAttempt, DeliveryId, DeliveryStatus, Webhook, WebhookId};
pub use storage::Storage;
pub use time::{Clock, RealClock, TestClock};
