//! The claim-and-dispatch transaction.
//!
//! `dispatch_one` is the single most important operation in the system: it
//! claims one eligible delivery under a row lock, executes the HTTP attempt
//! while holding the lock, computes the delivery's next state, and persists
//! the updated row together with an immutable attempt record — all in one
//! transaction. The lock only blocks competing claimants of the same row,
//! and the webhook's per-attempt timeout bounds how long it is held.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use hookpost_core::{
    models::{Delivery, DeliveryAttempt, DeliveryStatus, Webhook},
    Clock,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    backoff,
    error::Result,
    executor::DeliveryExecutor,
    storage::DispatchStorage,
};

/// Executes single delivery attempts transactionally.
pub struct Dispatcher {
    storage: Arc<dyn DispatchStorage>,
    executor: DeliveryExecutor,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        storage: Arc<dyn DispatchStorage>,
        executor: DeliveryExecutor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, executor, clock }
    }

    /// Claims and executes at most one pending delivery.
    ///
    /// Returns the newly created attempt record, or `None` when no delivery
    /// was eligible at poll time — an empty queue is not an error.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Storage` if the transaction fails at any
    /// step; the transaction is rolled back and no partial state is
    /// persisted. Delivery-level failures (timeouts, bad status codes) are
    /// recorded in the attempt, not surfaced here.
    pub async fn dispatch_one(&self) -> Result<Option<DeliveryAttempt>> {
        let mut tx = self.storage.begin().await?;

        let Some(delivery) = tx.claim_one(self.clock.now_utc()).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let Some(webhook) = tx.find_webhook(delivery.webhook_id).await? else {
            // The webhook was deleted between the eligibility join and this
            // read. The claim is moot; treat it as an empty queue.
            debug!(
                delivery_id = %delivery.id,
                webhook_id = %delivery.webhook_id,
                "webhook disappeared during claim"
            );
            tx.rollback().await?;
            return Ok(None);
        };

        debug!(
            delivery_id = %delivery.id,
            webhook_id = %webhook.id,
            attempt = delivery.delivery_attempts + 1,
            url = %webhook.url,
            "dispatching delivery"
        );

        // The HTTP call happens while the row lock is held; competing
        // workers skip this row instead of waiting on it.
        let outcome = self.executor.execute(&webhook, &delivery).await;

        let now = self.clock.now_utc();
        let next = plan_transition(&delivery, &webhook, outcome.success, now);
        let updated = Delivery {
            delivery_attempts: next.delivery_attempts,
            status: next.status,
            scheduled_at: next.scheduled_at,
            updated_at: now,
            ..delivery
        };

        let attempt = DeliveryAttempt {
            id: Uuid::new_v4(),
            webhook_id: webhook.id,
            delivery_id: updated.id,
            raw_request: outcome.raw_request,
            raw_response: outcome.raw_response,
            response_status_code: outcome.response_status.map(i32::from),
            execution_duration: outcome.duration_ms,
            success: outcome.success,
            error: outcome.error,
            created_at: now,
        };

        tx.update_delivery(updated).await?;
        tx.insert_attempt(attempt.clone()).await?;
        tx.commit().await?;

        Ok(Some(attempt))
    }
}

/// The delivery's next state after an attempt.
#[derive(Debug, PartialEq, Eq)]
struct Transition {
    delivery_attempts: i32,
    status: DeliveryStatus,
    scheduled_at: DateTime<Utc>,
}

/// Computes the state transition for a delivery after one attempt.
///
/// The backoff delay is derived from the attempt count *before* this
/// attempt, so a delivery's first retry waits exactly `retry_min_backoff`.
/// Terminal transitions leave `scheduled_at` untouched.
fn plan_transition(
    delivery: &Delivery,
    webhook: &Webhook,
    success: bool,
    now: DateTime<Utc>,
) -> Transition {
    let delivery_attempts = delivery.delivery_attempts.saturating_add(1);

    if success {
        return Transition {
            delivery_attempts,
            status: DeliveryStatus::Succeeded,
            scheduled_at: delivery.scheduled_at,
        };
    }

    if delivery_attempts >= webhook.max_delivery_attempts {
        return Transition {
            delivery_attempts,
            status: DeliveryStatus::Failed,
            scheduled_at: delivery.scheduled_at,
        };
    }

    let delay = backoff::retry_delay(
        u32::try_from(delivery.delivery_attempts).unwrap_or(u32::MAX),
        Duration::from_secs(u64::try_from(webhook.retry_min_backoff).unwrap_or(0).max(1)),
        Duration::from_secs(u64::try_from(webhook.retry_max_backoff).unwrap_or(0).max(1)),
    );

    Transition {
        delivery_attempts,
        status: DeliveryStatus::Pending,
        scheduled_at: now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
    }
}
