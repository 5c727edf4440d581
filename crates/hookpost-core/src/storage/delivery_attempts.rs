//! Repository for the delivery attempt audit trail.
//!
//! Attempts are immutable once created; there are no update or delete
//! operations here by design.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{DeliveryAttempt, DeliveryId, WebhookId},
};

const ATTEMPT_COLUMNS: &str = "id, webhook_id, delivery_id, raw_request, raw_response, \
                               response_status_code, execution_duration, success, error, \
                               created_at";

/// Repository for delivery attempt database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records a delivery attempt within a transaction.
    ///
    /// The dispatch transaction inserts the attempt in the same transaction
    /// that updates the delivery row, so either both land or neither does.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        attempt: &DeliveryAttempt,
    ) -> Result<Uuid> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO delivery_attempts (
                id, webhook_id, delivery_id, raw_request, raw_response,
                response_status_code, execution_duration, success, error, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            RETURNING id
            ",
        )
        .bind(attempt.id)
        .bind(attempt.webhook_id.0)
        .bind(attempt.delivery_id.0)
        .bind(&attempt.raw_request)
        .bind(&attempt.raw_response)
        .bind(attempt.response_status_code)
        .bind(attempt.execution_duration)
        .bind(attempt.success)
        .bind(&attempt.error)
        .bind(attempt.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    /// Finds an attempt by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, attempt_id: Uuid) -> Result<Option<DeliveryAttempt>> {
        let attempt = sqlx::query_as::<_, DeliveryAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM delivery_attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(attempt)
    }

    /// Lists attempts, newest first, optionally filtered by webhook and
    /// delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(
        &self,
        webhook_id: Option<WebhookId>,
        delivery_id: Option<DeliveryId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryAttempt>> {
        let attempts = sqlx::query_as::<_, DeliveryAttempt>(&format!(
            r"
            SELECT {ATTEMPT_COLUMNS} FROM delivery_attempts
            WHERE ($1::UUID IS NULL OR webhook_id = $1)
              AND ($2::UUID IS NULL OR delivery_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(webhook_id.map(|id| id.0))
        .bind(delivery_id.map(|id| id.0))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
