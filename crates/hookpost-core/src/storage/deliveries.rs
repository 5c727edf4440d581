//! Repository for delivery queue database operations.
//!
//! The claim query is the concurrency-critical piece of the whole system:
//! `FOR UPDATE OF deliveries SKIP LOCKED` lets any number of dispatch
//! workers poll the same table without blocking each other and without two
//! workers ever holding the same delivery row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Delivery, DeliveryStatus, WebhookId},
    DeliveryId,
};

const DELIVERY_COLUMNS: &str =
    "id, webhook_id, payload, scheduled_at, delivery_attempts, status, created_at, updated_at";

/// Repository for delivery queue database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Claims at most one eligible delivery within a transaction.
    ///
    /// Eligible means: the owning webhook is active, the delivery is
    /// pending, and its `scheduled_at` is not in the future. The oldest
    /// delivery wins. The selected row stays locked until the transaction
    /// commits or rolls back; rows locked by concurrent claimants are
    /// skipped rather than waited on.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn claim_one_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r"
            SELECT deliveries.id, deliveries.webhook_id, deliveries.payload,
                   deliveries.scheduled_at, deliveries.delivery_attempts,
                   deliveries.status, deliveries.created_at, deliveries.updated_at
            FROM deliveries
            INNER JOIN webhooks ON deliveries.webhook_id = webhooks.id
            WHERE webhooks.active = true
              AND deliveries.status = 'pending'
              AND deliveries.scheduled_at <= $1
            ORDER BY deliveries.created_at ASC
            LIMIT 1
            FOR UPDATE OF deliveries SKIP LOCKED
            ",
        )
        .bind(now)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(delivery)
    }

    /// Persists a delivery's post-attempt state within a transaction.
    ///
    /// Only the fields the dispatch transaction owns are written: attempts,
    /// status, scheduled_at and updated_at.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery: &Delivery,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET delivery_attempts = $1,
                status = $2,
                scheduled_at = $3,
                updated_at = $4
            WHERE id = $5
            ",
        )
        .bind(delivery.delivery_attempts)
        .bind(delivery.status.to_string())
        .bind(delivery.scheduled_at)
        .bind(delivery.updated_at)
        .bind(delivery.id.0)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Creates a new delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails, e.g. the webhook does not exist.
    pub async fn create(&self, delivery: &Delivery) -> Result<DeliveryId> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO deliveries (
                id, webhook_id, payload, scheduled_at, delivery_attempts,
                status, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            RETURNING id
            ",
        )
        .bind(delivery.id.0)
        .bind(delivery.webhook_id.0)
        .bind(&delivery.payload)
        .bind(delivery.scheduled_at)
        .bind(delivery.delivery_attempts)
        .bind(delivery.status.to_string())
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(DeliveryId(id))
    }

    /// Finds a delivery by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
        self.find_by_id_impl(&*self.pool, delivery_id).await
    }

    async fn find_by_id_impl<'e, E>(
        &self,
        executor: E,
        delivery_id: DeliveryId,
    ) -> Result<Option<Delivery>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1"
        ))
        .bind(delivery_id.0)
        .fetch_optional(executor)
        .await?;

        Ok(delivery)
    }

    /// Lists deliveries, newest first, optionally filtered by webhook and
    /// status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(
        &self,
        webhook_id: Option<WebhookId>,
        status: Option<DeliveryStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(&format!(
            r"
            SELECT {DELIVERY_COLUMNS} FROM deliveries
            WHERE ($1::UUID IS NULL OR webhook_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(webhook_id.map(|id| id.0))
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }

    /// Deletes a delivery.
    ///
    /// External deletion is allowed from any state; a delete racing with an
    /// in-progress claim surfaces to the claimant as a row that no longer
    /// exists at commit time, which the dispatch transaction tolerates.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, delivery_id: DeliveryId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM deliveries WHERE id = $1")
            .bind(delivery_id.0)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
