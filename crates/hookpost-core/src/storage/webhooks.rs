//! Repository for webhook database operations.

use std::sync::Arc;

use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Webhook, WebhookId},
};

const WEBHOOK_COLUMNS: &str = "id, name, url, content_type, valid_status_codes, secret_token, \
                               active, max_delivery_attempts, delivery_attempt_timeout, \
                               retry_min_backoff, retry_max_backoff, created_at, updated_at";

/// Repository for webhook database operations.
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

    /// Creates a new webhook.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or constraints are violated.
    pub async fn create(&self, webhook: &Webhook) -> Result<WebhookId> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO webhooks (
                id, name, url, content_type, valid_status_codes, secret_token,
                active, max_delivery_attempts, delivery_attempt_timeout,
                retry_min_backoff, retry_max_backoff, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
            )
            RETURNING id
            ",
        )
        .bind(webhook.id.0)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.content_type)
        .bind(&webhook.valid_status_codes)
        .bind(&webhook.secret_token)
        .bind(webhook.active)
        .bind(webhook.max_delivery_attempts)
        .bind(webhook.delivery_attempt_timeout)
        .bind(webhook.retry_min_backoff)
        .bind(webhook.retry_max_backoff)
        .bind(webhook.created_at)
        .bind(webhook.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(WebhookId(id))
    }

    /// Updates a webhook's configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update(&self, webhook: &Webhook) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhooks
            SET name = $1,
                url = $2,
                content_type = $3,
                valid_status_codes = $4,
                secret_token = $5,
                active = $6,
                max_delivery_attempts = $7,
                delivery_attempt_timeout = $8,
                retry_min_backoff = $9,
                retry_max_backoff = $10,
                updated_at = $11
            WHERE id = $12
            ",
        )
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.content_type)
        .bind(&webhook.valid_status_codes)
        .bind(&webhook.secret_token)
        .bind(webhook.active)
        .bind(webhook.max_delivery_attempts)
        .bind(webhook.delivery_attempt_timeout)
        .bind(webhook.retry_min_backoff)
        .bind(webhook.retry_max_backoff)
        .bind(webhook.updated_at)
        .bind(webhook.id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a webhook by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, webhook_id: WebhookId) -> Result<Option<Webhook>> {
        self.find_by_id_impl(&*self.pool, webhook_id).await
    }

    /// Finds a webhook by ID within a transaction.
    ///
    /// Used by the dispatch transaction after claiming a delivery so the
    /// webhook read observes the same snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        webhook_id: WebhookId,
    ) -> Result<Option<Webhook>> {
        self.find_by_id_impl(&mut **tx, webhook_id).await
    }

    async fn find_by_id_impl<'e, E>(&self, executor: E, webhook_id: WebhookId) -> Result<Option<Webhook>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let webhook = sqlx::query_as::<_, Webhook>(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1"
        ))
        .bind(webhook_id.0)
        .fetch_optional(executor)
        .await?;

        Ok(webhook)
    }

    /// Lists webhooks ordered by name, optionally filtered by active flag.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self, active: Option<bool>, limit: i64, offset: i64) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(&format!(
            r"
            SELECT {WEBHOOK_COLUMNS} FROM webhooks
            WHERE ($1::BOOLEAN IS NULL OR active = $1)
            ORDER BY name ASC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }

    /// Deletes a webhook and, via foreign keys, its deliveries and attempts.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, webhook_id: WebhookId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(webhook_id.0)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
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
