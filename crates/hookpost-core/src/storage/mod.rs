//! Database access layer implementing the repository pattern.
//!
//! The repositories translate between domain models and the database schema.
//! All database operations go through this module; the dispatch core composes
//! the `_in_tx` variants into its single claim-and-dispatch transaction.

use std::sync::Arc;

use sqlx::PgPool;

pub mod deliveries;
pub mod delivery_attempts;
pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook configuration.
    pub webhooks: Arc<webhooks::Repository>,

    /// Repository for delivery queue operations.
    pub deliveries: Arc<deliveries::Repository>,

    /// Repository for the delivery attempt audit trail.
    pub delivery_attempts: Arc<delivery_attempts::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    ///
    /// All repositories share the same pool behind an `Arc`.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            webhooks: Arc::new(webhooks::Repository::new(pool.clone())),
            deliveries: Arc::new(deliveries::Repository::new(pool.clone())),
            delivery_attempts: Arc::new(delivery_attempts::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.deliveries.pool()).await?;

        Ok(())
    }
}
