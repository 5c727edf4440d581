//! Storage abstraction for the claim-and-dispatch transaction.
//!
//! The dispatch core needs claim, webhook lookup, delivery update and
//! attempt insert to be composable inside one transaction, so the
//! abstraction is a unit-of-work: `DispatchStorage::begin` yields a
//! `DispatchTx` whose writes only land at `commit`. Production uses
//! PostgreSQL row locks; the `mock` module provides an in-memory double with
//! equivalent claim-exclusivity semantics for deterministic tests.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use hookpost_core::{
    error::{CoreError, Result},
    models::{Delivery, DeliveryAttempt, Webhook, WebhookId},
    storage::Storage,
};

/// One in-flight dispatch transaction.
///
/// A claimed delivery stays invisible to concurrent transactions until the
/// transaction finishes. Dropping the transaction without committing rolls
/// it back and releases the claim.
pub trait DispatchTx: Send {
    /// Claims at most one eligible delivery, locking it for this
    /// transaction.
    ///
    /// Returns `None` when no delivery is eligible, including when every
    /// eligible row is locked by a concurrent claimant.
    fn claim_one(
        &mut self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>>> + Send + '_>>;

    /// Loads the webhook owning a claimed delivery.
    ///
    /// `None` means the webhook row disappeared after the claim's
    /// eligibility join, e.g. a concurrent delete.
    fn find_webhook(
        &mut self,
        webhook_id: WebhookId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>>;

    /// Stages the delivery's post-attempt state.
    fn update_delivery(
        &mut self,
        delivery: Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stages one immutable attempt record.
    fn insert_attempt(
        &mut self,
        attempt: DeliveryAttempt,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Commits the transaction, making all staged writes visible.
    ///
    /// A commit failure means nothing was persisted; the caller must not
    /// assume success.
    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;

    /// Rolls the transaction back, discarding staged writes and releasing
    /// the claim.
    fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Factory for dispatch transactions.
pub trait DispatchStorage: Send + Sync + 'static {
    /// Begins a new dispatch transaction.
    fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn DispatchTx>>> + Send + '_>>;
}

/// Production storage implementation backed by PostgreSQL.
///
/// Wraps the core repositories so the dispatch transaction runs their
/// `_in_tx` variants over a single `sqlx::Transaction`; the `FOR UPDATE
/// SKIP LOCKED` claim in the deliveries repository is what makes concurrent
/// workers safe.
pub struct PgDispatchStorage {
    storage: Arc<Storage>,
}

impl PgDispatchStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl DispatchStorage for PgDispatchStorage {
    fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn DispatchTx>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let tx = storage.deliveries.pool().begin().await.map_err(CoreError::from)?;
            Ok(Box::new(PgDispatchTx { storage, tx }) as Box<dyn DispatchTx>)
        })
    }
}

struct PgDispatchTx {
    storage: Arc<Storage>,
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl DispatchTx for PgDispatchTx {
    fn claim_one(
        &mut self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>>> + Send + '_>> {
        let storage = self.storage.clone();
        let tx = &mut self.tx;
        Box::pin(async move { storage.deliveries.claim_one_in_tx(tx, now).await })
    }

    fn find_webhook(
        &mut self,
        webhook_id: WebhookId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
        let storage = self.storage.clone();
        let tx = &mut self.tx;
        Box::pin(async move { storage.webhooks.find_by_id_in_tx(tx, webhook_id).await })
    }

    fn update_delivery(
        &mut self,
        delivery: Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        let tx = &mut self.tx;
        Box::pin(async move { storage.deliveries.update_in_tx(tx, &delivery).await })
    }

    fn insert_attempt(
        &mut self,
        attempt: DeliveryAttempt,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        let tx = &mut self.tx;
        Box::pin(async move {
            storage.delivery_attempts.create_in_tx(tx, &attempt).await.map(|_| ())
        })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            let this = *self;
            this.tx.commit().await.map_err(CoreError::from)?;
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            let this = *self;
            this.tx.rollback().await.map_err(CoreError::from)?;
            Ok(())
        })
    }
}

pub mod mock {
    //! In-memory dispatch storage for testing without a database.
    //!
    //! Emulates the row-lock semantics the dispatch transaction relies on: a
    //! claimed delivery is invisible to other transactions until the claim
    //! is released by commit, rollback or drop. Writes are staged and only
    //! applied at commit. Claim and commit failures can be injected to
    //! exercise the error paths.

    use std::{
        collections::{HashMap, HashSet},
        sync::{Arc, Mutex, PoisonError},
    };

    use chrono::{DateTime, Utc};
    use hookpost_core::models::DeliveryId;

    use super::{
        CoreError, Delivery, DeliveryAttempt, DispatchStorage, DispatchTx, Future, Pin, Result,
        Webhook, WebhookId,
    };

    #[derive(Default)]
    struct MockState {
        webhooks: HashMap<WebhookId, Webhook>,
        deliveries: HashMap<DeliveryId, Delivery>,
        attempts: Vec<DeliveryAttempt>,
        locked: HashSet<DeliveryId>,
        claim_error: Option<String>,
        commit_error: Option<String>,
    }

    /// Mock storage for testing dispatch logic without a database.
    #[derive(Clone, Default)]
    pub struct MockDispatchStorage {
        state: Arc<Mutex<MockState>>,
    }

    impl MockDispatchStorage {
        /// Creates a new mock storage with empty state.
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Registers a webhook.
        pub fn add_webhook(&self, webhook: Webhook) {
            self.lock().webhooks.insert(webhook.id, webhook);
        }

        /// Enqueues a delivery.
        pub fn add_delivery(&self, delivery: Delivery) {
            self.lock().deliveries.insert(delivery.id, delivery);
        }

        /// Returns the current state of a delivery.
        pub fn delivery(&self, delivery_id: DeliveryId) -> Option<Delivery> {
            self.lock().deliveries.get(&delivery_id).cloned()
        }

        /// Returns all recorded attempts, in insertion order.
        pub fn recorded_attempts(&self) -> Vec<DeliveryAttempt> {
            self.lock().attempts.clone()
        }

        /// Fails the next claim with the given message.
        pub fn inject_claim_error(&self, message: impl Into<String>) {
            self.lock().claim_error = Some(message.into());
        }

        /// Fails the next commit with the given message.
        pub fn inject_commit_error(&self, message: impl Into<String>) {
            self.lock().commit_error = Some(message.into());
        }
    }

    impl DispatchStorage for MockDispatchStorage {
        fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn DispatchTx>>> + Send + '_>> {
            let state = self.state.clone();
            Box::pin(async move {
                Ok(Box::new(MockDispatchTx {
                    state,
                    claimed: None,
                    staged_delivery: None,
                    staged_attempt: None,
                    finished: false,
                }) as Box<dyn DispatchTx>)
            })
        }
    }

    struct MockDispatchTx {
        state: Arc<Mutex<MockState>>,
        claimed: Option<DeliveryId>,
        staged_delivery: Option<Delivery>,
        staged_attempt: Option<DeliveryAttempt>,
        finished: bool,
    }

    impl MockDispatchTx {
        fn release(&mut self) {
            if let Some(delivery_id) = self.claimed.take() {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.locked.remove(&delivery_id);
            }
            self.finished = true;
        }
    }

    impl Drop for MockDispatchTx {
        fn drop(&mut self) {
            // Parity with sqlx: dropping an unfinished transaction rolls it
            // back and releases its row locks.
            if !self.finished {
                self.release();
            }
        }
    }

    impl DispatchTx for MockDispatchTx {
        fn claim_one(
            &mut self,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

                if let Some(message) = state.claim_error.take() {
                    return Err(CoreError::Database(message));
                }

                let eligible = state
                    .deliveries
                    .values()
                    .filter(|d| {
                        d.status == hookpost_core::DeliveryStatus::Pending
                            && d.scheduled_at <= now
                            && !state.locked.contains(&d.id)
                            && state.webhooks.get(&d.webhook_id).is_some_and(|w| w.active)
                    })
                    .min_by_key(|d| (d.created_at, d.id.0))
                    .cloned();

                if let Some(delivery) = eligible {
                    state.locked.insert(delivery.id);
                    self.claimed = Some(delivery.id);
                    Ok(Some(delivery))
                } else {
                    Ok(None)
                }
            })
        }

        fn find_webhook(
            &mut self,
            webhook_id: WebhookId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
            Box::pin(async move {
                let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(state.webhooks.get(&webhook_id).cloned())
            })
        }

        fn update_delivery(
            &mut self,
            delivery: Delivery,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.staged_delivery = Some(delivery);
                Ok(())
            })
        }

        fn insert_attempt(
            &mut self,
            attempt: DeliveryAttempt,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.staged_attempt = Some(attempt);
                Ok(())
            })
        }

        fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
            Box::pin(async move {
                let mut this = *self;
                {
                    let mut state = this.state.lock().unwrap_or_else(PoisonError::into_inner);

                    if let Some(message) = state.commit_error.take() {
                        drop(state);
                        this.release();
                        return Err(CoreError::Database(message));
                    }

                    if let Some(delivery) = this.staged_delivery.take() {
                        state.deliveries.insert(delivery.id, delivery);
                    }
                    if let Some(attempt) = this.staged_attempt.take() {
                        state.attempts.push(attempt);
                    }
                }
                this.release();
                Ok(())
            })
        }

        fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
            Box::pin(async move {
                let mut this = *self;
                this.release();
                Ok(())
            })
        }
    }
}
