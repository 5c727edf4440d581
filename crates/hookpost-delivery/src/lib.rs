//! Dispatch core for the hookpost webhook delivery service.
//!
//! Implements the hot path that pushes enqueued payloads to their
//! destinations with bounded retries and full attempt auditing:
//!
//! 1. **Claim** — one pending delivery is selected under a row lock using
//!    `FOR UPDATE SKIP LOCKED`, so any number of worker processes can poll
//!    the same table with no double-dispatch and no contention stalls.
//! 2. **Execute** — a signed HTTP POST with the webhook's timeout; success
//!    is membership of the response status in the webhook's valid set.
//! 3. **Transition** — success terminates the delivery, failure either
//!    reschedules it with deterministic exponential backoff or, at the
//!    attempt cap, fails it permanently.
//! 4. **Persist** — the updated delivery row and an immutable
//!    `DeliveryAttempt` audit record land in the same transaction.
//!
//! The [`worker::DispatchWorker`] loops over [`dispatcher::Dispatcher`] at a
//! polling cadence, draining backlogs at full speed and supporting
//! cooperative shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod storage;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use executor::{DeliveryExecutor, ExecutionOutcome, ExecutorConfig};
pub use storage::{DispatchStorage, DispatchTx, PgDispatchStorage};
pub use worker::{DispatchWorker, WorkerConfig};

/// Default worker polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default shutdown drain timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
