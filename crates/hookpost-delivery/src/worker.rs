//! Long-running dispatch loop with cooperative shutdown.
//!
//! One worker runs one sequential loop; scale-out happens by running more
//! worker processes against the same database, not by intra-process
//! parallelism. The skip-locked claim in the dispatch transaction is the
//! only concurrency mechanism.

use std::{sync::Arc, time::Duration};

use hookpost_core::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatcher::Dispatcher;

/// Configuration for the dispatch worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to sleep when the queue is empty or a dispatch errored.
    pub poll_interval: Duration,

    /// Maximum time to wait for the loop to drain at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            shutdown_timeout: Duration::from_secs(crate::DEFAULT_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Sequential dispatch loop over a `Dispatcher`.
pub struct DispatchWorker {
    dispatcher: Arc<Dispatcher>,
    config: WorkerConfig,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl DispatchWorker {
    /// Creates a new worker.
    pub fn new(dispatcher: Arc<Dispatcher>, config: WorkerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { dispatcher, config, clock, cancellation_token: CancellationToken::new() }
    }

    /// Requests the loop to stop.
    ///
    /// Safe to call from any task, concurrently with `run`. The loop exits
    /// at the next iteration boundary; an in-flight dispatch is never
    /// aborted.
    pub fn shutdown(&self) {
        info!("dispatch worker shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Runs the dispatch loop until `shutdown` is called.
    ///
    /// Per iteration:
    /// - a produced attempt is logged and the loop re-polls immediately, so
    ///   a backlog drains at full speed;
    /// - an empty queue sleeps one poll interval;
    /// - a dispatch error is logged and treated as transient — the loop is
    ///   designed to run indefinitely and never terminates on storage
    ///   blips.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            "dispatch worker started"
        );

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.dispatcher.dispatch_one().await {
                Ok(Some(attempt)) => {
                    info!(
                        attempt_id = %attempt.id,
                        webhook_id = %attempt.webhook_id,
                        delivery_id = %attempt.delivery_id,
                        response_status_code = attempt.response_status_code,
                        execution_duration_ms = attempt.execution_duration,
                        success = attempt.success,
                        "delivery attempt recorded"
                    );
                },
                Ok(None) => {
                    if self.idle_wait().await {
                        break;
                    }
                },
                Err(dispatch_error) => {
                    error!(error = %dispatch_error, "dispatch failed");
                    if self.idle_wait().await {
                        break;
                    }
                },
            }
        }

        info!("dispatch worker stopped");
    }

    /// Sleeps one poll interval, returning true if shutdown was requested.
    async fn idle_wait(&self) -> bool {
        tokio::select! {
            () = self.clock.sleep(self.config.poll_interval) => false,
            () = self.cancellation_token.cancelled() => true,
        }
    }
}
