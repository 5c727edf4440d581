//! hookpost webhook delivery service.
//!
//! Main entry point: wires configuration, the database pool, the CRUD API
//! server and the dispatch worker together, and coordinates graceful
//! startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookpost_api::{AppState, Config};
use hookpost_core::{storage::Storage, RealClock};
use hookpost_delivery::{
    DeliveryExecutor, DispatchWorker, Dispatcher, PgDispatchStorage,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("starting hookpost webhook delivery service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        poll_interval_ms = config.poll_interval_ms,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&db_pool).await?;
    info!("database migrations completed");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let clock = Arc::new(RealClock);

    // Dispatch worker
    let worker_config = config.to_worker_config();
    let shutdown_timeout = worker_config.shutdown_timeout;
    let executor = DeliveryExecutor::new(config.to_executor_config(), clock.clone())?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(PgDispatchStorage::new(storage.clone())),
        executor,
        clock.clone(),
    ));
    let worker = Arc::new(DispatchWorker::new(dispatcher, worker_config, clock.clone()));
    let worker_handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    // API server
    let addr = config.parse_server_addr()?;
    let server_handle = tokio::spawn({
        let state = AppState::new(storage, clock);
        async move {
            if let Err(e) = hookpost_api::start_server(state, addr).await {
                error!(error = %e, "API server failed");
            }
        }
    });

    info!(%addr, "hookpost is ready");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    // Let the worker finish its in-flight dispatch, then stop everything.
    worker.shutdown();
    if tokio::time::timeout(shutdown_timeout, worker_handle).await.is_err() {
        error!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "dispatch worker did not stop within the shutdown timeout"
        );
    }
    server_handle.abort();

    db_pool.close().await;
    info!("database connections closed");

    info!("hookpost shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{default_filter},hookpost=debug")))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Ensures the schema exists.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS webhooks (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            content_type TEXT NOT NULL,
            valid_status_codes INTEGER[] NOT NULL,
            secret_token TEXT,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            max_delivery_attempts INTEGER NOT NULL CHECK (max_delivery_attempts >= 1),
            delivery_attempt_timeout INTEGER NOT NULL CHECK (delivery_attempt_timeout >= 1),
            retry_min_backoff INTEGER NOT NULL CHECK (retry_min_backoff >= 1),
            retry_max_backoff INTEGER NOT NULL CHECK (retry_max_backoff >= 1),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create webhooks table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS deliveries (
            id UUID PRIMARY KEY,
            webhook_id UUID NOT NULL REFERENCES webhooks(id) ON DELETE CASCADE,
            payload TEXT NOT NULL,
            scheduled_at TIMESTAMPTZ NOT NULL,
            delivery_attempts INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create deliveries table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS delivery_attempts (
            id UUID PRIMARY KEY,
            webhook_id UUID NOT NULL,
            delivery_id UUID NOT NULL REFERENCES deliveries(id) ON DELETE CASCADE,
            raw_request TEXT NOT NULL,
            raw_response TEXT,
            response_status_code INTEGER,
            execution_duration INTEGER NOT NULL,
            success BOOLEAN NOT NULL,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create delivery_attempts table")?;

    // The claim query's hot path: pending deliveries in created_at order.
    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_deliveries_pending
        ON deliveries(scheduled_at, created_at)
        WHERE status = 'pending'
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create deliveries claim index")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_deliveries_webhook
        ON deliveries(webhook_id, created_at DESC)
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create deliveries webhook index")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_delivery_attempts_delivery
        ON delivery_attempts(delivery_id, created_at)
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create delivery_attempts index")?;

    Ok(())
}

/// Waits for a shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
