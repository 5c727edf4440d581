//! HTTP server configuration and request routing.
//!
//! Requests flow through the middleware stack in order: request ID
//! injection, request/response tracing, timeout enforcement, then the
//! handler.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, AppState};

/// Creates the axum router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check));

    let api_routes = Router::new()
        .route(
            "/v1/webhooks",
            get(handlers::list_webhooks).post(handlers::create_webhook),
        )
        .route(
            "/v1/webhooks/{webhook_id}",
            get(handlers::get_webhook)
                .put(handlers::update_webhook)
                .delete(handlers::delete_webhook),
        )
        .route(
            "/v1/deliveries",
            get(handlers::list_deliveries).post(handlers::create_delivery),
        )
        .route(
            "/v1/deliveries/{delivery_id}",
            get(handlers::get_delivery).delete(handlers::delete_delivery),
        )
        .route("/v1/delivery-attempts", get(handlers::list_delivery_attempts))
        .route("/v1/delivery-attempts/{attempt_id}", get(handlers::get_delivery_attempt));

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware adding an `X-Request-Id` header to every response.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Binds the listener and serves the API until the process exits.
///
/// # Errors
///
/// Returns error if the address cannot be bound or the server fails.
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
