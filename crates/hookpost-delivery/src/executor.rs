//! HTTP executor for single delivery attempts.
//!
//! Builds the signed POST request, enforces the webhook's per-attempt
//! timeout, and captures full request/response traces for the audit trail.
//! Every failure mode is encoded in the returned outcome; `execute` never
//! returns an error, so one misconfigured endpoint cannot take down the
//! dispatch loop.

use std::{sync::Arc, time::Duration};

use hmac::{Hmac, Mac};
use hookpost_core::{
    models::{Delivery, Webhook},
    Clock,
};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use sha2::Sha256;
use tracing::debug;

use crate::error::{DispatchError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 payload signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Configuration for the delivery executor's HTTP client.
///
/// The request timeout is not configured here; it comes from each webhook's
/// `delivery_attempt_timeout`.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// User agent string for delivery requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            user_agent: "hookpost/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// Structured result of one delivery attempt.
///
/// Exactly one of the failure channels is populated on failure: a response
/// that missed the webhook's valid status set leaves `error` empty, while a
/// transport-level failure leaves `raw_response` and `response_status`
/// empty.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Rendered outgoing request, headers and body included.
    pub raw_request: String,
    /// Rendered response; absent when no response was received.
    pub raw_response: Option<String>,
    /// HTTP status code; absent when no response was received.
    pub response_status: Option<u16>,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: i32,
    /// Whether the response status was in the webhook's valid set.
    pub success: bool,
    /// Transport or request-construction error message.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for an attempt that failed before a request could be sent.
    fn aborted(message: String) -> Self {
        Self {
            raw_request: String::new(),
            raw_response: None,
            response_status: None,
            duration_ms: 0,
            success: false,
            error: Some(message),
        }
    }
}

/// HTTP client for webhook delivery attempts.
///
/// One executor is shared by the dispatch loop; connections are pooled
/// across attempts while per-request timeouts stay webhook-specific.
#[derive(Debug, Clone)]
pub struct DeliveryExecutor {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl DeliveryExecutor {
    /// Creates a new executor with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ExecutorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| DispatchError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, clock })
    }

    /// Executes one delivery attempt against the webhook's URL.
    ///
    /// Success is determined solely by membership of the response status in
    /// `webhook.valid_status_codes`; a 200 against a webhook expecting 201
    /// is a failure. Transport errors short-circuit with the error message
    /// captured and no response trace.
    pub async fn execute(&self, webhook: &Webhook, delivery: &Delivery) -> ExecutionOutcome {
        let request = match self.build_request(webhook, delivery) {
            Ok(request) => request,
            Err(message) => {
                debug!(
                    webhook_id = %webhook.id,
                    delivery_id = %delivery.id,
                    error = %message,
                    "could not build delivery request"
                );
                return ExecutionOutcome::aborted(message);
            },
        };

        let raw_request = render_request_trace(&request, &delivery.payload);

        let started = self.clock.now();
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                let duration = self.clock.now().duration_since(started);
                debug!(
                    webhook_id = %webhook.id,
                    delivery_id = %delivery.id,
                    duration_ms = duration.as_millis(),
                    error = %err,
                    "delivery request failed"
                );
                return ExecutionOutcome {
                    raw_request,
                    raw_response: None,
                    response_status: None,
                    duration_ms: as_millis_i32(duration),
                    success: false,
                    error: Some(err.to_string()),
                };
            },
        };
        let duration = self.clock.now().duration_since(started);

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => format!("[failed to read response body: {err}]"),
        };

        let success = webhook.valid_status_codes.contains(&i32::from(status.as_u16()));

        debug!(
            webhook_id = %webhook.id,
            delivery_id = %delivery.id,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            success,
            "delivery response received"
        );

        ExecutionOutcome {
            raw_request,
            raw_response: Some(render_response_trace(version, status, &headers, &body)),
            response_status: Some(status.as_u16()),
            duration_ms: as_millis_i32(duration),
            success,
            error: None,
        }
    }

    /// Builds the signed POST request for a delivery.
    ///
    /// All construction failures (malformed URL, invalid header values) are
    /// folded into an error message for the outcome.
    fn build_request(
        &self,
        webhook: &Webhook,
        delivery: &Delivery,
    ) -> std::result::Result<reqwest::Request, String> {
        let timeout =
            Duration::from_secs(u64::try_from(webhook.delivery_attempt_timeout).unwrap_or(0).max(1));

        let mut builder = self
            .client
            .post(&webhook.url)
            .timeout(timeout)
            .header(CONTENT_TYPE, &webhook.content_type)
            .body(delivery.payload.clone());

        if let Some(secret) = webhook.signing_secret() {
            builder = builder.header(SIGNATURE_HEADER, signature_hex(delivery.payload.as_bytes(), secret)?);
        }

        builder.build().map_err(|e| e.to_string())
    }
}

/// Computes the hex-encoded HMAC-SHA256 signature of a payload.
///
/// # Errors
///
/// Returns an error message if the secret cannot be used as an HMAC key.
pub fn signature_hex(payload: &[u8], secret: &str) -> std::result::Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid signing secret".to_string())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn as_millis_i32(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Renders the outgoing request as an HTTP/1.1-style trace for auditing.
fn render_request_trace(request: &reqwest::Request, body: &str) -> String {
    let url = request.url();
    let target = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    let mut trace = format!("{} {target} HTTP/1.1\r\n", request.method());
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => trace.push_str(&format!("host: {host}:{port}\r\n")),
            None => trace.push_str(&format!("host: {host}\r\n")),
        }
    }
    append_headers(&mut trace, request.headers());
    trace.push_str("\r\n");
    trace.push_str(body);
    trace
}

/// Renders a received response as an HTTP/1.1-style trace for auditing.
///
/// Stored verbatim; only the status code is ever parsed back out.
fn render_response_trace(
    version: reqwest::Version,
    status: reqwest::StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> String {
    let mut trace = format!("{version:?} {status}\r\n");
    append_headers(&mut trace, headers);
    trace.push_str("\r\n");
    trace.push_str(body);
    trace
}

fn append_headers(trace: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        trace.push_str(&format!("{name}: {}\r\n", value.to_str().unwrap_or("<binary>")));
    }
}
