//! Configuration and HTTP API for the hookpost webhook delivery service.
//!
//! The API is a thin CRUD surface over the core repositories: webhooks are
//! managed here, deliveries are enqueued here, and the attempt audit trail
//! is read here. None of the dispatch logic lives in this crate — the
//! handlers never touch the row locks the dispatch transaction uses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use hookpost_core::{storage::Storage, Clock};

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository container.
    pub storage: Arc<Storage>,
    /// Clock used for timestamps, injectable for tests.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }
}
