//! HTTP server for the backport bot.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts GitHub webhook deliveries (returns 202 Accepted)
//! - `GET /health` - Returns 200 if the server is running
//!
//! Accepted deliveries go into a bounded channel; intake consumes it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::webhooks::{Delivery, SignatureVerifier};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

/// Deliveries buffered between the webhook endpoint and intake.
pub const DELIVERY_BUFFER: usize = 256;

/// Creates the channel between the webhook endpoint and intake.
pub fn delivery_channel() -> (mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
    mpsc::channel(DELIVERY_BUFFER)
}

/// Shared application state, passed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    verifier: SignatureVerifier,
    deliveries: mpsc::Sender<Delivery>,
}

impl AppState {
    pub fn new(verifier: SignatureVerifier, deliveries: mpsc::Sender<Delivery>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                verifier,
                deliveries,
            }),
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    pub fn deliveries(&self) -> &mpsc::Sender<Delivery> {
        &self.inner.deliveries
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
