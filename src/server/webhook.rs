//! Webhook endpoint handler.
//!
//! Verifies and parses GitHub deliveries, then hands them to intake through
//! the delivery channel and returns 202 Accepted. Backports run afterwards.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::AppState;
use crate::types::DeliveryId;
use crate::webhooks::{Delivery, ParseError, SignatureError, parse_webhook};

const HEADER_EVENT: &str = "x-github-event";
const HEADER_DELIVERY: &str = "x-github-delivery";
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),

    /// Intake is not keeping up, or has stopped.
    #[error("intake unavailable")]
    Unavailable,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /webhook`.
///
/// Requires `X-GitHub-Event`, `X-GitHub-Delivery` and `X-Hub-Signature-256`.
///
/// - 202 Accepted: handed to intake, or an event the bot ignores
/// - 400 Bad Request: missing header or malformed payload
/// - 401 Unauthorized: bad signature
/// - 503 Service Unavailable: intake is full or gone
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = DeliveryId::new(get_header(&headers, HEADER_DELIVERY)?);

    // Signature first: nothing is parsed for unauthenticated requests.
    if let Err(e) = app_state
        .verifier()
        .verify(&body, headers.get(HEADER_SIGNATURE).and_then(|v| v.to_str().ok()))
    {
        warn!(delivery_id = %delivery_id, error = %e, "Rejected webhook delivery");
        return Err(e.into());
    }

    let event = match parse_webhook(event_type, &body) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(delivery_id = %delivery_id, event_type, "Ignoring webhook event");
            return Ok((StatusCode::ACCEPTED, "Ignored"));
        }
        Err(e) => {
            warn!(delivery_id = %delivery_id, event_type, error = %e, "Malformed webhook payload");
            return Err(e.into());
        }
    };

    info!(
        delivery_id = %delivery_id,
        event_type,
        repo = %event.repo_id(),
        "Webhook accepted"
    );

    let delivery = Delivery {
        id: delivery_id,
        event,
    };
    match app_state.deliveries().try_send(delivery) {
        Ok(()) => Ok((StatusCode::ACCEPTED, "Accepted")),
        Err(TrySendError::Full(delivery)) => {
            warn!(delivery_id = %delivery.id, "Intake queue full, dropping delivery");
            Err(WebhookError::Unavailable)
        }
        Err(TrySendError::Closed(delivery)) => {
            warn!(delivery_id = %delivery.id, "Intake has stopped, dropping delivery");
            Err(WebhookError::Unavailable)
        }
    }
}

fn get_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}
