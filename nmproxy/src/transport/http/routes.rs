//! Ingress request handling.
//!
//! Every request ends in an explicit status:
//! - `200` enqueued
//! - `400` wrong method, content-type or path
//! - `500` body read failure or bridge shutting down

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
};
use tokio::sync::mpsc;

use crate::bridge::protocol::{MAX_FRAME_LEN, QueuedMessage, Tag, is_frame_content_type};
use crate::signal::CancellationToken;

/// Shared handler state: the queue's producer side plus the shutdown signal.
#[derive(Debug, Clone)]
pub struct IngressState {
    queue: mpsc::Sender<QueuedMessage>,
    cancel: CancellationToken,
}

impl IngressState {
    pub fn new(queue: mpsc::Sender<QueuedMessage>, cancel: CancellationToken) -> Self {
        Self { queue, cancel }
    }

    /// Block until the message is queued or the bridge shuts down.
    async fn enqueue(&self, message: QueuedMessage) -> StatusCode {
        if self.cancel.is_cancelled() {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        let tag = message.tag;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(%tag, "Shutdown while waiting for queue space");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            sent = self.queue.send(message) => match sent {
                Ok(()) => StatusCode::OK,
                Err(_) => {
                    tracing::warn!(%tag, "Dispatcher queue closed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

fn has_frame_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_frame_content_type)
}

async fn receive_frame(
    State(state): State<IngressState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    if method != Method::POST || !has_frame_content_type(&headers) {
        tracing::debug!(%method, path = uri.path(), "Rejected ingress request");
        return StatusCode::BAD_REQUEST;
    }

    let Some(tag) = Tag::from_path(uri.path()) else {
        tracing::debug!(path = uri.path(), "Ingress request for unknown tag");
        return StatusCode::BAD_REQUEST;
    };

    let payload = match axum::body::to_bytes(body, MAX_FRAME_LEN).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(%tag, error = %e, "Failed to read frame body");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    tracing::debug!(%tag, len = payload.len(), "Received frame, queueing");
    state.enqueue(QueuedMessage::new(tag, payload)).await
}

/// Ingress router. Every path goes through one handler; the tag comes from
/// the path itself.
pub fn routes(state: IngressState) -> Router {
    Router::new().fallback(receive_frame).with_state(state)
}
