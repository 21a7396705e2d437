//! Dispatcher: queued messages → re-framed writes on their destination stream.
//!
//! Single consumer of the ingress queue. Messages left in the queue at
//! cancellation are dropped (at-most-once delivery), but a frame already being
//! written is always finished.

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;

use crate::bridge::codec::FrameCodec;
use crate::bridge::protocol::{QueuedMessage, Tag};
use crate::error::BridgeError;
use crate::signal::{CancellationToken, ErrorSlot};

pub struct Dispatcher<H, P> {
    /// Native messaging host's stdin.
    host: FramedWrite<H, FrameCodec>,
    /// Our own stdout, read by the browser.
    peer: FramedWrite<P, FrameCodec>,
}

impl<H, P> Dispatcher<H, P>
where
    H: AsyncWrite + Unpin,
    P: AsyncWrite + Unpin,
{
    pub fn new(host_input: H, peer_output: P) -> Self {
        Self {
            host: FramedWrite::new(host_input, FrameCodec::new()),
            peer: FramedWrite::new(peer_output, FrameCodec::new()),
        }
    }

    /// Deliver until cancelled or a write fails, which is published to `errors`.
    pub async fn run(
        mut self,
        queue: mpsc::Receiver<QueuedMessage>,
        cancel: CancellationToken,
        errors: ErrorSlot,
    ) {
        match self.pump(queue, &cancel).await {
            Ok(()) => tracing::debug!("Dispatcher stopped"),
            Err(e) => {
                tracing::error!(error = %e, "Dispatcher failed");
                errors.publish(e);
            }
        }
    }

    async fn pump(
        &mut self,
        mut queue: mpsc::Receiver<QueuedMessage>,
        cancel: &CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => return Ok(()),
                },
            };

            // Not raced against cancellation: a frame that has started goes out
            // whole. Killing the host or closing our stdout unblocks it.
            self.deliver(message).await?;
        }
    }

    async fn deliver(&mut self, message: QueuedMessage) -> Result<(), BridgeError> {
        let QueuedMessage { payload, tag } = message;
        tracing::debug!(%tag, len = payload.len(), "Delivering frame");

        let sent = match tag {
            Tag::ToHost => self.host.send(payload).await,
            Tag::ToPeer => self.peer.send(payload).await,
        };
        sent.map_err(|source| BridgeError::Deliver { tag, source })
    }
}
