//! Shared shutdown signaling between bridge tasks.
//!
//! Tasks never touch each other's state; they only see:
//! - a [`CancellationToken`] (broadcast, idempotent "done")
//! - an [`ErrorSlot`] (first fatal error wins, later ones are dropped)

use tokio::sync::mpsc;
pub use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// Write side of the error slot. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct ErrorSlot {
    tx: mpsc::Sender<BridgeError>,
}

/// Read side of the error slot, held by the coordinator.
#[derive(Debug)]
pub struct ErrorReceiver {
    rx: mpsc::Receiver<BridgeError>,
}

impl ErrorSlot {
    pub fn new() -> (Self, ErrorReceiver) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, ErrorReceiver { rx })
    }

    /// Record `err` if the slot is empty. Returns whether it was kept.
    pub fn publish(&self, err: BridgeError) -> bool {
        match self.tx.try_send(err) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(err))
            | Err(mpsc::error::TrySendError::Closed(err)) => {
                tracing::debug!(error = %err, "Error slot occupied, discarding");
                false
            }
        }
    }
}

impl ErrorReceiver {
    /// Wait for the first published error.
    ///
    /// Returns `None` only once every [`ErrorSlot`] has been dropped.
    pub async fn recv(&mut self) -> Option<BridgeError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BridgeError> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    fn stderr_error(msg: &str) -> BridgeError {
        BridgeError::HostStderr(std::io::Error::other(msg.to_string()))
    }

    #[tokio::test]
    async fn first_writer_wins() {
        let (slot, mut rx) = ErrorSlot::new();
        assert!(slot.publish(stderr_error("first")));
        assert!(!slot.clone().publish(stderr_error("second")));

        let err = rx.recv().await.unwrap();
        assert_eq!(err.to_string(), "host stderr: first");
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn publish_after_receiver_dropped_is_silent() {
        let (slot, rx) = ErrorSlot::new();
        drop(rx);
        assert!(!slot.publish(stderr_error("late")));
    }

    #[tokio::test]
    async fn recv_ends_when_all_slots_dropped() {
        let (slot, mut rx) = ErrorSlot::new();
        drop(slot);
        assert!(rx.recv().await.is_none());
    }
}
