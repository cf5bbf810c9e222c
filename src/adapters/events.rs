//! Event-driven processing trigger
//!
//! [`ChannelEventPublisher`] pushes "transfer created" signals onto a bounded
//! tokio channel without blocking the create path. [`spawn_event_listener`]
//! drains that channel and runs each new transfer through the process
//! service right away, so the scheduler only has to pick up what the
//! listener missed.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::process_service::{ProcessOutcome, ProcessTransferService};
use crate::core::traits::TransferEventPublisher;
use crate::types::{DeliveryError, TransferData};

const CHANNEL: &str = "transfer-created";

#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::Sender<TransferData>,
}

impl ChannelEventPublisher {
    /// Create a publisher and the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransferData>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TransferEventPublisher for ChannelEventPublisher {
    /// Never waits: a full or closed channel is reported as a delivery error
    fn publish_created(&self, data: TransferData) -> Result<(), DeliveryError> {
        self.tx.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::new(CHANNEL, "channel full"),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::new(CHANNEL, "channel closed"),
        })
    }
}

/// Process every created transfer received on `rx` until cancelled or the
/// channel closes
pub fn spawn_event_listener(
    mut rx: mpsc::Receiver<TransferData>,
    service: Arc<ProcessTransferService>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Transfer event listener started");
        loop {
            let data = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(data) => data,
                    None => break,
                },
            };

            match service.process_by_id(data.transfer_id).await {
                Ok(ProcessOutcome::Settled(view)) => debug!(
                    transfer_id = %view.id,
                    status = %view.status,
                    "Processed transfer from created event"
                ),
                Ok(ProcessOutcome::Skipped { transfer_id, status }) => debug!(
                    %transfer_id,
                    %status,
                    "Transfer already taken by another worker"
                ),
                Err(e) => warn!(
                    transfer_id = %data.transfer_id,
                    error = %e,
                    code = e.code(),
                    "Event-driven processing failed, scheduler will pick it up"
                ),
            }
        }
        info!("Transfer event listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transfer::fixtures::pending_transfer;

    #[tokio::test]
    async fn test_publish_delivers_to_receiver() {
        let (publisher, mut rx) = ChannelEventPublisher::channel(4);
        let data = pending_transfer("K1", "origin", 2, 1000).data();

        publisher.publish_created(data.clone()).unwrap();

        assert_eq!(rx.recv().await, Some(data));
    }

    #[tokio::test]
    async fn test_full_channel_is_delivery_error() {
        let (publisher, _rx) = ChannelEventPublisher::channel(1);
        publisher
            .publish_created(pending_transfer("K1", "origin", 2, 1000).data())
            .unwrap();

        let err = publisher
            .publish_created(pending_transfer("K2", "origin", 2, 1000).data())
            .unwrap_err();

        assert_eq!(err, DeliveryError::new(CHANNEL, "channel full"));
    }

    #[tokio::test]
    async fn test_closed_channel_is_delivery_error() {
        let (publisher, rx) = ChannelEventPublisher::channel(1);
        drop(rx);

        let err = publisher
            .publish_created(pending_transfer("K1", "origin", 2, 1000).data())
            .unwrap_err();

        assert_eq!(err.message, "channel closed");
    }
}
