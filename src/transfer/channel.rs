//! Saga event bus
//!
//! Handlers publish the next step's event onto the same bus they consume, so
//! the in-process channel is unbounded: a bounded one could block the only
//! consumer on its own send.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::SagaEvent;
use crate::error::WalletError;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: SagaEvent) -> Result<(), WalletError>;
}

/// Sender side, cloned into the saga and the recovery worker
#[derive(Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<SagaEvent>,
}

/// Receiver side, owned by the saga worker
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<SagaEvent>,
}

impl EventReceiver {
    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<SagaEvent> {
        self.rx.try_recv().ok()
    }

    /// `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<SagaEvent> {
        self.rx.recv().await
    }
}

/// Create a connected bus/receiver pair
pub fn event_channel() -> (ChannelBus, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelBus { tx }, EventReceiver { rx })
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn publish(&self, event: SagaEvent) -> Result<(), WalletError> {
        debug!(xid = event.xid(), event = event.name(), "Publishing saga event");
        self.tx
            .send(event)
            .map_err(|_| WalletError::Unknown("Saga event channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive_in_order() {
        let (bus, mut rx) = event_channel();
        bus.publish(SagaEvent::TransferMaterialized { xid: 1 })
            .await
            .unwrap();
        bus.publish(SagaEvent::TransferCredited { xid: 1 })
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(SagaEvent::TransferMaterialized { xid: 1 }));
        assert_eq!(rx.try_recv(), Some(SagaEvent::TransferCredited { xid: 1 }));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (bus, rx) = event_channel();
        drop(rx);
        let err = bus
            .publish(SagaEvent::TransferCredited { xid: 3 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_dropped() {
        let (bus, mut rx) = event_channel();
        drop(bus);
        assert_eq!(rx.recv().await, None);
    }
}
