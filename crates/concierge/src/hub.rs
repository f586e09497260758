//! Hub event broadcast.
//!
//! The concierge core announces what happened (`visitor_response`,
//! `door_open`) on a broadcast channel; the gateway's hub WebSocket
//! endpoint forwards every event to connected intercom units. Events
//! for which no hub is listening are dropped; a hub that reconnects
//! re-learns state from the session status endpoint.

use tokio::sync::broadcast;

use porter_hub_protocol::HubMessage;

#[derive(Clone)]
pub struct HubChannel {
    tx: broadcast::Sender<HubMessage>,
}

impl HubChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, message: HubMessage) {
        match self.tx.send(message) {
            Ok(receivers) => {
                tracing::debug!(receivers, "hub event emitted");
            }
            Err(_) => {
                tracing::debug!("hub event dropped (no hubs connected)");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_hub_protocol::AccessKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let channel = HubChannel::new(8);
        let mut rx = channel.subscribe();

        channel.emit(HubMessage::DoorOpen {
            access: AccessKind::Pedestrian,
            visit_id: Uuid::new_v4(),
        });

        match rx.recv().await.unwrap() {
            HubMessage::DoorOpen { access, .. } => assert_eq!(access, AccessKind::Pedestrian),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let channel = HubChannel::new(8);
        channel.emit(HubMessage::Ping { timestamp: 0 });
    }
}
