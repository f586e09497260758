//! Hub protocol: WebSocket message types exchanged with physical
//! intercom/kiosk units (hubs).
//!
//! Hubs connect to the gateway, identify themselves with `hub_hello`,
//! and then receive concierge events (`visitor_response`, `door_open`)
//! pushed by the backend. The gateway never streams media to hubs; the
//! realtime audio channel goes directly to the model provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubMessage {
    /// Hub → Gateway: initial handshake.
    #[serde(rename = "hub_hello")]
    HubHello { hub_id: String, version: String },

    /// Gateway → Hub: handshake accepted.
    #[serde(rename = "gateway_welcome")]
    GatewayWelcome {
        session_id: String,
        gateway_version: String,
    },

    /// Gateway → Hub: a resident answered (or the request expired).
    #[serde(rename = "visitor_response")]
    VisitorResponse {
        session_id: String,
        approved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        visit_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        responded_by: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Gateway → Hub: open the physical access for an approved visit.
    #[serde(rename = "door_open")]
    DoorOpen { access: AccessKind, visit_id: Uuid },

    /// Bidirectional: heartbeat.
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}

/// Which access a `door_open` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Pedestrian,
    Vehicular,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_wire_format() {
        let msg = HubMessage::HubHello {
            hub_id: "hub-01".into(),
            version: "0.1.0".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "hub_hello");
        assert_eq!(json["hub_id"], "hub-01");
    }

    #[test]
    fn door_open_round_trip() {
        let visit_id = Uuid::new_v4();
        let msg = HubMessage::DoorOpen {
            access: AccessKind::Vehicular,
            visit_id,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"access\":\"vehicular\""));
        match serde_json::from_str::<HubMessage>(&json).unwrap() {
            HubMessage::DoorOpen { access, visit_id: v } => {
                assert_eq!(access, AccessKind::Vehicular);
                assert_eq!(v, visit_id);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
