//! In-memory registry of connected hubs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use porter_hub_protocol::HubMessage;

/// Channel for pushing messages to a hub's WebSocket writer task.
pub type HubSink = mpsc::Sender<HubMessage>;

/// A connected hub.
pub struct ConnectedHub {
    pub hub_id: String,
    pub version: String,
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sink: HubSink,
}

/// Summary info returned by the list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HubInfo {
    pub hub_id: String,
    pub version: String,
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Thread-safe registry of all connected hubs.
pub struct HubRegistry {
    hubs: RwLock<HashMap<String, ConnectedHub>>,
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HubRegistry {
    pub fn new() -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a hub connection. Replaces any existing hub with the
    /// same `hub_id` (reconnect scenario).
    pub fn register(&self, hub: ConnectedHub) {
        let id = hub.hub_id.clone();
        tracing::info!(hub_id = %id, version = %hub.version, "hub registered");
        self.hubs.write().insert(id, hub);
    }

    /// Remove a hub (on disconnect).
    pub fn remove(&self, hub_id: &str) {
        if self.hubs.write().remove(hub_id).is_some() {
            tracing::info!(hub_id = %hub_id, "hub removed");
        }
    }

    /// Update the last_seen timestamp (called on any inbound message).
    pub fn touch(&self, hub_id: &str) {
        if let Some(hub) = self.hubs.write().get_mut(hub_id) {
            hub.last_seen = Utc::now();
        }
    }

    pub fn get_sink(&self, hub_id: &str) -> Option<HubSink> {
        self.hubs.read().get(hub_id).map(|h| h.sink.clone())
    }

    pub fn list(&self) -> Vec<HubInfo> {
        self.hubs
            .read()
            .values()
            .map(|h| HubInfo {
                hub_id: h.hub_id.clone(),
                version: h.version.clone(),
                session_id: h.session_id.clone(),
                connected_at: h.connected_at,
                last_seen: h.last_seen,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.read().is_empty()
    }

    /// Remove hubs that haven't been seen for longer than `timeout_secs`.
    pub fn prune_stale(&self, timeout_secs: i64) {
        let now = Utc::now();
        let mut hubs = self.hubs.write();
        let before = hubs.len();
        hubs.retain(|_, h| {
            let age = now.signed_duration_since(h.last_seen).num_seconds();
            age < timeout_secs
        });
        let pruned = before - hubs.len();
        if pruned > 0 {
            tracing::info!(pruned, remaining = hubs.len(), "pruned stale hubs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(id: &str) -> ConnectedHub {
        let (tx, _rx) = mpsc::channel(1);
        ConnectedHub {
            hub_id: id.into(),
            version: "0.1.0".into(),
            session_id: "ws-1".into(),
            connected_at: Utc::now(),
            last_seen: Utc::now(),
            sink: tx,
        }
    }

    #[test]
    fn register_replaces_duplicate() {
        let reg = HubRegistry::new();
        reg.register(hub("h1"));
        reg.register(hub("h1"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_and_len() {
        let reg = HubRegistry::new();
        reg.register(hub("h1"));
        assert_eq!(reg.len(), 1);
        reg.remove("h1");
        assert!(reg.is_empty());
    }

    #[test]
    fn prune_removes_only_stale_hubs() {
        let reg = HubRegistry::new();
        let mut stale = hub("stale");
        stale.last_seen = Utc::now() - chrono::Duration::seconds(300);
        reg.register(stale);
        reg.register(hub("fresh"));

        reg.prune_stale(120);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].hub_id, "fresh");
    }
}
