//! WebSocket endpoint for hub connections.
//!
//! Flow:
//! 1. Hub connects to `/v1/hub/ws?token=<pre-shared-token>`
//! 2. Hub sends `hub_hello` with its id and version
//! 3. Gateway responds with `gateway_welcome`
//! 4. Gateway pushes concierge events (`visitor_response`, `door_open`)
//!    as they happen; both sides exchange `ping`/`pong`

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use porter_hub_protocol::HubMessage;

use crate::hub::registry::ConnectedHub;
use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digest. Hashing
/// normalizes lengths so ct_eq always compares 32 bytes.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query params
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Pre-shared token for hub authentication.
    pub token: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /v1/hub/ws: upgrade to WebSocket.
///
/// When `PORTER_HUB_TOKEN` is set, the hub must present it; unset means
/// open access (dev mode).
pub async fn hub_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if let Ok(expected) = std::env::var("PORTER_HUB_TOKEN") {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_eq(provided, &expected) {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                "invalid or missing hub token",
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // 1. Wait for hub_hello.
    let Some((hub_id, version)) = wait_for_hello(&mut ws_stream).await else {
        tracing::warn!("hub disconnected before sending hub_hello");
        return;
    };

    let session_id = uuid::Uuid::new_v4().to_string();

    // 2. Send gateway_welcome.
    let welcome = HubMessage::GatewayWelcome {
        session_id: session_id.clone(),
        gateway_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    if send_message(&mut ws_sink, &welcome).await.is_err() {
        tracing::warn!(hub_id = %hub_id, "failed to send gateway_welcome");
        return;
    }

    tracing::info!(hub_id = %hub_id, version = %version, session_id = %session_id, "hub connected");

    // 3. Outbound channel: gateway → hub writer task.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<HubMessage>(64);

    // 4. Register the hub.
    state.hubs.register(ConnectedHub {
        hub_id: hub_id.clone(),
        version,
        session_id,
        connected_at: Utc::now(),
        last_seen: Utc::now(),
        sink: outbound_tx.clone(),
    });

    // 5. Forwarder task: concierge events → outbound channel. A lagged
    // receiver just skips ahead; missed events are recoverable through
    // the status endpoint.
    let mut events = state.concierge.hub().subscribe();
    let forward_tx = outbound_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if forward_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "hub event stream lagged");
                }
                Err(_) => break,
            }
        }
    });

    // Writer task: forwards outbound channel messages to the WS sink.
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if send_message(&mut ws_sink, &msg).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: process inbound messages from the hub.
    let registry = state.hubs.clone();
    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                registry.touch(&hub_id);
                match serde_json::from_str::<HubMessage>(&text) {
                    Ok(HubMessage::Ping { timestamp }) => {
                        let _ = outbound_tx.send(HubMessage::Pong { timestamp }).await;
                    }
                    Ok(HubMessage::Pong { .. }) => {}
                    Ok(other) => {
                        tracing::debug!(
                            hub_id = %hub_id,
                            msg = ?std::mem::discriminant(&other),
                            "unexpected inbound hub message"
                        );
                    }
                    Err(_) => {
                        tracing::debug!(hub_id = %hub_id, "ignoring unparseable hub message");
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {
                registry.touch(&hub_id);
            }
            _ => {}
        }
    }

    // Cleanup.
    forwarder.abort();
    writer.abort();
    registry.remove(&hub_id);
    tracing::info!(hub_id = %hub_id, "hub disconnected");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn wait_for_hello(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<(String, String)> {
    // Give the hub 10 seconds to identify itself.
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(HubMessage::HubHello { hub_id, version }) =
                    serde_json::from_str::<HubMessage>(&text)
                {
                    return Some((hub_id, version));
                }
            }
        }
        None
    })
    .await;

    timeout.unwrap_or(None)
}

async fn send_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &HubMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
