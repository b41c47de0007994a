//! Event Bus (C10, §4.10). A broker-less fan-out channel per subscriber;
//! per-publisher FIFO, drop-oldest on subscriber slowness.
//!
//! The WebSocket handler is adapted (much simplified) from the
//! `echo-session-ws-gateway` example: `ws.on_upgrade`, a split socket, a
//! periodic ping keepalive, and `tokio::select!` racing the outbound relay
//! against the keepalive so either side's failure tears the connection down
//! cleanly.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use super::state::AppState;

/// Decodes the HTTP Basic `player:password` header into just the player name,
/// for attributing a dashboard's `playerConnect` event (§4.10). Returns
/// `"anonymous"` when no/unparseable credentials were supplied (matches
/// `auth::require_basic_auth`'s opt-in behavior when no password is set).
fn player_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Basic "))
        .and_then(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|decoded| decoded.split_once(':').map(|(player, _)| player.to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Event kinds broadcast to dashboard subscribers (§4.10).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum Event {
    TickStart { tick: u64 },
    Enqueue { new: usize, duplicates: usize, player: String, target: String, exploit: String },
    EnqueueFallback { count: usize },
    SubmitStart { count: usize },
    SubmitSkip,
    SubmitComplete { accepted: usize, rejected: usize, queued: usize },
    VulnerabilityReported { exploit: String, target: String, player: String },
    PlayerConnect { player: String, address: String },
    AnalyticsUpdate,
}

const CHANNEL_CAPACITY: usize = 256;

pub fn new_channel() -> broadcast::Sender<Event> {
    broadcast::channel(CHANNEL_CAPACITY).0
}

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let player = player_from_headers(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, player))
}

async fn handle_socket(socket: WebSocket, state: AppState, player: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();
    let _ = state.events.send(Event::PlayerConnect {
        player,
        address: "dashboard".to_string(),
    });

    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
    ping_interval.tick().await; // discard the immediate first tick

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "dashboard subscriber lagged, dropping oldest events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_from_headers_decodes_basic_auth_user() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:secret");
        headers.insert("authorization", format!("Basic {encoded}").parse().unwrap());
        assert_eq!(player_from_headers(&headers), "alice");
    }

    #[test]
    fn player_from_headers_defaults_to_anonymous() {
        assert_eq!(player_from_headers(&HeaderMap::new()), "anonymous");
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let tx = new_channel();
        let mut rx = tx.subscribe();
        tx.send(Event::TickStart { tick: 0 }).unwrap();
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::TickStart { tick: 0 }));
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag_instead_of_reordering() {
        let tx = broadcast::channel::<Event>(2).0;
        let mut rx = tx.subscribe();
        for i in 0..5 {
            let _ = tx.send(Event::TickStart { tick: i });
        }
        // The channel capacity (2) was exceeded by 5 sends; the slow
        // subscriber must observe a Lagged error, not silently reordered data.
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
