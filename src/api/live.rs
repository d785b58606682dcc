//! `GET /ws`: a payer keeps this open while waiting for the Pix confirmation.
//!
//! Client frames are `{"event":"subscribe","txid":"..."}`; the server answers with
//! `subscribed` and later pushes one `payment` frame per confirmed txid. Subscribing to
//! a txid that is already paid yields the `payment` frame instead of `subscribed`.

use crate::api::AppState;
use crate::services::notification::{
    LiveEvent, LiveHandle, NotificationChannel, NotificationError, SubscribeOutcome,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { txid: String },
}

pub async fn live_connection(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.notifier))
}

async fn handle_socket(socket: WebSocket, notifier: Arc<dyn NotificationChannel>) {
    let socket_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<LiveEvent>();

    info!(socket_id = %socket_id, "🔌 Live connection opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode live event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_frame(text.as_str(), &socket_id, &tx, notifier.as_ref()).await
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(socket_id = %socket_id, error = %e, "Live connection read error");
                break;
            }
        }
    }

    match notifier.disconnect(&socket_id).await {
        Ok(removed) => info!(socket_id = %socket_id, removed, "Live connection closed"),
        Err(e) => warn!(socket_id = %socket_id, error = %e, "Failed to clear live subscriptions"),
    }

    drop(tx);
    writer.abort();
}

async fn handle_frame(
    text: &str,
    socket_id: &str,
    tx: &mpsc::UnboundedSender<LiveEvent>,
    notifier: &dyn NotificationChannel,
) {
    let reply = match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { txid }) if txid.trim().is_empty() => LiveEvent::Error {
            message: "txid is required".to_string(),
        },
        Ok(ClientFrame::Subscribe { txid }) => {
            let handle = LiveHandle::new(socket_id, tx.clone());
            match notifier.subscribe(&txid, handle).await {
                Ok(SubscribeOutcome::Registered) | Ok(SubscribeOutcome::AlreadyRegistered) => {
                    LiveEvent::Subscribed { txid }
                }
                // The payment frame already went out on this connection
                Ok(SubscribeOutcome::AlreadyPaid) => return,
                Err(NotificationError::UnknownTxid(_)) => LiveEvent::Error {
                    message: "unknown txid".to_string(),
                },
                Err(NotificationError::SubscriptionLimit { limit, .. }) => LiveEvent::Error {
                    message: format!("at most {} subscriptions per connection", limit),
                },
                Err(e) => {
                    warn!(txid = %txid, socket_id = %socket_id, error = %e, "Subscription failed");
                    LiveEvent::Error {
                        message: "subscription failed".to_string(),
                    }
                }
            }
        }
        Err(e) => {
            debug!(socket_id = %socket_id, error = %e, "Unrecognized live frame");
            LiveEvent::Error {
                message: "unrecognized frame".to_string(),
            }
        }
    };

    // Receiver only goes away with the connection
    let _ = tx.send(reply);
}
