//! Real-time payment notifications.
//!
//! Two backends share the [`NotificationChannel`] contract: a per-connection socket
//! registry (point-to-point) and a Redis pub/sub broadcast where clients filter by txid.

#[cfg(feature = "cache")]
pub mod broadcast;
pub mod registry;

use crate::database::error::DatabaseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[cfg(feature = "cache")]
pub use broadcast::RedisBroadcast;
pub use registry::SocketRegistry;

/// Message pushed to the payer once the confirmation is settled
pub const PAYMENT_MESSAGE: &str = "Pagamento realizado";

/// Frames sent from the server to a live client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    Subscribed { txid: String },
    Payment { txid: String, message: String },
    Error { message: String },
}

/// Write side of one live connection
#[derive(Debug, Clone)]
pub struct LiveHandle {
    pub socket_id: String,
    pub sender: mpsc::UnboundedSender<LiveEvent>,
}

impl LiveHandle {
    pub fn new(socket_id: impl Into<String>, sender: mpsc::UnboundedSender<LiveEvent>) -> Self {
        Self {
            socket_id: socket_id.into(),
            sender,
        }
    }
}

/// Result of a subscription request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Waiting for the confirmation
    Registered,
    /// This connection already waits for the txid
    AlreadyRegistered,
    /// Settled before the request arrived; the payment event was sent right away
    AlreadyPaid,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("subscription store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("broadcast failed: {0}")]
    Broker(String),

    #[error("no transaction with txid {0}")]
    UnknownTxid(String),

    #[error("connection {socket_id} already holds {limit} subscriptions")]
    SubscriptionLimit { socket_id: String, limit: usize },
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Register interest of a live connection in `txid`
    async fn subscribe(
        &self,
        txid: &str,
        handle: LiveHandle,
    ) -> Result<SubscribeOutcome, NotificationError>;

    /// Deliver `message` for `txid`; zero receivers is not an error
    async fn publish(&self, txid: &str, message: &str) -> Result<usize, NotificationError>;

    /// Drop every subscription for `txid`
    async fn unsubscribe(&self, txid: &str) -> Result<usize, NotificationError>;

    /// Drop every subscription held by a closed connection
    async fn disconnect(&self, socket_id: &str) -> Result<usize, NotificationError>;

    /// Drop subscriptions older than `ttl`
    async fn sweep(&self, ttl: Duration) -> Result<usize, NotificationError>;

    /// Whether `/ws` clients can subscribe through this channel
    fn supports_live_connections(&self) -> bool {
        true
    }
}
