use super::{
    LiveEvent, LiveHandle, NotificationChannel, NotificationError, SubscribeOutcome,
    PAYMENT_MESSAGE,
};
use crate::database::repository::{SubscriptionStore, TransactionStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct LiveSubscription {
    handle: LiveHandle,
    created_at: Instant,
}

/// Open subscriptions a single connection may hold
pub const MAX_SUBSCRIPTIONS_PER_SOCKET: usize = 16;

/// txid -> live connections waiting for its confirmation.
///
/// Rows are mirrored to `websocket_connections` when a store is attached. With a
/// transaction store attached, subscribing to an already paid txid answers with the
/// payment event immediately, so a payer who reconnects after settlement still learns
/// of it.
pub struct SocketRegistry {
    live: Arc<RwLock<HashMap<String, Vec<LiveSubscription>>>>,
    store: Option<Arc<dyn SubscriptionStore>>,
    transactions: Option<Arc<dyn TransactionStore>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self {
            live: Arc::new(RwLock::new(HashMap::new())),
            store: None,
            transactions: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionStore>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub async fn subscriber_count(&self, txid: &str) -> usize {
        self.live.read().await.get(txid).map(Vec::len).unwrap_or(0)
    }

    /// Send the payment event straight to `handle` when `txid` is already settled
    async fn deliver_if_paid(
        &self,
        txid: &str,
        handle: &LiveHandle,
    ) -> Result<bool, NotificationError> {
        let transactions = match &self.transactions {
            Some(transactions) => transactions,
            None => return Ok(false),
        };

        let transaction = transactions
            .find_by_txid(txid)
            .await?
            .ok_or_else(|| NotificationError::UnknownTxid(txid.to_string()))?;
        if !transaction.is_paid() {
            return Ok(false);
        }

        let event = LiveEvent::Payment {
            txid: txid.to_string(),
            message: PAYMENT_MESSAGE.to_string(),
        };
        if handle.sender.send(event).is_err() {
            warn!(txid = %txid, socket_id = %handle.socket_id, "Live connection closed before delivery");
        }
        info!(txid = %txid, socket_id = %handle.socket_id, "🔔 Late subscriber told of settled payment");
        Ok(true)
    }

    async fn remove_entry(&self, txid: &str, socket_id: &str) {
        let mut live = self.live.write().await;
        if let Some(subscriptions) = live.get_mut(txid) {
            subscriptions.retain(|s| s.handle.socket_id != socket_id);
            if subscriptions.is_empty() {
                live.remove(txid);
            }
        }
    }
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for SocketRegistry {
    async fn subscribe(
        &self,
        txid: &str,
        handle: LiveHandle,
    ) -> Result<SubscribeOutcome, NotificationError> {
        if self.deliver_if_paid(txid, &handle).await? {
            return Ok(SubscribeOutcome::AlreadyPaid);
        }

        {
            let mut live = self.live.write().await;
            let already = live
                .get(txid)
                .is_some_and(|subs| subs.iter().any(|s| s.handle.socket_id == handle.socket_id));
            if already {
                return Ok(SubscribeOutcome::AlreadyRegistered);
            }

            let held = live
                .values()
                .flatten()
                .filter(|s| s.handle.socket_id == handle.socket_id)
                .count();
            if held >= MAX_SUBSCRIPTIONS_PER_SOCKET {
                return Err(NotificationError::SubscriptionLimit {
                    socket_id: handle.socket_id.clone(),
                    limit: MAX_SUBSCRIPTIONS_PER_SOCKET,
                });
            }

            live.entry(txid.to_string())
                .or_default()
                .push(LiveSubscription {
                    handle: handle.clone(),
                    created_at: Instant::now(),
                });
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.create(txid, &handle.socket_id).await {
                self.remove_entry(txid, &handle.socket_id).await;
                return Err(e.into());
            }
        }

        // Settlement may have published between the first check and the insert
        if self.deliver_if_paid(txid, &handle).await? {
            self.remove_entry(txid, &handle.socket_id).await;
            return Ok(SubscribeOutcome::AlreadyPaid);
        }

        debug!(txid = %txid, socket_id = %handle.socket_id, "Live subscription registered");
        Ok(SubscribeOutcome::Registered)
    }

    async fn publish(&self, txid: &str, message: &str) -> Result<usize, NotificationError> {
        let live = self.live.read().await;
        let subscriptions = match live.get(txid) {
            Some(subscriptions) => subscriptions,
            None => {
                debug!(txid = %txid, "No live subscribers for payment notification");
                return Ok(0);
            }
        };

        let mut delivered = 0;
        for subscription in subscriptions {
            let event = LiveEvent::Payment {
                txid: txid.to_string(),
                message: message.to_string(),
            };
            match subscription.handle.sender.send(event) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    txid = %txid,
                    socket_id = %subscription.handle.socket_id,
                    "Live connection closed before delivery"
                ),
            }
        }

        info!(txid = %txid, delivered, "🔔 Payment notification published");
        Ok(delivered)
    }

    async fn unsubscribe(&self, txid: &str) -> Result<usize, NotificationError> {
        let removed = self
            .live
            .write()
            .await
            .remove(txid)
            .map(|subscriptions| subscriptions.len())
            .unwrap_or(0);

        if let Some(store) = &self.store {
            store.delete_by_txid(txid).await?;
        }

        Ok(removed)
    }

    async fn disconnect(&self, socket_id: &str) -> Result<usize, NotificationError> {
        let mut removed = 0;
        {
            let mut live = self.live.write().await;
            live.retain(|_, subscriptions| {
                let before = subscriptions.len();
                subscriptions.retain(|s| s.handle.socket_id != socket_id);
                removed += before - subscriptions.len();
                !subscriptions.is_empty()
            });
        }

        if let Some(store) = &self.store {
            store.delete_by_socket(socket_id).await?;
        }

        debug!(socket_id = %socket_id, removed, "Live connection subscriptions cleared");
        Ok(removed)
    }

    async fn sweep(&self, ttl: Duration) -> Result<usize, NotificationError> {
        let mut removed = 0;
        {
            let mut live = self.live.write().await;
            live.retain(|_, subscriptions| {
                let before = subscriptions.len();
                subscriptions.retain(|s| s.created_at.elapsed() < ttl);
                removed += before - subscriptions.len();
                !subscriptions.is_empty()
            });
        }

        if let Some(store) = &self.store {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
            let rows = store.delete_older_than(cutoff).await?;
            debug!(rows, "Expired subscription rows deleted");
        }

        Ok(removed)
    }
}
