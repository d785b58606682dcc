use super::{LiveEvent, LiveHandle, NotificationChannel, NotificationError, SubscribeOutcome};
use crate::cache::{CacheError, RedisPool};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Publishes payment events on a fixed Redis channel; subscribers filter by txid.
///
/// There is no per-connection state, so the subscription operations are no-ops.
pub struct RedisBroadcast {
    pool: RedisPool,
    channel: String,
}

impl RedisBroadcast {
    pub fn new(pool: RedisPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    async fn publish_event(&self, event: &LiveEvent) -> Result<usize, CacheError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.pool.get().await?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut *conn)
            .await?;

        Ok(receivers.max(0) as usize)
    }
}

#[async_trait]
impl NotificationChannel for RedisBroadcast {
    async fn subscribe(
        &self,
        txid: &str,
        handle: LiveHandle,
    ) -> Result<SubscribeOutcome, NotificationError> {
        debug!(
            txid = %txid,
            socket_id = %handle.socket_id,
            "Broadcast channel keeps no subscriptions"
        );
        Ok(SubscribeOutcome::Registered)
    }

    async fn publish(&self, txid: &str, message: &str) -> Result<usize, NotificationError> {
        let event = LiveEvent::Payment {
            txid: txid.to_string(),
            message: message.to_string(),
        };

        let receivers = self
            .publish_event(&event)
            .await
            .map_err(|e| NotificationError::Broker(e.to_string()))?;

        info!(
            txid = %txid,
            channel = %self.channel,
            receivers,
            "📣 Payment notification broadcast"
        );
        Ok(receivers)
    }

    async fn unsubscribe(&self, _txid: &str) -> Result<usize, NotificationError> {
        Ok(0)
    }

    async fn disconnect(&self, _socket_id: &str) -> Result<usize, NotificationError> {
        Ok(0)
    }

    async fn sweep(&self, _ttl: Duration) -> Result<usize, NotificationError> {
        Ok(0)
    }

    fn supports_live_connections(&self) -> bool {
        false
    }
}
