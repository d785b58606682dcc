//! Background removal of live subscriptions whose payer never saw a confirmation.

use crate::config::NotificationConfig;
use crate::services::notification::NotificationChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often the worker wakes up
    pub interval: Duration,
    /// Subscriptions older than this are dropped
    pub ttl: Duration,
}

impl SweeperConfig {
    pub fn from_notification_config(config: &NotificationConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.sweep_interval),
            ttl: Duration::from_secs(config.subscription_ttl),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            ttl: Duration::from_secs(3600),
        }
    }
}

pub struct SubscriptionSweeper {
    notifier: Arc<dyn NotificationChannel>,
    config: SweeperConfig,
}

impl SubscriptionSweeper {
    pub fn new(notifier: Arc<dyn NotificationChannel>, config: SweeperConfig) -> Self {
        Self { notifier, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            ttl_secs = self.config.ttl.as_secs(),
            "subscription sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("subscription sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("subscription sweeper stopped");
    }

    pub async fn run_cycle(&self) -> usize {
        match self.notifier.sweep(self.config.ttl).await {
            Ok(0) => {
                debug!("no expired subscriptions");
                0
            }
            Ok(removed) => {
                info!(removed, "expired subscriptions removed");
                removed
            }
            Err(e) => {
                warn!(error = %e, "subscription sweep failed");
                0
            }
        }
    }
}
