//! OAuth bearer credential cache for the Pix gateway

use crate::payments::error::PixResult;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Freshly issued credential
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Lazily fetched bearer token, refreshed `refresh_margin` before it expires.
///
/// The lock is held while fetching so concurrent callers share one token request.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            refresh_margin,
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> PixResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PixResult<AccessToken>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
            debug!("Pix access token near expiry, refreshing");
        }

        let token = fetch().await?;
        let lifetime = token.expires_in.saturating_sub(self.refresh_margin);
        *slot = Some(CachedToken {
            value: token.value.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.value)
    }

    /// Drop the cached token so the next call fetches a new one
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
