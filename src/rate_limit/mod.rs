//! Per-host request rate limiting.
//!
//! One capacity-1 token bucket per host: the first request for a host
//! proceeds immediately, each subsequent request waits until one refill
//! interval has elapsed since the previous one. Hosts never synchronize
//! with each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Hard floor on the inter-request delay for any host.
pub const MIN_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct HostBucket {
    last_request: Option<Instant>,
    delay: Duration,
}

/// Token-bucket limiter keyed by host.
pub struct HostRateLimiter {
    default_delay: Duration,
    hosts: RwLock<HashMap<String, Arc<Mutex<HostBucket>>>>,
}

impl HostRateLimiter {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay: default_delay.max(MIN_DELAY),
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Extract the bucket key from a URL.
    pub fn host_of(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        match parsed.port() {
            Some(port) => Some(format!("{host}:{port}")),
            None => Some(host.to_string()),
        }
    }

    /// Block until a request to the URL's host may proceed.
    ///
    /// Returns promptly with a cancellation error when the ambient token
    /// fires while waiting. URLs without a host are not limited.
    pub async fn wait(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<(), RateLimitError> {
        let host = match Self::host_of(url) {
            Some(host) => host,
            None => return Ok(()),
        };
        let bucket = self.bucket(&host).await;

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                let now = Instant::now();
                match bucket.last_request {
                    None => {
                        bucket.last_request = Some(now);
                        return Ok(());
                    }
                    Some(last) => {
                        let ready_at = last + bucket.delay;
                        if now >= ready_at {
                            bucket.last_request = Some(now);
                            return Ok(());
                        }
                        ready_at - now
                    }
                }
            };

            debug!("rate limiting {}: waiting {:?}", host, wait);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Install a host-specific delay; zero or below resets to the default.
    pub async fn set_domain_delay(&self, host: &str, delay: Duration) {
        let bucket = self.bucket(host).await;
        let mut bucket = bucket.lock().await;
        bucket.delay = if delay.is_zero() {
            self.default_delay
        } else {
            delay.max(MIN_DELAY)
        };
    }

    /// Effective delay currently applied to a host.
    pub async fn domain_delay(&self, host: &str) -> Duration {
        let hosts = self.hosts.read().await;
        match hosts.get(host) {
            Some(bucket) => bucket.lock().await.delay,
            None => self.default_delay,
        }
    }

    async fn bucket(&self, host: &str) -> Arc<Mutex<HostBucket>> {
        {
            let hosts = self.hosts.read().await;
            if let Some(bucket) = hosts.get(host) {
                return bucket.clone();
            }
        }

        let mut hosts = self.hosts.write().await;
        // Double-checked: another task may have inserted while we waited
        // for the write lock.
        hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HostBucket {
                    last_request: None,
                    delay: self.default_delay,
                }))
            })
            .clone()
    }
}
