//! robots.txt gate: lazily fetched, per-host cached crawl rules.

mod rules;

pub use rules::RobotRules;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::fetcher::HttpFetcher;

/// Per-host robots gate.
///
/// Rules are fetched lazily on the first query for a host and cached for
/// the run; the fetch happens outside the cache lock.
pub struct RobotsGate {
    fetcher: Arc<HttpFetcher>,
    user_agent: String,
    ignore: bool,
    rules: RwLock<HashMap<String, Arc<RobotRules>>>,
}

impl RobotsGate {
    pub fn new(fetcher: Arc<HttpFetcher>, user_agent: &str, ignore: bool) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.to_string(),
            ignore,
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the URL may be fetched under the host's robots rules.
    pub async fn is_allowed(&self, cancel: &CancellationToken, url: &str) -> bool {
        if self.ignore {
            return true;
        }
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return true,
        };
        let host = match host_key(&parsed) {
            Some(h) => h,
            None => return true,
        };

        let rules = self.rules_for(cancel, &parsed, &host).await;
        rules.is_allowed(parsed.path())
    }

    /// Crawl delay advertised by the host, zero when none is known.
    pub async fn crawl_delay(&self, host: &str) -> Duration {
        if self.ignore {
            return Duration::ZERO;
        }
        let rules = self.rules.read().await;
        rules
            .get(host)
            .map(|r| r.crawl_delay)
            .unwrap_or(Duration::ZERO)
    }

    async fn rules_for(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        host: &str,
    ) -> Arc<RobotRules> {
        {
            let rules = self.rules.read().await;
            if let Some(cached) = rules.get(host) {
                return cached.clone();
            }
        }

        // Fetch outside the lock so slow hosts don't serialize the gate.
        let fetched = Arc::new(self.fetch_rules(cancel, url, host).await);

        let mut rules = self.rules.write().await;
        // Another task may have raced us here; first insert wins.
        rules.entry(host.to_string()).or_insert(fetched).clone()
    }

    async fn fetch_rules(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        host: &str,
    ) -> RobotRules {
        let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
        match self.fetcher.get(cancel, &robots_url).await {
            Ok(response) if response.status_code == 200 => {
                let body = String::from_utf8_lossy(&response.body);
                let rules = RobotRules::parse(&body, &self.user_agent);
                debug!(
                    "robots for {}: {} disallow, {} allow, delay {:?}",
                    host,
                    rules.disallow.len(),
                    rules.allow.len(),
                    rules.crawl_delay
                );
                rules
            }
            Ok(response) if response.status_code == 404 => {
                debug!("no robots.txt for {}", host);
                RobotRules::permissive()
            }
            Ok(response) => {
                warn!(
                    "robots.txt fetch for {} returned {}, continuing permissively",
                    host, response.status_code
                );
                RobotRules::permissive()
            }
            Err(e) => {
                warn!(
                    "robots.txt fetch for {} failed ({}), continuing permissively",
                    host, e
                );
                RobotRules::permissive()
            }
        }
    }
}

/// Host key including any explicit port.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}
