//! HTTP fetching with per-phase timing capture and authentication.

mod response;

pub use response::{FetchMetrics, FetchResponse};

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect, Client};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, CrawlConfig, ResolvedAuth};
use response::collapse_headers;

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Maximum redirect chain length before a request fails.
const MAX_REDIRECTS: usize = 10;

/// Idle connections kept per host, and how long they linger.
const POOL_MAX_IDLE_PER_HOST: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("redirect limit exceeded for {0}")]
    RedirectLimit(String),
    #[error("invalid request header {0:?}")]
    Header(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fetch cancelled")]
    Cancelled,
}

/// HTTP client for page and robots fetches.
///
/// Never retries internally; one authentication scheme and the configured
/// custom headers apply to every request. Dropping the fetcher releases
/// its idle connections.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    auth: ResolvedAuth,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );
        for (name, value) in config.header_pairs()? {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::Header(name.clone()))?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|_| FetchError::Header(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            auth: config.auth.resolve()?,
        })
    }

    /// Issue a GET, following redirects and capturing timing.
    ///
    /// Returns promptly with a cancellation error if the ambient token
    /// fires during any phase.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<FetchResponse, FetchError> {
        let mut request = self.client.get(url);
        request = match &self.auth {
            ResolvedAuth::None => request,
            ResolvedAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            ResolvedAuth::Bearer { token } => request.bearer_auth(token),
            ResolvedAuth::ApiKey { header, value } => request.header(header.as_str(), value),
        };

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_redirect() {
                    FetchError::RedirectLimit(url.to_string())
                } else {
                    FetchError::Http(e)
                }
            })?,
        };
        let ttfb = start.elapsed();

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collapse_headers(response.headers());

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.bytes() => result?,
        };
        let total_time = start.elapsed();

        let content_type = headers.get("content-type").cloned();
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<i64>().ok());

        Ok(FetchResponse {
            status_code,
            final_url,
            headers,
            body: body.to_vec(),
            content_type,
            content_length,
            metrics: FetchMetrics {
                dns_lookup: None,
                tcp_connect: None,
                tls_handshake: None,
                ttfb,
                total_time,
            },
        })
    }
}
