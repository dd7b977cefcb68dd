//! Response types and header handling.

use std::collections::HashMap;
use std::time::Duration;

/// Per-phase request timing.
///
/// The connection-phase fields are unavailable on pooled transports and
/// stay unset; time-to-first-byte and total download time are always
/// measured.
#[derive(Debug, Clone, Default)]
pub struct FetchMetrics {
    pub dns_lookup: Option<Duration>,
    pub tcp_connect: Option<Duration>,
    pub tls_handshake: Option<Duration>,
    pub ttfb: Duration,
    pub total_time: Duration,
}

/// A completed HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    /// URL reached after following all redirects.
    pub final_url: String,
    /// Response headers, keys lowercased, multi-value headers collapsed to
    /// the first value.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub metrics: FetchMetrics,
}

impl FetchResponse {
    /// Whether the response body is worth handing to the HTML parser.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.trim().to_ascii_lowercase();
                ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml")
            })
            .unwrap_or(false)
    }
}

/// Flatten a wire header map: keys lowercased, repeated headers collapsed
/// to their first value, non-UTF-8 values dropped.
pub(crate) fn collapse_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut collapsed = HashMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            collapsed
                .entry(name.as_str().to_string())
                .or_insert_with(|| v.to_string());
        }
    }
    collapsed
}
