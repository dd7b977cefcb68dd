//! Fetch-then-parse adapter producing per-page results.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fetcher::{FetchError, HttpFetcher};
use crate::models::{ErrorKind, LinkData, PageData, PageError, PageResult};
use crate::parser::HtmlParser;

/// Turns one URL into a `PageResult`.
///
/// Failures are data, not errors: a network failure comes back as an
/// error record inside the result, and a parse failure yields a page with
/// the fetch-level fields and no links.
pub struct PageProcessor {
    fetcher: Arc<HttpFetcher>,
    allowed_schemes: Vec<String>,
}

impl PageProcessor {
    pub fn new(fetcher: Arc<HttpFetcher>, allowed_schemes: &[String]) -> Self {
        Self {
            fetcher,
            allowed_schemes: allowed_schemes.to_vec(),
        }
    }

    pub async fn process(&self, cancel: &CancellationToken, url: &str) -> PageResult {
        let response = match self.fetcher.get(cancel, url).await {
            Ok(response) => response,
            Err(FetchError::Cancelled) => {
                return PageResult::from_error(PageError::new(
                    ErrorKind::Cancelled,
                    "fetch cancelled",
                ));
            }
            Err(e) => {
                return PageResult::from_error(PageError::new(
                    ErrorKind::NetworkError,
                    e.to_string(),
                ));
            }
        };

        // Page identity stays the requested URL; only links are attributed
        // to the final URL.
        let mut page = PageData::new(url);
        page.status_code = Some(response.status_code);
        page.ttfb_ms = Some(response.metrics.ttfb.as_millis() as i64);
        page.download_time_ms = Some(response.metrics.total_time.as_millis() as i64);
        page.response_size = Some(response.body.len() as i64);
        page.headers = response.headers.clone();

        let mut links = Vec::new();
        if response.status_code < 400 && response.is_html() {
            match HtmlParser::new(&response.final_url, &self.allowed_schemes) {
                Ok(parser) => {
                    let parsed = parser.parse(&response.body);
                    page.title = parsed.title;
                    page.meta_desc = parsed.meta_desc;
                    page.meta_robots = parsed.meta_robots;
                    page.canonical_url = parsed.canonical_url;
                    page.content_hash = Some(parsed.content_hash);

                    links = parsed
                        .links
                        .into_iter()
                        .map(|link| LinkData {
                            source_url: response.final_url.clone(),
                            target_url: link.url,
                            anchor_text: link.anchor_text,
                            link_type: link.link_type,
                            rel: link.rel,
                        })
                        .collect();
                }
                Err(e) => {
                    // Parser failure is never fatal.
                    debug!("skipping parse of {}: invalid base url ({})", url, e);
                }
            }
        }

        PageResult {
            page: Some(page),
            links,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use crate::models::LinkType;

    fn processor() -> PageProcessor {
        let config = CrawlConfig::default();
        let fetcher = Arc::new(HttpFetcher::new(&config).expect("fetcher"));
        PageProcessor::new(fetcher, &config.allowed_schemes)
    }

    #[tokio::test]
    async fn html_pages_are_parsed_into_links() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(r#"<html><head><title>Home</title></head><body><a href="/a">A</a></body></html>"#)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let url = format!("{}/", server.url());
        let result = processor().process(&cancel, &url).await;

        let page = result.page.expect("page data");
        assert_eq!(page.url, url);
        assert_eq!(page.status_code, Some(200));
        assert_eq!(page.title.as_deref(), Some("Home"));
        assert!(page.content_hash.is_some());
        assert!(result.error.is_none());

        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].source_url, url);
        assert!(result.links[0].target_url.ends_with("/a"));
        assert_eq!(result.links[0].link_type, LinkType::Internal);
    }

    #[tokio::test]
    async fn non_html_bodies_are_not_parsed() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/data.json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"a": "<a href=\"/x\">not a link</a>"}"#)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let result = processor()
            .process(&cancel, &format!("{}/data.json", server.url()))
            .await;

        let page = result.page.expect("page data");
        assert_eq!(page.title, None);
        assert_eq!(page.content_hash, None);
        assert!(result.links.is_empty());
    }

    #[tokio::test]
    async fn error_status_pages_keep_fetch_fields_without_links() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/gone")
            .with_status(404)
            .with_header("Content-Type", "text/html")
            .with_body(r#"<html><body><a href="/back">Back</a></body></html>"#)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let result = processor()
            .process(&cancel, &format!("{}/gone", server.url()))
            .await;

        let page = result.page.expect("page data");
        assert_eq!(page.status_code, Some(404));
        assert!(result.links.is_empty());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn network_failure_is_returned_as_data() {
        let cancel = CancellationToken::new();
        // Nothing listens on this port.
        let result = processor()
            .process(&cancel, "http://127.0.0.1:1/unreachable")
            .await;

        assert!(result.page.is_none());
        assert!(result.links.is_empty());
        let error = result.error.expect("error record");
        assert_eq!(error.kind, ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn links_are_sourced_from_the_final_url() {
        let mut server = mockito::Server::new_async().await;
        let _start = server
            .mock("GET", "/start")
            .with_status(302)
            .with_header("Location", "/landing")
            .create_async()
            .await;
        let _landing = server
            .mock("GET", "/landing")
            .with_status(200)
            .with_header("Content-Type", "text/html")
            .with_body(r#"<html><body><a href="/child">Child</a></body></html>"#)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let url = format!("{}/start", server.url());
        let result = processor().process(&cancel, &url).await;

        let page = result.page.expect("page data");
        assert_eq!(page.url, url, "page identity is the requested url");
        assert_eq!(result.links.len(), 1);
        assert!(
            result.links[0].source_url.ends_with("/landing"),
            "links come from the final url"
        );
    }
}
