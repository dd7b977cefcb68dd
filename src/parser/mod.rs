//! HTML parsing: page metadata, content hash, and outbound links.

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::models::LinkType;

/// One outbound link extracted from a document, already resolved to an
/// absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLink {
    pub url: String,
    pub anchor_text: Option<String>,
    pub link_type: LinkType,
    pub rel: Option<String>,
}

/// Everything extracted from one HTML document.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub title: Option<String>,
    pub meta_desc: Option<String>,
    pub meta_robots: Option<String>,
    pub canonical_url: Option<String>,
    /// SHA-256 hex digest over the input bytes.
    pub content_hash: String,
    pub links: Vec<ParsedLink>,
}

/// HTML parser bound to a base URL and an allowed-scheme list.
///
/// The base URL should be the final URL after redirects, so relative
/// links resolve against where the content actually lives and the
/// internal/external split reflects the served host.
pub struct HtmlParser {
    base: Url,
    allowed_schemes: Vec<String>,
}

impl HtmlParser {
    pub fn new(base_url: &str, allowed_schemes: &[String]) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            allowed_schemes: allowed_schemes.to_vec(),
        })
    }

    pub fn parse(&self, body: &[u8]) -> ParseResult {
        let content_hash = hex::encode(Sha256::digest(body));
        let text = String::from_utf8_lossy(body);
        let document = Html::parse_document(&text);

        let title = document
            .select(&Selector::parse("title").unwrap())
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let meta_desc = meta_content(&document, "meta[name=\"description\"]");
        let meta_robots = meta_content(&document, "meta[name=\"robots\"]");

        let canonical_url = document
            .select(&Selector::parse("link[rel=\"canonical\"]").unwrap())
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| self.base.join(href.trim()).ok())
            .map(|u| u.to_string());

        let mut links = Vec::new();
        for anchor in document.select(&Selector::parse("a[href]").unwrap()) {
            let href = match anchor.value().attr("href") {
                Some(href) => href.trim(),
                None => continue,
            };
            let resolved = match self.resolve_href(href) {
                Some(url) => url,
                None => continue,
            };

            let anchor_text = Some(collapse_whitespace(&anchor.text().collect::<String>()))
                .filter(|t| !t.is_empty());
            let link_type = if resolved.host_str() == self.base.host_str() {
                LinkType::Internal
            } else {
                LinkType::External
            };
            let rel = anchor
                .value()
                .attr("rel")
                .map(|r| r.trim().to_ascii_lowercase())
                .filter(|r| !r.is_empty());

            links.push(ParsedLink {
                url: resolved.to_string(),
                anchor_text,
                link_type,
                rel,
            });
        }

        ParseResult {
            title,
            meta_desc,
            meta_robots,
            canonical_url,
            content_hash,
            links,
        }
    }

    /// Apply the href filtering rules and resolve to an absolute URL.
    fn resolve_href(&self, href: &str) -> Option<Url> {
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("javascript:") {
            return None;
        }

        if lower.contains("://") {
            // Absolute URL: the scheme prefix must be allowed.
            if !self.prefix_allowed(&lower) {
                return None;
            }
        } else if let Some(scheme) = explicit_scheme(&lower) {
            // Scheme-colon URL without authority (tel:, mailto:); only
            // allowed when the scheme itself is on the list.
            if !self.scheme_allowed(scheme) {
                return None;
            }
        }
        // Relative URLs are always accepted and resolved against the base.

        let resolved = self.base.join(href).ok()?;
        // Re-apply the scheme test to the absolute form.
        if !self.prefix_allowed(resolved.as_str()) {
            return None;
        }
        Some(resolved)
    }

    fn prefix_allowed(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.allowed_schemes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_ascii_lowercase()))
    }

    fn scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes.iter().any(|prefix| {
            prefix
                .trim_end_matches('/')
                .trim_end_matches(':')
                .eq_ignore_ascii_case(scheme)
        })
    }
}

/// Leading scheme of a scheme-colon URL, when one is present.
fn explicit_scheme(href: &str) -> Option<&str> {
    let colon = href.find(':')?;
    let scheme = &href[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')) {
        Some(scheme)
    } else {
        None
    }
}

/// Trim and collapse runs of whitespace to single spaces.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the trimmed `content` attribute of the first element matching
/// `selector`, if present and non-empty.
fn meta_content(document: &Html, selector: &str) -> Option<String> {
    document
        .select(&Selector::parse(selector).unwrap())
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(base: &str) -> HtmlParser {
        HtmlParser::new(base, &["https://".to_string(), "http://".to_string()])
            .expect("valid base")
    }

    #[test]
    fn extracts_metadata_and_hash() {
        let p = parser("http://site.example/");
        let body = br#"<html><head>
            <title>  Welcome
                Home  </title>
            <meta name="description" content="A test page">
            <meta name="robots" content="noindex, nofollow">
            <link rel="canonical" href="/canonical-path">
        </head><body></body></html>"#;
        let result = p.parse(body);

        assert_eq!(result.title.as_deref(), Some("Welcome Home"));
        assert_eq!(result.meta_desc.as_deref(), Some("A test page"));
        assert_eq!(result.meta_robots.as_deref(), Some("noindex, nofollow"));
        assert_eq!(
            result.canonical_url.as_deref(),
            Some("http://site.example/canonical-path")
        );
        assert_eq!(result.content_hash, hex::encode(Sha256::digest(body)));
    }

    #[test]
    fn filters_fragment_javascript_and_empty_hrefs() {
        let p = parser("http://site.example/");
        let body = br##"<html><body>
            <a href="">empty</a>
            <a href="#section">fragment</a>
            <a href="javascript:void(0)">script</a>
            <a href="JavaScript:alert(1)">script-mixed-case</a>
            <a href="/kept">kept</a>
        </body></html>"##;
        let result = p.parse(body);
        let urls: Vec<&str> = result.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["http://site.example/kept"]);
    }

    #[test]
    fn absolute_urls_respect_the_scheme_list() {
        let p = parser("http://site.example/");
        let body = br#"<html><body>
            <a href="https://other.example/ok">https ok</a>
            <a href="ftp://files.example/file">ftp dropped</a>
            <a href="mailto:user@site.example">mailto dropped</a>
            <a href="tel:+15551234567">tel dropped</a>
        </body></html>"#;
        let result = p.parse(body);
        let urls: Vec<&str> = result.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://other.example/ok"]);
    }

    #[test]
    fn relative_urls_resolve_against_the_base() {
        let p = parser("http://site.example/dir/page.html");
        let body = br#"<html><body>
            <a href="sibling.html">sibling</a>
            <a href="/rooted">rooted</a>
            <a href="../up">up</a>
        </body></html>"#;
        let result = p.parse(body);
        let urls: Vec<&str> = result.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://site.example/dir/sibling.html",
                "http://site.example/rooted",
                "http://site.example/up",
            ]
        );
    }

    #[test]
    fn internal_external_split_uses_the_base_host() {
        let p = parser("http://site.example/");
        let body = br#"<html><body>
            <a href="/inside">in</a>
            <a href="http://other.example/outside">out</a>
        </body></html>"#;
        let result = p.parse(body);
        assert_eq!(result.links[0].link_type, LinkType::Internal);
        assert_eq!(result.links[1].link_type, LinkType::External);
    }

    #[test]
    fn anchor_text_is_collapsed_and_rel_lowercased() {
        let p = parser("http://site.example/");
        let body = br#"<html><body>
            <a href="/a" rel="NoFollow UGC">  spaced
                <b>anchor</b>   text </a>
            <a href="/b"></a>
        </body></html>"#;
        let result = p.parse(body);
        assert_eq!(result.links[0].anchor_text.as_deref(), Some("spaced anchor text"));
        assert_eq!(result.links[0].rel.as_deref(), Some("nofollow ugc"));
        assert_eq!(result.links[1].anchor_text, None);
        assert_eq!(result.links[1].rel, None);
    }

    #[test]
    fn protocol_relative_hrefs_inherit_the_base_scheme() {
        let p = parser("http://site.example/");
        let result = p.parse(br#"<a href="//cdn.example/lib.js">cdn</a>"#);
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].url, "http://cdn.example/lib.js");
        assert_eq!(result.links[0].link_type, LinkType::External);
    }
}
