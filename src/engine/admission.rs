//! URL admission: which discovered URLs may enter the queue.

use std::collections::HashSet;

use regex::Regex;
use url::Url;

use crate::config::{ConfigError, CrawlConfig};

/// Admission predicate combining the host filter, include/exclude
/// patterns, and the scheme filter.
///
/// The predicate is monotone: shrinking the allowed-host set, adding an
/// exclude pattern, or tightening the scheme list can only shrink the
/// admitted set.
pub struct UrlAdmission {
    /// `{scheme}://{host}[:port]` origins derived from the seed URLs;
    /// None when external hosts may be followed.
    allowed_origins: Option<HashSet<String>>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    allowed_schemes: Vec<String>,
}

impl UrlAdmission {
    pub fn from_config(config: &CrawlConfig) -> Result<Self, ConfigError> {
        let allowed_origins = if config.follow_external_hosts {
            None
        } else {
            Some(
                config
                    .seed_urls
                    .iter()
                    .filter_map(|seed| origin_of(seed))
                    .collect(),
            )
        };

        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect()
        };

        Ok(Self {
            allowed_origins,
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
            allowed_schemes: config.allowed_schemes.clone(),
        })
    }

    pub fn is_admissible(&self, url: &str) -> bool {
        if let Some(origins) = &self.allowed_origins {
            match origin_of(url) {
                Some(origin) if origins.contains(&origin) => {}
                _ => return false,
            }
        }

        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(url)) {
            return false;
        }
        if self.exclude.iter().any(|re| re.is_match(url)) {
            return false;
        }

        let lower = url.to_ascii_lowercase();
        self.allowed_schemes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_ascii_lowercase()))
    }
}

/// `{scheme}://{host}[:port]` with the port kept only when explicit, so
/// both sides of the host filter normalize identically.
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}
