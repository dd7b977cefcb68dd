//! Crawler configuration: defaults, file loading, and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor for the per-host request delay. Configured values below this are
/// silently clamped, not rejected.
pub const MIN_REQUEST_DELAY_SECS: f64 = 0.1;

/// Request headers that may not be overridden from configuration.
const FORBIDDEN_HEADERS: &[&str] = &["host", "content-length", "connection"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,
    #[error("database path must not be empty")]
    EmptyDatabasePath,
    #[error("malformed header entry {0:?}, expected \"Name: Value\"")]
    MalformedHeader(String),
    #[error("header {0:?} may not be overridden")]
    ForbiddenHeader(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// The full crawler configuration.
///
/// Loadable from a TOML file, with CLI flags overlaid on top by the CLI
/// layer before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Initial URLs; may be empty when resuming an existing database.
    pub seed_urls: Vec<String>,
    /// Worker count.
    pub concurrency: usize,
    /// Inter-request delay per host, in seconds.
    pub request_delay: f64,
    /// Per-request HTTP timeout, in seconds.
    pub request_timeout: u64,
    /// Sent on every request and used for robots matching.
    pub user_agent: String,
    /// Bypass the robots gate entirely.
    pub ignore_robots: bool,
    /// Disable the seed-derived host filter.
    pub follow_external_hosts: bool,
    /// Stop after this many crawled pages (0 = unlimited).
    pub limit: u64,
    /// URLs must match at least one of these, when any are configured.
    pub include_patterns: Vec<String>,
    /// URLs must match none of these.
    pub exclude_patterns: Vec<String>,
    /// URL prefixes eligible for crawling.
    pub allowed_schemes: Vec<String>,
    /// Custom request headers as "Name: Value" entries.
    pub headers: Vec<String>,
    pub auth: AuthConfig,
    /// Store file location.
    pub database_path: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed_urls: Vec::new(),
            concurrency: 2,
            request_delay: 1.0,
            request_timeout: 30,
            user_agent: format!("linkmapper/{}", env!("CARGO_PKG_VERSION")),
            ignore_robots: false,
            follow_external_hosts: false,
            limit: 0,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            allowed_schemes: vec!["https://".to_string(), "http://".to_string()],
            headers: Vec::new(),
            auth: AuthConfig::default(),
            database_path: PathBuf::from("crawl.db"),
        }
    }
}

impl CrawlConfig {
    /// Load configuration from a TOML file, or defaults when no file is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration, clamping the request delay to its floor.
    ///
    /// Runs before the engine starts; any error here is fatal.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if self.request_delay < MIN_REQUEST_DELAY_SECS {
            self.request_delay = MIN_REQUEST_DELAY_SECS;
        }
        if self.allowed_schemes.is_empty() {
            self.allowed_schemes = vec!["https://".to_string(), "http://".to_string()];
        }

        self.header_pairs()?;
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        self.auth.resolve()?;
        Ok(())
    }

    /// Custom headers parsed into (name, value) pairs.
    pub fn header_pairs(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.headers.iter().map(|h| parse_header_entry(h)).collect()
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay.max(MIN_REQUEST_DELAY_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Parse one "Name: Value" header entry, rejecting the forbidden set.
pub fn parse_header_entry(entry: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = entry
        .split_once(':')
        .ok_or_else(|| ConfigError::MalformedHeader(entry.to_string()))?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return Err(ConfigError::MalformedHeader(entry.to_string()));
    }
    if FORBIDDEN_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::ForbiddenHeader(name.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Which authentication scheme to apply; exactly one per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
    ApiKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub basic: BasicAuthConfig,
    pub bearer: BearerAuthConfig,
    pub apikey: ApiKeyAuthConfig,
}

/// Direct or env-indirect credentials; the env indirection wins when both
/// are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BearerAuthConfig {
    pub token: Option<String>,
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyAuthConfig {
    pub header: Option<String>,
    pub value: Option<String>,
    pub header_env: Option<String>,
    pub value_env: Option<String>,
}

/// Credentials after env indirection has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAuth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header: String, value: String },
}

impl AuthConfig {
    /// Resolve the configured scheme's credentials.
    pub fn resolve(&self) -> Result<ResolvedAuth, ConfigError> {
        match self.auth_type {
            AuthType::None => Ok(ResolvedAuth::None),
            AuthType::Basic => Ok(ResolvedAuth::Basic {
                username: resolve_credential(
                    &self.basic.username,
                    &self.basic.username_env,
                    "auth.basic.username",
                )?,
                password: resolve_credential(
                    &self.basic.password,
                    &self.basic.password_env,
                    "auth.basic.password",
                )?,
            }),
            AuthType::Bearer => Ok(ResolvedAuth::Bearer {
                token: resolve_credential(
                    &self.bearer.token,
                    &self.bearer.token_env,
                    "auth.bearer.token",
                )?,
            }),
            AuthType::ApiKey => Ok(ResolvedAuth::ApiKey {
                header: resolve_credential(
                    &self.apikey.header,
                    &self.apikey.header_env,
                    "auth.apikey.header",
                )?,
                value: resolve_credential(
                    &self.apikey.value,
                    &self.apikey.value_env,
                    "auth.apikey.value",
                )?,
            }),
        }
    }
}

fn resolve_credential(
    direct: &Option<String>,
    env: &Option<String>,
    what: &str,
) -> Result<String, ConfigError> {
    if let Some(var) = env.as_deref().filter(|v| !v.is_empty()) {
        return std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string()));
    }
    direct
        .clone()
        .ok_or_else(|| ConfigError::MissingCredential(what.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_clamps_small_delay() {
        let mut config = CrawlConfig {
            request_delay: 0.01,
            ..Default::default()
        };
        config.validate().expect("valid");
        assert_eq!(config.request_delay, MIN_REQUEST_DELAY_SECS);
        assert_eq!(config.request_delay(), Duration::from_millis(100));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = CrawlConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency)
        ));
    }

    #[test]
    fn validate_rejects_bad_patterns() {
        let mut config = CrawlConfig {
            exclude_patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn header_entries_parse_and_forbidden_set_is_rejected() {
        let (name, value) = parse_header_entry("X-Custom: hello world").expect("parse");
        assert_eq!(name, "X-Custom");
        assert_eq!(value, "hello world");

        assert!(matches!(
            parse_header_entry("no-colon-here"),
            Err(ConfigError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_header_entry("Host: evil.example"),
            Err(ConfigError::ForbiddenHeader(_))
        ));
        assert!(matches!(
            parse_header_entry("Content-Length: 0"),
            Err(ConfigError::ForbiddenHeader(_))
        ));
        assert!(matches!(
            parse_header_entry("Connection: close"),
            Err(ConfigError::ForbiddenHeader(_))
        ));
    }

    #[test]
    fn auth_env_indirection_wins_over_direct() {
        std::env::set_var("LINKMAPPER_TEST_BEARER", "from-env");
        let auth = AuthConfig {
            auth_type: AuthType::Bearer,
            bearer: BearerAuthConfig {
                token: Some("direct".to_string()),
                token_env: Some("LINKMAPPER_TEST_BEARER".to_string()),
            },
            ..Default::default()
        };
        assert_eq!(
            auth.resolve().expect("resolve"),
            ResolvedAuth::Bearer {
                token: "from-env".to_string()
            }
        );
    }

    #[test]
    fn auth_missing_env_is_an_error() {
        let auth = AuthConfig {
            auth_type: AuthType::Bearer,
            bearer: BearerAuthConfig {
                token: None,
                token_env: Some("LINKMAPPER_TEST_UNSET_VAR".to_string()),
            },
            ..Default::default()
        };
        assert!(matches!(auth.resolve(), Err(ConfigError::MissingEnv(_))));
    }

    #[test]
    fn config_loads_from_toml() {
        let text = r#"
            seed_urls = ["https://site.example/"]
            concurrency = 4
            request_delay = 0.5
            database_path = "out/crawl.db"

            [auth]
            type = "api-key"

            [auth.apikey]
            header = "X-Api-Key"
            value = "secret"
        "#;
        let config: CrawlConfig = toml::from_str(text).expect("parse");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.auth.auth_type, AuthType::ApiKey);
        assert_eq!(
            config.auth.resolve().expect("resolve"),
            ResolvedAuth::ApiKey {
                header: "X-Api-Key".to_string(),
                value: "secret".to_string()
            }
        );
    }
}
