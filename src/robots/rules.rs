//! robots.txt parsing and path matching.

use std::time::Duration;

/// Parsed robots rules for one host.
///
/// Holds the disallow/allow pattern lists that applied to our user agent,
/// the advertised crawl delay, and any sitemap URLs seen.
#[derive(Debug, Clone, Default)]
pub struct RobotRules {
    pub disallow: Vec<String>,
    pub allow: Vec<String>,
    pub crawl_delay: Duration,
    pub sitemaps: Vec<String>,
}

impl RobotRules {
    /// Rules that allow everything.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Parse a robots.txt document, keeping the rule sections that apply
    /// to `user_agent`.
    ///
    /// A section applies when its User-agent is `*` or a case-insensitive
    /// substring of ours. Multiple User-agent lines may stack before a
    /// rule block.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_ascii_lowercase();
        let mut rules = Self::default();
        let mut section_applies = false;
        let mut in_ua_run = false;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (directive, value) = match line.split_once(':') {
                Some((d, v)) => (d.trim().to_ascii_lowercase(), v.trim()),
                None => continue,
            };

            match directive.as_str() {
                "user-agent" => {
                    // A fresh run of User-agent lines starts a new section.
                    if !in_ua_run {
                        section_applies = false;
                        in_ua_run = true;
                    }
                    let agent = value.to_ascii_lowercase();
                    if agent == "*" || ua_lower.contains(&agent) {
                        section_applies = true;
                    }
                }
                "disallow" => {
                    in_ua_run = false;
                    if section_applies && !value.is_empty() {
                        rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    in_ua_run = false;
                    if section_applies && !value.is_empty() {
                        rules.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_ua_run = false;
                    if section_applies {
                        // Invalid values are ignored.
                        if let Ok(secs) = value.parse::<f64>() {
                            if secs >= 0.0 && secs.is_finite() {
                                rules.crawl_delay = Duration::from_secs_f64(secs);
                            }
                        }
                    }
                }
                "sitemap" => {
                    in_ua_run = false;
                    rules.sitemaps.push(value.to_string());
                }
                _ => {
                    in_ua_run = false;
                }
            }
        }

        rules
    }

    /// Decide whether a path may be fetched.
    ///
    /// If any disallow pattern matches, an allow pattern that also matches
    /// and is strictly longer overrides it.
    pub fn is_allowed(&self, path: &str) -> bool {
        let matched_disallow = self
            .disallow
            .iter()
            .filter(|p| pattern_matches(p, path))
            .map(|p| p.len())
            .max();

        let disallow_len = match matched_disallow {
            Some(len) => len,
            None => return true,
        };

        self.allow
            .iter()
            .any(|p| p.len() > disallow_len && pattern_matches(p, path))
    }
}

/// Match a robots path pattern: `*` spans any run of characters, a
/// trailing `$` anchors the end of the path, anything else is a prefix
/// match.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    if parts.len() == 1 {
        return !anchored || pos == path.len();
    }

    // Greedy left-to-right placement of the middle literals.
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if last.is_empty() {
        // Trailing '*' spans the rest of the path.
        return true;
    }
    if anchored {
        path.len() >= pos + last.len() && path.ends_with(last)
    } else {
        path[pos..].contains(last)
    }
}
