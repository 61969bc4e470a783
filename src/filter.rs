use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for deciding which hrefs on a feed page are report links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFilterConfig {
    /// Regex patterns a link must match (if empty, all links are included unless excluded)
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    /// Regex patterns for links to drop (these take precedence over include patterns)
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_include_patterns() -> Vec<String> {
    vec!["/tasks".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["/browse".to_string()]
}

impl Default for LinkFilterConfig {
    fn default() -> Self {
        Self {
            include_patterns: default_include_patterns(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Link filter that uses regex patterns to pick report links out of a page
#[derive(Debug)]
pub struct LinkFilter {
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl LinkFilter {
    /// Create a new link filter from configuration
    pub fn new(config: &LinkFilterConfig) -> Result<Self, regex::Error> {
        let include_regexes = config
            .include_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_regexes = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_regexes,
            exclude_regexes,
        })
    }

    /// Determine if a resolved link should be collected
    pub fn accepts(&self, url: &Url) -> bool {
        let url_str = url.as_str();

        if self.exclude_regexes.iter().any(|r| r.is_match(url_str)) {
            return false;
        }

        self.include_regexes.is_empty() || self.include_regexes.iter().any(|r| r.is_match(url_str))
    }

    /// Resolve `href` against `base`, drop its fragment and apply the filter
    pub fn resolve(&self, base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") {
            return None;
        }
        let mut resolved = base.join(href).ok()?;
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        if self.accepts(&resolved) {
            Some(resolved.to_string())
        } else {
            ::log::trace!("Link filter rejected: {}", resolved);
            None
        }
    }
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self::new(&LinkFilterConfig::default()).expect("Default regex patterns should be valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://app.example/submissions").unwrap()
    }

    #[test]
    fn test_default_filter_keeps_task_links() {
        let filter = LinkFilter::default();

        assert_eq!(
            filter.resolve(&base(), "/tasks/abc-123"),
            Some("https://app.example/tasks/abc-123".to_string())
        );
        assert_eq!(filter.resolve(&base(), "/tasks/abc-123/browse"), None);
        assert_eq!(filter.resolve(&base(), "/profile"), None);
    }

    #[test]
    fn test_fragments_are_stripped() {
        let filter = LinkFilter::default();
        assert_eq!(
            filter.resolve(&base(), "https://app.example/tasks/1#network"),
            Some("https://app.example/tasks/1".to_string())
        );
    }

    #[test]
    fn test_non_http_links_are_ignored() {
        let filter = LinkFilter::default();
        assert_eq!(filter.resolve(&base(), "javascript:void(0)"), None);
        assert_eq!(filter.resolve(&base(), "mailto:x@tasks.example"), None);
        assert_eq!(filter.resolve(&base(), "   "), None);
    }

    #[test]
    fn test_empty_include_accepts_everything_not_excluded() {
        let config = LinkFilterConfig {
            include_patterns: vec![],
            exclude_patterns: vec![r"\.pdf$".to_string()],
        };
        let filter = LinkFilter::new(&config).unwrap();
        assert!(filter.accepts(&Url::parse("https://x.example/a").unwrap()));
        assert!(!filter.accepts(&Url::parse("https://x.example/a.pdf").unwrap()));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let config = LinkFilterConfig {
            include_patterns: vec!["(".to_string()],
            exclude_patterns: vec![],
        };
        assert!(LinkFilter::new(&config).is_err());
    }
}
