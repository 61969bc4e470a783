use crate::error::CrawlError;
use crate::filter::LinkFilterConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Top-level configuration for a harvesting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Feed page the crawl starts from
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// CSV file receiving the collected report links
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// JSON checkpoint used to resume interrupted crawls
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Courtesy delay between pages in seconds (0 disables)
    #[serde(default = "default_page_delay_secs")]
    pub page_delay_secs: f64,

    /// Consecutive pages without any links before the run is failed
    #[serde(default = "default_max_empty_pages")]
    pub max_empty_pages: u32,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,

    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Email alerts for bot challenges; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,

    #[serde(default)]
    pub link_filter: LinkFilterConfig,
}

/// WebDriver session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default)]
    pub headless: bool,

    /// How long to wait for page structure to appear, in seconds
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Attempts per navigation action before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries, doubled on each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// CSS selectors describing the paginated results feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Container that must be present once a page has rendered
    #[serde(default = "default_table_selector")]
    pub table: String,

    /// One element per result row; links are taken from anchors inside it
    #[serde(default = "default_row_selector")]
    pub row: String,

    #[serde(default = "default_next_button_selector")]
    pub next_button: String,

    /// Element whose text is the current page number
    #[serde(default = "default_page_indicator_selector")]
    pub page_indicator: Option<String>,
}

/// Bot-challenge detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// CSS selectors whose visible presence signals a challenge
    #[serde(default = "default_challenge_selectors")]
    pub selectors: Vec<String>,

    /// Additional comma-separated selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_selector: Option<String>,

    /// Seconds between re-checks while a challenge is present
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
}

/// SMTP relay used to alert an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    pub from: Option<String>,

    /// Comma-separated recipients
    pub to: Option<String>,

    /// Upgrade the connection with STARTTLS
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

fn default_base_url() -> String {
    "https://app.any.run/submissions".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("reports.csv")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("scraper_state.json")
}

fn default_page_delay_secs() -> f64 {
    1.0
}

fn default_max_empty_pages() -> u32 {
    5
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_wait_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_table_selector() -> String {
    "[class*='history-table--content']".to_string()
}

fn default_row_selector() -> String {
    ".history-table--content__row".to_string()
}

fn default_next_button_selector() -> String {
    "button.history-pagination__next.history-pagination__button.history-pagination__element"
        .to_string()
}

fn default_page_indicator_selector() -> Option<String> {
    Some("span.history-pagination__hidden-span".to_string())
}

fn default_challenge_selectors() -> Vec<String> {
    [
        "form#challenge-form",
        "div#cf-spinner",
        "div[class*='cf-challenge']",
        "div[class*='botcheck']",
        "iframe[src*='challenge']",
        "iframe[src*='turnstile']",
        "iframe[id*='cf-chl']",
        "iframe[title*='challenge']",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_poll_interval_secs() -> f64 {
    15.0
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: false,
            wait_timeout_secs: default_wait_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            table: default_table_selector(),
            row: default_row_selector(),
            next_button: default_next_button_selector(),
            page_indicator: default_page_indicator_selector(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            selectors: default_challenge_selectors(),
            extra_selector: None,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ChallengeConfig {
    /// Built-in selectors followed by any comma-separated extras
    pub fn all_selectors(&self) -> Vec<String> {
        let mut selectors = self.selectors.clone();
        if let Some(extra) = &self.extra_selector {
            for selector in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !selectors.iter().any(|s| s == selector) {
                    selectors.push(selector.to_string());
                }
            }
        }
        selectors
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
            to: None,
            use_tls: true,
        }
    }
}

impl SmtpConfig {
    /// Host, sender and at least one recipient are all set
    pub fn is_complete(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.host) && set(&self.from) && set(&self.to)
    }

    pub fn recipients(&self) -> Vec<String> {
        self.to
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Longest delay or poll interval accepted, one day
const MAX_INTERVAL_SECS: f64 = 86_400.0;

fn check_seconds(name: &str, value: f64) -> Result<(), CrawlError> {
    if !(0.0..=MAX_INTERVAL_SECS).contains(&value) {
        return Err(CrawlError::Config(format!(
            "{name} must be between 0 and {MAX_INTERVAL_SECS} seconds, got {value}"
        )));
    }
    Ok(())
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::new(&default_base_url())
    }
}

impl HarvestConfig {
    /// Create a new configuration with default values
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            output_path: default_output_path(),
            checkpoint_path: default_checkpoint_path(),
            page_delay_secs: default_page_delay_secs(),
            max_empty_pages: default_max_empty_pages(),
            browser: BrowserConfig::default(),
            selectors: SelectorConfig::default(),
            challenge: ChallengeConfig::default(),
            smtp: None,
            link_filter: LinkFilterConfig::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CrawlError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            CrawlError::Config(format!("cannot open {}: {}", path.display(), e))
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            CrawlError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        serde_json::from_str(json).map_err(|e| CrawlError::Config(e.to_string()))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), CrawlError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| CrawlError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        if self.browser.max_retries == 0 {
            return Err(CrawlError::Config("max_retries must be at least 1".into()));
        }
        if self.max_empty_pages == 0 {
            return Err(CrawlError::Config("max_empty_pages must be at least 1".into()));
        }
        check_seconds("page_delay_secs", self.page_delay_secs)?;
        check_seconds("challenge.poll_interval_secs", self.challenge.poll_interval_secs)?;
        for selector in [&self.selectors.table, &self.selectors.row, &self.selectors.next_button] {
            if selector.trim().is_empty() {
                return Err(CrawlError::Config("feed selectors must not be empty".into()));
            }
        }
        Ok(())
    }
}
