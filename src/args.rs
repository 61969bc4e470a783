use clap::Parser;
use report_harvester::config::SmtpConfig;
use report_harvester::{CrawlError, HarvestConfig};
use std::path::PathBuf;

/// Lowest challenge poll interval accepted from the command line
const MIN_CHALLENGE_POLL_SECS: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(name = "report-harvester")]
#[command(about = "Collects report links from a paginated sandbox feed, resuming where it left off")]
#[command(version)]
pub struct Args {
    /// Feed page to start from (overrides the config file)
    pub base_url: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// CSV file receiving the collected report links
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Checkpoint file used to resume interrupted runs
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Seconds to wait for the feed table after each navigation
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Courtesy delay between pages in seconds
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Consecutive pages without links before giving up
    #[arg(long)]
    pub max_empty_pages: Option<u32>,

    /// WebDriver endpoint (WEBDRIVER_URL takes precedence)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Extra comma-separated CSS selectors signalling a bot challenge
    #[arg(long)]
    pub challenge_selector: Option<String>,

    /// Seconds between re-checks while a challenge is showing (minimum 1)
    #[arg(long)]
    pub challenge_poll: Option<f64>,

    /// Skip bot challenge detection entirely
    #[arg(long)]
    pub no_challenge_check: bool,

    #[arg(long)]
    pub smtp_host: Option<String>,

    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// SMTP login; the password is read from SMTP_PASSWORD
    #[arg(long)]
    pub smtp_username: Option<String>,

    #[arg(long)]
    pub smtp_from: Option<String>,

    /// Comma-separated alert recipients
    #[arg(long)]
    pub smtp_to: Option<String>,

    /// Send mail without STARTTLS
    #[arg(long)]
    pub smtp_no_tls: bool,
}

impl Args {
    fn wants_smtp(&self) -> bool {
        self.smtp_host.is_some()
            || self.smtp_port.is_some()
            || self.smtp_username.is_some()
            || self.smtp_from.is_some()
            || self.smtp_to.is_some()
            || self.smtp_no_tls
    }

    /// Build the run configuration: config file first, then flag overrides
    pub fn into_config(self) -> Result<HarvestConfig, CrawlError> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)?,
            None => HarvestConfig::default(),
        };
        self.apply(&mut config, std::env::var("SMTP_PASSWORD").ok());
        config.validate()?;
        Ok(config)
    }

    fn apply(self, config: &mut HarvestConfig, smtp_password: Option<String>) {
        let wants_smtp = self.wants_smtp();

        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(checkpoint) = self.checkpoint {
            config.checkpoint_path = checkpoint;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(timeout) = self.timeout {
            config.browser.wait_timeout_secs = timeout;
        }
        if let Some(delay) = self.delay {
            config.page_delay_secs = delay.max(0.0);
        }
        if let Some(max_empty_pages) = self.max_empty_pages {
            config.max_empty_pages = max_empty_pages;
        }
        if let Some(webdriver_url) = self.webdriver_url {
            config.browser.webdriver_url = webdriver_url;
        }
        if let Some(selector) = self.challenge_selector {
            config.challenge.extra_selector = Some(selector);
        }
        if let Some(poll) = self.challenge_poll {
            config.challenge.poll_interval_secs = poll.max(MIN_CHALLENGE_POLL_SECS);
        }
        if self.no_challenge_check {
            config.challenge.enabled = false;
        }

        if wants_smtp || (smtp_password.is_some() && config.smtp.is_some()) {
            let smtp = config.smtp.get_or_insert_with(SmtpConfig::default);
            if let Some(host) = self.smtp_host {
                smtp.host = Some(host);
            }
            if let Some(port) = self.smtp_port {
                smtp.port = port;
            }
            if let Some(username) = self.smtp_username {
                smtp.username = Some(username);
            }
            if let Some(from) = self.smtp_from {
                smtp.from = Some(from);
            }
            if let Some(to) = self.smtp_to {
                smtp.to = Some(to);
            }
            if self.smtp_no_tls {
                smtp.use_tls = false;
            }
            if smtp_password.is_some() {
                smtp.password = smtp_password;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(argv: &[&str], password: Option<&str>) -> HarvestConfig {
        let args = Args::try_parse_from(argv).unwrap();
        let mut config = HarvestConfig::default();
        args.apply(&mut config, password.map(str::to_string));
        config
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = configured(&["report-harvester"], None);
        assert_eq!(config.output_path, PathBuf::from("reports.csv"));
        assert_eq!(config.checkpoint_path, PathBuf::from("scraper_state.json"));
        assert!(config.challenge.enabled);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let config = configured(
            &[
                "report-harvester",
                "https://feed.example/list",
                "--output",
                "out.csv",
                "--headless",
                "--timeout",
                "45",
                "--delay",
                "2.5",
                "--max-empty-pages",
                "3",
                "--challenge-selector",
                "div.verify,iframe.check",
                "--no-challenge-check",
            ],
            None,
        );
        assert_eq!(config.base_url, "https://feed.example/list");
        assert_eq!(config.output_path, PathBuf::from("out.csv"));
        assert!(config.browser.headless);
        assert_eq!(config.browser.wait_timeout_secs, 45);
        assert_eq!(config.page_delay_secs, 2.5);
        assert_eq!(config.max_empty_pages, 3);
        assert_eq!(
            config.challenge.extra_selector.as_deref(),
            Some("div.verify,iframe.check")
        );
        assert!(!config.challenge.enabled);
    }

    #[test]
    fn test_challenge_poll_has_a_floor() {
        let config = configured(&["report-harvester", "--challenge-poll", "0.2"], None);
        assert_eq!(config.challenge.poll_interval_secs, 1.0);
    }

    #[test]
    fn test_smtp_flags_build_section() {
        let config = configured(
            &[
                "report-harvester",
                "--smtp-host",
                "smtp.example.com",
                "--smtp-port",
                "2525",
                "--smtp-username",
                "ops",
                "--smtp-from",
                "harvester@example.com",
                "--smtp-to",
                "a@example.com,b@example.com",
                "--smtp-no-tls",
            ],
            Some("secret"),
        );
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host.as_deref(), Some("smtp.example.com"));
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.password.as_deref(), Some("secret"));
        assert!(!smtp.use_tls);
        assert!(smtp.is_complete());
    }

    #[test]
    fn test_huge_delay_is_rejected_not_panicking() {
        let config = configured(&["report-harvester", "--delay", "1e20"], None);
        assert!(matches!(config.validate(), Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_password_alone_does_not_enable_smtp() {
        let config = configured(&["report-harvester"], Some("secret"));
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_rejects_unknown_flag() {
        assert!(Args::try_parse_from(["report-harvester", "--concurrency", "4"]).is_err());
    }
}
