use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while harvesting report links
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Page structure never appeared, or a navigation action failed after all retries
    #[error("navigation failed while {action}: {reason}")]
    Navigation { action: String, reason: String },

    /// No WebDriver session could be established
    #[error("unable to establish a WebDriver session: {0}")]
    WebDriver(String),

    /// Checkpoint or result file could not be written
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Notification could not be built or delivered. Only ever logged.
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The feed kept returning pages without any rows
    #[error("{count} consecutive pages yielded no links")]
    EmptyPages { count: u32 },
}

impl CrawlError {
    pub fn navigation(action: impl Into<String>, reason: impl ToString) -> Self {
        CrawlError::Navigation {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlError::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(e: serde_json::Error) -> Self {
        CrawlError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for CrawlError {
    fn from(e: csv::Error) -> Self {
        CrawlError::Serialization(e.to_string())
    }
}

impl From<regex::Error> for CrawlError {
    fn from(e: regex::Error) -> Self {
        CrawlError::Config(e.to_string())
    }
}

/// A fatal crawl error together with the progress that survived it
#[derive(Debug, Error)]
#[error("{source} (progress saved through page {pages_persisted}; re-run to resume)")]
pub struct CrawlFailure {
    pub pages_persisted: u64,
    #[source]
    pub source: CrawlError,
}
